/*   Copyright 2024 sinkdns contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 *
 *  SPDX-License-Identifier: Apache-2.0
 *
 *  One query per TCP connection, like the original dns.Server TCP handler:
 *  accept, read one length-prefixed message, answer, close.
 */
use hickory_proto::op::Message;
use std::sync::Arc;

use super::Listener;

impl Listener {
    pub async fn serve_tcp(self: Arc<Self>, listener: tokio::net::TcpListener) -> crate::error::Result<()> {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("tcp accept error: {}", e);
                    continue;
                }
            };

            let me = self.clone();
            tokio::spawn(async move {
                let mut sock = sinkdns_net::TcpSocket::new(stream);
                let buf = match sock.recv(me.read_timeout).await {
                    Ok(b) => b,
                    Err(e) => {
                        log::debug!("tcp recv error from {}: {}", peer, e);
                        return;
                    }
                };
                let query = match Message::from_vec(&buf) {
                    Ok(m) => m,
                    Err(e) => {
                        log::debug!("dropping malformed tcp query from {}: {}", peer, e);
                        return;
                    }
                };

                let client_ip = peer.ip().to_string();
                let answer = me.handle("tcp", &query, &client_ip).await;
                match answer.to_vec() {
                    Ok(wire) => {
                        if let Err(e) = sock.send(&wire, me.write_timeout).await {
                            log::warn!("tcp send error to {}: {}", peer, e);
                        }
                    }
                    Err(e) => log::warn!("failed to encode tcp answer for {}: {}", peer, e),
                }
            });
        }
    }
}
