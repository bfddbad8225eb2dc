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
 */
use hickory_proto::op::Message;
use std::sync::Arc;

use super::Listener;

impl Listener {
    pub async fn serve_udp(self: Arc<Self>, sock: sinkdns_net::UdpSocket) -> crate::error::Result<()> {
        let sock = Arc::new(sock);
        loop {
            let received = match sock.recv(self.read_timeout).await {
                Ok(r) => r,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => {
                    log::warn!("udp recv error: {}", e);
                    continue;
                }
            };

            let query = match Message::from_vec(&received.buffer) {
                Ok(m) => m,
                Err(e) => {
                    log::debug!("dropping malformed udp query from {}: {}", received.from, e);
                    continue;
                }
            };

            let listener = self.clone();
            let sock = sock.clone();
            let from = received.from;
            tokio::spawn(async move {
                let client_ip = from.ip().to_string();
                let answer = listener.handle("udp", &query, &client_ip).await;
                match answer.to_vec() {
                    Ok(wire) => {
                        if let Err(e) = sock.send_to(&wire, from, listener.write_timeout).await {
                            log::warn!("udp send error to {}: {}", from, e);
                        }
                    }
                    Err(e) => log::warn!("failed to encode udp answer for {}: {}", from, e),
                }
            });
        }
    }
}
