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
 *  Binds the UDP and TCP listeners and dispatches each query through the
 *  racing resolver and decision pipeline. Each protocol's accept loop runs
 *  as its own task, mirroring the original's two independent dns.Server
 *  goroutines on one shared handler.
 */
pub mod tcp;
pub mod udp;

use hickory_proto::op::{Message, ResponseCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::decision::DecisionPipeline;
use crate::error::Result;
use crate::resolver::{Nameservers, RacingResolver};

pub struct Listener {
    bind_addr: SocketAddr,
    udp_packet_size: usize,
    read_timeout: Duration,
    write_timeout: Duration,
    nameservers: Nameservers,
    resolver: RacingResolver,
    pipeline: Arc<DecisionPipeline>,
}

impl Listener {
    pub fn new(
        bind_addr: SocketAddr,
        udp_packet_size: usize,
        read_timeout: Duration,
        write_timeout: Duration,
        nameservers: Nameservers,
        resolver: RacingResolver,
        pipeline: Arc<DecisionPipeline>,
    ) -> Self {
        Listener {
            bind_addr,
            udp_packet_size,
            read_timeout,
            write_timeout,
            nameservers,
            resolver,
            pipeline,
        }
    }

    pub async fn run(self: Arc<Self>) -> Result<()> {
        let udp_sock = sinkdns_net::UdpSocket::bind(self.bind_addr, self.udp_packet_size).await?;
        let tcp_listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        log::info!("udp listener on {}", self.bind_addr);
        log::info!("tcp listener on {}", self.bind_addr);

        let udp_self = self.clone();
        let udp_task = tokio::spawn(async move { udp_self.serve_udp(udp_sock).await });

        let tcp_self = self.clone();
        let tcp_task = tokio::spawn(async move { tcp_self.serve_tcp(tcp_listener).await });

        let _ = tokio::join!(udp_task, tcp_task);
        Ok(())
    }

    /// Handles one query end to end: forward to the racing resolver, run the
    /// decision pipeline over the answer, and return it with the original
    /// query id restored. A resolve failure degrades to SERVFAIL rather than
    /// dropping the client's request silently.
    async fn handle(&self, net: &'static str, query: &Message, client_ip: &str) -> Message {
        let Some(question) = query.queries().first() else {
            return servfail(query);
        };
        let qname = question.name().clone();

        match self
            .resolver
            .resolve(net, query, self.nameservers.as_slice(), &qname.to_ascii())
            .await
        {
            Ok(mut answer) => {
                self.pipeline.process(&qname, client_ip, &mut answer).await;
                answer.set_id(query.id());
                answer
            }
            Err(e) => {
                log::warn!("resolve query error: {}", e);
                servfail(query)
            }
        }
    }
}

fn servfail(query: &Message) -> Message {
    let mut resp = Message::new();
    resp.set_id(query.id());
    resp.set_message_type(hickory_proto::op::MessageType::Response);
    resp.set_op_code(query.op_code());
    resp.set_response_code(ResponseCode::ServFail);
    for q in query.queries() {
        resp.add_query(q.clone());
    }
    resp
}
