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
 *  Fans a query out to the configured nameservers top-to-bottom, starting a
 *  new one every `tick` until one answers or the list is exhausted. A
 *  sibling that answers after we've already taken a result is left to run to
 *  completion and its answer is discarded via a non-blocking send into a
 *  single-slot channel - there is no cooperative cancellation, deadlines on
 *  each probe bound the cost.
 */
use hickory_proto::op::{Message, ResponseCode};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

lazy_static::lazy_static! {
    static ref RESOLVE_RESULT: prometheus::IntCounterVec =
        prometheus::register_int_counter_vec!(
            "racing_resolver_result",
            "Racing resolver outcomes",
            &["result"])
        .unwrap();
}

pub struct RacingResolver {
    tick: Duration,
    rw_timeout: Duration,
}

/// NoError is obviously usable; any other non-ServFail code (NXDOMAIN and
/// friends) is a legitimate terminal answer too - only ServFail warrants
/// trying another upstream.
fn is_usable(msg: &Message) -> bool {
    msg.response_code() != ResponseCode::ServFail
}

impl RacingResolver {
    pub fn new(tick: Duration, rw_timeout: Duration) -> Self {
        RacingResolver { tick, rw_timeout }
    }

    async fn exchange_udp(query: &Message, addr: SocketAddr, timeout: Duration) -> Option<Message> {
        let sock = sinkdns_net::UdpSocket::bind("0.0.0.0:0", 65535).await.ok()?;
        sock.connect(addr).await.ok()?;
        let wire = query.to_vec().ok()?;
        sock.send(&wire, timeout).await.ok()?;
        let resp = sock.recv_exchange(timeout).await.ok()?;
        Message::from_vec(&resp).ok()
    }

    async fn exchange_tcp(query: &Message, addr: SocketAddr, timeout: Duration) -> Option<Message> {
        let mut sock = sinkdns_net::TcpSocket::connect(addr, timeout).await.ok()?;
        let wire = query.to_vec().ok()?;
        sock.send(&wire, timeout).await.ok()?;
        let resp = sock.recv(timeout).await.ok()?;
        Message::from_vec(&resp).ok()
    }

    async fn exchange_one(net: &str, query: &Message, server: &str, timeout: Duration) -> Option<Message> {
        let addr: SocketAddr = server.parse().ok()?;
        let result = if net == "tcp" {
            Self::exchange_tcp(query, addr, timeout).await
        } else {
            Self::exchange_udp(query, addr, timeout).await
        };
        match result {
            Some(msg) if is_usable(&msg) => Some(msg),
            Some(_) => {
                log::warn!("{} failed to get a valid answer on {}", net, server);
                None
            }
            None => {
                log::warn!("{} socket error on {}", net, server);
                None
            }
        }
    }

    /// Races `query` across `nameservers`, returning the first usable answer.
    pub async fn resolve(
        &self,
        net: &'static str,
        query: &Message,
        nameservers: &[String],
        qname: &str,
    ) -> Result<Message> {
        if nameservers.is_empty() {
            RESOLVE_RESULT.with_label_values(&["no_nameservers"]).inc();
            return Err(Error::Resolve {
                qname: qname.to_string(),
                net,
                nameservers: vec![],
            });
        }

        let (tx, mut rx) = mpsc::channel::<Message>(1);
        let mut started = 0usize;

        for server in nameservers {
            started += 1;
            let tx = tx.clone();
            let server = server.clone();
            let query = query.clone();
            let timeout = self.rw_timeout;

            tokio::spawn(async move {
                if let Some(answer) = Self::exchange_one(net, &query, &server, timeout).await {
                    let _ = tx.try_send(answer);
                }
            });

            if started == nameservers.len() {
                break;
            }

            tokio::select! {
                Some(answer) = rx.recv() => {
                    RESOLVE_RESULT.with_label_values(&["hit"]).inc();
                    return Ok(answer);
                }
                _ = tokio::time::sleep(self.tick) => {
                    continue;
                }
            }
        }

        // All nameservers started; wait out the remaining in-flight probes.
        drop(tx);
        match tokio::time::timeout(self.rw_timeout, rx.recv()).await {
            Ok(Some(answer)) => {
                RESOLVE_RESULT.with_label_values(&["hit"]).inc();
                Ok(answer)
            }
            _ => {
                RESOLVE_RESULT.with_label_values(&["all_failed"]).inc();
                Err(Error::Resolve {
                    qname: qname.to_string(),
                    net,
                    nameservers: nameservers.to_vec(),
                })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hickory_proto::op::{Message, MessageType, OpCode, Query};
    use hickory_proto::rr::{Name, RecordType};
    use std::str::FromStr;

    fn make_query() -> Message {
        let mut msg = Message::new();
        msg.set_id(1234);
        msg.set_message_type(MessageType::Query);
        msg.set_op_code(OpCode::Query);
        msg.add_query(Query::query(
            Name::from_str("example.com.").unwrap(),
            RecordType::A,
        ));
        msg
    }

    #[tokio::test]
    async fn no_nameservers_fails_immediately() {
        let resolver = RacingResolver::new(Duration::from_millis(50), Duration::from_millis(100));
        let q = make_query();
        let result = resolver.resolve("udp", &q, &[], "example.com").await;
        assert!(matches!(result, Err(Error::Resolve { .. })));
    }

    #[tokio::test]
    async fn unreachable_nameservers_fail_after_timeout() {
        // 192.0.2.0/24 is TEST-NET-1, guaranteed unreachable/non-routable.
        let resolver = RacingResolver::new(Duration::from_millis(20), Duration::from_millis(50));
        let q = make_query();
        let result = resolver
            .resolve("udp", &q, &["192.0.2.1:53".to_string()], "example.com")
            .await;
        assert!(matches!(result, Err(Error::Resolve { .. })));
    }
}
