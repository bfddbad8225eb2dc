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
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::ToSocketAddrs;

/// A UDP socket with a fixed max-datagram size and per-call deadlines.
///
/// Wraps `tokio::net::UdpSocket`; the wrapping exists so the listener and the
/// racing resolver share one place that enforces read/write timeouts instead
/// of each re-deriving `tokio::time::timeout` boilerplate.
pub struct UdpSocket {
    sock: tokio::net::UdpSocket,
    max_packet_size: usize,
}

#[derive(Debug)]
pub struct RecvResult {
    pub buffer: Vec<u8>,
    pub from: SocketAddr,
}

impl UdpSocket {
    pub async fn bind<A: ToSocketAddrs>(addr: A, max_packet_size: usize) -> std::io::Result<Self> {
        let sock = tokio::net::UdpSocket::bind(addr).await?;
        Ok(UdpSocket {
            sock,
            max_packet_size,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.sock.local_addr()
    }

    pub async fn recv(&self, timeout: Duration) -> std::io::Result<RecvResult> {
        let mut buf = vec![0u8; self.max_packet_size];
        let (len, from) = tokio::time::timeout(timeout, self.sock.recv_from(&mut buf))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "udp recv timeout"))??;
        buf.truncate(len);
        Ok(RecvResult { buffer: buf, from })
    }

    pub async fn send_to(
        &self,
        buf: &[u8],
        to: SocketAddr,
        timeout: Duration,
    ) -> std::io::Result<usize> {
        tokio::time::timeout(timeout, self.sock.send_to(buf, to))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "udp send timeout"))?
    }

    pub async fn connect(&self, addr: SocketAddr) -> std::io::Result<()> {
        self.sock.connect(addr).await
    }

    pub async fn send(&self, buf: &[u8], timeout: Duration) -> std::io::Result<usize> {
        tokio::time::timeout(timeout, self.sock.send(buf))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "udp send timeout"))?
    }

    pub async fn recv_exchange(&self, timeout: Duration) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.max_packet_size];
        let len = tokio::time::timeout(timeout, self.sock.recv(&mut buf))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "udp recv timeout"))??;
        buf.truncate(len);
        Ok(buf)
    }
}
