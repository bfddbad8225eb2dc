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
 *  DNS-over-TCP framing: each message is prefixed by a u16 length (RFC 1035
 *  4.2.2). We lean on tokio_util's length-delimited codec rather than
 *  hand-rolling the length prefix loop.
 */
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

pub struct TcpSocket {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl TcpSocket {
    pub fn new(stream: TcpStream) -> Self {
        let codec = LengthDelimitedCodec::builder()
            .length_field_length(2)
            .big_endian()
            .new_codec();
        TcpSocket {
            framed: Framed::new(stream, codec),
        }
    }

    pub async fn connect(addr: std::net::SocketAddr, timeout: Duration) -> std::io::Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "tcp connect timeout"))??;
        Ok(Self::new(stream))
    }

    pub async fn recv(&mut self, timeout: Duration) -> std::io::Result<Vec<u8>> {
        use futures::StreamExt as _;
        match tokio::time::timeout(timeout, self.framed.next()).await {
            Ok(Some(Ok(bytes))) => Ok(bytes.to_vec()),
            Ok(Some(Err(e))) => Err(e),
            Ok(None) => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "tcp connection closed",
            )),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "tcp recv timeout",
            )),
        }
    }

    pub async fn send(&mut self, buf: &[u8], timeout: Duration) -> std::io::Result<()> {
        use futures::SinkExt as _;
        tokio::time::timeout(timeout, self.framed.send(bytes::Bytes::copy_from_slice(buf)))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "tcp send timeout"))?
    }
}
