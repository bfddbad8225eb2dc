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
 *  One HTTP(S) call per lookup: GET {base}/{client_ip}/{query}/{fqdn}. A
 *  persistent reqwest::Client backs both remote mode (plain HTTP/1.1,
 *  keep-alive) and local-resolver mode (mTLS, pinned CA). Which one we build
 *  is decided once at startup from `Config::local_resolver`.
 */
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::tls::TlsMaterial;

#[derive(Deserialize)]
struct SinkholeResponse {
    sinkhole: String,
}

pub struct OraculumClient {
    http: reqwest::Client,
    base_url: String,
    token_key: String,
    token_value: String,
    client_id_header: String,
    client_id: Option<i64>,
}

impl OraculumClient {
    /// Builds the client for remote mode: plain HTTP/1.1 with keep-alive, no
    /// client certificate.
    pub fn new_remote(
        base_url: String,
        token_key: String,
        token_value: String,
        client_id_header: String,
        client_id: Option<i64>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(20)
            .build()?;
        Ok(OraculumClient {
            http,
            base_url,
            token_key,
            token_value,
            client_id_header,
            client_id,
        })
    }

    /// Builds the client for local-resolver mode: presents a client
    /// certificate and pins to the provided CA pool over HTTP/2.
    pub fn new_local(
        base_url: String,
        token_key: String,
        token_value: String,
        client_id_header: String,
        client_id: Option<i64>,
        timeout: Duration,
        tls: &TlsMaterial,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .use_rustls_tls()
            .http2_prior_knowledge()
            .identity(tls.identity()?)
            .add_root_certificate(tls.ca_certificate()?);
        if tls.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build()?;
        Ok(OraculumClient {
            http,
            base_url,
            token_key,
            token_value,
            client_id_header,
            client_id,
        })
    }

    fn build_request(&self, client_ip: &str, query: &str, trimmed_fqdn: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}/{}", self.base_url, client_ip, query, trimmed_fqdn);
        let mut req = self
            .http
            .get(url)
            .header(&self.token_key, &self.token_value)
            .header("Content-Type", "application/json");
        if let Some(id) = self.client_id {
            req = req.header(&self.client_id_header, id.to_string());
        }
        req
    }

    /// Performs the decision lookup. Returns `true` if Oraculum says this
    /// should be sinkholed.
    pub async fn lookup(&self, client_ip: &str, query: &str, trimmed_fqdn: &str) -> Result<bool> {
        let resp = self
            .build_request(client_ip, query, trimmed_fqdn)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() != 200 {
            return Err(Error::Core {
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await?;
        // "null" or a trivial stray byte - not a sinkhole hit, and not an
        // error either.
        if body.len() < 6 {
            return Ok(false);
        }

        let parsed: SinkholeResponse = serde_json::from_slice(&body)?;
        log::debug!("oraculum returned sinkhole={}", parsed.sinkhole);
        Ok(true)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::SocketAddr;

    async fn spawn_stub(
        status: u16,
        body: &'static str,
    ) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(s) => s,
                    Err(_) => return,
                };
                use tokio::io::{AsyncReadExt, AsyncWriteExt};
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {} OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        (addr, handle)
    }

    fn client_for(addr: SocketAddr) -> OraculumClient {
        OraculumClient::new_remote(
            format!("http://{}", addr),
            "X-sinkit-token".into(),
            "secret".into(),
            "X-client-id".into(),
            None,
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn short_body_means_no_match() {
        let (addr, _h) = spawn_stub(200, "null").await;
        let client = client_for(addr);
        let result: std::result::Result<bool, Error> = client.lookup("1.2.3.4", "q", "q").await;
        assert_eq!(result.unwrap(), false);
    }

    #[tokio::test]
    async fn sinkhole_json_means_match() {
        let (addr, _h) = spawn_stub(200, r#"{"sinkhole":"10.0.0.1"}"#).await;
        let client = client_for(addr);
        let result = client.lookup("1.2.3.4", "q", "q").await;
        assert_eq!(result.unwrap(), true);
    }

    #[tokio::test]
    async fn non_200_is_an_error() {
        let (addr, _h) = spawn_stub(500, "oops").await;
        let client = client_for(addr);
        match client.lookup("1.2.3.4", "q", "q").await {
            Err(Error::Core { status }) => assert_eq!(status, 500),
            other => panic!("expected Core error, got {:?}", other.is_ok()),
        }
    }
}
