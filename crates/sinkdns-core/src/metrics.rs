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
 *  Exposes the global prometheus registry on /metrics over plain HTTP/1.1.
 */
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prometheus::Encoder;
use std::convert::Infallible;
use std::net::SocketAddr;

async fn serve(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let metric_families = prometheus::gather();
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        log::warn!("failed to encode metrics: {}", e);
        return Ok(Response::builder().status(500).body(Body::empty()).unwrap());
    }
    Ok(Response::builder()
        .header("Content-Type", encoder.format_type())
        .body(Body::from(buffer))
        .unwrap())
}

/// Runs the metrics HTTP server until the process exits. Intended to be
/// spawned as its own task alongside the DNS listeners.
pub async fn run(bind_addr: SocketAddr) -> std::io::Result<()> {
    let make_svc = make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(serve)) });
    log::info!("metrics listener on {}", bind_addr);
    Server::bind(&bind_addr)
        .serve(make_svc)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}
