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
 *  Process entry point: load config, assemble the App, run the DNS
 *  listeners, the blocklist synchroniser and the metrics endpoint side by
 *  side, and exit cleanly on SIGINT.
 */
use base64::Engine as _;
use sinkdns_core::{config::Config, tls::TlsMaterial, App};

fn decode_tls_material(config: &Config) -> Result<TlsMaterial, String> {
    let engine = base64::engine::general_purpose::STANDARD;
    let crt = config
        .client_crt_base64
        .as_deref()
        .ok_or("SINKDNS_CLIENT_CRT_BASE64 not set")?;
    let key = config
        .client_key_base64
        .as_deref()
        .ok_or("SINKDNS_CLIENT_KEY_BASE64 not set")?;
    let ca = config
        .ca_crt_base64
        .as_deref()
        .ok_or("SINKDNS_CA_CRT_BASE64 not set")?;

    let crt = engine.decode(crt).map_err(|e| e.to_string())?;
    let key = engine.decode(key).map_err(|e| e.to_string())?;
    let ca = engine.decode(ca).map_err(|e| e.to_string())?;

    Ok(TlsMaterial::new(&crt, &key, ca).with_insecure_skip_verify(config.insecure_skip_verify))
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            log::error!("failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let tls = if config.local_resolver {
        match decode_tls_material(&config) {
            Ok(tls) => Some(tls),
            Err(e) => {
                log::error!("failed to load TLS material: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let app = match App::bootstrap(config, tls).await {
        Ok(app) => app,
        Err(e) => {
            log::error!("failed to start: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("preparing blocklist caches");
    if let Err(e) = app.blocklist_sync.startup().await {
        log::error!("failed to prepare blocklist caches: {}", e);
        std::process::exit(1);
    }

    let sync = app.blocklist_sync.clone();
    tokio::spawn(async move { sync.run().await });

    let metrics_addr: std::net::SocketAddr = ([0, 0, 0, 0], 9100).into();
    tokio::spawn(async move {
        if let Err(e) = sinkdns_core::metrics::run(metrics_addr).await {
            log::error!("metrics listener failed: {}", e);
        }
    });

    let listener = app.listener.clone();
    let serve = tokio::spawn(async move { listener.run().await });

    tokio::select! {
        result = serve => {
            match result {
                Ok(Ok(())) => log::info!("listener exited"),
                Ok(Err(e)) => {
                    log::error!("listener failed: {}", e);
                    std::process::exit(1);
                }
                Err(e) => {
                    log::error!("listener task panicked: {}", e);
                    std::process::exit(1);
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("received SIGINT, shutting down");
        }
    }
}
