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
pub mod action;
pub mod breaker;
pub mod cache;
pub mod config;
pub mod decision;
pub mod error;
pub mod fingerprint;
pub mod listener;
pub mod metrics;
pub mod oraculum;
pub mod proto;
pub mod resolver;
pub mod sync;
pub mod tls;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use config::Config;
use decision::{DecisionPipeline, ListCache};
use oraculum::{OraculumClient, ProbePool};
use resolver::{Nameservers, RacingResolver};
use sync::BlocklistSynchroniser;

/// Everything constructed once at startup and threaded explicitly through
/// the listener and synchroniser, rather than reached for via module-level
/// statics. `App::bootstrap` is the single place that turns a `Config` into
/// a runnable server.
pub struct App {
    pub config: Config,
    pub listener: Arc<listener::Listener>,
    pub blocklist_sync: Arc<BlocklistSynchroniser>,
}

impl App {
    /// `tls` must be `Some` when `config.local_resolver` is set; the caller
    /// (the `sinkdnsd` binary) is responsible for base64-decoding the
    /// `client_{crt,key}_base64` / `ca_crt_base64` configuration values and
    /// building it, since decoding that material is outside this crate's
    /// scope.
    pub async fn bootstrap(config: Config, tls: Option<tls::TlsMaterial>) -> error::Result<Self> {
        let list_cache = Arc::new(ListCache::new());
        let expiring_cache = Arc::new(cache::ExpiringCache::new(
            Duration::from_millis(config.oraculum_cache_expire_ms),
            config.oraculum_cache_maxcount,
        ));
        let breaker = Arc::new(breaker::CircuitBreaker::new(
            Duration::from_millis(config.oraculum_sleep_when_disabled_ms.max(0) as u64),
            Duration::from_millis(config.oraculum_api_fit_timeout_ms),
        ));
        let probe_pool = Arc::new(ProbePool::new(config.max_requests));

        let oraculum_timeout = Duration::from_millis(config.oraculum_api_timeout_ms);
        let oraculum = if config.local_resolver {
            let tls = tls
                .as_ref()
                .ok_or_else(|| error::Error::Decode("local-resolver mode requires TLS material".into()))?;
            Arc::new(OraculumClient::new_local(
                config.oraculum_url.clone(),
                config.oraculum_access_token_key.clone(),
                config.oraculum_access_token_value.clone(),
                config.client_id_header.clone(),
                config.client_id,
                oraculum_timeout,
                tls,
            )?)
        } else {
            Arc::new(OraculumClient::new_remote(
                config.oraculum_url.clone(),
                config.oraculum_access_token_key.clone(),
                config.oraculum_access_token_value.clone(),
                config.client_id_header.clone(),
                config.client_id,
                oraculum_timeout,
            )?)
        };

        let pipeline = Arc::new(DecisionPipeline::new(
            config.local_resolver,
            config.oraculum_disabled,
            config.oraculum_ip_addresses_enabled,
            Duration::from_millis(config.oraculum_api_fit_timeout_ms),
            config.sinkhole_address,
            config.sinkhole_ttl,
            list_cache.clone(),
            expiring_cache,
            breaker,
            oraculum.clone(),
            probe_pool,
        ));

        let resolv_conf = std::fs::read_to_string(&config.resolv_conf_file).ok();
        let nameservers = Nameservers::build(
            &config.backend_resolvers,
            config.backend_resolvers_exclusively,
            resolv_conf.as_deref(),
        );
        let racing_resolver = RacingResolver::new(
            Duration::from_millis(config.backend_resolver_tick_ms),
            Duration::from_millis(config.godns_read_timeout_ms),
        );

        let bind_addr: SocketAddr = format!("{}:{}", config.bind_host, config.bind_port)
            .parse()
            .map_err(|_| error::Error::Decode("invalid bind address".into()))?;

        let listener = Arc::new(listener::Listener::new(
            bind_addr,
            config.godns_udp_packet_size,
            Duration::from_millis(config.godns_read_timeout_ms),
            Duration::from_millis(config.godns_write_timeout_ms),
            nameservers,
            racing_resolver,
            pipeline,
        ));

        let blocklist_sync = Arc::new(BlocklistSynchroniser::new(
            cache_http_client(&config, tls.as_ref())?,
            config.cache_url.clone(),
            std::path::PathBuf::from(&config.cache_dir),
            config.oraculum_access_token_key.clone(),
            config.oraculum_access_token_value.clone(),
            config.client_id_header.clone(),
            config.client_id,
            config.cache_retry_count,
            Duration::from_secs(config.cache_retry_interval_s),
            Duration::from_secs(config.cache_request_timeout_s),
            config.local_resolver,
            config.whitelist_refresh(),
            config.ioc_refresh(),
            config.customlist_refresh(),
            list_cache,
        ));

        Ok(App {
            config,
            listener,
            blocklist_sync,
        })
    }
}

fn cache_http_client(
    config: &Config,
    tls: Option<&tls::TlsMaterial>,
) -> error::Result<reqwest::Client> {
    let timeout = Duration::from_secs(config.cache_request_timeout_s);
    if config.local_resolver {
        let tls = tls
            .ok_or_else(|| error::Error::Decode("local-resolver mode requires TLS material".into()))?;
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .use_rustls_tls()
            .http2_prior_knowledge()
            .identity(tls.identity()?)
            .add_root_certificate(tls.ca_certificate()?);
        if tls.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(builder.build()?)
    } else {
        Ok(reqwest::Client::builder().timeout(timeout).build()?)
    }
}
