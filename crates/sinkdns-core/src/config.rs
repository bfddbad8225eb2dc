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
 *  Environment-sourced configuration. One flat struct, deserialised with
 *  envy from a prefix-stripped environment, mirroring the shape (if not the
 *  library) of the Go original's envconfig-backed Settings struct.
 */
use serde::Deserialize;

pub const ENV_PREFIX: &str = "SINKDNS_";

fn default_bind_host() -> String {
    "0.0.0.0".into()
}
fn default_bind_port() -> u16 {
    53
}
fn default_read_timeout_ms() -> u64 {
    2000
}
fn default_write_timeout_ms() -> u64 {
    2000
}
fn default_udp_packet_size() -> usize {
    4096
}
fn default_resolv_conf_file() -> String {
    "/etc/resolv.conf".into()
}
fn default_backend_resolver_tick_ms() -> u64 {
    200
}
fn default_oraculum_api_timeout_ms() -> u64 {
    500
}
fn default_oraculum_api_fit_timeout_ms() -> u64 {
    200
}
fn default_oraculum_sleep_when_disabled_ms() -> i64 {
    10_000
}
fn default_oraculum_cache_expire_ms() -> u64 {
    300_000
}
fn default_oraculum_cache_maxcount() -> usize {
    0
}
fn default_sinkhole_ttl() -> u32 {
    10
}
fn default_client_id_header() -> String {
    "X-client-id".into()
}
fn default_cache_refresh_min() -> u64 {
    60
}
fn default_cache_retry_count() -> u32 {
    3
}
fn default_cache_retry_interval_s() -> u64 {
    1
}
fn default_cache_request_timeout_s() -> u64 {
    10
}
fn default_cache_dir() -> String {
    "/data".into()
}
fn default_max_requests() -> usize {
    32
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_host")]
    pub bind_host: String,
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    #[serde(default = "default_read_timeout_ms")]
    pub godns_read_timeout_ms: u64,
    #[serde(default = "default_write_timeout_ms")]
    pub godns_write_timeout_ms: u64,
    #[serde(default = "default_udp_packet_size")]
    pub godns_udp_packet_size: usize,

    #[serde(default = "default_resolv_conf_file")]
    pub resolv_conf_file: String,
    #[serde(default)]
    pub backend_resolvers: Vec<String>,
    #[serde(default)]
    pub backend_resolvers_exclusively: bool,
    #[serde(default = "default_backend_resolver_tick_ms")]
    pub backend_resolver_tick_ms: u64,

    pub oraculum_url: String,
    pub oraculum_access_token_key: String,
    pub oraculum_access_token_value: String,
    #[serde(default = "default_oraculum_api_timeout_ms")]
    pub oraculum_api_timeout_ms: u64,
    #[serde(default = "default_oraculum_api_fit_timeout_ms")]
    pub oraculum_api_fit_timeout_ms: u64,
    #[serde(default = "default_oraculum_sleep_when_disabled_ms")]
    pub oraculum_sleep_when_disabled_ms: i64,
    #[serde(default = "default_oraculum_cache_expire_ms")]
    pub oraculum_cache_expire_ms: u64,
    #[serde(default = "default_oraculum_cache_maxcount")]
    pub oraculum_cache_maxcount: usize,
    #[serde(default)]
    pub oraculum_ip_addresses_enabled: bool,
    #[serde(default)]
    pub oraculum_disabled: bool,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    pub sinkhole_address: std::net::Ipv4Addr,
    #[serde(default = "default_sinkhole_ttl")]
    pub sinkhole_ttl: u32,

    #[serde(default)]
    pub local_resolver: bool,
    #[serde(default)]
    pub client_crt_base64: Option<String>,
    #[serde(default)]
    pub client_key_base64: Option<String>,
    #[serde(default)]
    pub ca_crt_base64: Option<String>,
    #[serde(default)]
    pub insecure_skip_verify: bool,

    #[serde(default)]
    pub client_id: Option<i64>,
    #[serde(default = "default_client_id_header")]
    pub client_id_header: String,

    pub cache_url: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_cache_refresh_min")]
    pub cache_refresh_whitelist_min: u64,
    #[serde(default = "default_cache_refresh_min")]
    pub cache_refresh_ioc_min: u64,
    #[serde(default = "default_cache_refresh_min")]
    pub cache_refresh_customlist_min: u64,
    #[serde(default = "default_cache_retry_count")]
    pub cache_retry_count: u32,
    #[serde(default = "default_cache_retry_interval_s")]
    pub cache_retry_interval_s: u64,
    #[serde(default = "default_cache_request_timeout_s")]
    pub cache_request_timeout_s: u64,
}

impl Config {
    pub fn load() -> Result<Config, envy::Error> {
        envy::prefixed(ENV_PREFIX).from_env::<Config>()
    }

    #[cfg(test)]
    pub fn load_from_iter<I: IntoIterator<Item = (String, String)>>(
        iter: I,
    ) -> Result<Config, envy::Error> {
        envy::prefixed(ENV_PREFIX).from_iter(iter)
    }

    pub fn whitelist_refresh(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_refresh_whitelist_min * 60)
    }
    pub fn ioc_refresh(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_refresh_ioc_min * 60)
    }
    pub fn customlist_refresh(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_refresh_customlist_min * 60)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn minimal_env() -> Vec<(String, String)> {
        vec![
            ("SINKDNS_ORACULUM_URL".into(), "https://core.example".into()),
            ("SINKDNS_ORACULUM_ACCESS_TOKEN_KEY".into(), "X-sinkit-token".into()),
            ("SINKDNS_ORACULUM_ACCESS_TOKEN_VALUE".into(), "secret".into()),
            ("SINKDNS_SINKHOLE_ADDRESS".into(), "10.0.0.1".into()),
            ("SINKDNS_CACHE_URL".into(), "https://cache.example".into()),
        ]
    }

    #[test]
    fn defaults_fill_in_when_env_minimal() {
        let cfg = Config::load_from_iter(minimal_env()).unwrap();
        assert_eq!(cfg.bind_port, 53);
        assert_eq!(cfg.godns_udp_packet_size, 4096);
        assert!(!cfg.local_resolver);
        assert_eq!(cfg.sinkhole_ttl, 10);
    }

    #[test]
    fn missing_required_field_fails() {
        let env: Vec<(String, String)> = vec![(
            "SINKDNS_ORACULUM_URL".into(),
            "https://core.example".into(),
        )];
        assert!(Config::load_from_iter(env).is_err());
    }
}
