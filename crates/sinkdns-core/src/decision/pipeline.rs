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
 *  Orchestrates the cache/blocklist/breaker lookups and rewrites the answer
 *  to the sinkhole address when warranted. Runs after the racing resolver
 *  has already produced `answer`. Every error path here degrades to "pass
 *  through" - the pipeline never propagates an error to the caller, the
 *  client always gets a DNS response.
 */
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::op::Message;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::action::{Action, Verdict};
use crate::breaker::CircuitBreaker;
use crate::cache::{ExpiringCache, SnapshotTable};
use crate::error::Error;
use crate::fingerprint;
use crate::oraculum::{OraculumClient, ProbePool};

/// Suppress this rare suffix: the root server hints are never worth a lookup.
const ROOT_SERVERS_SUFFIX: &str = ".root-servers.net.";

pub struct ListCache {
    pub whitelist: SnapshotTable,
    pub customlist: SnapshotTable,
    pub ioclist: SnapshotTable,
}

impl ListCache {
    pub fn new() -> Self {
        ListCache {
            whitelist: SnapshotTable::new(),
            customlist: SnapshotTable::new(),
            ioclist: SnapshotTable::new(),
        }
    }
}

impl Default for ListCache {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DecisionPipeline {
    local_resolver: bool,
    oraculum_disabled: bool,
    oraculum_ip_addresses_enabled: bool,
    fit_response_time: Duration,
    sinkhole_address: Ipv4Addr,
    sinkhole_ttl: u32,

    list_cache: Arc<ListCache>,
    expiring_cache: Arc<ExpiringCache>,
    breaker: Arc<CircuitBreaker>,
    oraculum: Arc<OraculumClient>,
    probe_pool: Arc<ProbePool>,
}

#[allow(clippy::too_many_arguments)]
impl DecisionPipeline {
    pub fn new(
        local_resolver: bool,
        oraculum_disabled: bool,
        oraculum_ip_addresses_enabled: bool,
        fit_response_time: Duration,
        sinkhole_address: Ipv4Addr,
        sinkhole_ttl: u32,
        list_cache: Arc<ListCache>,
        expiring_cache: Arc<ExpiringCache>,
        breaker: Arc<CircuitBreaker>,
        oraculum: Arc<OraculumClient>,
        probe_pool: Arc<ProbePool>,
    ) -> Self {
        DecisionPipeline {
            local_resolver,
            oraculum_disabled,
            oraculum_ip_addresses_enabled,
            fit_response_time,
            sinkhole_address,
            sinkhole_ttl,
            list_cache,
            expiring_cache,
            breaker,
            oraculum,
            probe_pool,
        }
    }

    pub async fn process(&self, qname: &Name, client_ip: &str, answer: &mut Message) {
        if self.oraculum_disabled {
            return;
        }
        let qname_ascii = qname.to_ascii();
        let trimmed_fqdn = fingerprint::trim_fqdn(&qname_ascii);
        let should_sink = if self.local_resolver {
            self.local_regime(trimmed_fqdn).await
        } else {
            self.remote_regime(trimmed_fqdn, client_ip, answer).await
        };

        if should_sink {
            self.rewrite_to_sinkhole(qname, answer);
        }
    }

    // ---- local-resolver regime: blocklists only, no network call per query ----

    async fn local_regime(&self, trimmed_fqdn: &str) -> bool {
        let key = fingerprint::local_fingerprint(trimmed_fqdn);

        match self.list_cache.customlist.get(&key) {
            Ok(Action::White) => {
                self.spawn_probe(trimmed_fqdn.to_string());
                false
            }
            Ok(Action::Black) => {
                self.spawn_probe(trimmed_fqdn.to_string());
                true
            }
            Ok(Action::Log) => {
                log::info!("audit: {} matched customlist LOG", trimmed_fqdn);
                self.spawn_probe(trimmed_fqdn.to_string());
                false
            }
            Err(_) => self.ioclist_lookup(trimmed_fqdn, &key).await,
        }
    }

    async fn ioclist_lookup(&self, trimmed_fqdn: &str, key: &str) -> bool {
        match self.list_cache.ioclist.get(key) {
            Ok(Action::Log) => {
                log::info!("audit: {} matched ioclist LOG", trimmed_fqdn);
                self.spawn_probe(trimmed_fqdn.to_string());
                false
            }
            Ok(_) => {
                self.spawn_probe(trimmed_fqdn.to_string());
                true
            }
            Err(_) => false,
        }
    }

    fn spawn_probe(&self, trimmed_fqdn: String) {
        let breaker = self.breaker.clone();
        let oraculum = self.oraculum.clone();
        self.probe_pool.submit(async move {
            breaker
                .probe(|| async move {
                    oraculum
                        .lookup(&trimmed_fqdn, &trimmed_fqdn, &trimmed_fqdn)
                        .await
                        .is_ok()
                })
                .await;
        });
    }

    // ---- remote regime: Oraculum in the hot path, per-answer cache + breaker ----

    async fn remote_regime(&self, trimmed_fqdn: &str, client_ip: &str, answer: &Message) -> bool {
        if !Self::valid_fqdn(trimmed_fqdn) || !Self::valid_client_ip(client_ip) {
            return false;
        }

        if self.oraculum_ip_addresses_enabled {
            self.spawn_ip_side_checks(answer, client_ip, trimmed_fqdn);
        }

        self.decide(trimmed_fqdn, client_ip, trimmed_fqdn)
            .await
            .map(Verdict::is_sink)
            .unwrap_or(false)
    }

    fn valid_fqdn(fqdn: &str) -> bool {
        (3..=250).contains(&fqdn.len())
            && fqdn
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'))
    }

    fn valid_client_ip(ip: &str) -> bool {
        (3..=41).contains(&ip.len())
    }

    /// The core decision: cache lookup, then (if healthy and missed) a live
    /// Oraculum call, then breaker bookkeeping. Shared by the hostname check
    /// and the async IP-side checks.
    async fn decide(
        &self,
        token: &str,
        client_ip: &str,
        trimmed_fqdn: &str,
    ) -> Result<Verdict, Error> {
        let key = fingerprint::remote_fingerprint(token, client_ip, trimmed_fqdn);

        if let Ok(verdict) = self.expiring_cache.get(&key).await {
            return Ok(verdict);
        }

        if self.breaker.is_disabled() {
            let breaker = self.breaker.clone();
            let oraculum = self.oraculum.clone();
            let probe_token = trimmed_fqdn.to_string();
            self.probe_pool.submit(async move {
                breaker
                    .probe(|| async move {
                        oraculum
                            .lookup(&probe_token, &probe_token, &probe_token)
                            .await
                            .is_ok()
                    })
                    .await;
            });
            return Ok(Verdict::Pass);
        }

        let start = Instant::now();
        let result = self.oraculum.lookup(client_ip, token, trimmed_fqdn).await;
        let elapsed = start.elapsed();

        match result {
            Err(e) => {
                self.breaker.note_failure();
                log::info!("oraculum call failed, breaker tripped: {}", e);
                Ok(Verdict::Pass)
            }
            Ok(_) if elapsed > self.fit_response_time => {
                self.breaker.note_failure();
                log::info!(
                    "oraculum call too slow ({:?} > {:?}), breaker tripped",
                    elapsed,
                    self.fit_response_time
                );
                Ok(Verdict::Pass)
            }
            Ok(sink) => {
                let verdict = Verdict::from(sink);
                self.expiring_cache.set(&key, verdict).await.ok();
                Ok(verdict)
            }
        }
    }

    /// Fire-and-forget IP-side checks over the answer's A/AAAA/CNAME
    /// records. Results only populate the cache; they never affect the
    /// current rewrite. These are real decision calls, not probes, so they
    /// bypass the bounded probe pool entirely.
    fn spawn_ip_side_checks(&self, answer: &Message, client_ip: &str, trimmed_fqdn: &str) {
        for record in answer.answers() {
            let Some(token) = rdata_token(record) else {
                continue;
            };
            if token.ends_with(ROOT_SERVERS_SUFFIX) || token.len() <= 3 {
                continue;
            }
            let token = fingerprint::trim_fqdn(&token).to_string();
            let client_ip = client_ip.to_string();
            let trimmed_fqdn = trimmed_fqdn.to_string();
            let expiring_cache = self.expiring_cache.clone();
            let breaker = self.breaker.clone();
            let oraculum = self.oraculum.clone();
            let fit_response_time = self.fit_response_time;

            tokio::spawn(async move {
                if breaker.is_disabled() {
                    return;
                }
                let key = fingerprint::remote_fingerprint(&token, &client_ip, &trimmed_fqdn);
                if expiring_cache.get(&key).await.is_ok() {
                    return;
                }
                let start = Instant::now();
                match oraculum.lookup(&client_ip, &token, &trimmed_fqdn).await {
                    Ok(sink) if start.elapsed() <= fit_response_time => {
                        expiring_cache.set(&key, Verdict::from(sink)).await.ok();
                    }
                    Ok(_) => breaker.note_failure(),
                    Err(_) => breaker.note_failure(),
                }
            });
        }
    }

    fn rewrite_to_sinkhole(&self, qname: &Name, answer: &mut Message) {
        let mut record = Record::new();
        record.set_name(qname.clone());
        record.set_ttl(self.sinkhole_ttl);
        record.set_record_type(RecordType::A);
        record.set_data(Some(RData::A(self.sinkhole_address.into())));
        answer.answers_mut().clear();
        answer.add_answer(record);
    }
}

/// Pulls the textual RDATA token out of an A/AAAA/CNAME record, the way the
/// original implementation split the zone-file rendering of the record on
/// whitespace to find the last field. hickory gives us structured RDATA, so
/// we read it directly instead.
fn rdata_token(record: &Record) -> Option<String> {
    match record.data()? {
        RData::A(addr) => Some(addr.to_string()),
        RData::AAAA(addr) => Some(addr.to_string()),
        RData::CNAME(name) => Some(name.to_ascii()),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cache::SnapshotTable;
    use std::str::FromStr;

    fn client(url: String) -> Arc<OraculumClient> {
        Arc::new(
            OraculumClient::new_remote(
                url,
                "X-sinkit-token".into(),
                "secret".into(),
                "X-client-id".into(),
                None,
                Duration::from_millis(500),
            )
            .unwrap(),
        )
    }

    fn make_pipeline(oraculum_url: String, local_resolver: bool) -> (DecisionPipeline, Arc<ListCache>) {
        let list_cache = Arc::new(ListCache::new());
        let pipeline = DecisionPipeline::new(
            local_resolver,
            false,
            false,
            Duration::from_millis(200),
            Ipv4Addr::new(10, 0, 0, 1),
            10,
            list_cache.clone(),
            Arc::new(ExpiringCache::new(Duration::from_secs(60), 0)),
            Arc::new(CircuitBreaker::new(Duration::from_secs(10), Duration::from_millis(200))),
            client(oraculum_url),
            Arc::new(ProbePool::new(8)),
        );
        (pipeline, list_cache)
    }

    #[tokio::test]
    async fn local_regime_customlist_white_wins_over_ioc_black() {
        let (pipeline, lists) = make_pipeline("http://127.0.0.1:1".into(), true);
        let key = fingerprint::local_fingerprint("evil.test");
        lists.customlist.set(key.clone(), Action::White);
        lists.ioclist.set(key, Action::Black);

        assert!(!pipeline.local_regime("evil.test").await);
    }

    #[tokio::test]
    async fn local_regime_ioc_black_sinkholes_on_customlist_miss() {
        let (pipeline, lists) = make_pipeline("http://127.0.0.1:1".into(), true);
        let key = fingerprint::local_fingerprint("evil.test");
        lists.ioclist.set(key, Action::Black);

        assert!(pipeline.local_regime("evil.test").await);
    }

    #[tokio::test]
    async fn local_regime_no_hit_passes_through() {
        let (pipeline, _lists) = make_pipeline("http://127.0.0.1:1".into(), true);
        assert!(!pipeline.local_regime("example.com").await);
    }

    #[test]
    fn invalid_fqdn_is_rejected() {
        assert!(!DecisionPipeline::valid_fqdn("ab"));
        assert!(!DecisionPipeline::valid_fqdn(&"a".repeat(251)));
        assert!(!DecisionPipeline::valid_fqdn("bad/domain.com"));
        assert!(DecisionPipeline::valid_fqdn("example.com"));
    }

    #[test]
    fn invalid_client_ip_is_rejected() {
        assert!(!DecisionPipeline::valid_client_ip("a"));
        assert!(!DecisionPipeline::valid_client_ip(&"1".repeat(42)));
        assert!(DecisionPipeline::valid_client_ip("192.0.2.1"));
    }

    #[tokio::test]
    async fn sinkhole_rewrite_replaces_all_answers_with_one_a_record() {
        let (pipeline, _lists) = make_pipeline("http://127.0.0.1:1".into(), true);
        let qname = Name::from_str("bad.example.").unwrap();
        let mut answer = Message::new();
        let mut original = Record::new();
        original.set_name(qname.clone());
        original.set_record_type(RecordType::CNAME);
        answer.add_answer(original);

        pipeline.rewrite_to_sinkhole(&qname, &mut answer);

        assert_eq!(answer.answers().len(), 1);
        let rec = &answer.answers()[0];
        assert_eq!(rec.record_type(), RecordType::A);
        assert_eq!(rec.ttl(), 10);
        match rec.data() {
            Some(RData::A(addr)) => assert_eq!(*addr, Ipv4Addr::new(10, 0, 0, 1).into()),
            other => panic!("expected A record, got {:?}", other),
        }
    }
}
