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
 *  Per-answer Oraculum decision cache. Readers take a shared lock; writers
 *  take an exclusive one. Expiry is lazy - there is no background sweep, a
 *  stale entry is only noticed (and removed) when something tries to read
 *  it. The max-count bound rejects new keys outright rather than evicting,
 *  which keeps `set` O(1) and sidesteps needing an eviction policy.
 */
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::action::Verdict;
use crate::error::{Error, Result};

lazy_static::lazy_static! {
    static ref ORACULUM_CACHE: prometheus::IntCounterVec =
        prometheus::register_int_counter_vec!(
            "oraculum_cache",
            "Per-answer Oraculum decision cache statistics",
            &["result"])
        .unwrap();

    static ref ORACULUM_CACHE_SIZE: prometheus::IntGauge =
        prometheus::register_int_gauge!(
            "oraculum_cache_size",
            "Number of entries in the Oraculum decision cache")
        .unwrap();
}

struct Entry {
    verdict: Verdict,
    expires_at: Instant,
}

pub struct ExpiringCache {
    backend: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
    maxcount: usize,
}

impl ExpiringCache {
    pub fn new(ttl: Duration, maxcount: usize) -> Self {
        ExpiringCache {
            backend: RwLock::new(HashMap::new()),
            ttl,
            maxcount,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Verdict> {
        let found = {
            let backend = self.backend.read().await;
            backend.get(key).map(|e| (e.verdict, e.expires_at > Instant::now()))
        };
        match found {
            None => {
                ORACULUM_CACHE.with_label_values(&["MISS"]).inc();
                Err(Error::KeyNotFound(key.to_string()))
            }
            Some((_, false)) => {
                ORACULUM_CACHE.with_label_values(&["EXPIRED"]).inc();
                self.remove(key).await;
                Err(Error::KeyExpired(key.to_string()))
            }
            Some((verdict, true)) => {
                ORACULUM_CACHE.with_label_values(&["HIT"]).inc();
                Ok(verdict)
            }
        }
    }

    pub async fn set(&self, key: &str, verdict: Verdict) -> Result<()> {
        let mut backend = self.backend.write().await;
        if backend.len() >= self.maxcount && self.maxcount != 0 && !backend.contains_key(key) {
            return Err(Error::CacheFull);
        }
        backend.insert(
            key.to_string(),
            Entry {
                verdict,
                expires_at: Instant::now() + self.ttl,
            },
        );
        ORACULUM_CACHE_SIZE.set(backend.len() as i64);
        Ok(())
    }

    pub async fn remove(&self, key: &str) {
        self.backend.write().await.remove(key);
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.backend.read().await.contains_key(key)
    }

    pub async fn length(&self) -> usize {
        self.backend.read().await.len()
    }

    pub async fn clear(&self) {
        self.backend.write().await.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn miss_returns_key_not_found() {
        let cache = ExpiringCache::new(Duration::from_secs(60), 0);
        assert!(matches!(
            cache.get("missing").await,
            Err(Error::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn hit_returns_verdict() {
        let cache = ExpiringCache::new(Duration::from_secs(60), 0);
        cache.set("k", Verdict::Sink).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Verdict::Sink);
    }

    #[tokio::test]
    async fn expiry_is_observed_lazily_and_removes_entry() {
        let cache = ExpiringCache::new(Duration::from_millis(1), 0);
        cache.set("k", Verdict::Pass).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(cache.get("k").await, Err(Error::KeyExpired(_))));
        assert!(!cache.exists("k").await);
    }

    #[tokio::test]
    async fn set_rejects_new_key_when_full() {
        let cache = ExpiringCache::new(Duration::from_secs(60), 1);
        cache.set("a", Verdict::Pass).await.unwrap();
        assert!(matches!(cache.set("b", Verdict::Pass).await, Err(Error::CacheFull)));
        assert_eq!(cache.length().await, 1);
    }

    #[tokio::test]
    async fn overwrite_of_existing_key_does_not_count_toward_fullness() {
        let cache = ExpiringCache::new(Duration::from_secs(60), 1);
        cache.set("a", Verdict::Pass).await.unwrap();
        assert!(cache.set("a", Verdict::Sink).await.is_ok());
        assert_eq!(cache.get("a").await.unwrap(), Verdict::Sink);
    }

    #[tokio::test]
    async fn unbounded_when_maxcount_zero() {
        let cache = ExpiringCache::new(Duration::from_secs(60), 0);
        for i in 0..100 {
            cache.set(&i.to_string(), Verdict::Pass).await.unwrap();
        }
        assert_eq!(cache.length().await, 100);
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = ExpiringCache::new(Duration::from_secs(60), 0);
        cache.set("a", Verdict::Pass).await.unwrap();
        cache.clear().await;
        assert_eq!(cache.length().await, 0);
    }
}
