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
 *  Bounded pool backing the fire-and-forget "dry" probe path used by the
 *  decision pipeline on a blocklist hit or a disabled breaker. Modeled as a
 *  bounded work queue with non-blocking submission rather than unbounded
 *  task spawning: a probe that can't get a slot is dropped silently (logged
 *  once), never queued or retried.
 */
use std::sync::Arc;

lazy_static::lazy_static! {
    static ref PROBE_DROPPED: prometheus::IntCounter =
        prometheus::register_int_counter!(
            "oraculum_probe_dropped",
            "Number of probe calls dropped because the pool was exhausted")
        .unwrap();
}

pub struct ProbePool {
    permits: Arc<tokio::sync::Semaphore>,
}

impl ProbePool {
    pub fn new(max_requests: usize) -> Self {
        ProbePool {
            permits: Arc::new(tokio::sync::Semaphore::new(max_requests)),
        }
    }

    /// Submits `task` to run in the background if a slot is free;
    /// otherwise drops it silently. Never blocks the caller.
    pub fn submit<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        match permits.clone().try_acquire_owned() {
            Ok(permit) => {
                tokio::spawn(async move {
                    task.await;
                    drop(permit);
                });
            }
            Err(_) => {
                log::debug!("probe pool exhausted, dropping probe");
                PROBE_DROPPED.inc();
            }
        }
    }

    #[cfg(test)]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn submits_run_when_slots_available() {
        let pool = ProbePool::new(2);
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        pool.submit(async move {
            r.fetch_add(1, Ordering::SeqCst);
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_pool_drops_silently() {
        let pool = ProbePool::new(1);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let mut tx = Some(tx);
        pool.submit(async move {
            // Holds the only slot until the test releases it.
            let _ = rx.await;
        });
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        // Second submit should find the pool exhausted and drop silently.
        pool.submit(async move {
            r.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        let _ = tx.take().unwrap().send(());
    }
}
