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
 *  Process-wide health tracker for the Oraculum API. No locks: `disabled`
 *  and `last_probe_at` are independent atomics, matching the original's use
 *  of a bare atomic uint32/int64 pair rather than a mutex-guarded struct.
 */
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};

lazy_static::lazy_static! {
    static ref BREAKER_TRIPS: prometheus::IntCounter =
        prometheus::register_int_counter!(
            "oraculum_breaker_trips",
            "Number of times the Oraculum circuit breaker has opened")
        .unwrap();

    static ref BREAKER_RECOVERIES: prometheus::IntCounter =
        prometheus::register_int_counter!(
            "oraculum_breaker_recoveries",
            "Number of times the Oraculum circuit breaker has closed again")
        .unwrap();
}

fn unix_seconds(i: Instant, epoch: Instant, epoch_unix: i64) -> i64 {
    epoch_unix + i.saturating_duration_since(epoch).as_secs() as i64
}

pub struct CircuitBreaker {
    disabled: AtomicBool,
    last_probe_at: AtomicI64,
    sleep_when_disabled: Duration,
    fit_response_time: Duration,
    epoch: Instant,
    epoch_unix: i64,
}

impl CircuitBreaker {
    pub fn new(sleep_when_disabled: Duration, fit_response_time: Duration) -> Self {
        CircuitBreaker {
            disabled: AtomicBool::new(false),
            last_probe_at: AtomicI64::new(0),
            sleep_when_disabled,
            fit_response_time,
            epoch: Instant::now(),
            epoch_unix: now_unix(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    fn now_seconds(&self) -> i64 {
        unix_seconds(Instant::now(), self.epoch, self.epoch_unix)
    }

    /// Call after any real Oraculum call that errored or exceeded the fit
    /// response time budget. Trips the breaker open.
    pub fn note_failure(&self) {
        let was_disabled = self.disabled.swap(true, Ordering::SeqCst);
        self.last_probe_at.store(self.now_seconds(), Ordering::SeqCst);
        if !was_disabled {
            BREAKER_TRIPS.inc();
        }
    }

    /// Runs `do_call` to test recovery, but only if enough time has passed
    /// since the last probe. `do_call` is a no-result Oraculum lookup; on
    /// success and within budget the breaker closes.
    pub async fn probe<F, Fut>(&self, do_call: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        if !self.is_disabled() {
            return;
        }
        let now = self.now_seconds();
        let last = self.last_probe_at.load(Ordering::SeqCst);
        if (now - last) * 1000 < self.sleep_when_disabled.as_millis() as i64 {
            return;
        }
        self.last_probe_at.store(self.now_seconds(), Ordering::SeqCst);

        let start = Instant::now();
        let ok = do_call().await;
        let elapsed = start.elapsed();

        if ok && elapsed < self.fit_response_time {
            let was_disabled = self.disabled.swap(false, Ordering::SeqCst);
            if was_disabled {
                BREAKER_RECOVERIES.inc();
            }
        } else {
            self.last_probe_at.store(self.now_seconds(), Ordering::SeqCst);
        }
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn starts_healthy() {
        let b = CircuitBreaker::new(Duration::from_millis(100), Duration::from_millis(200));
        assert!(!b.is_disabled());
    }

    #[tokio::test]
    async fn failure_trips_open() {
        let b = CircuitBreaker::new(Duration::from_millis(100), Duration::from_millis(200));
        b.note_failure();
        assert!(b.is_disabled());
    }

    #[tokio::test]
    async fn probe_within_window_does_nothing() {
        let b = CircuitBreaker::new(Duration::from_secs(60), Duration::from_millis(200));
        b.note_failure();
        let mut called = false;
        b.probe(|| async {
            called = true;
            true
        })
        .await;
        assert!(!called);
        assert!(b.is_disabled());
    }

    #[tokio::test]
    async fn probe_after_window_recovers_on_fast_success() {
        let b = CircuitBreaker::new(Duration::from_millis(1), Duration::from_millis(200));
        b.note_failure();
        tokio::time::sleep(Duration::from_millis(5)).await;
        b.probe(|| async { true }).await;
        assert!(!b.is_disabled());
    }

    #[tokio::test]
    async fn probe_after_window_stays_open_on_failure() {
        let b = CircuitBreaker::new(Duration::from_millis(1), Duration::from_millis(200));
        b.note_failure();
        tokio::time::sleep(Duration::from_millis(5)).await;
        b.probe(|| async { false }).await;
        assert!(b.is_disabled());
    }

    #[tokio::test]
    async fn probe_after_window_stays_open_on_slow_success() {
        let b = CircuitBreaker::new(Duration::from_millis(1), Duration::from_millis(5));
        b.note_failure();
        tokio::time::sleep(Duration::from_millis(10)).await;
        b.probe(|| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            true
        })
        .await;
        assert!(b.is_disabled());
    }
}
