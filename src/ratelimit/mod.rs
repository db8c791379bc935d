use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{self, Instant};

/// Rates above this are treated as "unlimited" and the gate becomes a no-op.
pub const DISABLE_THRESHOLD_RPM: u64 = 100_000;

/// Per-worker dispatch gate. Callers are released one at a time, at least
/// `60000 / requests_per_minute` milliseconds apart. The last-release instant
/// is the only timing state shared by a worker's probe loops; holding the lock
/// across the sleep serializes releases, so two callers can never both be
/// released inside one interval.
pub struct RateGate {
    interval: Option<Duration>,
    last_release: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(requests_per_minute: u64) -> Self {
        let interval = if requests_per_minute > DISABLE_THRESHOLD_RPM {
            None
        } else {
            let rpm = requests_per_minute.max(1);
            Some(Duration::from_secs_f64(60.0 / rpm as f64))
        };
        Self {
            interval,
            last_release: Mutex::new(None),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.interval.is_none()
    }

    /// Suspends the caller until the per-worker interval has elapsed since the
    /// previous release.
    pub async fn wait(&self) {
        let Some(interval) = self.interval else {
            return;
        };
        let mut last = self.last_release.lock().await;
        let release_at = match *last {
            Some(prev) => Instant::now().max(prev + interval),
            None => Instant::now(),
        };
        time::sleep_until(release_at).await;
        *last = Some(release_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sequential_waits_respect_the_interval() {
        // 600 rpm -> one release every 100ms.
        let gate = RateGate::new(600);
        let start = Instant::now();
        for _ in 0..5 {
            gate.wait().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_serialized() {
        use std::sync::Arc;

        let gate = Arc::new(RateGate::new(600));
        let start = Instant::now();
        let callers: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.wait().await })
            })
            .collect();
        for caller in callers {
            caller.await.unwrap();
        }
        // 4 releases -> at least 3 full intervals of simulated time.
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn gate_is_a_noop_above_the_disable_threshold() {
        let gate = RateGate::new(DISABLE_THRESHOLD_RPM + 1);
        assert!(gate.is_disabled());
        let start = Instant::now();
        for _ in 0..100 {
            gate.wait().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn one_rpm_floor_means_a_minute_between_releases() {
        let gate = RateGate::new(1);
        let start = Instant::now();
        gate.wait().await;
        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }
}
