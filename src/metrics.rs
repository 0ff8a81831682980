//! Lookup metrics.
//!
//! The dispatcher reports to a [`MetricsSink`] handed to it at construction.
//! [`LookupMetrics`] keeps per-kind counters in atomics so any number of
//! connections can record concurrently; [`NoopMetrics`] discards everything.
//!
//! Only the `ip` and `phone` kinds are tracked. Time echoes cannot fail and
//! are not timed.

use crate::protocol::QueryKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Outcome tag of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Bad,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Bad => "bad",
        }
    }
}

/// Receiver of per-lookup measurements.
pub trait MetricsSink: Send + Sync {
    fn record_latency(&self, kind: QueryKind, elapsed: Duration);
    fn record_outcome(&self, kind: QueryKind, outcome: Outcome);
}

/// Sink that drops all measurements.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_latency(&self, _kind: QueryKind, _elapsed: Duration) {}
    fn record_outcome(&self, _kind: QueryKind, _outcome: Outcome) {}
}

#[derive(Debug, Default)]
struct KindCounters {
    timed: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
    ok: AtomicU64,
    bad: AtomicU64,
}

impl KindCounters {
    fn snapshot(&self) -> KindSnapshot {
        let timed = self.timed.load(Ordering::Relaxed);
        let total_nanos = self.total_nanos.load(Ordering::Relaxed);
        KindSnapshot {
            timed,
            ok: self.ok.load(Ordering::Relaxed),
            bad: self.bad.load(Ordering::Relaxed),
            mean_latency: if timed == 0 {
                Duration::ZERO
            } else {
                Duration::from_nanos(total_nanos / timed)
            },
            max_latency: Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed)),
        }
    }
}

/// Atomic, in-process lookup metrics.
#[derive(Debug, Default)]
pub struct LookupMetrics {
    ip: KindCounters,
    phone: KindCounters,
}

impl LookupMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, kind: QueryKind) -> Option<&KindCounters> {
        match kind {
            QueryKind::Ip => Some(&self.ip),
            QueryKind::Phone => Some(&self.phone),
            QueryKind::Time => None,
        }
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ip: self.ip.snapshot(),
            phone: self.phone.snapshot(),
        }
    }
}

impl MetricsSink for LookupMetrics {
    fn record_latency(&self, kind: QueryKind, elapsed: Duration) {
        let Some(counters) = self.counters(kind) else {
            return;
        };
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        counters.timed.fetch_add(1, Ordering::Relaxed);
        counters.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        counters.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    fn record_outcome(&self, kind: QueryKind, outcome: Outcome) {
        let Some(counters) = self.counters(kind) else {
            return;
        };
        match outcome {
            Outcome::Ok => counters.ok.fetch_add(1, Ordering::Relaxed),
            Outcome::Bad => counters.bad.fetch_add(1, Ordering::Relaxed),
        };
    }
}

/// Snapshot of one query kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KindSnapshot {
    pub timed: u64,
    pub ok: u64,
    pub bad: u64,
    pub mean_latency: Duration,
    pub max_latency: Duration,
}

/// Snapshot of all tracked query kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub ip: KindSnapshot,
    pub phone: KindSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counts_by_kind_and_outcome() {
        let metrics = LookupMetrics::new();
        metrics.record_outcome(QueryKind::Ip, Outcome::Ok);
        metrics.record_outcome(QueryKind::Ip, Outcome::Bad);
        metrics.record_outcome(QueryKind::Phone, Outcome::Bad);
        metrics.record_outcome(QueryKind::Time, Outcome::Ok);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ip.ok, 1);
        assert_eq!(snapshot.ip.bad, 1);
        assert_eq!(snapshot.phone.ok, 0);
        assert_eq!(snapshot.phone.bad, 1);
        assert_eq!(Outcome::Bad.as_str(), "bad");
    }

    #[test]
    fn test_latency_mean_and_max() {
        let metrics = LookupMetrics::new();
        metrics.record_latency(QueryKind::Phone, Duration::from_micros(100));
        metrics.record_latency(QueryKind::Phone, Duration::from_micros(300));

        let phone = metrics.snapshot().phone;
        assert_eq!(phone.timed, 2);
        assert_eq!(phone.mean_latency, Duration::from_micros(200));
        assert_eq!(phone.max_latency, Duration::from_micros(300));
        assert_eq!(metrics.snapshot().ip.mean_latency, Duration::ZERO);
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = Arc::new(LookupMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_outcome(QueryKind::Ip, Outcome::Ok);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().ip.ok, 8000);
    }
}
