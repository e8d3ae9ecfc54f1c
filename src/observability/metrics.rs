//! Thread-safe metrics collection
//!
//! Atomic counters for the hot paths (routing, voting, handoff) and a
//! mutex-protected ring of recent handoff latencies.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Latency samples kept for percentiles
const MAX_LATENCY_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

#[derive(Default)]
struct RoutingCounters {
    memory_hits: AtomicU64,
    scored: AtomicU64,
    fallbacks: AtomicU64,
}

#[derive(Default)]
struct WorkflowCounters {
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Default)]
struct ConsensusCounters {
    sessions_created: AtomicU64,
    sessions_closed: AtomicU64,
    consensus_reached: AtomicU64,
    votes_accepted: AtomicU64,
    votes_rejected: AtomicU64,
}

#[derive(Default)]
struct HandoffCounters {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    retries: AtomicU64,
    fallbacks: AtomicU64,
    latency_target_breaches: AtomicU64,
    transfers_initiated: AtomicU64,
    transfers_completed: AtomicU64,
}

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    routing: RoutingCounters,
    workflow: WorkflowCounters,
    consensus: ConsensusCounters,
    handoff: HandoffCounters,
    handoff_latencies: Mutex<VecDeque<u64>>, // milliseconds
    health_status: AtomicBool,
    last_health_check: AtomicU64,
    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let now = current_timestamp();
        Self {
            routing: RoutingCounters::default(),
            workflow: WorkflowCounters::default(),
            consensus: ConsensusCounters::default(),
            handoff: HandoffCounters::default(),
            handoff_latencies: Mutex::new(VecDeque::new()),
            health_status: AtomicBool::new(true),
            last_health_check: AtomicU64::new(now),
            uptime_start: AtomicU64::new(now),
        }
    }

    // Routing
    pub fn route_memory_hit(&self) {
        self.routing.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route_scored(&self) {
        self.routing.scored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route_fallback(&self) {
        self.routing.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    // Workflow
    pub fn workflow_completed(&self) {
        self.workflow.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn workflow_failed(&self) {
        self.workflow.failed.fetch_add(1, Ordering::Relaxed);
    }

    // Consensus
    pub fn session_created(&self) {
        self.consensus.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self, consensus_reached: bool) {
        self.consensus.sessions_closed.fetch_add(1, Ordering::Relaxed);
        if consensus_reached {
            self.consensus
                .consensus_reached
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn vote_cast(&self, accepted: bool) {
        let counter = if accepted {
            &self.consensus.votes_accepted
        } else {
            &self.consensus.votes_rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    // Handoff
    pub fn handoff_started(&self) {
        self.handoff.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handoff_retry(&self) {
        self.handoff.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handoff_fallback(&self) {
        self.handoff.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handoff_completed(&self, elapsed: Duration, breached_target: bool) {
        self.handoff.completed.fetch_add(1, Ordering::Relaxed);
        if breached_target {
            self.handoff
                .latency_target_breaches
                .fetch_add(1, Ordering::Relaxed);
        }
        self.record_latency(elapsed);
    }

    pub fn handoff_failed(&self) {
        self.handoff.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handoff_cancelled(&self) {
        self.handoff.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_initiated(&self) {
        self.handoff
            .transfers_initiated
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_completed(&self) {
        self.handoff
            .transfers_completed
            .fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, elapsed: Duration) {
        if let Ok(mut latencies) = self.handoff_latencies.lock() {
            latencies.push_back(elapsed.as_millis() as u64);
            while latencies.len() > MAX_LATENCY_SAMPLES {
                latencies.pop_front();
            }
        }
    }

    // Health
    pub fn update_health_status(&self, healthy: bool) {
        self.health_status.store(healthy, Ordering::Relaxed);
        self.last_health_check
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.routing.memory_hits,
            &self.routing.scored,
            &self.routing.fallbacks,
            &self.workflow.completed,
            &self.workflow.failed,
            &self.consensus.sessions_created,
            &self.consensus.sessions_closed,
            &self.consensus.consensus_reached,
            &self.consensus.votes_accepted,
            &self.consensus.votes_rejected,
            &self.handoff.started,
            &self.handoff.completed,
            &self.handoff.failed,
            &self.handoff.cancelled,
            &self.handoff.retries,
            &self.handoff.fallbacks,
            &self.handoff.latency_target_breaches,
            &self.handoff.transfers_initiated,
            &self.handoff.transfers_completed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        if let Ok(mut latencies) = self.handoff_latencies.lock() {
            latencies.clear();
        }
        let now = current_timestamp();
        self.health_status.store(true, Ordering::Relaxed);
        self.last_health_check.store(now, Ordering::Relaxed);
        self.uptime_start.store(now, Ordering::Relaxed);
    }

    /// (avg, p50, p95, p99) of recorded handoff latencies
    fn latency_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(latencies) = self.handoff_latencies.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if latencies.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted: Vec<u64> = latencies.iter().copied().collect();
        sorted.sort_unstable();
        let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
        (
            avg,
            percentile(&sorted, 50.0),
            percentile(&sorted, 95.0),
            percentile(&sorted, 99.0),
        )
    }

    /// Point-in-time copy of every metric
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_latency_ms, latency_p50_ms, latency_p95_ms, latency_p99_ms) =
            self.latency_statistics();
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        MetricsSnapshot {
            routing: RoutingMetrics {
                memory_hits: load(&self.routing.memory_hits),
                scored: load(&self.routing.scored),
                fallbacks: load(&self.routing.fallbacks),
            },
            workflow: WorkflowMetrics {
                completed: load(&self.workflow.completed),
                failed: load(&self.workflow.failed),
            },
            consensus: ConsensusMetrics {
                sessions_created: load(&self.consensus.sessions_created),
                sessions_closed: load(&self.consensus.sessions_closed),
                consensus_reached: load(&self.consensus.consensus_reached),
                votes_accepted: load(&self.consensus.votes_accepted),
                votes_rejected: load(&self.consensus.votes_rejected),
            },
            handoff: HandoffMetrics {
                started: load(&self.handoff.started),
                completed: load(&self.handoff.completed),
                failed: load(&self.handoff.failed),
                cancelled: load(&self.handoff.cancelled),
                retries: load(&self.handoff.retries),
                fallbacks: load(&self.handoff.fallbacks),
                latency_target_breaches: load(&self.handoff.latency_target_breaches),
                transfers_initiated: load(&self.handoff.transfers_initiated),
                transfers_completed: load(&self.handoff.transfers_completed),
                avg_latency_ms,
                latency_p50_ms,
                latency_p95_ms,
                latency_p99_ms,
            },
            healthy: self.health_status.load(Ordering::Relaxed),
            last_health_check: load(&self.last_health_check),
            uptime_seconds: now.saturating_sub(load(&self.uptime_start)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub routing: RoutingMetrics,
    pub workflow: WorkflowMetrics,
    pub consensus: ConsensusMetrics,
    pub handoff: HandoffMetrics,
    pub healthy: bool,
    pub last_health_check: u64,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingMetrics {
    pub memory_hits: u64,
    pub scored: u64,
    pub fallbacks: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowMetrics {
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsensusMetrics {
    pub sessions_created: u64,
    pub sessions_closed: u64,
    pub consensus_reached: u64,
    pub votes_accepted: u64,
    pub votes_rejected: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandoffMetrics {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub retries: u64,
    pub fallbacks: u64,
    pub latency_target_breaches: u64,
    pub transfers_initiated: u64,
    pub transfers_completed: u64,
    pub avg_latency_ms: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = sorted_data[index.floor() as usize] as f64;
    let upper = sorted_data[index.ceil() as usize] as f64;
    lower + (upper - lower) * index.fract()
}
