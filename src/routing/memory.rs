//! Routing memory
//!
//! A bounded ring buffer of recent task → agent decisions. Entries beyond
//! the capacity are trimmed oldest-first on insert; entries older than the
//! TTL are ignored on lookup but only removed by `purge_expired`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Default number of remembered decisions
pub const DEFAULT_MEMORY_CAPACITY: usize = 1000;

/// Default lookup window (10 minutes)
pub const DEFAULT_MEMORY_TTL_SECS: u64 = 600;

// Longer windows are clamped to about a century
const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 3600;

/// One remembered routing decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingMemoryEntry {
    pub task_id: String,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RoutingMemory {
    entries: Mutex<VecDeque<RoutingMemoryEntry>>,
    capacity: usize,
    ttl: Duration,
}

impl Default for RoutingMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY, DEFAULT_MEMORY_TTL_SECS)
    }
}

impl RoutingMemory {
    pub fn new(capacity: usize, ttl_secs: u64) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_MEMORY_CAPACITY))),
            capacity,
            ttl: Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64),
        }
    }

    /// Remember a decision made now
    pub fn record(&self, task_id: &str, agent_id: &str) {
        self.record_at(task_id, agent_id, Utc::now());
    }

    /// Remember a decision with an explicit timestamp
    ///
    /// Exposed so tests can exercise TTL behaviour without sleeping.
    #[doc(hidden)]
    pub fn record_at(&self, task_id: &str, agent_id: &str, timestamp: DateTime<Utc>) {
        if self.capacity == 0 {
            return;
        }

        let mut entries = self.lock();
        entries.push_back(RoutingMemoryEntry {
            task_id: task_id.to_string(),
            agent_id: agent_id.to_string(),
            timestamp,
        });

        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Most recent unexpired decision for this exact task id
    pub fn lookup(&self, task_id: &str) -> Option<RoutingMemoryEntry> {
        let cutoff = Utc::now() - self.ttl;
        self.lock()
            .iter()
            .rev()
            .find(|entry| entry.task_id == task_id && entry.timestamp >= cutoff)
            .cloned()
    }

    /// Unexpired decisions that selected the given agent, newest first
    pub fn recent_for_agent(&self, agent_id: &str) -> Vec<RoutingMemoryEntry> {
        let cutoff = Utc::now() - self.ttl;
        self.lock()
            .iter()
            .rev()
            .filter(|entry| entry.agent_id == agent_id && entry.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let cutoff = Utc::now() - self.ttl;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|entry| entry.timestamp >= cutoff);
        let removed = before - entries.len();

        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Purged expired routing memory");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of all stored entries, oldest first
    pub fn entries(&self) -> Vec<RoutingMemoryEntry> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<RoutingMemoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_oldest_first() {
        let memory = RoutingMemory::new(3, 600);
        for i in 0..5 {
            memory.record(&format!("task-{i}"), "agent");
        }

        let entries = memory.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].task_id, "task-2");
        assert_eq!(entries[2].task_id, "task-4");
    }

    #[test]
    fn test_lookup_returns_most_recent_match() {
        let memory = RoutingMemory::new(10, 600);
        memory.record("task-1", "agent-a");
        memory.record("task-1", "agent-b");

        assert_eq!(memory.lookup("task-1").unwrap().agent_id, "agent-b");
        assert!(memory.lookup("task-2").is_none());
    }

    #[test]
    fn test_expired_entries_are_ignored_but_kept() {
        let memory = RoutingMemory::new(10, 600);
        memory.record_at("old", "agent-a", Utc::now() - Duration::minutes(11));

        assert!(memory.lookup("old").is_none());
        assert_eq!(memory.len(), 1);

        assert_eq!(memory.purge_expired(), 1);
        assert!(memory.is_empty());
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let memory = RoutingMemory::new(0, 600);
        memory.record("task", "agent");
        assert!(memory.is_empty());
    }

    #[test]
    fn test_recent_for_agent() {
        let memory = RoutingMemory::new(10, 600);
        memory.record("t1", "a");
        memory.record("t2", "b");
        memory.record("t3", "a");

        let recent = memory.recent_for_agent("a");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].task_id, "t3");
    }
}
