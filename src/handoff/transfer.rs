//! Direct context transfer between two agents
//!
//! `initiate` compresses the request context and parks it under a new
//! handoff id; `complete_handoff` lets the named target claim it once.

use super::coordinator::HandoffRequest;
use crate::cache::ExpiringCache;
use crate::compression::{CompressedBlob, CompressionService, GzipCompressionService};
use crate::error::{SwarmError, SwarmResult};
use crate::events::{publish_best_effort, EventSink, NoopEventSink, SwarmEvent, SwarmEventKind};
use crate::observability::metrics::metrics;
use crate::routing::TaskPriority;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_TRANSFER_TTL: Duration = Duration::from_secs(300);
const MAX_PENDING_TRANSFERS: usize = 10_000;

/// Result of the initiation phase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoffResponse {
    pub success: bool,
    pub handoff_id: String,
    pub compressed_size: usize,
    pub transfer_time: Duration,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
struct PendingTransfer {
    source_agent_id: String,
    target_agent_id: String,
    task_id: String,
    priority: TaskPriority,
    blob: CompressedBlob,
    initiated_at: DateTime<Utc>,
}

/// What the claiming agent receives
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedTransfer {
    pub handoff_id: String,
    pub source_agent_id: String,
    pub target_agent_id: String,
    pub task_id: String,
    pub priority: TaskPriority,
    pub context: Value,
    pub initiated_at: DateTime<Utc>,
}

pub struct ContextTransfer {
    compression: Arc<dyn CompressionService>,
    pending: Mutex<ExpiringCache<String, PendingTransfer>>,
    events: Arc<dyn EventSink>,
}

impl ContextTransfer {
    pub fn new(compression: Arc<dyn CompressionService>, ttl: Duration) -> Self {
        Self {
            compression,
            pending: Mutex::new(ExpiringCache::new(MAX_PENDING_TRANSFERS, Some(ttl))),
            events: Arc::new(NoopEventSink),
        }
    }

    /// Transfer backed by a gzip store whose blobs live as long as the transfers
    pub fn gzip(ttl: Duration) -> Self {
        Self::new(Arc::new(GzipCompressionService::new(ttl)), ttl)
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Compress the context and park it for the target
    ///
    /// Failures are reported in the response rather than returned as errors.
    pub async fn initiate(&self, request: &HandoffRequest) -> HandoffResponse {
        let started = Instant::now();
        let handoff_id = Uuid::new_v4().to_string();

        let blob = match serde_json::to_string(&request.context)
            .map_err(|e| e.to_string())
            .and_then(|payload| {
                self.compression
                    .compress(&payload)
                    .map_err(|e| e.to_string())
            }) {
            Ok(blob) => blob,
            Err(error) => {
                warn!(handoff_id = %handoff_id, error = %error, "Context transfer failed to start");
                return HandoffResponse {
                    success: false,
                    handoff_id,
                    compressed_size: 0,
                    transfer_time: started.elapsed(),
                    error: Some(error),
                };
            }
        };

        let compressed_size = blob.compressed_size;
        let pending = PendingTransfer {
            source_agent_id: request.source_agent_id.clone(),
            target_agent_id: request.target_agent_id.clone(),
            task_id: request.task_id.clone(),
            priority: request.priority,
            blob,
            initiated_at: Utc::now(),
        };
        {
            let mut table = self.lock();
            table.purge_expired();
            for (evicted_id, _) in table.insert(handoff_id.clone(), pending) {
                warn!(handoff_id = %evicted_id, "Pending transfer evicted to stay within capacity");
            }
        }

        metrics().transfer_initiated();
        info!(
            handoff_id = %handoff_id,
            source = %request.source_agent_id,
            target = %request.target_agent_id,
            compressed_size,
            "Context transfer initiated"
        );
        publish_best_effort(
            self.events.as_ref(),
            SwarmEvent::new(
                handoff_id.clone(),
                SwarmEventKind::TransferInitiated {
                    source: request.source_agent_id.clone(),
                    target: request.target_agent_id.clone(),
                    compressed_size,
                },
            )
            .with_task(request.task_id.clone()),
        )
        .await;

        HandoffResponse {
            success: true,
            handoff_id,
            compressed_size,
            transfer_time: started.elapsed(),
            error: None,
        }
    }

    /// Claim a parked context; only the original target may, and only once
    pub async fn complete_handoff(
        &self,
        handoff_id: &str,
        claiming_agent_id: &str,
    ) -> SwarmResult<CompletedTransfer> {
        let key = handoff_id.to_string();
        // Decompressed under the table lock so the entry goes only on success
        let (pending, payload) = {
            let mut table = self.lock();
            let not_found = || SwarmError::HandoffNotFound {
                handoff_id: handoff_id.to_string(),
            };
            let entry = table.get(&key).ok_or_else(not_found)?;
            if entry.target_agent_id != claiming_agent_id {
                return Err(SwarmError::HandoffTargetMismatch {
                    handoff_id: handoff_id.to_string(),
                    expected: entry.target_agent_id.clone(),
                    claimed: claiming_agent_id.to_string(),
                });
            }
            let payload = self.compression.decompress(&entry.blob).map_err(|e| {
                warn!(handoff_id, error = %e, "Context transfer payload unavailable");
                e
            })?;
            (table.remove(&key).ok_or_else(not_found)?, payload)
        };

        let context: Value = serde_json::from_str(&payload)
            .map_err(|e| SwarmError::internal(format!("corrupt transfer payload: {e}")))?;

        metrics().transfer_completed();
        info!(handoff_id, claimed_by = claiming_agent_id, "Context transfer completed");
        publish_best_effort(
            self.events.as_ref(),
            SwarmEvent::new(
                handoff_id,
                SwarmEventKind::TransferCompleted {
                    claimed_by: claiming_agent_id.to_string(),
                },
            )
            .with_task(pending.task_id.clone()),
        )
        .await;

        Ok(CompletedTransfer {
            handoff_id: handoff_id.to_string(),
            source_agent_id: pending.source_agent_id,
            target_agent_id: pending.target_agent_id,
            task_id: pending.task_id,
            priority: pending.priority,
            context,
            initiated_at: pending.initiated_at,
        })
    }

    /// Transfers waiting to be claimed
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, ExpiringCache<String, PendingTransfer>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
