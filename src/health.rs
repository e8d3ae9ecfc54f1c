//! Health check system
//!
//! Probes the runtimes handoffs depend on and folds the results into the
//! global health flag reported by the metrics snapshot.

use crate::observability::metrics::metrics;
use crate::runtime::AgentRuntime;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Health check result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheckResult {
    pub component: String,
    pub healthy: bool,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
}

/// Trait for components that can be health checked
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;

    fn component_name(&self) -> &str;
}

/// Wraps a runtime's availability probe
pub struct RuntimeHealthCheck {
    label: String,
    runtime: Arc<dyn AgentRuntime>,
}

impl RuntimeHealthCheck {
    pub fn new(label: impl Into<String>, runtime: Arc<dyn AgentRuntime>) -> Self {
        Self {
            label: label.into(),
            runtime,
        }
    }
}

#[async_trait]
impl HealthCheck for RuntimeHealthCheck {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let healthy = self.runtime.is_available().await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        if healthy {
            debug!(
                runtime = %self.label,
                response_time_ms,
                "Runtime health check passed"
            );
        } else {
            warn!(
                runtime = %self.label,
                response_time_ms,
                "Runtime health check failed"
            );
        }

        HealthCheckResult {
            component: self.label.clone(),
            healthy,
            message: Some(if healthy {
                format!("{} runtime available", self.runtime.name())
            } else {
                format!("{} runtime unavailable", self.runtime.name())
            }),
            response_time_ms: Some(response_time_ms),
        }
    }

    fn component_name(&self) -> &str {
        &self.label
    }
}

/// Aggregated health check manager
#[derive(Default)]
pub struct HealthCheckManager {
    health_checks: Vec<Box<dyn HealthCheck>>,
}

impl HealthCheckManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_health_check(&mut self, health_check: Box<dyn HealthCheck>) {
        self.health_checks.push(health_check);
    }

    pub fn len(&self) -> usize {
        self.health_checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.health_checks.is_empty()
    }

    /// Run all health checks in registration order
    pub async fn run_health_checks(&self) -> Vec<HealthCheckResult> {
        let mut results = Vec::with_capacity(self.health_checks.len());
        for health_check in &self.health_checks {
            results.push(health_check.health_check().await);
        }
        results
    }

    /// All components must be healthy; updates the global health flag
    pub async fn calculate_overall_health(&self) -> bool {
        let results = self.run_health_checks().await;

        if results.is_empty() {
            warn!("No health checks configured - assuming healthy");
            metrics().update_health_status(true);
            return true;
        }

        let healthy_count = results.iter().filter(|r| r.healthy).count();
        let overall_healthy = healthy_count == results.len();

        debug!(
            healthy = healthy_count,
            total = results.len(),
            overall = overall_healthy,
            "Overall health check"
        );
        metrics().update_health_status(overall_healthy);

        overall_healthy
    }
}
