//! Handoff Coordinator
//!
//! Moves a task's context to another agent's runtime. A designated evaluator
//! runtime can be asked first whether a handoff is worthwhile. Dispatch to
//! the target is retried per [`RetryPolicy`], a local target may fall back
//! to a secondary local runtime when its primary reports unavailable, and
//! every step is reported to the hooks and the event sink.
//!
//! Runtimes are registered under a label; local and remote runtimes share one
//! namespace.

use super::hooks::{invoke_hook, HandoffHooks, HandoffInfo, NoopHooks};
use super::retry::{Delay, RetryPolicy, TokioDelay};
use crate::error::{SwarmError, SwarmResult};
use crate::events::{publish_best_effort, EventSink, NoopEventSink, SwarmEvent, SwarmEventKind};
use crate::observability::metrics::metrics;
use crate::routing::TaskPriority;
use crate::runtime::{AgentRuntime, Message, RequestParams, RuntimeKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

const EVALUATOR_PROMPT: &str = "You decide whether a task should be handed off to another agent. \
Reply with a single JSON object: {\"should_handoff\": bool, \"target_agent_id\": string or null, \
\"confidence\": number between 0 and 1, \"reason\": string}.";

/// Runtime-adjustable coordinator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffConfig {
    pub enable_evaluation: bool,
    /// Label of the runtime asked by [`HandoffCoordinator::evaluate`]
    pub evaluator: Option<String>,
    /// Minimum evaluator confidence for [`HandoffCoordinator::handoff_if_needed`]
    pub confidence_threshold: f64,
    /// Slower handoffs are logged, not failed
    pub latency_target: Duration,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            enable_evaluation: true,
            evaluator: None,
            confidence_threshold: 0.8,
            latency_target: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRequest {
    pub source_agent_id: String,
    /// Label of the receiving runtime
    pub target_agent_id: String,
    pub task_id: String,
    pub context: Value,
    #[serde(default)]
    pub priority: TaskPriority,
}

impl HandoffRequest {
    pub fn new(
        source_agent_id: impl Into<String>,
        target_agent_id: impl Into<String>,
        task_id: impl Into<String>,
        context: Value,
    ) -> Self {
        Self {
            source_agent_id: source_agent_id.into(),
            target_agent_id: target_agent_id.into(),
            task_id: task_id.into(),
            context,
            priority: TaskPriority::default(),
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// The evaluator's verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffEvaluation {
    pub should_handoff: bool,
    #[serde(default)]
    pub target_agent_id: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

impl HandoffEvaluation {
    fn no_handoff(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            should_handoff: false,
            target_agent_id: None,
            confidence,
            reason: reason.into(),
        }
    }
}

/// A handoff the target runtime accepted
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffOutcome {
    pub handoff_id: String,
    pub target_agent_id: String,
    /// Name of the runtime that answered; differs from the target on fallback
    pub runtime: String,
    pub response: String,
    pub attempts: u32,
    pub elapsed: Duration,
    pub used_fallback: bool,
}

#[derive(Clone)]
struct RegisteredRuntime {
    runtime: Arc<dyn AgentRuntime>,
    fallback: Option<String>,
}

enum AttemptError {
    Cancelled,
    Exhausted { attempts: u32, last_error: String },
}

pub struct HandoffCoordinator {
    runtimes: RwLock<HashMap<String, RegisteredRuntime>>,
    config: RwLock<HandoffConfig>,
    retry_policy: RwLock<RetryPolicy>,
    hooks: Arc<dyn HandoffHooks>,
    events: Arc<dyn EventSink>,
    delay: Arc<dyn Delay>,
}

impl Default for HandoffCoordinator {
    fn default() -> Self {
        Self::new(HandoffConfig::default())
    }
}

impl HandoffCoordinator {
    pub fn new(config: HandoffConfig) -> Self {
        Self {
            runtimes: RwLock::new(HashMap::new()),
            config: RwLock::new(config),
            retry_policy: RwLock::new(RetryPolicy::default()),
            hooks: Arc::new(NoopHooks),
            events: Arc::new(NoopEventSink),
            delay: Arc::new(TokioDelay),
        }
    }

    pub fn with_retry_policy(self, policy: RetryPolicy) -> Self {
        self.update_retry_policy(policy);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn HandoffHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Replace the timer used between attempts
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    pub fn register_agent(&self, label: impl Into<String>, runtime: Arc<dyn AgentRuntime>) {
        self.insert_runtime(label.into(), runtime, None);
    }

    /// Register a local runtime with a secondary runtime to use when it is down
    pub fn register_agent_with_fallback(
        &self,
        label: impl Into<String>,
        runtime: Arc<dyn AgentRuntime>,
        fallback_label: impl Into<String>,
    ) {
        self.insert_runtime(label.into(), runtime, Some(fallback_label.into()));
    }

    fn insert_runtime(
        &self,
        label: String,
        runtime: Arc<dyn AgentRuntime>,
        fallback: Option<String>,
    ) {
        debug!(label = %label, kind = ?runtime.kind(), fallback = ?fallback, "Runtime registered");
        self.runtimes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(label, RegisteredRuntime { runtime, fallback });
    }

    pub fn unregister_agent(&self, label: &str) -> bool {
        self.runtimes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(label)
            .is_some()
    }

    /// Registered labels, sorted
    pub fn agent_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .runtimes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        labels.sort();
        labels
    }

    fn lookup(&self, label: &str) -> Option<RegisteredRuntime> {
        self.runtimes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(label)
            .cloned()
    }

    pub fn config(&self) -> HandoffConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap settings; in-flight handoffs keep the ones they started with
    pub fn update_config(&self, config: HandoffConfig) {
        info!(?config, "Handoff config updated");
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        *self
            .retry_policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap the retry policy; in-flight handoffs keep the one they started with
    pub fn update_retry_policy(&self, policy: RetryPolicy) {
        info!(?policy, "Handoff retry policy updated");
        *self
            .retry_policy
            .write()
            .unwrap_or_else(PoisonError::into_inner) = policy;
    }

    /// Ask the evaluator whether this context should be handed off
    ///
    /// Never fails: a missing evaluator or a failing one yields a no-handoff
    /// verdict.
    pub async fn evaluate(&self, context: &Value) -> HandoffEvaluation {
        let config = self.config();
        if !config.enable_evaluation {
            return HandoffEvaluation::no_handoff(0.0, "Handoff evaluation disabled");
        }

        let Some(evaluator) = config.evaluator.as_deref().and_then(|label| self.lookup(label))
        else {
            return HandoffEvaluation::no_handoff(0.5, "No evaluator available");
        };

        let messages = [
            Message::system(EVALUATOR_PROMPT),
            Message::user(context.to_string()),
        ];
        let params = RequestParams::default().with_temperature(0.0);

        let verdict = match evaluator.runtime.send_chat_request(&messages, &params).await {
            Ok(reply) => parse_evaluation(&reply),
            Err(e) => Err(e.to_string()),
        };

        match verdict {
            Ok(evaluation) => {
                debug!(
                    should_handoff = evaluation.should_handoff,
                    confidence = evaluation.confidence,
                    target = ?evaluation.target_agent_id,
                    "Handoff evaluated"
                );
                evaluation
            }
            Err(message) => {
                warn!(error = %message, "Handoff evaluation failed");
                HandoffEvaluation::no_handoff(0.0, format!("Evaluation error: {message}"))
            }
        }
    }

    /// Evaluate, then hand off only on a confident verdict naming a target
    pub async fn handoff_if_needed(
        &self,
        source_agent_id: &str,
        task_id: &str,
        context: Value,
    ) -> SwarmResult<Option<HandoffOutcome>> {
        let evaluation = self.evaluate(&context).await;
        let threshold = self.config().confidence_threshold;

        match evaluation.target_agent_id {
            Some(target) if evaluation.should_handoff && evaluation.confidence >= threshold => {
                let request = HandoffRequest::new(source_agent_id, target, task_id, context);
                self.initiate_handoff(request).await.map(Some)
            }
            _ => {
                debug!(
                    task_id,
                    confidence = evaluation.confidence,
                    threshold,
                    reason = %evaluation.reason,
                    "Handoff not needed"
                );
                Ok(None)
            }
        }
    }

    pub async fn initiate_handoff(&self, request: HandoffRequest) -> SwarmResult<HandoffOutcome> {
        self.initiate_handoff_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Dispatch the context to the target runtime, retrying per policy
    ///
    /// Fails immediately with `TargetAgentNotFound` for an unknown label,
    /// with `HandoffFailed` once attempts are exhausted, and with
    /// `HandoffCancelled` when `cancel` fires during an attempt or a wait.
    pub async fn initiate_handoff_with_cancel(
        &self,
        request: HandoffRequest,
        cancel: &CancellationToken,
    ) -> SwarmResult<HandoffOutcome> {
        let Some(target) = self.lookup(&request.target_agent_id) else {
            warn!(target = %request.target_agent_id, "Handoff target not registered");
            return Err(SwarmError::target_not_found(&request.target_agent_id));
        };

        let info = HandoffInfo {
            handoff_id: Uuid::new_v4().to_string(),
            source_agent_id: request.source_agent_id.clone(),
            target_agent_id: request.target_agent_id.clone(),
            task_id: request.task_id.clone(),
        };
        let span = crate::handoff_span!(
            handoff_id = %info.handoff_id,
            source = %info.source_agent_id,
            target = %info.target_agent_id,
            task_id = %info.task_id
        );

        self.run_handoff(&request, target, info, cancel)
            .instrument(span)
            .await
    }

    async fn run_handoff(
        &self,
        request: &HandoffRequest,
        target: RegisteredRuntime,
        info: HandoffInfo,
        cancel: &CancellationToken,
    ) -> SwarmResult<HandoffOutcome> {
        let started = Instant::now();
        let policy = self.retry_policy();
        let latency_target = self.config().latency_target;

        metrics().handoff_started();
        invoke_hook("on_start", &info.handoff_id, || self.hooks.on_start(&info));
        self.publish(
            &info,
            SwarmEventKind::HandoffStarted {
                source: info.source_agent_id.clone(),
                target: info.target_agent_id.clone(),
            },
        )
        .await;

        let messages = handoff_messages(request);
        let params = RequestParams::default()
            .with_metadata("task_id", request.task_id.clone())
            .with_metadata("source_agent_id", request.source_agent_id.clone());

        let result = self
            .dispatch_with_retry(&target, &messages, &params, &policy, &info, cancel)
            .await;

        match result {
            Ok((response, runtime, attempts, used_fallback)) => {
                let elapsed = started.elapsed();
                let breached = elapsed > latency_target;
                if breached {
                    warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        target_ms = latency_target.as_millis() as u64,
                        "Handoff exceeded latency target"
                    );
                }
                metrics().handoff_completed(elapsed, breached);
                invoke_hook("on_complete", &info.handoff_id, || {
                    self.hooks.on_complete(&info, elapsed)
                });
                self.publish(
                    &info,
                    SwarmEventKind::HandoffCompleted {
                        target: info.target_agent_id.clone(),
                        attempts,
                        elapsed_ms: elapsed.as_millis() as u64,
                    },
                )
                .await;
                info!(
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    runtime = %runtime,
                    "Handoff completed"
                );

                Ok(HandoffOutcome {
                    handoff_id: info.handoff_id,
                    target_agent_id: info.target_agent_id,
                    runtime,
                    response,
                    attempts,
                    elapsed,
                    used_fallback,
                })
            }
            Err(AttemptError::Cancelled) => {
                metrics().handoff_cancelled();
                self.publish(
                    &info,
                    SwarmEventKind::HandoffFailed {
                        error: "cancelled".to_string(),
                    },
                )
                .await;
                info!("Handoff cancelled");
                Err(SwarmError::HandoffCancelled {
                    handoff_id: info.handoff_id,
                })
            }
            Err(AttemptError::Exhausted {
                attempts,
                last_error,
            }) => {
                metrics().handoff_failed();
                let error = SwarmError::handoff_failed(attempts, last_error);
                self.publish(
                    &info,
                    SwarmEventKind::HandoffFailed {
                        error: error.sanitized_message(),
                    },
                )
                .await;
                warn!(attempts, error = %error, "Handoff failed");
                Err(error)
            }
        }
    }

    /// Returns (response, runtime name, attempts used, fallback used)
    async fn dispatch_with_retry(
        &self,
        target: &RegisteredRuntime,
        messages: &[Message],
        params: &RequestParams,
        policy: &RetryPolicy,
        info: &HandoffInfo,
        cancel: &CancellationToken,
    ) -> Result<(String, String, u32, bool), AttemptError> {
        let max_attempts = policy.max_attempts();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let (runtime, used_fallback) = self.select_runtime(target).await;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = runtime.send_chat_request(messages, params) => Some(result),
            };

            let error = match result {
                None => {
                    self.report_attempt_error(info, "cancelled", attempt);
                    return Err(AttemptError::Cancelled);
                }
                Some(Ok(response)) => {
                    return Ok((response, runtime.name().to_string(), attempt, used_fallback));
                }
                Some(Err(e)) => e.to_string(),
            };

            warn!(attempt, max_attempts, error = %error, "Handoff attempt failed");
            self.report_attempt_error(info, &error, attempt);
            self.publish(
                info,
                SwarmEventKind::HandoffAttemptFailed {
                    attempt,
                    error: crate::error::sanitize_error_message(&error),
                },
            )
            .await;
            last_error = error;

            if attempt < max_attempts {
                metrics().handoff_retry();
                let wait = policy.delay_for(attempt);
                debug!(attempt, wait_ms = wait.as_millis() as u64, "Waiting before retry");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        self.report_attempt_error(info, "cancelled", attempt);
                        return Err(AttemptError::Cancelled);
                    }
                    _ = self.delay.wait(wait) => {}
                }
            }
        }

        Err(AttemptError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    fn report_attempt_error(&self, info: &HandoffInfo, error: &str, attempt: u32) {
        invoke_hook("on_error", &info.handoff_id, || {
            self.hooks.on_error(info, error, attempt)
        });
    }

    /// Primary runtime, or its fallback when a local primary reports unavailable
    async fn select_runtime(&self, target: &RegisteredRuntime) -> (Arc<dyn AgentRuntime>, bool) {
        let primary = Arc::clone(&target.runtime);
        let Some(fallback_label) = target.fallback.as_deref() else {
            return (primary, false);
        };
        if primary.kind() != RuntimeKind::Local || primary.is_available().await {
            return (primary, false);
        }

        let fallback = match self.lookup(fallback_label) {
            Some(fallback) => fallback.runtime,
            None => {
                warn!(fallback = %fallback_label, "Fallback runtime not registered");
                return (primary, false);
            }
        };
        if !fallback.is_available().await {
            debug!(fallback = %fallback_label, "Fallback runtime unavailable, staying on primary");
            return (primary, false);
        }

        metrics().handoff_fallback();
        info!(
            primary = %primary.name(),
            fallback = %fallback.name(),
            "Primary local runtime unavailable, using fallback"
        );
        (fallback, true)
    }

    async fn publish(&self, info: &HandoffInfo, kind: SwarmEventKind) {
        let event = SwarmEvent::new(info.handoff_id.clone(), kind).with_task(info.task_id.clone());
        publish_best_effort(self.events.as_ref(), event).await;
    }
}

/// Messages sent to the receiving runtime
fn handoff_messages(request: &HandoffRequest) -> Vec<Message> {
    vec![
        Message::system(format!(
            "You are taking over task {} from agent {}. Continue the work using the context provided.",
            request.task_id, request.source_agent_id
        )),
        Message::user(request.context.to_string()),
    ]
}

/// Parse the evaluator's reply, tolerating prose around the JSON object
fn parse_evaluation(reply: &str) -> Result<HandoffEvaluation, String> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => return Err("evaluator reply contained no JSON object".to_string()),
    };

    let mut evaluation: HandoffEvaluation = serde_json::from_str(json)
        .map_err(|e| format!("invalid evaluator reply: {e}"))?;
    evaluation.confidence = evaluation.confidence.clamp(0.0, 1.0);
    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_evaluation_with_prose() {
        let evaluation = parse_evaluation(
            "Sure! {\"should_handoff\": true, \"target_agent_id\": \"reviewer\", \"confidence\": 1.4, \"reason\": \"needs review\"} Done.",
        )
        .unwrap();
        assert!(evaluation.should_handoff);
        assert_eq!(evaluation.target_agent_id.as_deref(), Some("reviewer"));
        assert_eq!(evaluation.confidence, 1.0);
    }

    #[test]
    fn test_parse_evaluation_rejects_non_json() {
        assert!(parse_evaluation("no idea").is_err());
        assert!(parse_evaluation("{\"confidence\": \"high\"}").is_err());
    }

    #[test]
    fn test_handoff_messages_carry_context() {
        let request = HandoffRequest::new(
            "planner",
            "coder",
            "t-9",
            serde_json::json!({"file": "main.rs"}),
        );
        let messages = handoff_messages(&request);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("t-9"));
        assert!(messages[0].content.contains("planner"));
        assert_eq!(messages[1].content, r#"{"file":"main.rs"}"#);
    }

    #[test]
    fn test_config_hot_swap() {
        let coordinator = HandoffCoordinator::default();
        coordinator.update_retry_policy(RetryPolicy::linear(5, Duration::from_millis(1)));
        assert_eq!(coordinator.retry_policy().max_retries, 5);

        coordinator.update_config(HandoffConfig {
            enable_evaluation: false,
            ..HandoffConfig::default()
        });
        assert!(!coordinator.config().enable_evaluation);
    }

    #[tokio::test]
    async fn test_unknown_target_fails_immediately() {
        let coordinator = HandoffCoordinator::default();
        let err = coordinator
            .initiate_handoff(HandoffRequest::new("a", "ghost", "t", Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::TargetAgentNotFound { label } if label == "ghost"));
    }

    #[tokio::test]
    async fn test_evaluation_disabled() {
        let coordinator = HandoffCoordinator::new(HandoffConfig {
            enable_evaluation: false,
            ..HandoffConfig::default()
        });
        let evaluation = coordinator.evaluate(&Value::Null).await;
        assert!(!evaluation.should_handoff);
        assert_eq!(evaluation.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_missing_evaluator() {
        let coordinator = HandoffCoordinator::new(HandoffConfig {
            evaluator: Some("judge".to_string()),
            ..HandoffConfig::default()
        });
        let evaluation = coordinator.evaluate(&Value::Null).await;
        assert_eq!(evaluation.confidence, 0.5);
        assert_eq!(evaluation.reason, "No evaluator available");
    }
}
