//! Mock implementations for testing
//!
//! Provides mock runtimes, hooks, event sinks and timers so routing,
//! handoff and health code can be exercised without a model server.

use crate::events::{EventError, EventSink, SwarmEvent};
use crate::handoff::{Delay, HandoffHooks, HandoffInfo, HookError};
use crate::runtime::{AgentRuntime, Message, RequestParams, RuntimeError, RuntimeKind};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Runtime that replies from a script
///
/// Replies are consumed in order; once the script runs out the last reply
/// repeats. With no replies at all every call fails.
#[derive(Debug)]
pub struct MockRuntime {
    name: String,
    kind: RuntimeKind,
    replies: Mutex<VecDeque<String>>,
    last_reply: Mutex<Option<String>>,
    available: AtomicBool,
    calls: AtomicUsize,
    latency: Duration,
    received: Mutex<Vec<Vec<Message>>>,
}

impl MockRuntime {
    pub fn new(name: impl Into<String>, replies: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: RuntimeKind::Remote,
            replies: Mutex::new(replies.into()),
            last_reply: Mutex::new(None),
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn single_response(name: impl Into<String>, reply: impl Into<String>) -> Self {
        Self::new(name, vec![reply.into()])
    }

    /// A runtime whose every call fails
    pub fn with_failure(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn local(mut self) -> Self {
        self.kind = RuntimeKind::Local;
        self
    }

    /// Sleep on the tokio timer before every reply
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Message lists received so far, one per call
    pub fn received(&self) -> Vec<Vec<Message>> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AgentRuntime for MockRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RuntimeKind {
        self.kind
    }

    async fn send_chat_request(
        &self,
        messages: &[Message],
        _params: &RequestParams,
    ) -> Result<String, RuntimeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last_reply.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone()
            .ok_or_else(|| RuntimeError::RequestFailed(format!("{} mock failure", self.name)))
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Runtime that fails a fixed number of times before succeeding
#[derive(Debug)]
pub struct FlakyRuntime {
    name: String,
    failures_remaining: AtomicUsize,
    reply: String,
    calls: AtomicUsize,
}

impl FlakyRuntime {
    pub fn new(name: impl Into<String>, failures: usize, reply: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failures_remaining: AtomicUsize::new(failures),
            reply: reply.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Never succeeds
    pub fn permanent(name: impl Into<String>) -> Self {
        Self::new(name, usize::MAX, "")
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentRuntime for FlakyRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Remote
    }

    async fn send_chat_request(
        &self,
        _messages: &[Message],
        _params: &RequestParams,
    ) -> Result<String, RuntimeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if failing {
            Err(RuntimeError::NetworkError(format!(
                "{} attempt {call} failed",
                self.name
            )))
        } else {
            Ok(self.reply.clone())
        }
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// Hook call as recorded by [`RecordingHooks`]
#[derive(Debug, Clone, PartialEq)]
pub enum HookCall {
    Start { handoff_id: String },
    Complete { handoff_id: String },
    Error { handoff_id: String, attempt: u32, error: String },
}

#[derive(Debug, Default)]
pub struct RecordingHooks {
    calls: Mutex<Vec<HookCall>>,
    fail: bool,
    panic: bool,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record, then return an error from every hook
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Record, then panic from every hook
    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn error_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, HookCall::Error { .. }))
            .count()
    }

    fn record(&self, call: HookCall) -> Result<(), HookError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        if self.panic {
            panic!("recording hook panic");
        }
        if self.fail {
            return Err(HookError::Failed("recording hook failure".to_string()));
        }
        Ok(())
    }
}

impl HandoffHooks for RecordingHooks {
    fn on_start(&self, info: &HandoffInfo) -> Result<(), HookError> {
        self.record(HookCall::Start {
            handoff_id: info.handoff_id.clone(),
        })
    }

    fn on_complete(&self, info: &HandoffInfo, _elapsed: Duration) -> Result<(), HookError> {
        self.record(HookCall::Complete {
            handoff_id: info.handoff_id.clone(),
        })
    }

    fn on_error(&self, info: &HandoffInfo, error: &str, attempt: u32) -> Result<(), HookError> {
        self.record(HookCall::Error {
            handoff_id: info.handoff_id.clone(),
            attempt,
            error: error.to_string(),
        })
    }
}

/// Event sink that keeps everything it is given
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<SwarmEvent>>,
    closed: bool,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every event as if the consumer went away
    pub fn closed() -> Self {
        Self {
            closed: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<SwarmEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn event_names(&self) -> Vec<&'static str> {
        self.events().iter().map(SwarmEvent::name).collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: SwarmEvent) -> Result<(), EventError> {
        if self.closed {
            return Err(EventError::ChannelClosed);
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

/// Timer that records requested waits and returns immediately
#[derive(Debug, Default)]
pub struct RecordingDelay {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn wait(&self, duration: Duration) {
        self.waits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}
