//! Handoff lifecycle hooks
//!
//! Hooks observe a handoff; they cannot change it. A hook that returns an
//! error or panics is logged and the handoff carries on.

use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HookError {
    #[error("Hook failed: {0}")]
    Failed(String),
}

/// What a hook is told about the handoff it observes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoffInfo {
    pub handoff_id: String,
    pub source_agent_id: String,
    pub target_agent_id: String,
    pub task_id: String,
}

pub trait HandoffHooks: Send + Sync {
    fn on_start(&self, _info: &HandoffInfo) -> Result<(), HookError> {
        Ok(())
    }

    fn on_complete(&self, _info: &HandoffInfo, _elapsed: Duration) -> Result<(), HookError> {
        Ok(())
    }

    /// Fired for every failed attempt and once on cancellation
    fn on_error(&self, _info: &HandoffInfo, _error: &str, _attempt: u32) -> Result<(), HookError> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl HandoffHooks for NoopHooks {}

/// Run one hook, swallowing errors and panics
pub(crate) fn invoke_hook<F>(hook: &'static str, handoff_id: &str, f: F)
where
    F: FnOnce() -> Result<(), HookError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(hook, handoff_id, error = %e, "Handoff hook failed"),
        Err(_) => error!(hook, handoff_id, "Handoff hook panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_hook_error_is_swallowed() {
        invoke_hook("on_start", "h-1", || Err(HookError::Failed("nope".into())));
    }

    #[test]
    fn test_hook_panic_is_swallowed() {
        invoke_hook("on_complete", "h-1", || panic!("hook exploded"));
    }

    #[test]
    fn test_hook_runs() {
        let ran = AtomicBool::new(false);
        invoke_hook("on_error", "h-1", || {
            ran.store(true, Ordering::SeqCst);
            Ok(())
        });
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_noop_hooks() {
        let info = HandoffInfo {
            handoff_id: "h".into(),
            source_agent_id: "a".into(),
            target_agent_id: "b".into(),
            task_id: "t".into(),
        };
        assert!(NoopHooks.on_start(&info).is_ok());
        assert!(NoopHooks.on_error(&info, "x", 1).is_ok());
    }
}
