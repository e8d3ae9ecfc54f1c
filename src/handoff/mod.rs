//! Cross-agent handoff
//!
//! - `coordinator`: evaluator-gated dispatch to a target runtime with retry,
//!   local fallback, hooks and cancellation
//! - `transfer`: one-shot compressed context transfer between two agents
//! - `retry`: backoff policy and the timer abstraction it waits on
//! - `hooks`: lifecycle observers

pub mod coordinator;
pub mod hooks;
pub mod retry;
pub mod transfer;

pub use coordinator::{
    HandoffConfig, HandoffCoordinator, HandoffEvaluation, HandoffOutcome, HandoffRequest,
};
pub use hooks::{HandoffHooks, HandoffInfo, HookError, NoopHooks};
pub use retry::{Delay, RetryPolicy, TokioDelay};
pub use transfer::{CompletedTransfer, ContextTransfer, HandoffResponse, DEFAULT_TRANSFER_TTL};
