//! Error types for swarm coordination
//!
//! Routing, voting and handoff failures are surfaced to callers as
//! `SwarmError`. Workflow failures have their own type (`WorkflowError`) and
//! are returned as values, never propagated.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("static secret pattern")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("static path pattern")
});

const MAX_MESSAGE_LEN: usize = 500;

/// Main error type for routing, consensus and handoff operations
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("No agents registered")]
    NoAgents,

    #[error("Target agent not found: {label}")]
    TargetAgentNotFound { label: String },

    #[error("Handoff failed after {attempts} attempts: {last_error}")]
    HandoffFailed { attempts: u32, last_error: String },

    #[error("Handoff not found: {handoff_id}")]
    HandoffNotFound { handoff_id: String },

    #[error("Handoff {handoff_id} targets '{expected}', not '{claimed}'")]
    HandoffTargetMismatch {
        handoff_id: String,
        expected: String,
        claimed: String,
    },

    #[error("Handoff cancelled: {handoff_id}")]
    HandoffCancelled { handoff_id: String },

    #[error("Voting session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Voting session is not open: {session_id}")]
    SessionNotOpen { session_id: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] crate::runtime::RuntimeError),

    #[error(transparent)]
    Compression(#[from] crate::compression::CompressionError),
}

impl SwarmError {
    /// Create target-not-found error
    pub fn target_not_found<S: Into<String>>(label: S) -> Self {
        Self::TargetAgentNotFound {
            label: label.into(),
        }
    }

    /// Create handoff-failed error chaining the last underlying message
    pub fn handoff_failed<S: Into<String>>(attempts: u32, last_error: S) -> Self {
        Self::HandoffFailed {
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable short code for events and logs
    pub fn code(&self) -> &'static str {
        match self {
            SwarmError::NoAgents => "no_agents",
            SwarmError::TargetAgentNotFound { .. } => "target_agent_not_found",
            SwarmError::HandoffFailed { .. } => "handoff_failed",
            SwarmError::HandoffNotFound { .. } => "handoff_not_found",
            SwarmError::HandoffTargetMismatch { .. } => "handoff_target_mismatch",
            SwarmError::HandoffCancelled { .. } => "handoff_cancelled",
            SwarmError::SessionNotFound { .. } => "session_not_found",
            SwarmError::SessionNotOpen { .. } => "session_not_open",
            SwarmError::InvalidInput { .. } => "invalid_input",
            SwarmError::Internal { .. } => "internal_error",
            SwarmError::Config(_) => "config_error",
            SwarmError::Runtime(_) => "runtime_error",
            SwarmError::Compression(crate::compression::CompressionError::Expired { .. }) => {
                "compression_expired"
            }
            SwarmError::Compression(_) => "compression_error",
        }
    }

    /// Error text safe to publish outside the process
    pub fn sanitized_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

/// Redact secrets and sensitive paths, then cap length
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for swarm operations
pub type SwarmResult<T> = Result<T, SwarmError>;
