//! Agent runtime layer
//!
//! `provider` defines the `AgentRuntime` trait every backend implements;
//! `openai_compat` is the HTTP implementation used for both hosted and
//! locally served models.

pub mod openai_compat;
pub mod provider;

pub use openai_compat::{OpenAiCompatConfig, OpenAiCompatRuntime};
pub use provider::*;
