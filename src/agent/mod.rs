//! Agent entities and the shared agent registry

pub mod registry;

pub use registry::{Agent, AgentRegistry};
