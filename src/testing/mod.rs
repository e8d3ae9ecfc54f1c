//! Testing utilities and mock implementations
//!
//! Mocks for exercising the router, workflow, consensus and handoff
//! components without a live model server.

pub mod mocks;

pub use mocks::*;
