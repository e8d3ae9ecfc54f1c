//! Task Routing
//!
//! ## Task Router (router.rs)
//!
//! Picks the best agent for a task by blending an expertise score with a
//! load-balancing score, falling back to the least loaded agent when the
//! whole pool is at capacity.
//!
//! ## Routing Memory (memory.rs)
//!
//! A bounded, short-lived cache of task → agent decisions that keeps repeat
//! lookups for the same task consistent.

pub mod memory;
pub mod router;

pub use memory::{RoutingMemory, RoutingMemoryEntry};
pub use router::{Reservation, RoutingDecision, RoutingSource, Task, TaskPriority, TaskRouter};
