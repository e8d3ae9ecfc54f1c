//! Multi-agent consensus
//!
//! Agents vote once each over a fixed option list; closing a session picks a
//! winner with one of four algorithms and an optional quorum.

pub mod algorithm;
pub mod engine;
pub mod vote;

pub use algorithm::{
    resolve, tally, ConsensusAlgorithm, ConsensusResult, OptionTally, DEFAULT_THRESHOLD,
};
pub use engine::{agent_weight, ConsensusEngine, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL};
pub use vote::{SessionStatus, Vote, VotingSession};
