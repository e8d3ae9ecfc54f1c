//! Votes and voting sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One agent's ballot in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub agent_id: String,
    pub option_id: String,
    pub weight: f64,
    pub timestamp: DateTime<Utc>,
    pub rationale: Option<String>,
}

impl Vote {
    pub fn new(agent_id: impl Into<String>, option_id: impl Into<String>, weight: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            option_id: option_id.into(),
            weight,
            timestamp: Utc::now(),
            rationale: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Closed,
}

/// A vote over a fixed option list
///
/// Status moves from `Open` to `Closed` once and never back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingSession {
    pub id: String,
    pub topic: String,
    pub options: Vec<String>,
    pub votes: Vec<Vote>,
    pub status: SessionStatus,
    /// Minimum number of votes for a valid result
    pub quorum: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl VotingSession {
    pub fn new(
        id: impl Into<String>,
        topic: impl Into<String>,
        options: Vec<String>,
        quorum: Option<usize>,
    ) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            options,
            votes: Vec::new(),
            status: SessionStatus::Open,
            quorum,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|option| option == option_id)
    }

    pub fn has_voted(&self, agent_id: &str) -> bool {
        self.votes.iter().any(|vote| vote.agent_id == agent_id)
    }

    /// Why a vote would be refused, if it would be
    pub fn rejection_reason(&self, agent_id: &str, option_id: &str) -> Option<&'static str> {
        if !self.is_open() {
            Some("session closed")
        } else if !self.has_option(option_id) {
            Some("unknown option")
        } else if self.has_voted(agent_id) {
            Some("agent already voted")
        } else {
            None
        }
    }

    pub(crate) fn close(&mut self) {
        self.status = SessionStatus::Closed;
        self.closed_at = Some(Utc::now());
    }

    pub fn total_weight(&self) -> f64 {
        self.votes.iter().map(|vote| vote.weight).sum()
    }
}
