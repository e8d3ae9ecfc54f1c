//! Consensus Engine
//!
//! Owns the voting-session table and the agents whose expertise sets vote
//! weights. All operations take `&self` and are safe to call concurrently.

use super::algorithm::{resolve, ConsensusAlgorithm, ConsensusResult, DEFAULT_THRESHOLD};
use super::vote::{Vote, VotingSession};
use crate::agent::{Agent, AgentRegistry};
use crate::cache::ExpiringCache;
use crate::error::{SwarmError, SwarmResult};
use crate::observability::metrics::metrics;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_SESSIONS: usize = 1000;
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Weight of a vote from a registered agent
pub fn agent_weight(agent: &Agent) -> f64 {
    (agent.expertise.len() as f64 / 2.0).max(1.0)
}

pub struct ConsensusEngine {
    agents: AgentRegistry,
    sessions: Mutex<ExpiringCache<String, VotingSession>>,
    default_threshold: f64,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL)
    }
}

impl ConsensusEngine {
    /// Sessions beyond `max_sessions` are evicted oldest first; sessions older
    /// than `session_ttl` are treated as unknown
    pub fn new(default_threshold: f64, max_sessions: usize, session_ttl: Duration) -> Self {
        Self {
            agents: AgentRegistry::new(),
            sessions: Mutex::new(ExpiringCache::new(max_sessions, Some(session_ttl))),
            default_threshold,
        }
    }

    pub fn default_threshold(&self) -> f64 {
        self.default_threshold
    }

    pub fn register_agent(&self, agent: Agent) {
        debug!(agent_id = %agent.id, weight = agent_weight(&agent), "Voting agent registered");
        self.agents.register(agent);
    }

    pub fn unregister_agent(&self, agent_id: &str) -> Option<Agent> {
        self.agents.unregister(agent_id)
    }

    /// Open a session and return its id
    pub fn create_session(
        &self,
        topic: impl Into<String>,
        options: Vec<String>,
        quorum: Option<usize>,
    ) -> SwarmResult<String> {
        if options.is_empty() {
            return Err(SwarmError::invalid_input("a voting session needs at least one option"));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = options.iter().find(|option| !seen.insert(option.as_str())) {
            return Err(SwarmError::invalid_input(format!(
                "duplicate option id: {duplicate}"
            )));
        }

        let session = VotingSession::new(Uuid::new_v4().to_string(), topic, options, quorum);
        let session_id = session.id.clone();

        let evicted = {
            let mut sessions = self.lock();
            sessions.purge_expired();
            sessions.insert_preferring(session_id.clone(), session, |s| !s.is_open())
        };
        for (evicted_id, evicted_session) in evicted {
            warn!(
                session_id = %evicted_id,
                open = evicted_session.is_open(),
                "Voting session evicted to stay within capacity"
            );
        }

        metrics().session_created();
        info!(session_id = %session_id, quorum = ?quorum, "Voting session created");
        Ok(session_id)
    }

    /// Record a vote; returns false instead of failing when it cannot be accepted
    pub fn cast_vote(
        &self,
        session_id: &str,
        agent_id: &str,
        option_id: &str,
        rationale: Option<&str>,
    ) -> bool {
        let weight = self.agents.get(agent_id).map_or(1.0, |agent| agent_weight(&agent));

        let accepted = {
            let mut sessions = self.lock();
            match sessions.get_mut(&session_id.to_string()) {
                None => {
                    debug!(session_id, agent_id, "Vote for unknown session ignored");
                    false
                }
                Some(session) => match session.rejection_reason(agent_id, option_id) {
                    Some(reason) => {
                        debug!(session_id, agent_id, option_id, reason, "Vote rejected");
                        false
                    }
                    None => {
                        let mut vote = Vote::new(agent_id, option_id, weight);
                        if let Some(rationale) = rationale {
                            vote = vote.with_rationale(rationale);
                        }
                        session.votes.push(vote);
                        true
                    }
                },
            }
        };

        metrics().vote_cast(accepted);
        accepted
    }

    /// Close a session exactly once and resolve it
    pub fn close_session(
        &self,
        session_id: &str,
        algorithm: ConsensusAlgorithm,
    ) -> SwarmResult<ConsensusResult> {
        let span = crate::vote_span!(session_id = %session_id, method = %algorithm);
        let _guard = span.enter();

        // Electorate is read before the session lock; locks are never nested
        let electorate: Vec<(String, f64)> = self
            .agents
            .agents()
            .iter()
            .map(|agent| (agent.id.clone(), agent_weight(agent)))
            .collect();

        let closed = {
            let mut sessions = self.lock();
            let session = sessions.get_mut(&session_id.to_string()).ok_or_else(|| {
                SwarmError::SessionNotFound {
                    session_id: session_id.to_string(),
                }
            })?;
            if !session.is_open() {
                return Err(SwarmError::SessionNotOpen {
                    session_id: session_id.to_string(),
                });
            }
            session.close();
            session.clone()
        };

        let result = resolve(&closed, algorithm, &electorate);
        metrics().session_closed(result.consensus_reached);
        info!(
            winner = ?result.winner,
            confidence = result.confidence,
            consensus_reached = result.consensus_reached,
            votes = closed.votes.len(),
            "Voting session closed"
        );
        Ok(result)
    }

    /// Close using an algorithm name such as `supermajority` or `consensus-threshold:0.9`
    pub fn close_session_named(
        &self,
        session_id: &str,
        algorithm: &str,
    ) -> SwarmResult<ConsensusResult> {
        let algorithm = ConsensusAlgorithm::parse_with_default(algorithm, self.default_threshold)
            .map_err(SwarmError::invalid_input)?;
        self.close_session(session_id, algorithm)
    }

    pub fn session(&self, session_id: &str) -> Option<VotingSession> {
        self.lock().get(&session_id.to_string()).cloned()
    }

    /// Open sessions in creation order
    pub fn open_sessions(&self) -> Vec<VotingSession> {
        self.lock()
            .values()
            .filter(|session| session.is_open())
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, ExpiringCache<String, VotingSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
