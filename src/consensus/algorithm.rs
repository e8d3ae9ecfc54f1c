//! Consensus resolution algorithms
//!
//! Resolution is a pure function of a closed session, the chosen algorithm
//! and the registered electorate. Ties go to the option listed first.

use super::vote::VotingSession;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Threshold used when an algorithm name is given without one
pub const DEFAULT_THRESHOLD: f64 = 0.66;

/// How a winner is chosen when a session closes
///
/// # Example
///
/// ```
/// use agent_swarm::consensus::ConsensusAlgorithm;
///
/// let algorithm: ConsensusAlgorithm = "supermajority:0.75".parse().unwrap();
/// assert_eq!(algorithm, ConsensusAlgorithm::Supermajority { threshold: 0.75 });
/// assert_eq!(algorithm.to_string(), "supermajority:0.75");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum ConsensusAlgorithm {
    /// Most unweighted votes; reached when above half of all votes
    SimpleMajority,
    /// Highest weighted sum; reached when above half of total weight
    WeightedMajority,
    /// Highest weighted sum; reached when its share is at least `threshold`
    Supermajority { threshold: f64 },
    /// Every registered agent votes for the same option with enough weight
    ConsensusThreshold { threshold: f64 },
}

impl ConsensusAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            ConsensusAlgorithm::SimpleMajority => "simple-majority",
            ConsensusAlgorithm::WeightedMajority => "weighted-majority",
            ConsensusAlgorithm::Supermajority { .. } => "supermajority",
            ConsensusAlgorithm::ConsensusThreshold { .. } => "consensus-threshold",
        }
    }

    pub fn threshold(&self) -> Option<f64> {
        match self {
            ConsensusAlgorithm::Supermajority { threshold }
            | ConsensusAlgorithm::ConsensusThreshold { threshold } => Some(*threshold),
            _ => None,
        }
    }

    /// Parse `name[:threshold]`, using `default_threshold` when none is given
    pub fn parse_with_default(s: &str, default_threshold: f64) -> Result<Self, String> {
        let lowered = s.trim().to_lowercase();
        let (name, threshold) = match lowered.split_once(':') {
            Some((name, raw)) => {
                let threshold: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| format!("Invalid threshold: {raw}"))?;
                if !(0.0..=1.0).contains(&threshold) {
                    return Err(format!("Threshold must be within [0, 1], got {threshold}"));
                }
                (name.trim().to_string(), threshold)
            }
            None => (lowered.clone(), default_threshold),
        };

        match name.replace('_', "-").as_str() {
            "simple-majority" | "majority" => Ok(ConsensusAlgorithm::SimpleMajority),
            "weighted-majority" | "weighted" => Ok(ConsensusAlgorithm::WeightedMajority),
            "supermajority" => Ok(ConsensusAlgorithm::Supermajority { threshold }),
            "consensus-threshold" | "consensus" => {
                Ok(ConsensusAlgorithm::ConsensusThreshold { threshold })
            }
            _ => Err(format!(
                "Unknown consensus algorithm: {s}. Valid: simple-majority, weighted-majority, supermajority[:T], consensus-threshold[:T]"
            )),
        }
    }
}

impl fmt::Display for ConsensusAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.threshold() {
            Some(threshold) => write!(f, "{}:{}", self.name(), threshold),
            None => f.write_str(self.name()),
        }
    }
}

impl FromStr for ConsensusAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_default(s, DEFAULT_THRESHOLD)
    }
}

/// Votes received by one option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionTally {
    pub option_id: String,
    pub count: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub winner: Option<String>,
    pub confidence: f64,
    /// One entry per session option, in option order
    pub distribution: Vec<OptionTally>,
    pub consensus_reached: bool,
    pub method: ConsensusAlgorithm,
    pub details: String,
}

/// Per-option counts and weights in option order
pub fn tally(session: &VotingSession) -> Vec<OptionTally> {
    session
        .options
        .iter()
        .map(|option_id| {
            let votes = session.votes.iter().filter(|v| &v.option_id == option_id);
            let (count, weight) = votes.fold((0, 0.0), |(c, w), v| (c + 1, w + v.weight));
            OptionTally {
                option_id: option_id.clone(),
                count,
                weight,
            }
        })
        .collect()
}

/// First option with the strictly highest key
fn leader<F>(distribution: &[OptionTally], key: F) -> Option<&OptionTally>
where
    F: Fn(&OptionTally) -> f64,
{
    distribution.iter().fold(None, |best, tally| match best {
        Some(current) if key(tally) <= key(current) => Some(current),
        _ => Some(tally),
    })
}

/// Resolve a session
///
/// `electorate` lists every registered agent with its vote weight; only the
/// consensus-threshold algorithm looks at it.
pub fn resolve(
    session: &VotingSession,
    algorithm: ConsensusAlgorithm,
    electorate: &[(String, f64)],
) -> ConsensusResult {
    let distribution = tally(session);
    let total_votes = session.votes.len();

    let no_winner = |distribution: Vec<OptionTally>, details: String| ConsensusResult {
        winner: None,
        confidence: 0.0,
        distribution,
        consensus_reached: false,
        method: algorithm,
        details,
    };

    if total_votes == 0 {
        return no_winner(distribution, "No votes cast".to_string());
    }
    if let Some(quorum) = session.quorum {
        if total_votes < quorum {
            return no_winner(
                distribution,
                format!("Quorum not met: {total_votes} of {quorum} required votes cast"),
            );
        }
    }

    let total_weight = session.total_weight();
    let weighted_share = |tally: &OptionTally| {
        if total_weight > 0.0 {
            tally.weight / total_weight
        } else {
            0.0
        }
    };

    let (winner, confidence, reached, details) = match algorithm {
        ConsensusAlgorithm::SimpleMajority => {
            let Some(top) = leader(&distribution, |t| t.count as f64) else {
                return no_winner(distribution, "No options".to_string());
            };
            let reached = top.count * 2 > total_votes;
            (
                top.option_id.clone(),
                top.count as f64 / total_votes as f64,
                reached,
                format!("'{}' received {} of {} votes", top.option_id, top.count, total_votes),
            )
        }
        ConsensusAlgorithm::WeightedMajority | ConsensusAlgorithm::Supermajority { .. } => {
            let Some(top) = leader(&distribution, |t| t.weight) else {
                return no_winner(distribution, "No options".to_string());
            };
            let share = weighted_share(top);
            let reached = match algorithm {
                ConsensusAlgorithm::Supermajority { threshold } => share >= threshold,
                _ => top.weight * 2.0 > total_weight,
            };
            (
                top.option_id.clone(),
                share,
                reached,
                format!(
                    "'{}' received {:.2} of {:.2} total weight ({:.0}%)",
                    top.option_id,
                    top.weight,
                    total_weight,
                    share * 100.0
                ),
            )
        }
        ConsensusAlgorithm::ConsensusThreshold { threshold } => {
            if electorate.is_empty() {
                return no_winner(distribution, "No registered agents".to_string());
            }
            let missing = electorate
                .iter()
                .filter(|(agent_id, _)| !session.has_voted(agent_id))
                .count();
            if missing > 0 {
                return no_winner(
                    distribution,
                    format!("{missing} registered agents did not vote"),
                );
            }
            let first = &session.votes[0].option_id;
            if session.votes.iter().any(|v| &v.option_id != first) {
                return no_winner(distribution, "Votes are not unanimous".to_string());
            }
            let possible: f64 = electorate.iter().map(|(_, weight)| weight).sum();
            let required = threshold * possible;
            if total_weight < required {
                return no_winner(
                    distribution,
                    format!("Weight {total_weight:.2} below required {required:.2}"),
                );
            }
            (
                first.clone(),
                if possible > 0.0 {
                    (total_weight / possible).min(1.0)
                } else {
                    1.0
                },
                true,
                format!("Unanimous for '{first}' with {total_weight:.2} of {possible:.2} weight"),
            )
        }
    };

    ConsensusResult {
        winner: Some(winner),
        confidence,
        distribution,
        consensus_reached: reached,
        method: algorithm,
        details,
    }
}
