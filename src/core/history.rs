//! Phase transition history.
//!
//! Every transition the machine takes is appended here with a timestamp, so
//! a run can be replayed from its report.

use super::phase::Phase;
use super::transition::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record of a single phase change.
///
/// # Example
///
/// ```rust
/// use tether::core::{Outcome, Phase, PhaseTransition};
/// use chrono::Utc;
///
/// let transition = PhaseTransition {
///     from: Phase::AssociatingRadio,
///     to: Phase::AwaitingAddress,
///     outcome: Outcome::Success,
///     timestamp: Utc::now(),
/// };
/// assert!(transition.is_change());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    /// The phase whose handler just ran
    pub from: Phase,
    /// Where the table sent the machine
    pub to: Phase,
    /// What the handler reported
    pub outcome: Outcome,
    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
}

impl PhaseTransition {
    pub fn new(from: Phase, to: Phase, outcome: Outcome) -> Self {
        Self {
            from,
            to,
            outcome,
            timestamp: Utc::now(),
        }
    }

    /// `false` for self-loops such as `Terminated -> Terminated`.
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

/// Ordered history of phase transitions.
///
/// `record` returns a new history and leaves the original untouched.
///
/// # Example
///
/// ```rust
/// use tether::core::{Outcome, Phase, PhaseHistory, PhaseTransition};
///
/// let history = PhaseHistory::new()
///     .record(PhaseTransition::new(Phase::AssociatingRadio, Phase::AwaitingAddress, Outcome::Success))
///     .record(PhaseTransition::new(Phase::AwaitingAddress, Phase::Failed, Outcome::Failure));
///
/// assert_eq!(
///     history.get_path(),
///     vec![&Phase::AssociatingRadio, &Phase::AwaitingAddress, &Phase::Failed]
/// );
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseHistory {
    transitions: Vec<PhaseTransition>,
}

impl PhaseHistory {
    pub fn new() -> Self {
        Self {
            transitions: Vec::new(),
        }
    }

    /// Record a transition, returning a new history.
    pub fn record(&self, transition: PhaseTransition) -> Self {
        let mut transitions = self.transitions.clone();
        transitions.push(transition);
        Self { transitions }
    }

    /// Phases traversed: the first `from`, then every `to`.
    pub fn get_path(&self) -> Vec<&Phase> {
        let mut path = Vec::new();
        if let Some(first) = self.transitions.first() {
            path.push(&first.from);
        }
        for transition in &self.transitions {
            path.push(&transition.to);
        }
        path
    }

    /// Time between the first and last transition, `None` when empty.
    pub fn duration(&self) -> Option<Duration> {
        let first = self.transitions.first()?;
        let last = self.transitions.last()?;
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }

    /// How many times the machine went from `from` to `to`.
    pub fn count(&self, from: Phase, to: Phase) -> usize {
        self.transitions
            .iter()
            .filter(|t| t.from == from && t.to == to)
            .count()
    }

    /// `true` if the machine ever entered `phase`.
    pub fn visited(&self, phase: Phase) -> bool {
        self.get_path().into_iter().any(|p| *p == phase)
    }

    pub fn last(&self) -> Option<&PhaseTransition> {
        self.transitions.last()
    }

    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }
}
