//! The transition table: a pure mapping from `(Phase, Outcome)` to the next
//! phase.
//!
//! Handlers in [`crate::machine`] only report whether their action worked;
//! where the machine goes next is decided here, so the table can be checked
//! on its own without any radio, socket or indicator.

use super::phase::Phase;
use serde::{Deserialize, Serialize};

/// What a phase handler reports back to the machine.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure,
}

/// Build target. Decides what `Failed` does.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Failure parks the device in a blinking trap and never releases.
    Embedded,
    /// Failure routes to `ReleasingResources` and a non-zero exit code.
    #[default]
    Host,
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "embedded" => Ok(Self::Embedded),
            "host" => Ok(Self::Host),
            other => Err(format!("unknown target '{other}', expected host or embedded")),
        }
    }
}

/// Errors raised while resolving a transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("No transition rule for phase '{from}'")]
    UnexpectedPhase { from: Phase },
}

/// One row of the transition table.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TransitionRule {
    pub from: Phase,
    pub on_success: Phase,
    pub on_failure: Phase,
}

impl TransitionRule {
    pub fn new(from: Phase, on_success: Phase, on_failure: Phase) -> Self {
        Self {
            from,
            on_success,
            on_failure,
        }
    }

    /// Pick the destination for `outcome`.
    pub fn next(&self, outcome: Outcome) -> Phase {
        match outcome {
            Outcome::Success => self.on_success,
            Outcome::Failure => self.on_failure,
        }
    }
}

/// Ordered set of [`TransitionRule`]s, at most one per source phase.
///
/// # Example
///
/// ```rust
/// use tether::core::{Outcome, Phase, Target, TransitionTable};
///
/// let table = TransitionTable::standard(Target::Host);
/// assert_eq!(
///     table.resolve(Phase::AwaitingAddress, Outcome::Success),
///     Ok(Phase::EstablishingTransport)
/// );
/// assert_eq!(
///     table.resolve(Phase::Failed, Outcome::Success),
///     Ok(Phase::ReleasingResources)
/// );
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionTable {
    rules: Vec<TransitionRule>,
}

impl TransitionTable {
    /// An empty table. Every lookup fails until rules are added.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// The table for the given build target.
    pub fn standard(target: Target) -> Self {
        use Phase::*;

        let failed = match target {
            Target::Host => TransitionRule::new(Failed, ReleasingResources, ReleasingResources),
            Target::Embedded => TransitionRule::new(Failed, Failed, Failed),
        };

        Self::new()
            .with_rule(TransitionRule::new(AssociatingRadio, AwaitingAddress, Failed))
            .with_rule(TransitionRule::new(AwaitingAddress, EstablishingTransport, Failed))
            .with_rule(TransitionRule::new(EstablishingTransport, Exchanging, Failed))
            .with_rule(TransitionRule::new(Exchanging, ReleasingResources, Failed))
            .with_rule(failed)
            .with_rule(TransitionRule::new(ReleasingResources, Terminated, Terminated))
            .with_rule(TransitionRule::new(Terminated, Terminated, Terminated))
    }

    /// Add a rule, replacing any existing rule for the same source phase.
    pub fn with_rule(mut self, rule: TransitionRule) -> Self {
        self.rules.retain(|r| r.from != rule.from);
        self.rules.push(rule);
        self
    }

    /// Drop the rule for `from`, if any.
    pub fn without(mut self, from: Phase) -> Self {
        self.rules.retain(|r| r.from != from);
        self
    }

    pub fn rule_for(&self, from: Phase) -> Option<&TransitionRule> {
        self.rules.iter().find(|r| r.from == from)
    }

    /// Look up the next phase.
    pub fn resolve(&self, from: Phase, outcome: Outcome) -> Result<Phase, TransitionError> {
        self.rule_for(from)
            .map(|rule| rule.next(outcome))
            .ok_or(TransitionError::UnexpectedPhase { from })
    }

    /// `true` when every [`Phase`] has a rule.
    pub fn is_complete(&self) -> bool {
        Phase::ALL.iter().all(|p| self.rule_for(*p).is_some())
    }

    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }
}
