//! Pure core of the connection state machine.
//!
//! - [`Phase`]: the exhaustive set of machine states
//! - [`TransitionTable`]: `(Phase, Outcome) -> Phase`, no side effects
//! - [`PhaseHistory`]: immutable log of transitions taken
//!
//! Nothing in this module touches hardware or sockets.

mod history;
mod phase;
mod transition;

pub use history::{PhaseHistory, PhaseTransition};
pub use phase::Phase;
pub use transition::{Outcome, Target, TransitionError, TransitionRule, TransitionTable};
