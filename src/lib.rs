//! Tether: a network-association state machine with guaranteed teardown.
//!
//! A device brings up its WiFi radio, waits for an address, opens one TCP or
//! UDP socket, runs a short echo exchange and then releases everything it
//! acquired, whatever happened along the way. The control flow is a single
//! explicit state machine: handlers perform one phase's side effects and
//! report success or failure, and a pure transition table decides the next
//! phase.
//!
//! # Core Concepts
//!
//! - **Phase**: where the machine is ([`core::Phase`])
//! - **TransitionTable**: `(Phase, Outcome) -> Phase`, checkable on its own
//! - **EventGate**: single-permit signal from the radio's notification
//!   context to the machine thread
//! - **Capabilities**: radio, sockets and status indicator are traits, so
//!   the same machine runs against real hardware, the host OS, or fakes
//!
//! # Example
//!
//! ```rust
//! use tether::machine::{ConnectionStateMachine, Settings};
//! use tether::radio::Credentials;
//! use tether::testing::{RecordingIndicator, ScriptedRadio, ScriptedSockets};
//! use tether::transport::Protocol;
//! use tether::core::Phase;
//!
//! let settings = Settings::client(
//!     Credentials::new("lab", "secret"),
//!     Protocol::Udp,
//!     "192.168.1.10:8080".parse().unwrap(),
//! );
//! let mut machine = ConnectionStateMachine::new(
//!     settings,
//!     ScriptedRadio::cooperative(),
//!     ScriptedSockets::echoing(),
//!     RecordingIndicator::new(),
//! );
//!
//! let report = machine.run();
//! assert_eq!(report.final_phase, Phase::Terminated);
//! assert_eq!(report.exit_code, 0);
//! assert_eq!(report.exchanges, 4);
//! ```

pub mod config;
pub mod core;
pub mod discovery;
pub mod echo;
pub mod error;
pub mod gate;
pub mod indicator;
pub mod logging;
pub mod machine;
pub mod radio;
pub mod report;
pub mod testing;
pub mod transport;

// Re-export commonly used types
pub use config::{Config, ConfigError};
pub use crate::core::{Outcome, Phase, PhaseHistory, Target, TransitionTable};
pub use error::SessionError;
pub use machine::{ConnectionStateMachine, Settings};
pub use report::RunReport;
