//! The phases of the connection state machine.
//!
//! A [`Phase`] is a plain value describing where the machine currently is.
//! All methods are pure; the side effects of each phase live in
//! [`crate::machine`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// One state of the connection state machine.
///
/// The machine starts in [`Phase::AssociatingRadio`] and, on every path that
/// does not end in the embedded failure trap, finishes in
/// [`Phase::Terminated`].
///
/// ```text
///  AssociatingRadio ─▶ AwaitingAddress ─▶ EstablishingTransport ─▶ Exchanging
///         │                  │                     │                    │
///         └──────────────────┴──────────┬──────────┴────────────────────┤
///                                       ▼                               ▼
///                                    Failed ──(host)──▶ ReleasingResources ─▶ Terminated
/// ```
///
/// # Example
///
/// ```rust
/// use tether::core::Phase;
///
/// let phase = Phase::initial();
/// assert_eq!(phase, Phase::AssociatingRadio);
/// assert_eq!(phase.name(), "AssociatingRadio");
/// assert!(!phase.is_terminal());
/// assert!(Phase::Terminated.is_terminal());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Phase {
    /// Bring up the radio driver and wait for the association event.
    AssociatingRadio,
    /// Associated; waiting for the address-assigned event.
    AwaitingAddress,
    /// Opening the transport handle (connect for clients, bind for servers).
    EstablishingTransport,
    /// Running the fixed message exchange (client) or the echo loop (server).
    Exchanging,
    /// A phase failed; `failure_origin` names which one.
    Failed,
    /// Closing the transport and dropping the radio association.
    ReleasingResources,
    /// Everything released. Nothing further happens.
    Terminated,
}

impl Phase {
    /// Every phase, in declaration order.
    pub const ALL: [Phase; 7] = [
        Phase::AssociatingRadio,
        Phase::AwaitingAddress,
        Phase::EstablishingTransport,
        Phase::Exchanging,
        Phase::Failed,
        Phase::ReleasingResources,
        Phase::Terminated,
    ];

    /// The phase a freshly created machine starts in.
    pub fn initial() -> Self {
        Phase::AssociatingRadio
    }

    /// Stable name for logging and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AssociatingRadio => "AssociatingRadio",
            Self::AwaitingAddress => "AwaitingAddress",
            Self::EstablishingTransport => "EstablishingTransport",
            Self::Exchanging => "Exchanging",
            Self::Failed => "Failed",
            Self::ReleasingResources => "ReleasingResources",
            Self::Terminated => "Terminated",
        }
    }

    /// `true` only for [`Phase::Terminated`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// `true` only for [`Phase::Failed`].
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Phases that tear the run down: `Failed` and `ReleasingResources`.
    pub fn is_teardown(&self) -> bool {
        matches!(self, Self::Failed | Self::ReleasingResources)
    }

    /// Phases whose handler performs work that can fail.
    ///
    /// `Failed`, `ReleasingResources` and `Terminated` never report a
    /// failure outcome.
    pub fn can_fail(&self) -> bool {
        matches!(
            self,
            Self::AssociatingRadio
                | Self::AwaitingAddress
                | Self::EstablishingTransport
                | Self::Exchanging
        )
    }
}

impl Default for Phase {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
