//! Errors a phase can fail with.
//!
//! Every variant is resolved at the phase boundary into a single `Failed`
//! transition; none is retried.

use crate::core::Phase;
use crate::gate::GateError;
use crate::radio::RadioError;
use crate::transport::TransportError;
use thiserror::Error;

/// Why a blocking radio wait did not produce the expected event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioWaitError {
    #[error(transparent)]
    Radio(#[from] RadioError),

    #[error(transparent)]
    Gate(#[from] GateError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("radio initialization failed: {0}")]
    RadioInit(#[source] RadioError),

    #[error("radio association failed: {0}")]
    RadioAssociation(#[source] RadioWaitError),

    #[error("address acquisition failed: {0}")]
    AddressAcquisition(#[source] RadioWaitError),

    #[error("socket create failed: {0}")]
    SocketCreate(#[source] TransportError),

    #[error("socket connect failed: {0}")]
    SocketConnect(#[source] TransportError),

    #[error("socket bind failed: {0}")]
    SocketBind(#[source] TransportError),

    #[error("send failed: {0}")]
    Send(#[source] TransportError),

    #[error("receive failed: {0}")]
    Receive(#[source] TransportError),

    #[error("peer closed the session")]
    PeerClosed,

    #[error("no transition defined for phase '{0}'")]
    UnexpectedPhase(Phase),
}

impl SessionError {
    /// Short stable identifier for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RadioInit(_) => "RadioInitError",
            Self::RadioAssociation(_) => "RadioAssociationError",
            Self::AddressAcquisition(_) => "AddressAcquisitionError",
            Self::SocketCreate(_) => "SocketCreateError",
            Self::SocketConnect(_) => "SocketConnectError",
            Self::SocketBind(_) => "SocketBindError",
            Self::Send(_) => "SendError",
            Self::Receive(_) => "ReceiveError",
            Self::PeerClosed => "PeerClosed",
            Self::UnexpectedPhase(_) => "UnexpectedPhase",
        }
    }

    /// Orderly close by the peer rather than a fault.
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, Self::PeerClosed)
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Create { .. } => Self::SocketCreate(err),
            TransportError::Connect { .. } => Self::SocketConnect(err),
            TransportError::Bind { .. } => Self::SocketBind(err),
            TransportError::Send(_)
            | TransportError::ShortWrite { .. }
            | TransportError::NotOpen => Self::Send(err),
            TransportError::Receive(_) => Self::Receive(err),
            TransportError::PeerClosed => Self::PeerClosed,
        }
    }
}
