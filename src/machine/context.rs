//! The single mutable record a run works on.

use crate::core::Phase;
use crate::error::SessionError;
use crate::transport::{ReceiveBuffer, SocketApi, TransportSession};

/// Owned by the machine for the whole run and mutated only by the phase
/// handler that is currently executing.
///
/// The socket handle and receive buffer live inside the
/// [`TransportSession`]; `socket_open()` is `true` exactly while a handle is
/// held.
pub struct SessionContext<A: SocketApi> {
    pub(crate) transport: TransportSession<A>,
    pub(crate) radio_associated: bool,
    pub(crate) exit_code: i32,
    pub(crate) failure_origin: Option<Phase>,
    pub(crate) failure: Option<SessionError>,
    pub(crate) exchanges: u64,
}

impl<A: SocketApi> SessionContext<A> {
    pub fn new(sockets: A) -> Self {
        Self {
            transport: TransportSession::new(sockets),
            radio_associated: false,
            exit_code: 0,
            failure_origin: None,
            failure: None,
            exchanges: 0,
        }
    }

    pub fn socket_open(&self) -> bool {
        self.transport.is_open()
    }

    pub fn radio_associated(&self) -> bool {
        self.radio_associated
    }

    pub fn receive_buffer(&self) -> &ReceiveBuffer {
        self.transport.buffer()
    }

    /// 0 on success, non-zero after any failure.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// The phase that produced the failure. Diagnostic only.
    pub fn failure_origin(&self) -> Option<Phase> {
        self.failure_origin
    }

    pub fn failure(&self) -> Option<&SessionError> {
        self.failure.as_ref()
    }

    /// Completed message/reply pairs.
    pub fn exchanges(&self) -> u64 {
        self.exchanges
    }

    /// `true` once nothing is held: no socket and no association.
    pub fn is_released(&self) -> bool {
        !self.socket_open() && !self.radio_associated
    }

    pub fn transport(&self) -> &TransportSession<A> {
        &self.transport
    }
}
