//! Transport session: one socket handle plus one reusable receive buffer.
//!
//! The socket primitives themselves are a capability ([`SocketApi`]) so the
//! session logic can run against real sockets ([`StdSockets`]) or scripted
//! ones in tests. The session guarantees that a handle which failed halfway
//! through opening is closed before the error is returned, and that
//! [`TransportSession::close`] can be called any number of times.

pub mod std_socket;

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

pub use std_socket::{StdHandle, StdSockets};

/// Payload capacity of the receive buffer.
pub const RECEIVE_CAPACITY: usize = 1024;

/// Prefix the server puts in front of every echoed payload.
pub const ECHO_PREFIX: &[u8] = b"Echo: ";

/// Output capacity on the replying side: a full payload plus prefix room.
pub const REPLY_CAPACITY: usize = RECEIVE_CAPACITY + 10;

/// Well-known port both sides default to.
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Stream socket.
    #[default]
    Tcp,
    /// Datagram socket.
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        })
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(format!("unknown protocol '{other}', expected tcp or udp")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Connect to a server and run the fixed message list.
    #[default]
    Client,
    /// Bind and echo whatever arrives until the peer goes away.
    Server,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Client => "Client",
            Self::Server => "Server",
        })
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "server" => Ok(Self::Server),
            other => Err(format!("unknown role '{other}', expected client or server")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not create {protocol} socket: {source}")]
    Create {
        protocol: Protocol,
        #[source]
        source: io::Error,
    },

    #[error("could not connect to {peer}: {source}")]
    Connect {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("could not bind {local}: {source}")]
    Bind {
        local: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("no transport handle is open")]
    NotOpen,
}

/// Blocking socket primitives.
///
/// Every call blocks until the underlying operation resolves. No call has a
/// timeout.
pub trait SocketApi {
    type Handle;

    fn create(&mut self, protocol: Protocol) -> io::Result<Self::Handle>;

    fn connect(&mut self, handle: &mut Self::Handle, peer: SocketAddr) -> io::Result<()>;

    fn bind(&mut self, handle: &mut Self::Handle, local: SocketAddr) -> io::Result<()>;

    /// Send to the connected peer, or to `peer` for unconnected datagrams.
    fn send(
        &mut self,
        handle: &mut Self::Handle,
        payload: &[u8],
        peer: Option<SocketAddr>,
    ) -> io::Result<usize>;

    /// Receive into `buf`. `Ok((0, _))` means orderly close.
    fn recv(
        &mut self,
        handle: &mut Self::Handle,
        buf: &mut [u8],
    ) -> io::Result<(usize, Option<SocketAddr>)>;

    fn close(&mut self, handle: Self::Handle) -> io::Result<()>;

    fn local_addr(&self, handle: &Self::Handle) -> io::Result<SocketAddr>;
}

/// Fixed-capacity buffer reused across reads. `len` always marks the end of
/// the last read.
#[derive(Clone)]
pub struct ReceiveBuffer {
    bytes: [u8; RECEIVE_CAPACITY],
    len: usize,
}

impl ReceiveBuffer {
    pub fn new() -> Self {
        Self {
            bytes: [0; RECEIVE_CAPACITY],
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        RECEIVE_CAPACITY
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn as_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    fn spare(&mut self) -> &mut [u8] {
        &mut self.bytes[..]
    }

    fn terminate(&mut self, len: usize) {
        self.len = len.min(RECEIVE_CAPACITY);
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReceiveBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiveBuffer")
            .field("len", &self.len)
            .field("text", &self.as_text())
            .finish()
    }
}

/// The reply observed by a client after one exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EchoedReply {
    pub bytes: Vec<u8>,
}

impl EchoedReply {
    pub fn as_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Boundary of one blocking socket call inside an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoEvent {
    Started,
    Finished,
}

/// One datagram or read the server handled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServedEcho {
    pub peer: Option<SocketAddr>,
    pub request: Vec<u8>,
    pub reply: Vec<u8>,
}

/// `"Echo: "` followed by `payload`, truncated to `capacity` bytes.
///
/// ```rust
/// use tether::transport::echo_reply;
///
/// assert_eq!(echo_reply(b"ping", 64), b"Echo: ping");
/// assert_eq!(echo_reply(b"ping", 8), b"Echo: pi");
/// ```
pub fn echo_reply(payload: &[u8], capacity: usize) -> Vec<u8> {
    let mut reply = Vec::with_capacity((ECHO_PREFIX.len() + payload.len()).min(capacity));
    reply.extend_from_slice(ECHO_PREFIX);
    reply.extend_from_slice(payload);
    reply.truncate(capacity);
    reply
}

/// Owns at most one transport handle for the lifetime of a run.
pub struct TransportSession<A: SocketApi> {
    api: A,
    handle: Option<A::Handle>,
    protocol: Option<Protocol>,
    buffer: ReceiveBuffer,
    last_peer: Option<SocketAddr>,
}

impl<A: SocketApi> TransportSession<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            handle: None,
            protocol: None,
            buffer: ReceiveBuffer::new(),
            last_peer: None,
        }
    }

    /// Create a handle and connect it to `peer`.
    pub fn open_and_connect(
        &mut self,
        protocol: Protocol,
        peer: SocketAddr,
    ) -> Result<(), TransportError> {
        self.open(protocol, |api, handle| {
            api.connect(handle, peer)
                .map_err(|source| TransportError::Connect { peer, source })
        })?;
        log::info!("[Client] Connected to {peer} over {protocol}");
        Ok(())
    }

    /// Create a handle bound to `port` on every local interface. Returns the
    /// bound address, which differs from the request when `port` is 0.
    pub fn open_and_bind(
        &mut self,
        protocol: Protocol,
        port: u16,
    ) -> Result<SocketAddr, TransportError> {
        let local = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        self.open(protocol, |api, handle| {
            api.bind(handle, local)
                .map_err(|source| TransportError::Bind { local, source })
        })?;
        let bound = self.local_addr().unwrap_or(local);
        log::info!("[Server] Bound {protocol} socket on {bound}");
        Ok(bound)
    }

    fn open<F>(&mut self, protocol: Protocol, attach: F) -> Result<(), TransportError>
    where
        F: FnOnce(&mut A, &mut A::Handle) -> Result<(), TransportError>,
    {
        self.close();

        let mut handle = self
            .api
            .create(protocol)
            .map_err(|source| TransportError::Create { protocol, source })?;

        if let Err(err) = attach(&mut self.api, &mut handle) {
            if let Err(close_err) = self.api.close(handle) {
                log::warn!("closing half-open {protocol} socket failed: {close_err}");
            }
            return Err(err);
        }

        self.handle = Some(handle);
        self.protocol = Some(protocol);
        Ok(())
    }

    /// Write `message` to the connected peer.
    pub fn send(&mut self, message: &[u8]) -> Result<usize, TransportError> {
        self.send_to(message, None)
    }

    fn send_to(
        &mut self,
        payload: &[u8],
        peer: Option<SocketAddr>,
    ) -> Result<usize, TransportError> {
        let handle = self.handle.as_mut().ok_or(TransportError::NotOpen)?;
        let written = self
            .api
            .send(handle, payload, peer)
            .map_err(TransportError::Send)?;
        if written != payload.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: payload.len(),
            });
        }
        Ok(written)
    }

    /// Block for exactly one read into the buffer.
    pub fn receive(&mut self) -> Result<usize, TransportError> {
        let handle = self.handle.as_mut().ok_or(TransportError::NotOpen)?;
        self.buffer.clear();
        let (len, peer) = self
            .api
            .recv(handle, self.buffer.spare())
            .map_err(TransportError::Receive)?;
        self.buffer.terminate(len);
        if len == 0 {
            return Err(TransportError::PeerClosed);
        }
        if peer.is_some() {
            self.last_peer = peer;
        }
        Ok(self.buffer.len())
    }

    /// Write `message`, then block for one reply. No retry.
    pub fn exchange_once(&mut self, message: &[u8]) -> Result<EchoedReply, TransportError> {
        self.exchange_observed(message, |_| {})
    }

    /// [`exchange_once`](Self::exchange_once), calling `on_io` before and
    /// after the send and the receive. The receive is skipped if the send
    /// fails.
    pub fn exchange_observed<F>(
        &mut self,
        message: &[u8],
        mut on_io: F,
    ) -> Result<EchoedReply, TransportError>
    where
        F: FnMut(IoEvent),
    {
        on_io(IoEvent::Started);
        let sent = self.send(message);
        on_io(IoEvent::Finished);
        sent?;

        on_io(IoEvent::Started);
        let received = self.receive();
        on_io(IoEvent::Finished);
        received?;

        Ok(EchoedReply {
            bytes: self.buffer.as_bytes().to_vec(),
        })
    }

    /// Send the echo of the buffer back to whoever sent it.
    pub fn reply_echo(&mut self) -> Result<Vec<u8>, TransportError> {
        let reply = echo_reply(self.buffer.as_bytes(), REPLY_CAPACITY);
        let peer = match self.protocol {
            Some(Protocol::Udp) => self.last_peer,
            _ => None,
        };
        self.send_to(&reply, peer)?;
        Ok(reply)
    }

    /// Receive one message from any peer and echo it back.
    pub fn serve_once(&mut self) -> Result<ServedEcho, TransportError> {
        self.receive()?;
        let request = self.buffer.as_bytes().to_vec();
        let reply = self.reply_echo()?;
        Ok(ServedEcho {
            peer: self.last_peer,
            request,
            reply,
        })
    }

    /// Release the handle. Safe to call when nothing is open.
    pub fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.api.close(handle) {
                log::warn!("socket close reported: {e}");
            }
        }
        self.protocol = None;
        self.last_peer = None;
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn protocol(&self) -> Option<Protocol> {
        self.protocol
    }

    pub fn buffer(&self) -> &ReceiveBuffer {
        &self.buffer
    }

    pub fn last_peer(&self) -> Option<SocketAddr> {
        self.last_peer
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        let handle = self.handle.as_ref()?;
        self.api.local_addr(handle).ok()
    }

    pub fn api(&self) -> &A {
        &self.api
    }
}

impl<A: SocketApi> Drop for TransportSession<A> {
    fn drop(&mut self) {
        self.close();
    }
}
