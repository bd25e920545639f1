//! [`SocketApi`] over real OS sockets.
//!
//! [`StdSockets::create`] opens an unattached IPv4 socket through socket2;
//! connect and bind run on that socket and then hand it to the matching
//! `std::net` type. Server sockets set `SO_REUSEADDR` before binding. A
//! stream server accepts its single peer lazily on the first receive.

use super::{Protocol, SocketApi};
use socket2::{Domain, SockAddr, Socket, Type};
use std::io::{self, Read, Write};
use std::mem;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, UdpSocket};

/// Pending connections a stream server queues; it serves one peer.
const LISTEN_BACKLOG: i32 = 1;

#[derive(Debug)]
pub enum StdHandle {
    /// Created, not yet connected or bound.
    Unattached { protocol: Protocol, socket: Socket },
    /// Connected stream client.
    Stream(TcpStream),
    /// Bound stream server and the peer it is currently serving.
    Listener {
        listener: TcpListener,
        peer: Option<(TcpStream, SocketAddr)>,
    },
    /// Datagram socket, connected (client) or bound (server).
    Datagram(UdpSocket),
    /// The socket was handed on; holds no OS resource.
    Detached,
}

/// Real sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdSockets;

impl StdSockets {
    pub fn new() -> Self {
        Self
    }
}

fn already_attached() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "socket already connected or bound")
}

fn not_attached() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket is not connected or bound")
}

/// Swap the unattached socket in `handle` for its attached form.
fn promote(handle: &mut StdHandle, attach: impl FnOnce(Protocol, Socket) -> StdHandle) {
    if let StdHandle::Unattached { protocol, socket } = mem::replace(handle, StdHandle::Detached) {
        *handle = attach(protocol, socket);
    }
}

impl SocketApi for StdSockets {
    type Handle = StdHandle;

    fn create(&mut self, protocol: Protocol) -> io::Result<StdHandle> {
        let (ty, proto) = match protocol {
            Protocol::Tcp => (Type::STREAM, socket2::Protocol::TCP),
            Protocol::Udp => (Type::DGRAM, socket2::Protocol::UDP),
        };
        let socket = Socket::new(Domain::IPV4, ty, Some(proto))?;
        Ok(StdHandle::Unattached { protocol, socket })
    }

    fn connect(&mut self, handle: &mut StdHandle, peer: SocketAddr) -> io::Result<()> {
        let StdHandle::Unattached { socket, .. } = handle else {
            return Err(already_attached());
        };
        socket.connect(&SockAddr::from(peer))?;
        promote(handle, |protocol, socket| match protocol {
            Protocol::Tcp => StdHandle::Stream(socket.into()),
            Protocol::Udp => StdHandle::Datagram(socket.into()),
        });
        Ok(())
    }

    fn bind(&mut self, handle: &mut StdHandle, local: SocketAddr) -> io::Result<()> {
        let StdHandle::Unattached { protocol, socket } = handle else {
            return Err(already_attached());
        };
        socket.set_reuse_address(true)?;
        socket.bind(&SockAddr::from(local))?;
        if *protocol == Protocol::Tcp {
            socket.listen(LISTEN_BACKLOG)?;
        }
        promote(handle, |protocol, socket| match protocol {
            Protocol::Tcp => StdHandle::Listener {
                listener: socket.into(),
                peer: None,
            },
            Protocol::Udp => StdHandle::Datagram(socket.into()),
        });
        Ok(())
    }

    fn send(
        &mut self,
        handle: &mut StdHandle,
        payload: &[u8],
        peer: Option<SocketAddr>,
    ) -> io::Result<usize> {
        match handle {
            StdHandle::Stream(stream) => stream.write_all(payload).map(|_| payload.len()),
            StdHandle::Listener {
                peer: Some((stream, _)),
                ..
            } => stream.write_all(payload).map(|_| payload.len()),
            StdHandle::Datagram(socket) => match peer {
                Some(peer) => socket.send_to(payload, peer),
                None => socket.send(payload),
            },
            StdHandle::Listener { peer: None, .. }
            | StdHandle::Unattached { .. }
            | StdHandle::Detached => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no peer to send to",
            )),
        }
    }

    fn recv(
        &mut self,
        handle: &mut StdHandle,
        buf: &mut [u8],
    ) -> io::Result<(usize, Option<SocketAddr>)> {
        match handle {
            StdHandle::Stream(stream) => {
                let n = stream.read(buf)?;
                Ok((n, stream.peer_addr().ok()))
            }
            StdHandle::Listener { listener, peer } => {
                if peer.is_none() {
                    let (stream, addr) = listener.accept()?;
                    log::info!("[Server] Client connected from {addr}");
                    *peer = Some((stream, addr));
                }
                let Some((stream, addr)) = peer.as_mut() else {
                    return Err(io::Error::new(io::ErrorKind::NotConnected, "no peer"));
                };
                let addr = *addr;
                match stream.read(buf) {
                    Ok(0) => {
                        *peer = None;
                        Ok((0, Some(addr)))
                    }
                    Ok(n) => Ok((n, Some(addr))),
                    Err(e) => {
                        *peer = None;
                        Err(e)
                    }
                }
            }
            StdHandle::Datagram(socket) => {
                let (n, from) = socket.recv_from(buf)?;
                Ok((n, Some(from)))
            }
            StdHandle::Unattached { .. } | StdHandle::Detached => Err(not_attached()),
        }
    }

    fn close(&mut self, handle: StdHandle) -> io::Result<()> {
        let shutdown = |stream: &TcpStream| match stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        };
        match handle {
            StdHandle::Stream(stream) => shutdown(&stream),
            StdHandle::Listener {
                peer: Some((stream, _)),
                ..
            } => shutdown(&stream),
            StdHandle::Listener { peer: None, .. }
            | StdHandle::Datagram(_)
            | StdHandle::Unattached { .. }
            | StdHandle::Detached => Ok(()),
        }
    }

    fn local_addr(&self, handle: &StdHandle) -> io::Result<SocketAddr> {
        match handle {
            StdHandle::Stream(stream) => stream.local_addr(),
            StdHandle::Listener { listener, .. } => listener.local_addr(),
            StdHandle::Datagram(socket) => socket.local_addr(),
            StdHandle::Unattached { socket, .. } => socket
                .local_addr()?
                .as_socket()
                .ok_or_else(not_attached),
            StdHandle::Detached => Err(not_attached()),
        }
    }
}
