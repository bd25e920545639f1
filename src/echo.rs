//! The PC-side echo peer.
//!
//! Binds every interface, advertises its non-loopback IPv4 addresses, then
//! answers each message with `"Echo: "` + message. A stream peer serves one
//! client at a time; a datagram peer replies to whoever sent each datagram.

use crate::discovery;
use crate::transport::{Protocol, ServedEcho, StdSockets, TransportError, TransportSession};
use std::net::SocketAddr;

pub struct EchoPeer {
    session: TransportSession<StdSockets>,
    protocol: Protocol,
    local: SocketAddr,
    keep_serving: bool,
    served: u64,
}

impl EchoPeer {
    /// Bind `port` on every interface (0 picks a free port).
    pub fn bind(protocol: Protocol, port: u16) -> Result<Self, TransportError> {
        let mut session = TransportSession::new(StdSockets::new());
        let local = session.open_and_bind(protocol, port)?;
        discovery::advertise("Server", local.port());
        Ok(Self {
            session,
            protocol,
            local,
            keep_serving: false,
            served: 0,
        })
    }

    /// Accept the next stream client after the current one disconnects,
    /// instead of stopping.
    pub fn keep_serving(mut self, keep: bool) -> Self {
        self.keep_serving = keep;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Echoes sent so far.
    pub fn served(&self) -> u64 {
        self.served
    }

    /// Block for one message and echo it.
    pub fn serve_one(&mut self) -> Result<ServedEcho, TransportError> {
        let echo = self.session.serve_once()?;
        self.served += 1;
        log::debug!(
            "[Server] Received: {} from {}",
            String::from_utf8_lossy(&echo.request),
            echo.peer
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
        log::debug!("[Server] Sent:     {}", String::from_utf8_lossy(&echo.reply));
        Ok(echo)
    }

    /// Serve until `limit` echoes have been sent, or until the stream client
    /// disconnects when not keeping on. Returns the number of echoes.
    pub fn serve(&mut self, limit: Option<u64>) -> Result<u64, TransportError> {
        let start = self.served;
        while limit.map_or(true, |max| self.served - start < max) {
            match self.serve_one() {
                Ok(_) => {}
                Err(TransportError::PeerClosed) if self.protocol == Protocol::Tcp => {
                    log::info!("[Server] Client disconnected.");
                    if !self.keep_serving {
                        break;
                    }
                }
                Err(TransportError::PeerClosed) => {
                    log::debug!("[Server] Ignoring empty datagram");
                }
                Err(err @ (TransportError::Receive(_) | TransportError::Send(_)))
                    if self.keep_serving =>
                {
                    log::warn!("[Server] {err}");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(self.served - start)
    }

    pub fn close(&mut self) {
        if self.session.is_open() {
            self.session.close();
            log::info!("[Server] Closed.");
        }
    }
}

impl Drop for EchoPeer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, TcpStream, UdpSocket};
    use std::thread;

    fn loopback(peer: &EchoPeer) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, peer.local_addr().port()))
    }

    fn round_trip(stream: &mut TcpStream, msg: &[u8]) -> Vec<u8> {
        stream.write_all(msg).unwrap();
        let mut buf = [0u8; 128];
        let n = stream.read(&mut buf).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn tcp_peer_stops_when_single_client_leaves() {
        let mut peer = EchoPeer::bind(Protocol::Tcp, 0).unwrap();
        let addr = loopback(&peer);
        let server = thread::spawn(move || peer.serve(None).unwrap());

        let mut client = TcpStream::connect(addr).unwrap();
        assert_eq!(round_trip(&mut client, b"Hello, Server!"), b"Echo: Hello, Server!");
        assert_eq!(round_trip(&mut client, b"Goodbye!"), b"Echo: Goodbye!");
        drop(client);

        assert_eq!(server.join().unwrap(), 2);
    }

    #[test]
    fn tcp_peer_accepts_next_client_when_keeping_on() {
        let mut peer = EchoPeer::bind(Protocol::Tcp, 0).unwrap().keep_serving(true);
        let addr = loopback(&peer);
        let server = thread::spawn(move || peer.serve(Some(2)).unwrap());

        for msg in [&b"first"[..], &b"second"[..]] {
            let mut client = TcpStream::connect(addr).unwrap();
            let mut expected = b"Echo: ".to_vec();
            expected.extend_from_slice(msg);
            assert_eq!(round_trip(&mut client, msg), expected);
        }

        assert_eq!(server.join().unwrap(), 2);
    }

    #[test]
    fn udp_peer_replies_to_sender() {
        let mut peer = EchoPeer::bind(Protocol::Udp, 0).unwrap();
        let addr = loopback(&peer);
        let server = thread::spawn(move || {
            let echo = peer.serve_one().unwrap();
            (echo, peer.served())
        });

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client.send_to(b"How are you?", addr).unwrap();
        let mut buf = [0u8; 128];
        let (n, _) = client.recv_from(&mut buf).unwrap();

        let (echo, served) = server.join().unwrap();
        assert_eq!(&buf[..n], b"Echo: How are you?");
        assert_eq!(echo.peer, Some(client.local_addr().unwrap()));
        assert_eq!(served, 1);
    }
}
