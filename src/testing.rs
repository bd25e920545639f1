//! Scripted stand-ins for every capability the machine consumes.
//!
//! Each fake hands out a cloneable probe before it is moved into the machine,
//! so a test can inspect what happened afterwards.
//!
//! ```rust
//! use tether::testing::ScriptedSockets;
//!
//! let sockets = ScriptedSockets::echoing().fail_send_on(2);
//! let probe = sockets.probe();
//! assert_eq!(probe.open_handles(), 0);
//! ```

use crate::indicator::{Color, StatusIndicator};
use crate::radio::{Credentials, LinkStatus, RadioDriver, RadioError, RadioNotifier};
use crate::transport::{echo_reply, Protocol, SocketApi};
use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Sockets
// ---------------------------------------------------------------------------

/// What the next `recv` returns.
#[derive(Clone, Debug)]
pub enum RecvStep {
    /// `"Echo: "` + the most recent payload sent.
    Echo,
    Data {
        bytes: Vec<u8>,
        from: Option<SocketAddr>,
    },
    /// Zero-length read.
    Closed,
    Error(io::ErrorKind),
}

impl RecvStep {
    pub fn data(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Data {
            bytes: bytes.into(),
            from: None,
        }
    }

    pub fn datagram(bytes: impl Into<Vec<u8>>, from: SocketAddr) -> Self {
        Self::Data {
            bytes: bytes.into(),
            from: Some(from),
        }
    }
}

#[derive(Debug, Default)]
struct SocketLog {
    created: usize,
    closed: usize,
    receives: usize,
    sent: Vec<(Vec<u8>, Option<SocketAddr>)>,
    connected: Vec<SocketAddr>,
    bound: Vec<SocketAddr>,
}

/// Read-only view of a [`ScriptedSockets`] after it has been moved.
#[derive(Clone, Debug, Default)]
pub struct SocketProbe {
    log: Arc<Mutex<SocketLog>>,
}

impl SocketProbe {
    pub fn created(&self) -> usize {
        lock(&self.log).created
    }

    pub fn closed(&self) -> usize {
        lock(&self.log).closed
    }

    /// Handles created and not yet closed.
    pub fn open_handles(&self) -> usize {
        let log = lock(&self.log);
        log.created - log.closed
    }

    pub fn receives(&self) -> usize {
        lock(&self.log).receives
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        lock(&self.log)
            .sent
            .iter()
            .map(|(bytes, _)| bytes.clone())
            .collect()
    }

    pub fn sent_to(&self) -> Vec<(Vec<u8>, Option<SocketAddr>)> {
        lock(&self.log).sent.clone()
    }

    pub fn connected(&self) -> Vec<SocketAddr> {
        lock(&self.log).connected.clone()
    }

    pub fn bound(&self) -> Vec<SocketAddr> {
        lock(&self.log).bound.clone()
    }
}

#[derive(Debug)]
pub struct ScriptedHandle {
    pub protocol: Protocol,
    local: Option<SocketAddr>,
}

/// [`SocketApi`] that replays a receive script.
#[derive(Debug)]
pub struct ScriptedSockets {
    script: VecDeque<RecvStep>,
    exhausted: RecvStep,
    fail_create: bool,
    fail_connect: bool,
    fail_bind: bool,
    fail_send_on: Option<usize>,
    sends: usize,
    log: Arc<Mutex<SocketLog>>,
}

impl ScriptedSockets {
    /// Every receive echoes the last payload sent.
    pub fn echoing() -> Self {
        Self::scripted(Vec::new(), RecvStep::Echo)
    }

    /// Replay `steps`, then report the peer as closed.
    pub fn with_replies(steps: Vec<RecvStep>) -> Self {
        Self::scripted(steps, RecvStep::Closed)
    }

    fn scripted(steps: Vec<RecvStep>, exhausted: RecvStep) -> Self {
        Self {
            script: steps.into(),
            exhausted,
            fail_create: false,
            fail_connect: false,
            fail_bind: false,
            fail_send_on: None,
            sends: 0,
            log: Arc::default(),
        }
    }

    pub fn fail_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn fail_bind(mut self) -> Self {
        self.fail_bind = true;
        self
    }

    /// The `n`-th send (0-based) fails with a broken pipe.
    pub fn fail_send_on(mut self, n: usize) -> Self {
        self.fail_send_on = Some(n);
        self
    }

    pub fn probe(&self) -> SocketProbe {
        SocketProbe {
            log: Arc::clone(&self.log),
        }
    }
}

impl SocketApi for ScriptedSockets {
    type Handle = ScriptedHandle;

    fn create(&mut self, protocol: Protocol) -> io::Result<ScriptedHandle> {
        if self.fail_create {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "no socket buffers"));
        }
        lock(&self.log).created += 1;
        Ok(ScriptedHandle {
            protocol,
            local: None,
        })
    }

    fn connect(&mut self, handle: &mut ScriptedHandle, peer: SocketAddr) -> io::Result<()> {
        if self.fail_connect {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        lock(&self.log).connected.push(peer);
        handle.local = Some(SocketAddr::from((Ipv4Addr::new(192, 168, 1, 20), 49152)));
        Ok(())
    }

    fn bind(&mut self, handle: &mut ScriptedHandle, local: SocketAddr) -> io::Result<()> {
        if self.fail_bind {
            return Err(io::Error::from(io::ErrorKind::AddrInUse));
        }
        lock(&self.log).bound.push(local);
        handle.local = Some(local);
        Ok(())
    }

    fn send(
        &mut self,
        _handle: &mut ScriptedHandle,
        payload: &[u8],
        peer: Option<SocketAddr>,
    ) -> io::Result<usize> {
        let index = self.sends;
        self.sends += 1;
        if self.fail_send_on == Some(index) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        lock(&self.log).sent.push((payload.to_vec(), peer));
        Ok(payload.len())
    }

    fn recv(
        &mut self,
        _handle: &mut ScriptedHandle,
        buf: &mut [u8],
    ) -> io::Result<(usize, Option<SocketAddr>)> {
        let step = self
            .script
            .pop_front()
            .unwrap_or_else(|| self.exhausted.clone());
        let mut log = lock(&self.log);
        log.receives += 1;

        let (bytes, from) = match step {
            RecvStep::Echo => {
                let last = log.sent.last().map(|(b, _)| b.as_slice()).unwrap_or(&[]);
                (echo_reply(last, buf.len()), None)
            }
            RecvStep::Data { bytes, from } => (bytes, from),
            RecvStep::Closed => return Ok((0, None)),
            RecvStep::Error(kind) => return Err(io::Error::from(kind)),
        };

        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok((n, from))
    }

    fn close(&mut self, _handle: ScriptedHandle) -> io::Result<()> {
        lock(&self.log).closed += 1;
        Ok(())
    }

    fn local_addr(&self, handle: &ScriptedHandle) -> io::Result<SocketAddr> {
        handle
            .local
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
}

// ---------------------------------------------------------------------------
// Radio
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RadioLog {
    initialized: usize,
    requests: Vec<String>,
    disconnects: usize,
}

#[derive(Clone, Debug, Default)]
pub struct RadioProbe {
    log: Arc<Mutex<RadioLog>>,
}

impl RadioProbe {
    pub fn initialized(&self) -> usize {
        lock(&self.log).initialized
    }

    /// SSIDs of every association request, in order.
    pub fn requests(&self) -> Vec<String> {
        lock(&self.log).requests.clone()
    }

    pub fn disconnects(&self) -> usize {
        lock(&self.log).disconnects
    }
}

/// [`RadioDriver`] whose events fire from a helper thread as scripted.
#[derive(Debug)]
pub struct ScriptedRadio {
    init_error: Option<RadioError>,
    request_error: Option<RadioError>,
    disconnect_error: Option<RadioError>,
    /// `None` never reports a connection result.
    connect_status: Option<i32>,
    fire_address: bool,
    link: Result<LinkStatus, RadioError>,
    delay: Duration,
    notifier: Option<RadioNotifier>,
    events: Option<JoinHandle<()>>,
    log: Arc<Mutex<RadioLog>>,
}

impl ScriptedRadio {
    /// Associates with status 0 and assigns an address.
    pub fn cooperative() -> Self {
        Self {
            init_error: None,
            request_error: None,
            disconnect_error: None,
            connect_status: Some(0),
            fire_address: true,
            link: Ok(LinkStatus {
                ssid: "lab".into(),
                address: Some(Ipv4Addr::new(192, 168, 1, 20)),
                gateway: Some(Ipv4Addr::new(192, 168, 1, 1)),
                rssi_dbm: Some(-52),
                channel: Some(6),
            }),
            delay: Duration::from_millis(1),
            notifier: None,
            events: None,
            log: Arc::default(),
        }
    }

    pub fn failing_init(mut self, code: i32) -> Self {
        self.init_error = Some(RadioError::Driver {
            op: "init",
            code,
        });
        self
    }

    pub fn failing_request(mut self, code: i32) -> Self {
        self.request_error = Some(RadioError::Driver {
            op: "connect",
            code,
        });
        self
    }

    pub fn failing_disconnect(mut self, code: i32) -> Self {
        self.disconnect_error = Some(RadioError::Driver {
            op: "disconnect",
            code,
        });
        self
    }

    /// Report `status` as the connection result.
    pub fn association_status(mut self, status: i32) -> Self {
        self.connect_status = Some(status);
        self
    }

    /// Never report a connection result.
    pub fn silent_association(mut self) -> Self {
        self.connect_status = None;
        self
    }

    /// Associate but never assign an address.
    pub fn silent_address(mut self) -> Self {
        self.fire_address = false;
        self
    }

    pub fn failing_link_status(mut self) -> Self {
        self.link = Err(RadioError::Driver {
            op: "iface_status",
            code: -5,
        });
        self
    }

    /// Delay before each event is delivered.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn probe(&self) -> RadioProbe {
        RadioProbe {
            log: Arc::clone(&self.log),
        }
    }

    fn join_events(&mut self) {
        if let Some(events) = self.events.take() {
            let _ = events.join();
        }
    }
}

impl RadioDriver for ScriptedRadio {
    fn initialize(&mut self, notifier: RadioNotifier) -> Result<(), RadioError> {
        lock(&self.log).initialized += 1;
        if let Some(err) = self.init_error.clone() {
            return Err(err);
        }
        self.notifier = Some(notifier);
        Ok(())
    }

    fn request_association(&mut self, credentials: &Credentials) -> Result<(), RadioError> {
        let notifier = self.notifier.clone().ok_or(RadioError::NotInitialized)?;
        lock(&self.log).requests.push(credentials.ssid.clone());
        if let Some(err) = self.request_error.clone() {
            return Err(err);
        }

        self.join_events();
        let status = self.connect_status;
        let fire_address = self.fire_address;
        let delay = self.delay;
        self.events = Some(thread::spawn(move || {
            let Some(status) = status else {
                return;
            };
            thread::sleep(delay);
            notifier.connect_result(status);
            if status == 0 && fire_address {
                thread::sleep(delay);
                notifier.address_added();
            }
        }));
        Ok(())
    }

    fn link_status(&mut self) -> Result<LinkStatus, RadioError> {
        self.link.clone()
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        lock(&self.log).disconnects += 1;
        self.join_events();
        if let Some(err) = self.disconnect_error.clone() {
            return Err(err);
        }
        if let Some(notifier) = &self.notifier {
            notifier.disconnect_result(0);
        }
        Ok(())
    }
}

impl Drop for ScriptedRadio {
    fn drop(&mut self) {
        self.join_events();
    }
}

// ---------------------------------------------------------------------------
// Indicator
// ---------------------------------------------------------------------------

/// Shared record of every color shown.
#[derive(Clone, Debug, Default)]
pub struct ColorLog {
    colors: Arc<Mutex<Vec<Color>>>,
}

impl ColorLog {
    pub fn colors(&self) -> Vec<Color> {
        lock(&self.colors).clone()
    }

    pub fn last(&self) -> Option<Color> {
        lock(&self.colors).last().copied()
    }

    pub fn count(&self, color: Color) -> usize {
        lock(&self.colors).iter().filter(|c| **c == color).count()
    }
}

/// [`StatusIndicator`] that records instead of lighting anything.
#[derive(Debug, Default)]
pub struct RecordingIndicator {
    log: ColorLog,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> ColorLog {
        self.log.clone()
    }
}

impl StatusIndicator for RecordingIndicator {
    fn show(&mut self, color: Color) {
        lock(&self.log.colors).push(color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::EventGate;

    #[test]
    fn echoing_sockets_echo_last_send() {
        let mut api = ScriptedSockets::echoing();
        let mut handle = api.create(Protocol::Tcp).unwrap();
        api.send(&mut handle, b"ping", None).unwrap();
        let mut buf = [0u8; 32];
        let (n, _) = api.recv(&mut handle, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"Echo: ping");
    }

    #[test]
    fn exhausted_script_reports_close() {
        let mut api = ScriptedSockets::with_replies(vec![RecvStep::data("one")]);
        let mut handle = api.create(Protocol::Udp).unwrap();
        let mut buf = [0u8; 32];
        assert_eq!(api.recv(&mut handle, &mut buf).unwrap().0, 3);
        assert_eq!(api.recv(&mut handle, &mut buf).unwrap().0, 0);
    }

    #[test]
    fn silent_radio_never_signals() {
        let association = EventGate::new();
        let address = EventGate::new();
        let mut radio = ScriptedRadio::cooperative().silent_association();
        radio
            .initialize(RadioNotifier::new(association.handle(), address.handle()))
            .unwrap();
        radio
            .request_association(&Credentials::new("lab", "pw"))
            .unwrap();
        assert!(association.wait_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn recording_indicator_shares_log() {
        let mut led = RecordingIndicator::new();
        let log = led.log();
        led.show(Color::Red);
        led.show(Color::Off);
        assert_eq!(log.colors(), vec![Color::Red, Color::Off]);
        assert_eq!(log.last(), Some(Color::Off));
    }
}
