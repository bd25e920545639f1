//! The connection state machine.
//!
//! The machine owns the radio driver, the transport session and the
//! indicator, and runs one phase handler at a time on the calling thread.
//! Handlers only report success or failure; [`TransitionTable`] decides the
//! next phase. Every path that does not end in the embedded failure trap
//! passes through `ReleasingResources`, which closes the socket and drops the
//! association.

mod context;
mod monitor;

pub use context::SessionContext;
pub use monitor::PhaseMonitor;

use crate::core::{Outcome, Phase, PhaseHistory, PhaseTransition, Target, TransitionTable};
use crate::discovery;
use crate::error::{RadioWaitError, SessionError};
use crate::gate::{EventGate, WaitPolicy};
use crate::indicator::{self, Cue, StatusIndicator};
use crate::radio::{Credentials, RadioDriver, RadioError, RadioNotifier};
use crate::report::RunReport;
use crate::transport::{IoEvent, Protocol, Role, SocketApi, DEFAULT_PORT};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::time::Duration;
use uuid::Uuid;

/// What the client sends, in order. The exchange stops at the first failure.
pub const CLIENT_MESSAGES: [&str; 4] = [
    "Hello, Server!",
    "How are you?",
    "Socket demo working.",
    "Goodbye!",
];

/// Where the transport points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// Client role: connect to this server.
    Connect(SocketAddr),
    /// Server role: bind this port on every interface.
    Bind(u16),
}

impl Endpoint {
    pub fn role(&self) -> Role {
        match self {
            Self::Connect(_) => Role::Client,
            Self::Bind(_) => Role::Server,
        }
    }
}

/// Fixed inputs of a run. Nothing here changes once the machine starts.
#[derive(Clone, Debug)]
pub struct Settings {
    pub credentials: Credentials,
    pub protocol: Protocol,
    pub endpoint: Endpoint,
    pub association_wait: WaitPolicy,
    pub address_wait: WaitPolicy,
    pub target: Target,
    /// Half-period of the failure blink.
    pub blink_half_period: Duration,
    /// Blink cycles before the embedded trap hands control back; `None`
    /// blinks for as long as the device is powered.
    pub blink_cycles: Option<u32>,
}

impl Settings {
    pub fn client(credentials: Credentials, protocol: Protocol, server: SocketAddr) -> Self {
        Self::with_endpoint(credentials, protocol, Endpoint::Connect(server))
    }

    pub fn server(credentials: Credentials, protocol: Protocol, port: u16) -> Self {
        Self::with_endpoint(credentials, protocol, Endpoint::Bind(port))
    }

    fn with_endpoint(credentials: Credentials, protocol: Protocol, endpoint: Endpoint) -> Self {
        Self {
            credentials,
            protocol,
            endpoint,
            association_wait: WaitPolicy::Forever,
            address_wait: WaitPolicy::Forever,
            target: Target::Host,
            blink_half_period: Duration::from_secs(1),
            blink_cycles: None,
        }
    }

    pub fn role(&self) -> Role {
        self.endpoint.role()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::server(Credentials::new("", ""), Protocol::Tcp, DEFAULT_PORT)
    }
}

pub struct ConnectionStateMachine<R, A, I>
where
    R: RadioDriver,
    A: SocketApi,
    I: StatusIndicator,
{
    settings: Settings,
    table: TransitionTable,
    radio: R,
    indicator: I,
    context: SessionContext<A>,
    phase: Phase,
    history: PhaseHistory,
    association: EventGate,
    address: EventGate,
    notifier: RadioNotifier,
    monitor: PhaseMonitor,
    run_id: Uuid,
    started_at: DateTime<Utc>,
}

impl<R, A, I> ConnectionStateMachine<R, A, I>
where
    R: RadioDriver,
    A: SocketApi,
    I: StatusIndicator,
{
    pub fn new(settings: Settings, radio: R, sockets: A, indicator: I) -> Self {
        let association = EventGate::new();
        let address = EventGate::new();
        let notifier = RadioNotifier::new(association.handle(), address.handle());
        let table = TransitionTable::standard(settings.target);

        Self {
            settings,
            table,
            radio,
            indicator,
            context: SessionContext::new(sockets),
            phase: Phase::initial(),
            history: PhaseHistory::new(),
            association,
            address,
            notifier,
            monitor: PhaseMonitor::new(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    /// Replace the transition table.
    pub fn with_table(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn context(&self) -> &SessionContext<A> {
        &self.context
    }

    pub fn history(&self) -> &PhaseHistory {
        &self.history
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Handle that unblocks the machine's radio waits, e.g. from a signal
    /// handler.
    pub fn notifier(&self) -> RadioNotifier {
        self.notifier.clone()
    }

    pub fn monitor(&self) -> PhaseMonitor {
        self.monitor.clone()
    }

    /// Drive the machine until it terminates, or until the embedded trap
    /// parks it in `Failed`.
    pub fn run(&mut self) -> RunReport {
        log::info!(
            "{} ECHO {} DEMO",
            self.settings.protocol.to_string().to_uppercase(),
            self.settings.role().to_string().to_uppercase()
        );
        self.indicator.cue(Cue::Startup);
        self.monitor.publish(self.phase);

        while !self.phase.is_terminal() {
            let before = self.phase;
            let after = self.step();
            if after != before {
                continue;
            }
            if self.settings.target == Target::Embedded && after == Phase::Failed {
                log::error!("[Failure] parked; power-cycle to recover");
                break;
            }
            log::error!("phase {after} leads back to itself; tearing down");
            self.abandon(after);
            self.enter(PhaseTransition::new(after, Phase::Terminated, Outcome::Failure));
        }

        self.report()
    }

    /// Run the handler for the current phase and take one transition.
    pub fn step(&mut self) -> Phase {
        let from = self.phase;
        let result = self.dispatch(from);

        let outcome = match result {
            Ok(()) => Outcome::Success,
            Err(_) => Outcome::Failure,
        };

        let (to, error) = match self.table.resolve(from, outcome) {
            Ok(to) => (to, result.err()),
            Err(e) if from.is_teardown() => {
                log::error!("{e}");
                self.abandon(from);
                (Phase::Terminated, None)
            }
            Err(e) => {
                log::error!("{e}");
                (Phase::Failed, Some(SessionError::UnexpectedPhase(from)))
            }
        };

        if to == Phase::Failed && from != Phase::Failed {
            self.context.failure_origin = Some(from);
            self.context.failure = error;
        }

        self.enter(PhaseTransition::new(from, to, outcome));
        to
    }

    /// End a run whose table gives `phase` no way forward: keep the first
    /// failure, mark the run failed and release everything.
    fn abandon(&mut self, phase: Phase) {
        if self.context.failure_origin.is_none() {
            self.context.failure_origin = Some(phase);
            self.context.failure = Some(SessionError::UnexpectedPhase(phase));
        }
        self.context.exit_code = -1;
        self.release();
    }

    fn enter(&mut self, transition: PhaseTransition) {
        if transition.is_change() {
            log::info!("phase: {} -> {}", transition.from, transition.to);
        }
        let to = transition.to;
        self.history = self.history.record(transition);
        self.phase = to;
        self.monitor.publish(to);
        if to == Phase::Terminated {
            self.indicator.cue(Cue::Terminated);
        }
    }

    fn dispatch(&mut self, phase: Phase) -> Result<(), SessionError> {
        match phase {
            Phase::AssociatingRadio => self.associate(),
            Phase::AwaitingAddress => self.await_address(),
            Phase::EstablishingTransport => self.establish(),
            Phase::Exchanging => match self.settings.role() {
                Role::Client => self.exchange_messages(),
                Role::Server => self.serve_echo(),
            },
            Phase::Failed => {
                self.fail();
                Ok(())
            }
            Phase::ReleasingResources => {
                self.release();
                Ok(())
            }
            Phase::Terminated => Ok(()),
        }
    }

    fn associate(&mut self) -> Result<(), SessionError> {
        self.indicator.cue(Cue::Associating);

        self.radio
            .initialize(self.notifier.clone())
            .map_err(SessionError::RadioInit)?;

        log::info!("Connecting to WiFi '{}'...", self.settings.credentials.ssid);
        self.notifier.reset_connect_status();
        self.radio
            .request_association(&self.settings.credentials)
            .map_err(|e| SessionError::RadioAssociation(e.into()))?;

        if let Err(e) = self.association.wait(self.settings.association_wait) {
            // The request was accepted and may still complete after we stop waiting.
            if let Err(d) = self.radio.disconnect() {
                log::warn!("Failed to withdraw association request: {d}");
            }
            return Err(SessionError::RadioAssociation(e.into()));
        }

        let status = self.notifier.last_connect_status();
        if status != 0 {
            return Err(SessionError::RadioAssociation(RadioWaitError::Radio(
                RadioError::Status(status),
            )));
        }

        self.context.radio_associated = true;
        self.indicator.cue(Cue::Associated);
        Ok(())
    }

    fn await_address(&mut self) -> Result<(), SessionError> {
        self.address
            .wait(self.settings.address_wait)
            .map_err(|e| SessionError::AddressAcquisition(e.into()))?;

        match self.radio.link_status() {
            Ok(status) => log::info!("WiFi status: {status}"),
            Err(e) => log::warn!("Failed to get WiFi status: {e}"),
        }

        self.indicator.cue(Cue::AddressAcquired);
        Ok(())
    }

    fn establish(&mut self) -> Result<(), SessionError> {
        let protocol = self.settings.protocol;
        match self.settings.endpoint {
            Endpoint::Connect(peer) => {
                self.context.transport.open_and_connect(protocol, peer)?;
            }
            Endpoint::Bind(port) => {
                let bound = self.context.transport.open_and_bind(protocol, port)?;
                discovery::advertise("Server", bound.port());
            }
        }
        self.indicator.cue(Cue::TransportReady);
        Ok(())
    }

    fn exchange_messages(&mut self) -> Result<(), SessionError> {
        for message in CLIENT_MESSAGES {
            let indicator = &mut self.indicator;
            let exchanged =
                self.context
                    .transport
                    .exchange_observed(message.as_bytes(), |event| {
                        indicator.cue(match event {
                            IoEvent::Started => Cue::IoStarted,
                            IoEvent::Finished => Cue::IoFinished,
                        })
                    });

            let reply = match exchanged {
                Ok(reply) => reply,
                Err(e) => {
                    let err = SessionError::from(e);
                    if err.is_peer_closed() {
                        log::warn!("[Client] Server closed the connection");
                    } else {
                        log::error!("[Client] {err}");
                    }
                    return Err(err);
                }
            };
            log::debug!("[Client] Sent: {message}");
            log::debug!("[Client] Received: {}", reply.as_text());
            self.context.exchanges += 1;
        }
        Ok(())
    }

    fn serve_echo(&mut self) -> Result<(), SessionError> {
        loop {
            self.indicator.cue(Cue::IoStarted);
            let received = self.context.transport.receive();
            self.indicator.cue(Cue::IoFinished);
            if let Err(e) = received {
                let err = SessionError::from(e);
                if err.is_peer_closed() {
                    log::warn!("[Server] Client closed the connection");
                } else {
                    log::error!("[Server] {err}");
                }
                return Err(err);
            }

            let peer = self
                .context
                .transport
                .last_peer()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            log::debug!(
                "[Server] Received: {} from {peer}",
                self.context.transport.buffer().as_text()
            );

            self.indicator.cue(Cue::IoStarted);
            let replied = self.context.transport.reply_echo();
            self.indicator.cue(Cue::IoFinished);
            if let Err(e) = replied {
                log::error!("[Server] send failed: {e}");
                return Err(e.into());
            }
            self.context.exchanges += 1;
        }
    }

    fn fail(&mut self) {
        let origin = self
            .context
            .failure_origin
            .map(|p| p.name())
            .unwrap_or("unknown");
        log::error!("[Failure] Called from: {origin}");
        if let Some(err) = &self.context.failure {
            log::error!("[Failure] Cause: {err}");
        }
        log::error!(
            "[Failure] Context: socket_open={} radio_associated={} exit_code={}",
            self.context.socket_open(),
            self.context.radio_associated,
            self.context.exit_code
        );

        self.context.exit_code = -1;

        if self.settings.target == Target::Embedded {
            indicator::blink_failure(
                &mut self.indicator,
                self.settings.blink_half_period,
                self.settings.blink_cycles,
            );
        }
    }

    fn release(&mut self) {
        if self.context.transport.is_open() {
            self.context.transport.close();
            log::info!("[{}] Closed", self.settings.role());
        }

        if self.context.radio_associated {
            if let Err(e) = self.radio.disconnect() {
                log::warn!("Failed to disconnect from WiFi: {e}");
            }
            self.context.radio_associated = false;
        }
    }

    /// Snapshot of the run so far.
    pub fn report(&self) -> RunReport {
        RunReport::new(
            self.run_id,
            self.started_at,
            self.settings.role(),
            self.settings.protocol,
            self.phase,
            &self.context,
            self.history.clone(),
        )
    }
}
