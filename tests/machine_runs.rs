//! Full machine runs against scripted radio, sockets and indicator.
//!
//! Every failure point is injected once and the run is checked for the
//! failure origin, the error kind and complete teardown.

use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use tether::core::{Phase, Target, TransitionRule, TransitionTable};
use tether::gate::WaitPolicy;
use tether::indicator::Color;
use tether::machine::{ConnectionStateMachine, Settings, CLIENT_MESSAGES};
use tether::radio::Credentials;
use tether::testing::{RecordingIndicator, RecvStep, ScriptedRadio, ScriptedSockets};
use tether::transport::Protocol;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn server_addr() -> SocketAddr {
    "192.168.1.10:8080".parse().unwrap()
}

fn bounded(mut settings: Settings) -> Settings {
    settings.association_wait = WaitPolicy::Timeout(Duration::from_secs(2));
    settings.address_wait = WaitPolicy::Timeout(Duration::from_secs(2));
    settings.blink_half_period = Duration::ZERO;
    settings
}

fn client(protocol: Protocol) -> Settings {
    bounded(Settings::client(
        Credentials::new("lab", "secret"),
        protocol,
        server_addr(),
    ))
}

fn server(protocol: Protocol) -> Settings {
    bounded(Settings::server(
        Credentials::new("lab", "secret"),
        protocol,
        8080,
    ))
}

type Machine = ConnectionStateMachine<ScriptedRadio, ScriptedSockets, RecordingIndicator>;

fn machine(settings: Settings, radio: ScriptedRadio, sockets: ScriptedSockets) -> Machine {
    ConnectionStateMachine::new(settings, radio, sockets, RecordingIndicator::new())
}

fn failure_path(origin: Phase) -> Vec<Phase> {
    let mut path = Vec::new();
    for phase in [
        Phase::AssociatingRadio,
        Phase::AwaitingAddress,
        Phase::EstablishingTransport,
        Phase::Exchanging,
    ] {
        path.push(phase);
        if phase == origin {
            break;
        }
    }
    path.extend([Phase::Failed, Phase::ReleasingResources, Phase::Terminated]);
    path
}

fn path_of(machine: &Machine) -> Vec<Phase> {
    machine.history().get_path().into_iter().copied().collect()
}

// ---------------------------------------------------------------------------
// Success
// ---------------------------------------------------------------------------

#[test]
fn client_success_walks_every_color() {
    let indicator = RecordingIndicator::new();
    let colors = indicator.log();
    let mut m = ConnectionStateMachine::new(
        client(Protocol::Tcp),
        ScriptedRadio::cooperative(),
        ScriptedSockets::echoing(),
        indicator,
    );

    let report = m.run();
    assert!(report.succeeded());

    let mut expected = vec![
        Color::Off,
        Color::Red,
        Color::Blue,
        Color::Green,
        Color::Yellow,
    ];
    for _ in CLIENT_MESSAGES {
        expected.extend([Color::Green, Color::Yellow, Color::Green, Color::Yellow]);
    }
    expected.push(Color::Off);
    assert_eq!(colors.colors(), expected);
}

#[test]
fn client_success_releases_socket_and_radio() {
    let radio = ScriptedRadio::cooperative();
    let radio_probe = radio.probe();
    let sockets = ScriptedSockets::echoing();
    let socket_probe = sockets.probe();
    let mut m = machine(client(Protocol::Udp), radio, sockets);

    let report = m.run();

    assert_eq!(report.exit_code, 0);
    assert_eq!(report.exchanges, CLIENT_MESSAGES.len() as u64);
    assert_eq!(
        path_of(&m),
        vec![
            Phase::AssociatingRadio,
            Phase::AwaitingAddress,
            Phase::EstablishingTransport,
            Phase::Exchanging,
            Phase::ReleasingResources,
            Phase::Terminated,
        ]
    );
    assert_eq!(socket_probe.connected(), vec![server_addr()]);
    assert_eq!(socket_probe.created(), 1);
    assert_eq!(socket_probe.open_handles(), 0);
    assert_eq!(radio_probe.requests(), vec!["lab".to_string()]);
    assert_eq!(radio_probe.disconnects(), 1);
    assert!(m.context().is_released());
}

#[test]
fn link_status_failure_is_only_logged() {
    let mut m = machine(
        client(Protocol::Tcp),
        ScriptedRadio::cooperative().failing_link_status(),
        ScriptedSockets::echoing(),
    );
    assert!(m.run().succeeded());
}

#[test]
fn failing_disconnect_still_terminates() {
    let mut m = machine(
        client(Protocol::Tcp),
        ScriptedRadio::cooperative().failing_disconnect(-1),
        ScriptedSockets::echoing(),
    );
    let report = m.run();
    assert_eq!(report.final_phase, Phase::Terminated);
    assert_eq!(report.exit_code, 0);
    assert!(!m.context().radio_associated());
}

// ---------------------------------------------------------------------------
// Failure injection, host target
// ---------------------------------------------------------------------------

#[test]
fn radio_init_failure() {
    let radio = ScriptedRadio::cooperative().failing_init(-19);
    let radio_probe = radio.probe();
    let sockets = ScriptedSockets::echoing();
    let socket_probe = sockets.probe();
    let mut m = machine(client(Protocol::Tcp), radio, sockets);

    let report = m.run();

    assert_eq!(report.exit_code, -1);
    assert_eq!(report.failure_origin, Some(Phase::AssociatingRadio));
    assert_eq!(report.failure_kind.as_deref(), Some("RadioInitError"));
    assert_eq!(path_of(&m), failure_path(Phase::AssociatingRadio));
    assert_eq!(radio_probe.disconnects(), 0);
    assert_eq!(socket_probe.created(), 0);
}

#[test]
fn association_request_failure() {
    let mut m = machine(
        client(Protocol::Tcp),
        ScriptedRadio::cooperative().failing_request(-5),
        ScriptedSockets::echoing(),
    );
    let report = m.run();
    assert_eq!(report.failure_kind.as_deref(), Some("RadioAssociationError"));
    assert!(m.context().is_released());
}

#[test]
fn association_status_failure_wakes_waiter() {
    let radio = ScriptedRadio::cooperative().association_status(-113);
    let radio_probe = radio.probe();
    let mut settings = client(Protocol::Tcp);
    settings.association_wait = WaitPolicy::Forever;
    let mut m = machine(settings, radio, ScriptedSockets::echoing());

    let report = m.run();

    assert_eq!(report.failure_origin, Some(Phase::AssociatingRadio));
    assert_eq!(report.failure_kind.as_deref(), Some("RadioAssociationError"));
    assert!(report.failure.unwrap().contains("-113"));
    assert_eq!(radio_probe.disconnects(), 0);
}

#[test]
fn association_timeout() {
    let mut settings = client(Protocol::Tcp);
    settings.association_wait = WaitPolicy::Timeout(Duration::from_millis(20));
    let mut m = machine(
        settings,
        ScriptedRadio::cooperative().silent_association(),
        ScriptedSockets::echoing(),
    );

    let report = m.run();
    assert_eq!(report.failure_origin, Some(Phase::AssociatingRadio));
    assert_eq!(report.exit_code, -1);
    assert!(m.context().is_released());
}

#[test]
fn late_association_is_withdrawn_after_timeout() {
    let radio = ScriptedRadio::cooperative().with_delay(Duration::from_millis(150));
    let radio_probe = radio.probe();
    let mut settings = client(Protocol::Tcp);
    settings.association_wait = WaitPolicy::Timeout(Duration::from_millis(10));
    let mut m = machine(settings, radio, ScriptedSockets::echoing());

    let report = m.run();

    assert_eq!(report.final_phase, Phase::Terminated);
    assert_eq!(report.failure_origin, Some(Phase::AssociatingRadio));
    assert_eq!(report.failure_kind.as_deref(), Some("RadioAssociationError"));
    assert_eq!(radio_probe.requests().len(), 1);
    assert_eq!(radio_probe.disconnects(), 1);
    assert!(!m.context().radio_associated());
}

#[test]
fn cancelled_association_wait_withdraws_request() {
    let radio = ScriptedRadio::cooperative().silent_association();
    let radio_probe = radio.probe();
    let mut settings = client(Protocol::Tcp);
    settings.association_wait = WaitPolicy::Forever;
    let mut m = machine(settings, radio, ScriptedSockets::echoing());
    let monitor = m.monitor();
    let notifier = m.notifier();

    let running = thread::spawn(move || m.run());

    assert!(monitor.wait_for(Phase::AssociatingRadio, Duration::from_secs(2)));
    thread::sleep(Duration::from_millis(50));
    notifier.cancel();
    let report = running.join().unwrap();

    assert_eq!(report.failure_origin, Some(Phase::AssociatingRadio));
    assert_eq!(report.final_phase, Phase::Terminated);
    assert_eq!(radio_probe.disconnects(), 1);
}

#[test]
fn address_timeout_disconnects_radio() {
    let radio = ScriptedRadio::cooperative().silent_address();
    let radio_probe = radio.probe();
    let mut settings = client(Protocol::Tcp);
    settings.address_wait = WaitPolicy::Timeout(Duration::from_millis(20));
    let mut m = machine(settings, radio, ScriptedSockets::echoing());

    let report = m.run();

    assert_eq!(report.failure_origin, Some(Phase::AwaitingAddress));
    assert_eq!(report.failure_kind.as_deref(), Some("AddressAcquisitionError"));
    assert_eq!(path_of(&m), failure_path(Phase::AwaitingAddress));
    assert_eq!(radio_probe.disconnects(), 1);
}

#[test]
fn unbounded_address_wait_parks_until_cancelled() {
    let radio = ScriptedRadio::cooperative().silent_address();
    let radio_probe = radio.probe();
    let mut settings = client(Protocol::Tcp);
    settings.address_wait = WaitPolicy::Forever;
    let mut m = machine(settings, radio, ScriptedSockets::echoing());
    let monitor = m.monitor();
    let notifier = m.notifier();

    let running = thread::spawn(move || m.run());

    assert!(monitor.wait_for(Phase::AwaitingAddress, Duration::from_secs(2)));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(monitor.current(), Phase::AwaitingAddress);

    notifier.cancel();
    let report = running.join().unwrap();

    assert_eq!(report.failure_origin, Some(Phase::AwaitingAddress));
    assert_eq!(report.final_phase, Phase::Terminated);
    assert_eq!(radio_probe.disconnects(), 1);
}

#[test]
fn socket_create_failure() {
    let sockets = ScriptedSockets::echoing().fail_create();
    let mut m = machine(client(Protocol::Udp), ScriptedRadio::cooperative(), sockets);

    let report = m.run();

    assert_eq!(report.failure_origin, Some(Phase::EstablishingTransport));
    assert_eq!(report.failure_kind.as_deref(), Some("SocketCreateError"));
    assert!(m.context().is_released());
}

#[test]
fn socket_connect_failure_closes_half_open_handle() {
    let radio = ScriptedRadio::cooperative();
    let radio_probe = radio.probe();
    let sockets = ScriptedSockets::echoing().fail_connect();
    let socket_probe = sockets.probe();
    let mut m = machine(client(Protocol::Tcp), radio, sockets);

    let report = m.run();

    assert_eq!(report.failure_kind.as_deref(), Some("SocketConnectError"));
    assert_eq!(path_of(&m), failure_path(Phase::EstablishingTransport));
    assert_eq!(socket_probe.created(), 1);
    assert_eq!(socket_probe.open_handles(), 0);
    assert_eq!(radio_probe.disconnects(), 1);
}

#[test]
fn socket_bind_failure() {
    let sockets = ScriptedSockets::echoing().fail_bind();
    let socket_probe = sockets.probe();
    let mut m = machine(server(Protocol::Tcp), ScriptedRadio::cooperative(), sockets);

    let report = m.run();

    assert_eq!(report.failure_origin, Some(Phase::EstablishingTransport));
    assert_eq!(report.failure_kind.as_deref(), Some("SocketBindError"));
    assert_eq!(socket_probe.open_handles(), 0);
}

#[test]
fn send_failure_stops_exchange() {
    let sockets = ScriptedSockets::echoing().fail_send_on(2);
    let socket_probe = sockets.probe();
    let mut m = machine(client(Protocol::Tcp), ScriptedRadio::cooperative(), sockets);

    let report = m.run();

    assert_eq!(report.failure_origin, Some(Phase::Exchanging));
    assert_eq!(report.failure_kind.as_deref(), Some("SendError"));
    assert_eq!(report.exchanges, 2);
    assert_eq!(socket_probe.receives(), 2);
    assert_eq!(socket_probe.open_handles(), 0);
}

#[test]
fn receive_failure() {
    let sockets = ScriptedSockets::with_replies(vec![
        RecvStep::Echo,
        RecvStep::Error(std::io::ErrorKind::ConnectionReset),
    ]);
    let mut m = machine(client(Protocol::Tcp), ScriptedRadio::cooperative(), sockets);

    let report = m.run();

    assert_eq!(report.failure_kind.as_deref(), Some("ReceiveError"));
    assert_eq!(report.exchanges, 1);
    assert!(m.context().is_released());
}

#[test]
fn peer_close_mid_exchange() {
    let sockets = ScriptedSockets::with_replies(vec![RecvStep::Echo, RecvStep::Echo, RecvStep::Closed]);
    let mut m = machine(client(Protocol::Tcp), ScriptedRadio::cooperative(), sockets);

    let report = m.run();

    assert_eq!(report.failure_origin, Some(Phase::Exchanging));
    assert_eq!(report.failure_kind.as_deref(), Some("PeerClosed"));
    assert_eq!(report.exchanges, 2);
    assert_eq!(path_of(&m), failure_path(Phase::Exchanging));
}

#[test]
fn unexpected_phase_is_a_failure() {
    let table = TransitionTable::standard(Target::Host).without(Phase::EstablishingTransport);
    let mut m = machine(
        client(Protocol::Tcp),
        ScriptedRadio::cooperative(),
        ScriptedSockets::echoing(),
    )
    .with_table(table);

    let report = m.run();

    assert_eq!(report.failure_origin, Some(Phase::EstablishingTransport));
    assert_eq!(report.failure_kind.as_deref(), Some("UnexpectedPhase"));
    assert_eq!(report.final_phase, Phase::Terminated);
    assert!(m.context().is_released());
}

#[test]
fn missing_release_rule_still_terminates() {
    let table = TransitionTable::standard(Target::Host).without(Phase::ReleasingResources);
    let radio = ScriptedRadio::cooperative();
    let radio_probe = radio.probe();
    let sockets = ScriptedSockets::with_replies(vec![RecvStep::Echo, RecvStep::Closed]);
    let socket_probe = sockets.probe();
    let mut m = machine(client(Protocol::Tcp), radio, sockets).with_table(table);

    let report = m.run();

    assert_eq!(report.final_phase, Phase::Terminated);
    assert_eq!(report.failure_origin, Some(Phase::Exchanging));
    assert_eq!(report.failure_kind.as_deref(), Some("PeerClosed"));
    assert_eq!(m.history().count(Phase::ReleasingResources, Phase::Terminated), 1);
    assert_eq!(m.history().count(Phase::ReleasingResources, Phase::Failed), 0);
    assert!(m.context().is_released());
    assert_eq!(socket_probe.closed(), 1);
    assert_eq!(radio_probe.disconnects(), 1);
}

#[test]
fn missing_release_rule_on_success_is_unexpected() {
    let table = TransitionTable::standard(Target::Host).without(Phase::ReleasingResources);
    let mut m = machine(
        client(Protocol::Udp),
        ScriptedRadio::cooperative(),
        ScriptedSockets::echoing(),
    )
    .with_table(table);

    let report = m.run();

    assert_eq!(report.final_phase, Phase::Terminated);
    assert_eq!(report.exit_code, -1);
    assert_eq!(report.failure_origin, Some(Phase::ReleasingResources));
    assert_eq!(report.failure_kind.as_deref(), Some("UnexpectedPhase"));
    assert!(m.context().is_released());
}

#[test]
fn missing_failed_rule_on_host_still_releases() {
    let table = TransitionTable::standard(Target::Host).without(Phase::Failed);
    let radio = ScriptedRadio::cooperative();
    let radio_probe = radio.probe();
    let sockets = ScriptedSockets::echoing().fail_send_on(1);
    let socket_probe = sockets.probe();
    let mut m = machine(client(Protocol::Tcp), radio, sockets).with_table(table);

    let report = m.run();

    assert_eq!(report.final_phase, Phase::Terminated);
    assert_eq!(report.exit_code, -1);
    assert_eq!(report.failure_origin, Some(Phase::Exchanging));
    assert_eq!(report.failure_kind.as_deref(), Some("SendError"));
    assert_eq!(m.history().count(Phase::Failed, Phase::Terminated), 1);
    assert!(m.context().is_released());
    assert_eq!(socket_probe.open_handles(), 0);
    assert_eq!(radio_probe.disconnects(), 1);
}

#[test]
fn release_phase_is_idempotent() {
    let table = TransitionTable::standard(Target::Host).with_rule(TransitionRule::new(
        Phase::ReleasingResources,
        Phase::ReleasingResources,
        Phase::ReleasingResources,
    ));
    let radio = ScriptedRadio::cooperative();
    let radio_probe = radio.probe();
    let sockets = ScriptedSockets::echoing();
    let socket_probe = sockets.probe();
    let mut m = machine(client(Protocol::Tcp), radio, sockets).with_table(table);

    while m.phase() != Phase::ReleasingResources {
        m.step();
    }
    assert_eq!(m.step(), Phase::ReleasingResources);
    let after_first = m.report();

    assert_eq!(m.step(), Phase::ReleasingResources);
    let after_second = m.report();

    assert_eq!(radio_probe.disconnects(), 1);
    assert_eq!(socket_probe.closed(), 1);
    assert!(m.context().is_released());
    assert_eq!(after_second.exit_code, after_first.exit_code);
    assert_eq!(after_second.exit_code, 0);
    assert_eq!(after_second.failure_origin, None);
    assert_eq!(after_second.exchanges, after_first.exchanges);
}

#[test]
fn self_looping_release_rule_ends_the_run() {
    let table = TransitionTable::standard(Target::Host).with_rule(TransitionRule::new(
        Phase::ReleasingResources,
        Phase::ReleasingResources,
        Phase::ReleasingResources,
    ));
    let mut m = machine(
        client(Protocol::Tcp),
        ScriptedRadio::cooperative(),
        ScriptedSockets::echoing(),
    )
    .with_table(table);

    let report = m.run();

    assert_eq!(report.final_phase, Phase::Terminated);
    assert_eq!(report.failure_origin, Some(Phase::ReleasingResources));
    assert!(m.context().is_released());
}

// ---------------------------------------------------------------------------
// Server role
// ---------------------------------------------------------------------------

#[test]
fn udp_server_echoes_each_sender_until_error() {
    let a: SocketAddr = "192.168.1.30:5000".parse().unwrap();
    let b: SocketAddr = "192.168.1.31:5001".parse().unwrap();
    let sockets = ScriptedSockets::with_replies(vec![
        RecvStep::datagram("one", a),
        RecvStep::datagram("two", b),
        RecvStep::Error(std::io::ErrorKind::Interrupted),
    ]);
    let socket_probe = sockets.probe();
    let mut m = machine(server(Protocol::Udp), ScriptedRadio::cooperative(), sockets);

    let report = m.run();

    assert_eq!(report.exchanges, 2);
    assert_eq!(report.failure_kind.as_deref(), Some("ReceiveError"));
    assert_eq!(
        socket_probe.sent_to(),
        vec![
            (b"Echo: one".to_vec(), Some(a)),
            (b"Echo: two".to_vec(), Some(b)),
        ]
    );
    assert_eq!(
        socket_probe.bound(),
        vec!["0.0.0.0:8080".parse::<SocketAddr>().unwrap()]
    );
    assert!(m.context().is_released());
}

#[test]
fn tcp_server_ends_when_client_leaves() {
    let sockets = ScriptedSockets::with_replies(vec![RecvStep::data("Hello, Server!")]);
    let socket_probe = sockets.probe();
    let mut m = machine(server(Protocol::Tcp), ScriptedRadio::cooperative(), sockets);

    let report = m.run();

    assert_eq!(report.failure_kind.as_deref(), Some("PeerClosed"));
    assert_eq!(report.exchanges, 1);
    assert_eq!(socket_probe.sent_to(), vec![(b"Echo: Hello, Server!".to_vec(), None)]);
}

// ---------------------------------------------------------------------------
// Embedded target
// ---------------------------------------------------------------------------

#[test]
fn embedded_failure_blinks_and_never_releases() {
    let radio = ScriptedRadio::cooperative();
    let radio_probe = radio.probe();
    let indicator = RecordingIndicator::new();
    let colors = indicator.log();
    let mut settings = client(Protocol::Tcp);
    settings.target = Target::Embedded;
    settings.blink_cycles = Some(3);
    let mut m = ConnectionStateMachine::new(
        settings,
        radio,
        ScriptedSockets::echoing().fail_connect(),
        indicator,
    );

    let report = m.run();

    assert_eq!(report.final_phase, Phase::Failed);
    assert_eq!(report.exit_code, -1);
    assert_eq!(report.failure_origin, Some(Phase::EstablishingTransport));
    assert!(!m.history().visited(Phase::ReleasingResources));
    assert!(!m.history().visited(Phase::Terminated));
    assert!(m.context().radio_associated());
    assert_eq!(radio_probe.disconnects(), 0);

    let shown = colors.colors();
    assert_eq!(
        &shown[shown.len() - 6..],
        &[Color::Red, Color::Off, Color::Red, Color::Off, Color::Red, Color::Off]
    );
}

#[test]
fn report_round_trips_after_failure() {
    let mut m = machine(
        client(Protocol::Tcp),
        ScriptedRadio::cooperative(),
        ScriptedSockets::with_replies(vec![RecvStep::Closed]),
    );
    let report = m.run();

    let json = report.to_json().unwrap();
    let restored = tether::RunReport::from_json(&json).unwrap();
    assert_eq!(restored, report);
    assert_eq!(restored.history.count(Phase::Exchanging, Phase::Failed), 1);
}
