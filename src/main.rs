//! Entry point for `tether`.
//!
//! `tether run` drives the connection state machine on the host target;
//! `tether peer` runs the PC-side echo peer. All protocol work lives in the
//! library; `main.rs` owns only process setup.

use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use tether::config::{Config, Overrides};
use tether::core::Target;
use tether::echo::EchoPeer;
use tether::indicator::LogIndicator;
use tether::machine::ConnectionStateMachine;
use tether::radio::HostRadio;
use tether::transport::{Protocol, Role, StdSockets, DEFAULT_PORT};

/// WiFi association and socket echo demo with guaranteed teardown.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the connection state machine once.
    Run {
        /// TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// client or server.
        #[arg(long)]
        role: Option<Role>,

        /// tcp or udp.
        #[arg(long)]
        protocol: Option<Protocol>,

        /// Server IPv4 address (client role).
        #[arg(short, long)]
        server: Option<IpAddr>,

        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long)]
        ssid: Option<String>,

        #[arg(long)]
        psk: Option<String>,

        /// host or embedded.
        #[arg(long)]
        target: Option<Target>,

        /// Print the run report as JSON when done.
        #[arg(long)]
        report: bool,
    },
    /// Run the PC-side echo peer.
    Peer {
        /// tcp or udp.
        #[arg(long, default_value = "tcp")]
        protocol: Protocol,

        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Accept further stream clients after the first disconnects.
        #[arg(long)]
        keep_serving: bool,
    },
}

fn main() {
    tether::logging::init();

    let cli = Cli::parse();

    let code = match cli.command {
        Command::Run {
            config,
            role,
            protocol,
            server,
            port,
            ssid,
            psk,
            target,
            report,
        } => {
            let overrides = Overrides {
                ssid,
                psk,
                role,
                protocol,
                server_ip: server,
                port,
                target,
            };
            run(config, overrides, report)
        }
        Command::Peer {
            protocol,
            port,
            keep_serving,
        } => peer(protocol, port, keep_serving),
    };

    std::process::exit(code);
}

fn run(path: Option<PathBuf>, overrides: Overrides, print_report: bool) -> i32 {
    let config = match path {
        Some(path) => match Config::load(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("failed to load config from {}: {e}", path.display());
                return 1;
            }
        },
        None => Config::default(),
    };

    let settings = match config.apply(overrides).to_settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };

    let mut machine = ConnectionStateMachine::new(
        settings,
        HostRadio::new(),
        StdSockets::new(),
        LogIndicator::new(),
    );
    let report = machine.run();

    if print_report {
        match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => log::error!("failed to render report: {e}"),
        }
    }

    report.exit_code
}

fn peer(protocol: Protocol, port: u16, keep_serving: bool) -> i32 {
    let mut peer = match EchoPeer::bind(protocol, port) {
        Ok(p) => p.keep_serving(keep_serving),
        Err(e) => {
            log::error!("[Server] {e}");
            return 1;
        }
    };

    match peer.serve(None) {
        Ok(served) => {
            log::info!("[Server] Echoed {served} message(s)");
            0
        }
        Err(e) => {
            log::error!("[Server] {e}");
            1
        }
    }
}
