//! TOML configuration.
//!
//! Every section is optional and defaulted. Validation runs over the whole
//! file at once and reports every problem it finds, not just the first.
//!
//! ```toml
//! [radio]
//! ssid = "lab"
//! psk = "secret"
//! association_timeout_ms = 10000
//!
//! [transport]
//! role = "client"
//! protocol = "udp"
//! server_ip = "192.168.1.10"
//! port = 8080
//!
//! [indicator]
//! target = "host"
//! blink_period_ms = 1000
//! ```

use crate::core::Target;
use crate::gate::WaitPolicy;
use crate::machine::{Endpoint, Settings};
use crate::radio::Credentials;
use crate::transport::{Protocol, Role, DEFAULT_PORT};
use serde::Deserialize;
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;
use thiserror::Error;

/// One reason a configuration cannot be run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigViolation {
    #[error("radio.ssid must not be empty")]
    EmptySsid,

    #[error("transport.server_ip is required for the client role")]
    MissingServerIp,

    #[error("transport.port must be non-zero for the client role")]
    ZeroClientPort,

    #[error("{field} must be greater than zero when set")]
    ZeroTimeout { field: &'static str },

    #[error("indicator.blink_period_ms must be greater than zero")]
    ZeroBlinkPeriod,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {}", Violations(.0))]
    Invalid(Vec<ConfigViolation>),
}

struct Violations<'a>(&'a [ConfigViolation]);

impl fmt::Display for Violations<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub radio: RadioSection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub indicator: IndicatorSection,
}

/// The `[radio]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RadioSection {
    #[serde(default)]
    pub ssid: String,
    #[serde(default)]
    pub psk: String,
    /// Absent means wait forever.
    pub association_timeout_ms: Option<u64>,
    /// Absent means wait forever.
    pub address_timeout_ms: Option<u64>,
}

/// The `[transport]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportSection {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub protocol: Protocol,
    pub server_ip: Option<IpAddr>,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            role: Role::default(),
            protocol: Protocol::default(),
            server_ip: None,
            port: default_port(),
        }
    }
}

/// The `[indicator]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndicatorSection {
    #[serde(default)]
    pub target: Target,
    /// Half-period of the failure blink.
    #[serde(default = "default_blink_period")]
    pub blink_period_ms: u64,
    /// Embedded only. Absent blinks forever.
    pub blink_cycles: Option<u32>,
}

fn default_blink_period() -> u64 {
    1000
}

impl Default for IndicatorSection {
    fn default() -> Self {
        Self {
            target: Target::default(),
            blink_period_ms: default_blink_period(),
            blink_cycles: None,
        }
    }
}

/// Values given on the command line. `Some` wins over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub ssid: Option<String>,
    pub psk: Option<String>,
    pub role: Option<Role>,
    pub protocol: Option<Protocol>,
    pub server_ip: Option<IpAddr>,
    pub port: Option<u16>,
    pub target: Option<Target>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(ssid) = overrides.ssid {
            self.radio.ssid = ssid;
        }
        if let Some(psk) = overrides.psk {
            self.radio.psk = psk;
        }
        if let Some(role) = overrides.role {
            self.transport.role = role;
        }
        if let Some(protocol) = overrides.protocol {
            self.transport.protocol = protocol;
        }
        if overrides.server_ip.is_some() {
            self.transport.server_ip = overrides.server_ip;
        }
        if let Some(port) = overrides.port {
            self.transport.port = port;
        }
        if let Some(target) = overrides.target {
            self.indicator.target = target;
        }
        self
    }

    /// Check every rule, accumulating all violations.
    pub fn validate(&self) -> Validation<(), NonEmptyVec<ConfigViolation>> {
        let client = self.transport.role == Role::Client;

        let checks = vec![
            check(!self.radio.ssid.is_empty(), ConfigViolation::EmptySsid),
            check(
                !client || self.transport.server_ip.is_some(),
                ConfigViolation::MissingServerIp,
            ),
            check(
                !client || self.transport.port != 0,
                ConfigViolation::ZeroClientPort,
            ),
            check(
                self.radio.association_timeout_ms != Some(0),
                ConfigViolation::ZeroTimeout {
                    field: "radio.association_timeout_ms",
                },
            ),
            check(
                self.radio.address_timeout_ms != Some(0),
                ConfigViolation::ZeroTimeout {
                    field: "radio.address_timeout_ms",
                },
            ),
            check(
                self.indicator.blink_period_ms != 0,
                ConfigViolation::ZeroBlinkPeriod,
            ),
        ];

        Validation::all_vec(checks).map(|_| ())
    }

    /// Validate and turn the file into machine settings.
    pub fn to_settings(&self) -> Result<Settings, ConfigError> {
        if let Validation::Failure(violations) = self.validate() {
            return Err(ConfigError::Invalid(violations.iter().cloned().collect()));
        }

        let endpoint = match (self.transport.role, self.transport.server_ip) {
            (Role::Client, Some(ip)) => Endpoint::Connect(SocketAddr::new(ip, self.transport.port)),
            (Role::Client, None) => {
                return Err(ConfigError::Invalid(vec![ConfigViolation::MissingServerIp]))
            }
            (Role::Server, _) => Endpoint::Bind(self.transport.port),
        };

        Ok(Settings {
            credentials: Credentials::new(self.radio.ssid.clone(), self.radio.psk.clone()),
            protocol: self.transport.protocol,
            endpoint,
            association_wait: WaitPolicy::from_millis(self.radio.association_timeout_ms),
            address_wait: WaitPolicy::from_millis(self.radio.address_timeout_ms),
            target: self.indicator.target,
            blink_half_period: Duration::from_millis(self.indicator.blink_period_ms),
            blink_cycles: self.indicator.blink_cycles,
        })
    }
}

fn check(ok: bool, violation: ConfigViolation) -> Validation<(), NonEmptyVec<ConfigViolation>> {
    if ok {
        Validation::success(())
    } else {
        Validation::fail(violation)
    }
}
