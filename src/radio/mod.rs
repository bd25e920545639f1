//! WiFi management layer, consumed as a capability.
//!
//! A [`RadioDriver`] issues requests and returns immediately; the outcome
//! arrives later on the driver's own notification context through the
//! [`RadioNotifier`] it was handed at initialisation. The notifier touches
//! nothing but its gates and its status cell.

pub mod host;

use crate::gate::GateHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

pub use host::HostRadio;

/// Network name and pre-shared key. The key never appears in `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub ssid: String,
    psk: String,
}

impl Credentials {
    pub fn new(ssid: impl Into<String>, psk: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            psk: psk.into(),
        }
    }

    pub fn psk(&self) -> &str {
        &self.psk
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid)
            .field("psk", &"<redacted>")
            .finish()
    }
}

/// Snapshot of the associated link, for the log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatus {
    pub ssid: String,
    pub address: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    pub rssi_dbm: Option<i32>,
    pub channel: Option<u16>,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ssid={}", self.ssid)?;
        if let Some(addr) = self.address {
            write!(f, " ip={addr}")?;
        }
        if let Some(gw) = self.gateway {
            write!(f, " gateway={gw}")?;
        }
        if let Some(rssi) = self.rssi_dbm {
            write!(f, " rssi={rssi}dBm")?;
        }
        if let Some(channel) = self.channel {
            write!(f, " channel={channel}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RadioError {
    #[error("driver request '{op}' failed with code {code}")]
    Driver { op: &'static str, code: i32 },

    #[error("association reported status {0}")]
    Status(i32),

    #[error("radio driver not initialized")]
    NotInitialized,
}

/// The blocking-request half of the WiFi layer.
pub trait RadioDriver {
    /// Register event callbacks. `notifier` is the only channel back to the
    /// machine.
    fn initialize(&mut self, notifier: RadioNotifier) -> Result<(), RadioError>;

    /// Submit an association request. Completion is reported through
    /// [`RadioNotifier::connect_result`].
    fn request_association(&mut self, credentials: &Credentials) -> Result<(), RadioError>;

    /// Current link details. Only used for logging.
    fn link_status(&mut self) -> Result<LinkStatus, RadioError>;

    /// Drop the association.
    fn disconnect(&mut self) -> Result<(), RadioError>;
}

impl<T: RadioDriver + ?Sized> RadioDriver for Box<T> {
    fn initialize(&mut self, notifier: RadioNotifier) -> Result<(), RadioError> {
        (**self).initialize(notifier)
    }

    fn request_association(&mut self, credentials: &Credentials) -> Result<(), RadioError> {
        (**self).request_association(credentials)
    }

    fn link_status(&mut self) -> Result<LinkStatus, RadioError> {
        (**self).link_status()
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        (**self).disconnect()
    }
}

/// Callback-side handle given to the driver.
#[derive(Debug, Clone)]
pub struct RadioNotifier {
    association: GateHandle,
    address: GateHandle,
    connect_status: Arc<AtomicI32>,
}

impl RadioNotifier {
    pub fn new(association: GateHandle, address: GateHandle) -> Self {
        Self {
            association,
            address,
            connect_status: Arc::new(AtomicI32::new(0)),
        }
    }

    /// Connection-result event. `status == 0` means associated.
    ///
    /// A failed status still wakes the waiter, which then reads
    /// [`RadioNotifier::last_connect_status`].
    pub fn connect_result(&self, status: i32) {
        self.connect_status.store(status, Ordering::SeqCst);
        if status == 0 {
            log::info!("radio: associated");
        } else {
            log::warn!("radio: association failed with status {status}");
        }
        self.association.signal();
    }

    /// Disconnect-result event. A successful disconnect drops any retained
    /// association permit.
    pub fn disconnect_result(&self, status: i32) {
        if status == 0 {
            log::info!("radio: disconnected");
            self.association.try_take();
        } else {
            log::warn!("radio: disconnect failed with status {status}");
        }
    }

    /// Address-assigned event.
    pub fn address_added(&self) {
        log::debug!("radio: ipv4 address assigned");
        self.address.signal();
    }

    pub fn last_connect_status(&self) -> i32 {
        self.connect_status.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_connect_status(&self) {
        self.connect_status.store(0, Ordering::SeqCst);
    }

    /// Abort any wait blocked on either gate.
    pub fn cancel(&self) {
        self.association.cancel();
        self.address.cancel();
    }
}
