//! Radio driver for the host target.
//!
//! On a workstation the operating system already owns the link, so
//! association is immediate. The connect and address events are still
//! delivered from a separate notification thread, exactly as a real driver
//! would deliver them.

use super::{Credentials, LinkStatus, RadioDriver, RadioError, RadioNotifier};
use crate::discovery;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct HostRadio {
    notifier: Option<RadioNotifier>,
    ssid: String,
    settle: Duration,
    events: Option<JoinHandle<()>>,
}

impl HostRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay between the association request and each delivered event.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    fn notifier(&self) -> Result<&RadioNotifier, RadioError> {
        self.notifier.as_ref().ok_or(RadioError::NotInitialized)
    }

    fn join_events(&mut self) {
        if let Some(events) = self.events.take() {
            if events.join().is_err() {
                log::warn!("host radio: event thread panicked");
            }
        }
    }
}

impl RadioDriver for HostRadio {
    fn initialize(&mut self, notifier: RadioNotifier) -> Result<(), RadioError> {
        self.notifier = Some(notifier);
        Ok(())
    }

    fn request_association(&mut self, credentials: &Credentials) -> Result<(), RadioError> {
        let notifier = self.notifier()?.clone();
        self.join_events();
        self.ssid = credentials.ssid.clone();
        log::info!(
            "host radio: link owned by the OS, treating '{}' as associated",
            credentials.ssid
        );

        let settle = self.settle;
        self.events = Some(thread::spawn(move || {
            thread::sleep(settle);
            notifier.connect_result(0);
            thread::sleep(settle);
            notifier.address_added();
        }));
        Ok(())
    }

    fn link_status(&mut self) -> Result<LinkStatus, RadioError> {
        self.notifier()?;
        let address = discovery::ipv4_interfaces()
            .map_err(|e| {
                log::warn!("host radio: interface lookup failed: {e}");
                RadioError::Driver {
                    op: "iface_status",
                    code: e.raw_os_error().unwrap_or(-1),
                }
            })?
            .into_iter()
            .map(|iface| iface.addr)
            .next();

        Ok(LinkStatus {
            ssid: self.ssid.clone(),
            address,
            ..LinkStatus::default()
        })
    }

    fn disconnect(&mut self) -> Result<(), RadioError> {
        let notifier = self.notifier()?.clone();
        self.join_events();
        notifier.disconnect_result(0);
        Ok(())
    }
}
