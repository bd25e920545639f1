//! Local IPv4 interface enumeration.
//!
//! Servers advertise where they can be reached at startup. This is a log
//! line for humans, not part of the wire contract.

use nix::net::if_::InterfaceFlags;
use std::net::Ipv4Addr;

/// A non-loopback interface carrying an IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Interface {
    /// OS interface name (e.g. "eth0", "wlan0").
    pub name: String,
    pub addr: Ipv4Addr,
}

/// Every non-loopback IPv4 address bound to a local interface, in the order
/// the OS reports them.
pub fn ipv4_interfaces() -> std::io::Result<Vec<Ipv4Interface>> {
    let addrs = nix::ifaddrs::getifaddrs().map_err(std::io::Error::other)?;

    let mut found = Vec::new();
    for ifaddr in addrs {
        if ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK) {
            continue;
        }
        let Some(sin) = ifaddr.address.as_ref().and_then(|a| a.as_sockaddr_in()) else {
            continue;
        };
        let addr = Ipv4Addr::from(sin.ip());
        if addr.is_loopback() {
            continue;
        }
        found.push(Ipv4Interface {
            name: ifaddr.interface_name.clone(),
            addr,
        });
    }
    Ok(found)
}

/// Log every reachable address for `port`. Returns what was logged.
pub fn advertise(role: &str, port: u16) -> Vec<Ipv4Interface> {
    match ipv4_interfaces() {
        Ok(ifaces) if !ifaces.is_empty() => {
            log::info!("[{role}] Listening on port {port}, reachable at:");
            for iface in &ifaces {
                log::info!("[{role}]   {}  (iface: {})", iface.addr, iface.name);
            }
            ifaces
        }
        Ok(_) => {
            log::info!("[{role}] Listening on port {port}...");
            Vec::new()
        }
        Err(e) => {
            log::warn!("[{role}] interface lookup failed: {e}");
            log::info!("[{role}] Listening on port {port}...");
            Vec::new()
        }
    }
}
