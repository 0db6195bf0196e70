use crate::error::{Result, RunconfError};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Prefix shared by every dynamic placeholder
pub const MARKER_PREFIX: &str = "HOOK_";
/// Placeholder replaced by the machine's LAN address
pub const IP_MARKER: &str = "HOOK_IP";
/// Placeholder replaced by a free TCP port
pub const PORT_MARKER: &str = "HOOK_PORT";

/// Address used when no interface qualifies
pub const FALLBACK_ADDRESS: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// A resolved environment value
#[derive(Debug, Clone, PartialEq)]
pub enum EnvValue {
    String(String),
    Number(serde_json::Number),
    Bool(bool),
    Absent,
    /// Nested structure kept verbatim as JSON text
    Opaque(String),
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::Opaque(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Absent => Ok(()),
        }
    }
}

/// Inclusive range of ports searched for `HOOK_PORT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// # Errors
    ///
    /// Returns `RunconfError::InvalidPortRange` if `start > end`, or if the
    /// range includes port 0 (binding it yields an arbitrary ephemeral port).
    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start == 0 || start > end {
            return Err(RunconfError::InvalidPortRange {
                range: format!("{start}-{end}"),
            });
        }
        Ok(Self { start, end })
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 10_000,
            end: 30_000,
        }
    }
}

impl FromStr for PortRange {
    type Err = RunconfError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || RunconfError::InvalidPortRange {
            range: s.to_string(),
        };
        let (start, end) = s.split_once('-').ok_or_else(invalid)?;
        let start = start.trim().parse().map_err(|_| invalid())?;
        let end = end.trim().parse().map_err(|_| invalid())?;
        Self::new(start, end).map_err(|_| invalid())
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Ports handed out during this run.
///
/// `reserve_free` holds the lock across probing and insertion, so concurrent
/// resolutions never receive the same port.
#[derive(Debug, Default)]
pub struct PortRegistry {
    issued: Mutex<BTreeSet<u16>>,
}

impl PortRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the first port in `range` that is unissued and currently bindable.
    pub async fn reserve_free(&self, range: PortRange) -> Option<u16> {
        let mut issued = self.issued.lock().await;
        for port in range.iter() {
            if issued.contains(&port) {
                continue;
            }
            if is_port_free(port).await {
                issued.insert(port);
                return Some(port);
            }
        }
        None
    }

    /// Snapshot of every port issued so far, ascending
    pub async fn issued(&self) -> Vec<u16> {
        self.issued.lock().await.iter().copied().collect()
    }
}

async fn is_port_free(port: u16) -> bool {
    match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
        Ok(_listener) => true,
        Err(e) => {
            debug!("Port {port} unavailable: {e}");
            false
        }
    }
}

/// Resolves `HOOK_*` placeholders to concrete values
#[derive(Debug, Default)]
pub struct ValueResolver {
    registry: PortRegistry,
    port_range: PortRange,
    ip_override: Option<Ipv4Addr>,
}

impl ValueResolver {
    #[must_use]
    pub fn new(port_range: PortRange, ip_override: Option<Ipv4Addr>) -> Self {
        Self {
            registry: PortRegistry::new(),
            port_range,
            ip_override,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &PortRegistry {
        &self.registry
    }

    #[must_use]
    pub fn port_range(&self) -> PortRange {
        self.port_range
    }

    /// Returns the concrete value for `token`.
    ///
    /// Tokens without a recognised marker are returned unchanged.
    pub async fn resolve(&self, token: &str) -> EnvValue {
        if !token.starts_with(MARKER_PREFIX) {
            return EnvValue::String(token.to_string());
        }

        if token.starts_with(IP_MARKER) {
            let address = self.local_address();
            debug!("{token} -> {address}");
            return EnvValue::String(address.to_string());
        }

        if let Some(rest) = token.strip_prefix(PORT_MARKER) {
            return match self.registry.reserve_free(self.port_range).await {
                Some(port) => {
                    debug!("{token} -> {port}");
                    EnvValue::Number(port.into())
                }
                None => {
                    let fallback = rest
                        .strip_prefix(':')
                        .or_else(|| rest.strip_prefix('_'))
                        .unwrap_or(rest);
                    warn!(
                        "No free port in {}, using '{fallback}' for {token}",
                        self.port_range
                    );
                    EnvValue::String(fallback.to_string())
                }
            };
        }

        EnvValue::String(token.to_string())
    }

    /// LAN address of this machine, honouring the override if one was given
    #[must_use]
    pub fn local_address(&self) -> Ipv4Addr {
        if let Some(address) = self.ip_override {
            return address;
        }
        select_address(&interface_addresses(), None)
    }
}

/// IPv4 addresses of the local interfaces that can be reached from the LAN
#[must_use]
pub fn interface_addresses() -> Vec<Ipv4Addr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            warn!("Cannot enumerate network interfaces: {e}");
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .filter(|ip| is_candidate(*ip))
        .collect()
}

/// Whether `ip` may be offered as the machine's address
#[must_use]
pub fn is_candidate(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    !(ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || a == 127
        || (a == 198 && b == 18))
}

/// Picks the address to publish from `candidates`.
///
/// `override_address` wins outright. Otherwise candidates are filtered,
/// `192.168.0.*` addresses move to the front (relative order kept), and the
/// first one is taken, falling back to `127.0.0.1`.
#[must_use]
pub fn select_address(candidates: &[Ipv4Addr], override_address: Option<Ipv4Addr>) -> Ipv4Addr {
    if let Some(address) = override_address {
        return address;
    }

    let mut eligible: Vec<Ipv4Addr> = candidates
        .iter()
        .copied()
        .filter(|ip| is_candidate(*ip))
        .collect();
    eligible.sort_by_key(|ip| !matches!(ip.octets(), [192, 168, 0, _]));

    eligible.first().copied().unwrap_or(FALLBACK_ADDRESS)
}
