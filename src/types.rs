use serde::{Deserialize, Serialize};

/// Outcome of probing one port on one address.
///
/// Empty banner/TLS fields are `None` and omitted from JSON.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub port: u16,
    pub open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_cipher: Option<String>,
}

impl ProbeResult {
    /// A closed (or filtered, or unreachable) port.
    pub fn closed(port: u16) -> Self {
        Self {
            port,
            open: false,
            banner: None,
            tls_version: None,
            tls_cipher: None,
        }
    }
}

/// All probe results for one address, ascending by port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostReport {
    pub ip: String,
    pub ports: Vec<ProbeResult>,
}

impl HostReport {
    pub fn open_ports(&self) -> impl Iterator<Item = &ProbeResult> {
        self.ports.iter().filter(|p| p.open)
    }
}

/// One `HostReport` per enumerated address, in enumeration order.
pub type ScanResult = Vec<HostReport>;
