// Path: crates/daemon/src/config.rs

//! The daemon configuration file: a flat record loaded once at startup —
//! no parent-pointer `Config` base, just a plain `serde_json`-deserialized
//! struct passed by reference to whatever needs it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The default maximum number of concurrent client connections.
pub const DEFAULT_MAX_CONNECTIONS: u16 = 10;

/// `Server.*` — the only section every build of the daemon needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Maximum concurrent client connections.
    #[serde(rename = "maxConnectionNum", default = "default_max_connections")]
    pub max_connection_num: u16,
    /// Whether the access-control matrix is enforced.
    #[serde(rename = "keyAccessControl", default)]
    pub key_access_control: bool,
    /// Whether security events are reported on open/save/clear.
    #[serde(rename = "idsmReporting", default)]
    pub idsm_reporting: bool,
}

fn default_max_connections() -> u16 {
    DEFAULT_MAX_CONNECTIONS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connection_num: DEFAULT_MAX_CONNECTIONS,
            key_access_control: false,
            idsm_reporting: false,
        }
    }
}

/// `X.509.*` — present only when the daemon is built/configured to
/// register an X.509 provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct X509Config {
    /// `X.509.storage.root`.
    #[serde(rename = "storage")]
    pub storage: X509StorageConfig,
    /// `X.509.access.*`.
    #[serde(rename = "access")]
    pub access: X509AccessConfig,
}

/// `X.509.storage.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct X509StorageConfig {
    /// Root directory of the X.509 certificate storage tree.
    pub root: PathBuf,
}

/// `X.509.access.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct X509AccessConfig {
    /// Proxy-registered CA connector object id.
    #[serde(rename = "caConnectorId")]
    pub ca_connector_id: u64,
    /// Proxy-registered trustmaster object id.
    #[serde(rename = "trustmasterId")]
    pub trustmaster_id: u64,
}

/// The top-level daemon configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// `Server.*`.
    #[serde(rename = "Server", default)]
    pub server: ServerConfig,
    /// `X.509.*`, absent when X.509 support is not configured — the
    /// handshake's `RegisterX509Provider` then responds `Unsupported`.
    #[serde(rename = "X.509", default)]
    pub x509: Option<X509Config>,
}

impl DaemonConfig {
    /// Parses a daemon configuration document from its JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_section_with_defaults_for_missing_fields() {
        let json = r#"{ "Server": { "maxConnectionNum": 25 } }"#;
        let config = DaemonConfig::from_json(json).unwrap();
        assert_eq!(config.server.max_connection_num, 25);
        assert!(!config.server.key_access_control);
        assert!(config.x509.is_none());
    }

    #[test]
    fn absent_server_section_uses_defaults() {
        let config = DaemonConfig::from_json("{}").unwrap();
        assert_eq!(config.server.max_connection_num, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn parses_x509_section_when_present() {
        let json = r#"{
            "Server": { "maxConnectionNum": 5, "keyAccessControl": true, "idsmReporting": true },
            "X.509": {
                "storage": { "root": "/var/lib/crypto-daemon/x509" },
                "access": { "caConnectorId": 1, "trustmasterId": 2 }
            }
        }"#;
        let config = DaemonConfig::from_json(json).unwrap();
        assert!(config.server.key_access_control);
        let x509 = config.x509.unwrap();
        assert_eq!(x509.access.ca_connector_id, 1);
        assert_eq!(x509.storage.root, PathBuf::from("/var/lib/crypto-daemon/x509"));
    }
}
