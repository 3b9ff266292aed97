//! Configuration management for the device and gateway emulators
//!
//! This module handles loading, parsing, and validating the device list
//! and the gateway settings. Everything here runs before any socket exists;
//! a failure is always fatal.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::protocols::semtech::{GatewayId, IdFit, HEADER_SIZE};
use crate::security::IvMode;
use crate::utils::{bytes_to_hex, hex_to_array};

/// Environment prefix for gateway overrides, e.g. `LORA_GATEWAY__TTN_PORT=1700`
pub const GATEWAY_ENV_PREFIX: &str = "LORA_GATEWAY";

/// Largest UDP payload an IPv4 datagram can carry
pub const MAX_UDP_PAYLOAD: usize = 65507;

/// Largest device datagram the relay accepts; the frame must still fit in one UDP datagram
pub const MAX_DATAGRAM_SIZE: usize = MAX_UDP_PAYLOAD - HEADER_SIZE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to load {path}: {source}")]
    Source {
        path: PathBuf,
        #[source]
        source: ::config::ConfigError,
    },

    #[error("Invalid device {index}: {reason}")]
    InvalidDevice { index: usize, reason: String },

    #[error("Invalid gateway setting '{field}': {reason}")]
    InvalidGateway { field: &'static str, reason: String },

    #[error("Device list is empty")]
    NoDevices,
}

/// Device activation mode (recorded only; no join procedure is run)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationMode {
    #[serde(rename = "OTAA")]
    Otaa,

    #[serde(rename = "ABP")]
    Abp,
}

impl fmt::Display for ActivationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationMode::Otaa => write!(f, "OTAA"),
            ActivationMode::Abp => write!(f, "ABP"),
        }
    }
}

/// One entry of the device config file, as written on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    #[serde(rename = "devEUI")]
    pub dev_eui: String,

    #[serde(rename = "appEUI")]
    pub app_eui: String,

    #[serde(rename = "appKey")]
    pub app_key: String,

    pub mode: ActivationMode,

    pub gateway_ip: String,

    pub gateway_port: u16,

    /// Reuse an all-zero IV for every message instead of a random one
    #[serde(default)]
    pub fixed_iv: bool,
}

/// Validated device settings
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub dev_eui: [u8; 8],
    pub app_eui: [u8; 8],
    pub app_key: [u8; 16],
    pub mode: ActivationMode,
    pub gateway_endpoint: SocketAddr,
    pub iv_mode: IvMode,
}

// AppKey stays out of Debug output
impl fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("dev_eui", &bytes_to_hex(&self.dev_eui))
            .field("app_eui", &bytes_to_hex(&self.app_eui))
            .field("mode", &self.mode)
            .field("gateway_endpoint", &self.gateway_endpoint)
            .field("iv_mode", &self.iv_mode)
            .finish()
    }
}

impl DeviceEntry {
    /// Validate the entry at position `index` into a record
    pub fn validate(&self, index: usize) -> Result<DeviceRecord, ConfigError> {
        let invalid = |field: &str, reason: String| ConfigError::InvalidDevice {
            index,
            reason: format!("{}: {}", field, reason),
        };

        let dev_eui = hex_to_array::<8>(&self.dev_eui).map_err(|e| invalid("devEUI", e))?;
        let app_eui = hex_to_array::<8>(&self.app_eui).map_err(|e| invalid("appEUI", e))?;
        let app_key = hex_to_array::<16>(&self.app_key).map_err(|e| invalid("appKey", e))?;

        let ip: Ipv4Addr = self.gateway_ip.parse()
            .map_err(|_| invalid("gateway_ip", format!("'{}' is not an IPv4 address", self.gateway_ip)))?;

        if self.gateway_port == 0 {
            return Err(invalid("gateway_port", "must be non-zero".to_string()));
        }

        Ok(DeviceRecord {
            dev_eui,
            app_eui,
            app_key,
            mode: self.mode,
            gateway_endpoint: SocketAddr::from((ip, self.gateway_port)),
            iv_mode: IvMode::from_fixed_flag(self.fixed_iv),
        })
    }
}

/// Parse and validate a JSON array of device entries
pub fn parse_devices(json: &str) -> Result<Vec<DeviceRecord>, ConfigError> {
    parse_devices_from(Path::new("<inline>"), json)
}

fn parse_devices_from(path: &Path, json: &str) -> Result<Vec<DeviceRecord>, ConfigError> {
    // Parse entries one at a time so errors can name the offending index
    let entries: Vec<serde_json::Value> = serde_json::from_str(json)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

    if entries.is_empty() {
        return Err(ConfigError::NoDevices);
    }

    entries.into_iter()
        .enumerate()
        .map(|(index, value)| {
            let entry: DeviceEntry = serde_json::from_value(value)
                .map_err(|e| ConfigError::InvalidDevice { index, reason: e.to_string() })?;
            entry.validate(index)
        })
        .collect()
}

/// Load the device list from a JSON file
pub fn load_devices<P: AsRef<Path>>(path: P) -> Result<Vec<DeviceRecord>, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

    let devices = parse_devices_from(path, &json)?;
    info!("Loaded {} device(s) from {}", devices.len(), path.display());
    Ok(devices)
}

/// Gateway config file, as written on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway identifier, fitted to 8 bytes
    pub gateway_id: String,

    /// UDP port the relay listens on for device datagrams
    pub gateway_port: u16,

    /// Network server address
    pub ttn_ip: String,

    /// Network server port
    pub ttn_port: u16,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Largest device datagram relayed, at most `MAX_DATAGRAM_SIZE`; longer ones are dropped
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_datagram_size() -> usize {
    2048
}

/// Validated gateway settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRecord {
    pub gateway_id: GatewayId,
    pub listen_port: u16,
    pub server_endpoint: SocketAddr,
    pub max_datagram_size: usize,
}

impl GatewayConfig {
    /// Load gateway configuration from a JSON file, with environment overrides
    ///
    /// The file itself is parsed strictly: a value of the wrong JSON type is
    /// an error. Only the `LORA_GATEWAY__*` environment layer is coerced from
    /// strings. No semantic validation happens here; see [`validate`](Self::validate).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        let file_config: GatewayConfig = serde_json::from_str(&json)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

        let source_err = |source| ConfigError::Source { path: path.to_path_buf(), source };

        let settings = ::config::Config::builder()
            .add_source(::config::Config::try_from(&file_config).map_err(source_err)?)
            .add_source(::config::Environment::with_prefix(GATEWAY_ENV_PREFIX).separator("__"))
            .build()
            .map_err(source_err)?;

        settings.try_deserialize().map_err(source_err)
    }

    /// Validate the configuration into a gateway record
    pub fn validate(&self) -> Result<GatewayRecord, ConfigError> {
        if self.gateway_id.is_empty() {
            return Err(ConfigError::InvalidGateway {
                field: "gateway_id",
                reason: "must not be empty".to_string(),
            });
        }

        let (gateway_id, fit) = GatewayId::from_config_str(&self.gateway_id);
        if let IdFit::Truncated(dropped) = fit {
            warn!("gateway_id '{}' is longer than 8 bytes, dropping the last {}", self.gateway_id, dropped);
        }

        if self.gateway_port == 0 {
            return Err(ConfigError::InvalidGateway {
                field: "gateway_port",
                reason: "must be non-zero".to_string(),
            });
        }

        let ip: Ipv4Addr = self.ttn_ip.parse()
            .map_err(|_| ConfigError::InvalidGateway {
                field: "ttn_ip",
                reason: format!("'{}' is not an IPv4 address", self.ttn_ip),
            })?;

        if self.ttn_port == 0 {
            return Err(ConfigError::InvalidGateway {
                field: "ttn_port",
                reason: "must be non-zero".to_string(),
            });
        }

        if self.max_datagram_size == 0 || self.max_datagram_size > MAX_DATAGRAM_SIZE {
            return Err(ConfigError::InvalidGateway {
                field: "max_datagram_size",
                reason: format!("{} is outside 1..={}", self.max_datagram_size, MAX_DATAGRAM_SIZE),
            });
        }

        Ok(GatewayRecord {
            gateway_id,
            listen_port: self.gateway_port,
            server_endpoint: SocketAddr::from((ip, self.ttn_port)),
            max_datagram_size: self.max_datagram_size,
        })
    }

    /// Get log level from configuration
    pub fn get_log_level(&self) -> log::LevelFilter {
        match self.log_level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info, // Default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const DEVICES: &str = r#"[
        {
            "devEUI": "70B3D57ED0000001",
            "appEUI": "0000000000000001",
            "appKey": "000102030405060708090a0b0c0d0e0f",
            "mode": "OTAA",
            "gateway_ip": "127.0.0.1",
            "gateway_port": 1700
        },
        {
            "devEUI": "70B3D57ED0000002",
            "appEUI": "0000000000000001",
            "appKey": "0f0e0d0c0b0a09080706050403020100",
            "mode": "ABP",
            "gateway_ip": "10.0.0.2",
            "gateway_port": 1701,
            "fixed_iv": true
        }
    ]"#;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_devices() {
        let devices = parse_devices(DEVICES).unwrap();
        assert_eq!(devices.len(), 2);

        let first = &devices[0];
        assert_eq!(first.dev_eui, [0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0x00, 0x00, 0x01]);
        assert_eq!(first.app_key[15], 0x0f);
        assert_eq!(first.mode, ActivationMode::Otaa);
        assert_eq!(first.gateway_endpoint, "127.0.0.1:1700".parse().unwrap());
        assert_eq!(first.iv_mode, IvMode::Random);

        assert_eq!(devices[1].mode, ActivationMode::Abp);
        assert_eq!(devices[1].iv_mode, IvMode::FixedZero);
    }

    #[test]
    fn test_missing_app_key() {
        let json = r#"[{
            "devEUI": "70B3D57ED0000001",
            "appEUI": "0000000000000001",
            "mode": "OTAA",
            "gateway_ip": "127.0.0.1",
            "gateway_port": 1700
        }]"#;

        match parse_devices(json) {
            Err(ConfigError::InvalidDevice { index, reason }) => {
                assert_eq!(index, 0);
                assert!(reason.contains("appKey"), "{}", reason);
            }
            other => panic!("expected InvalidDevice, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_types_and_lengths() {
        let wrong_port_type = DEVICES.replacen("1700", "\"1700\"", 1);
        assert!(matches!(parse_devices(&wrong_port_type), Err(ConfigError::InvalidDevice { index: 0, .. })));

        let short_key = DEVICES.replacen("000102030405060708090a0b0c0d0e0f", "00010203", 1);
        assert!(matches!(parse_devices(&short_key), Err(ConfigError::InvalidDevice { index: 0, .. })));

        let bad_eui = DEVICES.replacen("70B3D57ED0000002", "70B3D57ED00000ZZ", 1);
        assert!(matches!(parse_devices(&bad_eui), Err(ConfigError::InvalidDevice { index: 1, .. })));

        let bad_mode = DEVICES.replacen("\"ABP\"", "\"LORA\"", 1);
        assert!(matches!(parse_devices(&bad_mode), Err(ConfigError::InvalidDevice { index: 1, .. })));

        let bad_ip = DEVICES.replacen("10.0.0.2", "gateway.local", 1);
        assert!(matches!(parse_devices(&bad_ip), Err(ConfigError::InvalidDevice { index: 1, .. })));

        let zero_port = DEVICES.replacen("1701", "0", 1);
        assert!(matches!(parse_devices(&zero_port), Err(ConfigError::InvalidDevice { index: 1, .. })));
    }

    #[test]
    fn test_not_an_array() {
        assert!(matches!(parse_devices("{}"), Err(ConfigError::Parse { .. })));
        assert!(matches!(parse_devices("not json"), Err(ConfigError::Parse { .. })));
        assert!(matches!(parse_devices("[]"), Err(ConfigError::NoDevices)));
    }

    #[test]
    fn test_load_devices_from_file() {
        let file = write_temp(DEVICES);
        let devices = load_devices(file.path()).unwrap();
        assert_eq!(devices.len(), 2);

        let missing = load_devices("/nonexistent/devices.json");
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_debug_hides_app_key() {
        let devices = parse_devices(DEVICES).unwrap();
        let text = format!("{:?}", devices[0]);
        assert!(text.contains("70b3d57ed0000001"));
        assert!(!text.contains("000102030405060708090a0b0c0d0e0f"));
    }

    #[test]
    fn test_gateway_config() {
        let file = write_temp(r#"{
            "gateway_id": "ABCDEFGH",
            "gateway_port": 1700,
            "ttn_ip": "127.0.0.1",
            "ttn_port": 1800
        }"#);

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.get_log_level(), log::LevelFilter::Info);

        let record = config.validate().unwrap();
        assert_eq!(record.gateway_id.as_bytes(), b"ABCDEFGH");
        assert_eq!(record.listen_port, 1700);
        assert_eq!(record.server_endpoint, "127.0.0.1:1800".parse().unwrap());
        assert_eq!(record.max_datagram_size, 2048);
    }

    #[test]
    fn test_gateway_config_missing_field() {
        let file = write_temp(r#"{ "gateway_id": "GW", "gateway_port": 1700, "ttn_ip": "127.0.0.1" }"#);
        assert!(matches!(GatewayConfig::from_file(file.path()), Err(ConfigError::Parse { .. })));

        assert!(matches!(GatewayConfig::from_file("/nonexistent/gateway.json"), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_gateway_config_rejects_wrong_json_types() {
        let cases = [
            r#"{ "gateway_id": 12345678, "gateway_port": 1700, "ttn_ip": "127.0.0.1", "ttn_port": 1800 }"#,
            r#"{ "gateway_id": "GW01", "gateway_port": true, "ttn_ip": "127.0.0.1", "ttn_port": 1800 }"#,
            r#"{ "gateway_id": "GW01", "gateway_port": 1700, "ttn_ip": "127.0.0.1", "ttn_port": 1800.7 }"#,
            r#"{ "gateway_id": "GW01", "gateway_port": "1700", "ttn_ip": "127.0.0.1", "ttn_port": 1800 }"#,
            r#"{ "gateway_id": "GW01", "gateway_port": 1700, "ttn_ip": 2130706433, "ttn_port": 1800 }"#,
            r#"{ "gateway_id": "GW01", "gateway_port": 70000, "ttn_ip": "127.0.0.1", "ttn_port": 1800 }"#,
        ];

        for json in cases {
            let file = write_temp(json);
            match GatewayConfig::from_file(file.path()) {
                Err(ConfigError::Parse { .. }) => {}
                other => panic!("expected Parse error for {}, got {:?}", json, other),
            }
        }
    }

    #[test]
    fn test_gateway_file_load_does_not_validate() {
        // Validation runs after logging is set up, so its warnings are visible
        let file = write_temp(r#"{
            "gateway_id": "GATEWAY-0001",
            "gateway_port": 1700,
            "ttn_ip": "not-an-ip",
            "ttn_port": 1800,
            "log_level": "warn"
        }"#);

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.get_log_level(), log::LevelFilter::Warn);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidGateway { field: "ttn_ip", .. })));
    }

    fn gateway_config() -> GatewayConfig {
        GatewayConfig {
            gateway_id: "GW01".to_string(),
            gateway_port: 1700,
            ttn_ip: "127.0.0.1".to_string(),
            ttn_port: 1800,
            log_level: "DEBUG".to_string(),
            max_datagram_size: 1024,
        }
    }

    #[test]
    fn test_gateway_validation() {
        let config = gateway_config();
        assert_eq!(config.get_log_level(), log::LevelFilter::Debug);
        assert_eq!(config.validate().unwrap().gateway_id.as_bytes(), b"GW01\0\0\0\0");

        let mut long_id = gateway_config();
        long_id.gateway_id = "GATEWAY-0001".to_string();
        assert_eq!(long_id.validate().unwrap().gateway_id.as_bytes(), b"GATEWAY-");

        let mut empty_id = gateway_config();
        empty_id.gateway_id.clear();
        assert!(matches!(empty_id.validate(), Err(ConfigError::InvalidGateway { field: "gateway_id", .. })));

        let mut bad_ip = gateway_config();
        bad_ip.ttn_ip = "::1".to_string();
        assert!(matches!(bad_ip.validate(), Err(ConfigError::InvalidGateway { field: "ttn_ip", .. })));

        let mut zero_port = gateway_config();
        zero_port.gateway_port = 0;
        assert!(matches!(zero_port.validate(), Err(ConfigError::InvalidGateway { field: "gateway_port", .. })));

        let mut no_buffer = gateway_config();
        no_buffer.max_datagram_size = 0;
        assert!(matches!(no_buffer.validate(), Err(ConfigError::InvalidGateway { field: "max_datagram_size", .. })));

        let mut largest = gateway_config();
        largest.max_datagram_size = MAX_DATAGRAM_SIZE;
        assert_eq!(largest.validate().unwrap().max_datagram_size, 65494);

        // One more byte and the frame no longer fits in a UDP datagram
        let mut oversized = gateway_config();
        oversized.max_datagram_size = MAX_DATAGRAM_SIZE + 1;
        assert!(matches!(oversized.validate(), Err(ConfigError::InvalidGateway { field: "max_datagram_size", .. })));
    }
}
