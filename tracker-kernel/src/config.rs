use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

pub const CONFIG_PATH_VAR: &str = "TRACKER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "tracker.yaml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TrackerConfig {
    #[serde(default)]
    pub serial: SerialSettings,
    #[serde(default)]
    pub decoder: DecoderConf,
    #[serde(default)]
    pub http: HttpConf,
    #[serde(default)]
    pub display: DisplayConf,
    #[serde(default)]
    pub health: HealthConf,
}

/// `port` and `baud_rate` have no usable default; `validate` rejects them when unset.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SerialSettings {
    #[serde(default)]
    pub port: String, // ex: "/dev/ttyUSB0", "COM3"
    #[serde(default)]
    pub baud_rate: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DecoderConf {
    /// Treat a document without `lastMessageTimes` as an error instead of skipping it.
    #[serde(default)]
    pub strict_schema: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConf {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DisplayConf {
    #[serde(default)]
    pub console_table: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthConf {
    /// 0 turns the periodic summary off.
    #[serde(default = "default_health_interval")]
    pub log_interval_secs: u64,
}

fn default_poll_interval_ms() -> u64 { 100 }
fn default_read_timeout_ms() -> u64 { 1000 }
fn default_max_frame_bytes() -> usize { 64 * 1024 }
fn default_true() -> bool { true }
fn default_bind() -> String { "0.0.0.0:8080".into() }
fn default_health_interval() -> u64 { 30 }

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 0,
            poll_interval_ms: default_poll_interval_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { enabled: true, bind: default_bind(), api_key: None }
    }
}

impl Default for HealthConf {
    fn default() -> Self {
        Self { log_interval_secs: default_health_interval() }
    }
}

impl SerialSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl HttpConf {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            key: "http.bind",
            reason: e.to_string(),
        })
    }
}

impl TrackerConfig {
    pub fn from_yaml_str(txt: &str) -> Result<Self, ConfigError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(txt)?)
    }

    /// `TRACKER_SERIAL_PORT` / `TRACKER_BAUD_RATE` win over the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("TRACKER_SERIAL_PORT").filter(|p| !p.trim().is_empty()) {
            self.serial.port = port;
        }
        if let Some(baud) = lookup("TRACKER_BAUD_RATE") {
            self.serial.baud_rate = baud.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid { key: "serial.baud_rate", reason: e.to_string() }
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::Missing("serial.port"));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Missing("serial.baud_rate"));
        }
        if self.serial.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "serial.poll_interval_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.serial.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "serial.max_frame_bytes",
                reason: "must be greater than zero".into(),
            });
        }
        if self.http.enabled {
            self.http.bind_addr()?;
        }
        Ok(())
    }
}

/// Reads the file (if any), applies env overrides, validates.
pub async fn load_config_from(path: &Path) -> Result<TrackerConfig, ConfigError> {
    let mut cfg = if path.exists() {
        let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), "configuration loaded");
        TrackerConfig::from_yaml_str(&txt)?
    } else {
        warn!(path = %path.display(), "no config file, relying on defaults and environment");
        TrackerConfig::default()
    };

    cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

pub async fn load_config() -> Result<TrackerConfig, ConfigError> {
    let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    load_config_from(Path::new(&path)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const FULL: &str = r#"
serial:
  port: /dev/ttyUSB0
  baud_rate: 115200
  poll_interval_ms: 50
decoder:
  strict_schema: true
http:
  bind: 127.0.0.1:9000
  api_key: secret
display:
  console_table: true
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_full_config() {
        let cfg = TrackerConfig::from_yaml_str(FULL).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.serial.port, "/dev/ttyUSB0");
        assert_eq!(cfg.serial.baud_rate, 115200);
        assert_eq!(cfg.serial.poll_interval(), Duration::from_millis(50));
        assert_eq!(cfg.serial.read_timeout(), Duration::from_millis(1000));
        assert!(cfg.decoder.strict_schema);
        assert_eq!(cfg.http.bind_addr().unwrap().port(), 9000);
        assert_eq!(cfg.http.api_key.as_deref(), Some("secret"));
        assert!(cfg.display.console_table);
        assert_eq!(cfg.health.log_interval_secs, 30);
    }

    #[test]
    fn test_defaults_for_optional_settings() {
        let cfg = TrackerConfig::from_yaml_str("serial:\n  port: COM3\n  baud_rate: 9600\n").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.serial.poll_interval_ms, 100);
        assert_eq!(cfg.serial.read_timeout_ms, 1000);
        assert!(!cfg.decoder.strict_schema);
        assert!(cfg.http.enabled);
        assert!(!cfg.display.console_table);
    }

    #[test]
    fn test_port_and_baud_rate_are_required() {
        let cfg = TrackerConfig::from_yaml_str("serial:\n  baud_rate: 9600\n").unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Missing("serial.port"))));

        let cfg = TrackerConfig::from_yaml_str("serial:\n  port: COM3\n").unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Missing("serial.baud_rate"))));

        let cfg = TrackerConfig::from_yaml_str("").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let cfg = TrackerConfig::from_yaml_str(
            "serial:\n  port: COM3\n  baud_rate: 9600\n  poll_interval_ms: 0\n",
        )
        .unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { key: "serial.poll_interval_ms", .. })
        ));
    }

    #[test]
    fn test_bad_bind_rejected() {
        let cfg = TrackerConfig::from_yaml_str(
            "serial:\n  port: COM3\n  baud_rate: 9600\nhttp:\n  bind: not-an-address\n",
        )
        .unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid { key: "http.bind", .. })));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            [("TRACKER_SERIAL_PORT", "/dev/ttyACM1"), ("TRACKER_BAUD_RATE", "57600")].into();
        let mut cfg = TrackerConfig::from_yaml_str(FULL).unwrap();
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.serial.port, "/dev/ttyACM1");
        assert_eq!(cfg.serial.baud_rate, 57600);

        let mut cfg = TrackerConfig::default();
        let err = cfg
            .apply_env_overrides(|k| (k == "TRACKER_BAUD_RATE").then(|| "fast".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "serial.baud_rate", .. }));

        let mut cfg = TrackerConfig::from_yaml_str(FULL).unwrap();
        cfg.apply_env_overrides(no_env).unwrap();
        assert_eq!(cfg.serial.port, "/dev/ttyUSB0");
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            TrackerConfig::from_yaml_str("serial: [unclosed"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tracker.yaml");
        std::fs::write(&path, FULL).unwrap();

        let cfg = load_config_from(&path).await.unwrap();
        assert_eq!(cfg.serial.baud_rate, 115200);
    }
}
