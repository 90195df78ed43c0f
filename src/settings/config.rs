//! Configuration file handling.
//!
//! The file is TOML and describes the interfaces known to the host and the
//! subscribers to open on start-up:
//!
//! ```toml
//! log_level = "info"
//!
//! [[interfaces]]
//! name = "eth0"
//! mac = "02:00:00:00:00:01"
//!
//! [[subscribers]]
//! name = "web"
//! [subscribers.filter]
//! point = "post_routing"
//! dport = 80
//! [subscribers.writer]
//! dest_dev = "eth0"
//! mode = "to_stack"
//! ```

use crate::error::{NetHookError, Result};
use crate::network::core::MacAddr;
use crate::settings::filter::FilterOptions;
use crate::settings::writer::WriterOptions;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// An interface the host exposes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub name: String,
    pub mac: MacAddr,
}

/// A subscriber opened on start-up.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SubscriberConfig {
    pub name: String,
    pub filter: FilterOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<WriterOptions>,
}

/// Top-level configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Log level used when neither the command line nor `RUST_LOG` set one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,

    #[serde(default)]
    pub subscribers: Vec<SubscriberConfig>,
}

impl Config {
    /// `<config dir>/nethook/nethook.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("nethook").join("nethook.toml"))
    }

    /// Resolves an explicit path, falling back to the default location.
    pub fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
        match path {
            Some(path) => Ok(path.to_path_buf()),
            None => Self::default_path()
                .ok_or_else(|| NetHookError::config("could not determine config directory")),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)
            .map_err(|e| NetHookError::config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| NetHookError::config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| NetHookError::config(e.to_string()))
    }

    /// Writes the configuration, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceConfig> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    /// Checks names are unique, every filter has a point and every interface
    /// a subscriber mentions is declared.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for iface in &self.interfaces {
            if iface.name.is_empty() {
                return Err(NetHookError::config("interface with empty name"));
            }
            if !seen.insert(iface.name.as_str()) {
                return Err(NetHookError::config(format!(
                    "duplicate interface '{}'",
                    iface.name
                )));
            }
        }

        let mut names = HashSet::new();
        for sub in &self.subscribers {
            if !names.insert(sub.name.as_str()) {
                return Err(NetHookError::config(format!(
                    "duplicate subscriber '{}'",
                    sub.name
                )));
            }
            sub.filter
                .to_descriptor()
                .map_err(|e| NetHookError::config(format!("subscriber '{}': {}", sub.name, e)))?;

            let writer_dev = sub.writer.as_ref().and_then(|w| w.dest_dev.as_deref());
            for name in sub.filter.interfaces().chain(writer_dev) {
                if self.interface(name).is_none() {
                    return Err(NetHookError::config(format!(
                        "subscriber '{}' refers to unknown interface '{}'",
                        sub.name, name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::filter::InterceptionPoint;
    use crate::network::processing::WriteMode;

    const SAMPLE: &str = r#"
log_level = "debug"

[[interfaces]]
name = "eth0"
mac = "02:00:00:00:00:01"

[[interfaces]]
name = "eth1"
mac = "02:00:00:00:00:02"

[[subscribers]]
name = "web"
[subscribers.filter]
point = "post_routing"
proto = 6
dport = 80
[subscribers.writer]
dest_dev = "eth1"
mode = "to_interface"

[[subscribers]]
name = "dns"
[subscribers.filter]
point = "pre_routing"
in_dev = "eth0"
sport = 53
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.interfaces.len(), 2);
        assert_eq!(
            config.interface("eth1").unwrap().mac,
            "02:00:00:00:00:02".parse().unwrap()
        );

        let web = &config.subscribers[0];
        assert_eq!(web.filter.point, Some(InterceptionPoint::PostRouting));
        assert_eq!(web.filter.dport, Some(80));
        let writer = web.writer.as_ref().unwrap();
        assert_eq!(writer.mode, WriteMode::ToInterface);

        assert!(config.subscribers[1].writer.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_unknown_interface() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.subscribers[1].filter.in_dev = Some("wlan0".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("wlan0"));
    }

    #[test]
    fn test_validate_duplicates_and_missing_point() {
        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.interfaces.push(config.interfaces[0].clone());
        assert!(config.validate().is_err());

        let mut config = Config::from_toml(SAMPLE).unwrap();
        config.subscribers[0].filter.point = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_mac_rejected() {
        let content = "[[interfaces]]\nname = \"eth0\"\nmac = \"not-a-mac\"\n";
        assert!(matches!(
            Config::from_toml(content),
            Err(NetHookError::Config(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let path = std::env::temp_dir()
            .join(format!("nethook-test-{}", std::process::id()))
            .join("nethook.toml");

        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_default_path_name() {
        if let Some(path) = Config::default_path() {
            assert!(path.ends_with("nethook/nethook.toml"));
        }
    }
}
