//! Environment driven configuration.
//!
//! | variable | meaning |
//! |---|---|
//! | `DPP_PORT` | serial device, `auto` picks the platform default |
//! | `DPP_JSON_DIR` | directory holding the JSON definitions |
//! | `DPP_DIR` | data directory, defaults to `~/.dpp` |
use std::path::PathBuf;

use crate::serial::Timing;
use crate::transport::TransportConfig;
use crate::{Error, Result};

#[cfg(target_os = "macos")]
pub static DEFAULT_PORT: &str = "/dev/tty.usbserial";
#[cfg(not(target_os = "macos"))]
pub static DEFAULT_PORT: &str = "/dev/ttyUSB0";

static AUTO_PORT: &str = "auto";
static DEFAULT_DATA_DIR: &str = ".dpp";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Serial device path
    pub port: Option<String>,
    /// Explicit definitions directory, searched first
    pub definitions_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub timing: Timing,
    pub expect_echo: bool,
}

impl Default for Config {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Config {
            port: None,
            definitions_dir: None,
            data_dir: dirs::home_dir().map(|home| home.join(DEFAULT_DATA_DIR)),
            timing: transport.timing,
            expect_echo: transport.expect_echo,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        Config {
            port: var("DPP_PORT")
                .filter(|port| !port.is_empty())
                .map(|port| if port == AUTO_PORT { DEFAULT_PORT.to_string() } else { port }),
            definitions_dir: var("DPP_JSON_DIR").filter(|d| !d.is_empty()).map(PathBuf::from),
            data_dir: var("DPP_DIR")
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
                .or(defaults.data_dir.clone()),
            ..defaults
        }
    }

    /// Configured port, or the platform default.
    pub fn port_path(&self) -> String {
        self.port.clone().unwrap_or_else(|| DEFAULT_PORT.to_string())
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            timing: self.timing,
            expect_echo: self.expect_echo,
        }
    }

    /// Directories searched for definitions, in order.
    pub fn definition_search_path(&self) -> Vec<PathBuf> {
        let home = dirs::home_dir();
        let mut path = vec![];

        path.extend(self.definitions_dir.clone());
        path.push(PathBuf::from("json"));
        path.extend(home.as_ref().map(|home| home.join("dpp").join("json")));
        path.extend(self.data_dir.as_ref().map(|dir| dir.join("json")));
        path.extend(home.as_ref().map(|home| home.join("ds2").join("json")));

        path
    }

    /// First directory of the search path that exists.
    pub fn find_definitions_dir(&self) -> Result<PathBuf> {
        self.definition_search_path()
            .into_iter()
            .find(|dir| dir.is_dir())
            .ok_or(Error::NotFound)
    }
}
