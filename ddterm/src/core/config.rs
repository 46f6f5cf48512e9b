use std::path::PathBuf;
use std::time::Duration;

use crate::settle::DEFAULT_SETTLE_TIMEOUT;

/// Default launcher of the terminal application.
pub const DEFAULT_APP_COMMAND: &str = "com.github.amezin.ddterm";

/// Controller configuration.
/// Persisted window settings live in the settings store, not here.
#[derive(Debug, Clone)]
pub struct Config {
    pub settle_timeout: Duration,
    /// Command line used to launch the application when it is not on the bus.
    pub app_command: Vec<String>,
    pub settings_path: PathBuf,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app_command(mut self, command: Vec<String>) -> Self {
        if !command.is_empty() {
            self.app_command = command;
        }
        self
    }

    pub fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    pub fn with_settings_path(mut self, path: PathBuf) -> Self {
        self.settings_path = path;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
            app_command: vec![DEFAULT_APP_COMMAND.to_string()],
            settings_path: default_settings_path(),
        }
    }
}

fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ddterm")
        .join("settings.json")
}
