use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use self::capture::CaptureConfig;
use self::clipboard::ClipboardConfig;
use self::daemon::DaemonConfig;
use self::ocr::OcrConfig;
use self::selector::SelectorConfig;

pub mod capture;
pub mod clipboard;
pub mod daemon;
pub mod hotkey;
pub mod ocr;
pub mod selector;
pub mod store;

pub use hotkey::{HotkeyBinding, HotkeyParseError, Key, KeySymbol, Modifier};
pub use store::{Paths, write_atomic};

/// Current on-disk schema
pub const SCHEMA_VERSION: u32 = 1;

fn default_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine a configuration directory")]
    NoConfigDir,

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid hotkey: {0}")]
    Hotkey(#[from] HotkeyParseError),

    #[error("unsupported config version {0} (expected at most {SCHEMA_VERSION})")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Schema version of this record
    #[serde(default = "default_version")]
    pub version: u32,
    /// Trigger chord, validated when the file is read
    pub hotkey: HotkeyBinding,
    pub capture: CaptureConfig,
    pub selector: SelectorConfig,
    pub ocr: OcrConfig,
    pub clipboard: ClipboardConfig,
    pub daemon: DaemonConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            hotkey: HotkeyBinding::default(),
            capture: CaptureConfig::default(),
            selector: SelectorConfig::default(),
            ocr: OcrConfig::default(),
            clipboard: ClipboardConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl Config {
    /// Read the config at `path`, falling back to defaults when it does not exist.
    ///
    /// Environment overrides are applied on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read(path)?;
        config.apply_env()?;
        Ok(config)
    }

    /// The file as written, without environment overrides. Use this for
    /// a config that will be saved back.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match fs::read_to_string(path) {
            Ok(data) => {
                let config: Config =
                    serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    })?;
                tracing::debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", path.display());
                Config::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if config.version > SCHEMA_VERSION {
            return Err(ConfigError::UnsupportedVersion(config.version));
        }
        config.version = SCHEMA_VERSION;
        Ok(config)
    }

    /// Persist atomically (temp file then rename)
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        write_atomic(path, &data).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Environment overrides; malformed numbers are ignored, a malformed hotkey is not
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let millis = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(hotkey) = lookup("SCREENOCR_HOTKEY") {
            self.hotkey = HotkeyBinding::parse(&hotkey)?;
        }
        if let Some(ms) = millis("SCREENOCR_CAPTURE_TIMEOUT_MS") {
            self.capture.timeout_ms = ms;
        }
        if let Some(ms) = millis("SCREENOCR_SELECTOR_TIMEOUT_MS") {
            self.selector.timeout_ms = ms;
        }
        if let Some(ms) = millis("SCREENOCR_OCR_TIMEOUT_MS") {
            self.ocr.timeout_ms = ms;
        }
        if let Some(language) = lookup("SCREENOCR_OCR_LANGUAGE")
            && !language.trim().is_empty()
        {
            self.ocr.language = language.trim().to_string();
        }

        Ok(())
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture.timeout_ms)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector.timeout_ms)
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_millis(self.ocr.timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.daemon.stop_grace_ms)
    }
}
