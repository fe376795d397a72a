use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::ConfigError;

const APP_NAME: &str = "screenocr";
const CONFIG_FILE: &str = "config.json";

/// Filesystem locations used by the daemon and the CLI
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_file: PathBuf,
    /// Lock record, status snapshot and daemon log live here
    pub state_dir: PathBuf,
}

impl Paths {
    /// XDG locations, with the state directory in the runtime dir when there is one
    pub fn discover() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from("", "", APP_NAME).ok_or(ConfigError::NoConfigDir)?;

        let state_dir = dirs
            .runtime_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dirs.cache_dir().to_path_buf());

        Ok(Self {
            config_file: dirs.config_dir().join(CONFIG_FILE),
            state_dir,
        })
    }

    /// Explicit config file, state kept next to it
    pub fn with_config_file(config_file: PathBuf) -> Self {
        let state_dir = config_file
            .parent()
            .map(|p| p.join("state"))
            .unwrap_or_else(|| PathBuf::from("state"));

        Self {
            config_file,
            state_dir,
        }
    }

    pub fn status_file(&self) -> PathBuf {
        self.state_dir.join("status.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.state_dir.join("daemon.log")
    }
}

/// Write `bytes` so that readers see either the old file or the whole new one
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_sibling(path);
    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// `<name>.tmp-<pid>` next to `path`
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.tmp-{}", std::process::id()))
}
