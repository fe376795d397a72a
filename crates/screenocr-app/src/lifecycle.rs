use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use screenocr_config::{HotkeyBinding, store};
use serde::{Deserialize, Serialize};

const LOCK_FILE: &str = "daemon.lock";

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("daemon already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("daemon is not running")]
    NotRunning,

    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LockError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        LockError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Who holds the daemon lock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub binding: String,
    /// Executable name, to tell a reused pid from ours
    #[serde(default)]
    pub exe: Option<String>,
    /// Set once the hotkey is registered and presses are being admitted
    #[serde(default)]
    pub ready: bool,
}

impl LockRecord {
    pub fn current(binding: &HotkeyBinding) -> Self {
        Self {
            pid: std::process::id(),
            started_at: Utc::now(),
            binding: binding.to_string(),
            exe: current_exe_name(),
            ready: false,
        }
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(LOCK_FILE)
    }

    /// Take the daemon lock in `dir`.
    ///
    /// The record is fully written to a private file and then hard-linked
    /// into place, so the lock appears atomically and never half-written.
    /// A lock left by a dead process is cleared; a live holder is
    /// `AlreadyRunning`.
    pub fn acquire(dir: &Path, binding: &HotkeyBinding) -> Result<LockGuard, LockError> {
        Self::current(binding).acquire_as(dir)
    }

    pub(crate) fn acquire_as(self, dir: &Path) -> Result<LockGuard, LockError> {
        fs::create_dir_all(dir).map_err(|e| LockError::io(dir, e))?;
        let path = Self::path(dir);
        let staging = store::temp_sibling(&path);

        for _ in 0..2 {
            write_synced(&staging, &self.to_bytes()).map_err(|e| LockError::io(&staging, e))?;
            let linked = fs::hard_link(&staging, &path);
            let _ = fs::remove_file(&staging);

            match linked {
                Ok(()) => {
                    tracing::info!("Acquired daemon lock {}", path.display());
                    return Ok(LockGuard {
                        path,
                        record: self,
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(LockError::io(&path, e)),
            }

            match Self::read(dir)? {
                Some(holder) if holder.is_alive() => {
                    return Err(LockError::AlreadyRunning { pid: holder.pid });
                }
                stale => clear_stale(&path, stale.as_ref())?,
            }
        }

        // another instance won the race for the cleared lock
        match Self::read(dir)? {
            Some(holder) => Err(LockError::AlreadyRunning { pid: holder.pid }),
            None => Err(LockError::io(
                &path,
                std::io::Error::other("lock kept changing while acquiring"),
            )),
        }
    }

    /// Current holder, if any. An unreadable record reads as `None`.
    pub fn read(dir: &Path) -> Result<Option<LockRecord>, LockError> {
        let path = Self::path(dir);
        match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    tracing::warn!("Ignoring unreadable lock {}: {e}", path.display());
                    Ok(None)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LockError::io(&path, e)),
        }
    }

    /// `pid` holds the lock and has registered its hotkey
    pub fn is_ready(dir: &Path, pid: u32) -> Result<bool, LockError> {
        Ok(Self::read(dir)?.is_some_and(|record| record.pid == pid && record.ready))
    }

    /// The recorded process exists and is still our executable
    pub fn is_alive(&self) -> bool {
        if !process_alive(self.pid) {
            return false;
        }
        match (&self.exe, exe_name_of(self.pid)) {
            (Some(recorded), Some(actual)) => *recorded == actual,
            _ => true,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec_pretty(self).unwrap_or_default()
    }
}

/// Held for the daemon's lifetime; removes the lock when released or dropped
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    record: LockRecord,
    released: bool,
}

impl LockGuard {
    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    /// Rewrite the record in place, e.g. after the binding changed
    pub fn update_binding(&mut self, binding: &HotkeyBinding) -> Result<(), LockError> {
        self.record.binding = binding.to_string();
        store::write_atomic(&self.path, &self.record.to_bytes())
            .map_err(|e| LockError::io(&self.path, e))
    }

    /// Publish that the daemon is listening
    pub fn mark_ready(&mut self) -> Result<(), LockError> {
        self.record.ready = true;
        store::write_atomic(&self.path, &self.record.to_bytes())
            .map_err(|e| LockError::io(&self.path, e))
    }

    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        remove_if_ours(&self.path, self.record.pid)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = remove_if_ours(&self.path, self.record.pid)
        {
            tracing::warn!("{e}");
        }
    }
}

fn remove_if_ours(path: &Path, pid: u32) -> Result<(), LockError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    match LockRecord::read(dir)? {
        Some(record) if record.pid != pid => {
            tracing::warn!("Lock now held by pid {}, leaving it", record.pid);
            Ok(())
        }
        _ => match fs::remove_file(path) {
            Ok(()) => {
                tracing::info!("Released daemon lock");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::io(path, e)),
        },
    }
}

/// Remove a lock whose holder is gone, unless it changed under us
pub(crate) fn clear_stale(path: &Path, seen: Option<&LockRecord>) -> Result<(), LockError> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let now = LockRecord::read(dir)?;
    if now.as_ref() != seen {
        return Ok(());
    }

    match seen {
        Some(record) => tracing::warn!(
            "Removing stale lock (pid {} no longer running)",
            record.pid
        ),
        None => tracing::warn!("Removing unreadable lock {}", path.display()),
    }

    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LockError::io(path, e)),
    }
}

/// Signal 0 check. A process owned by someone else still counts as alive.
pub fn process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true,
    }
}

fn exe_name_of(pid: u32) -> Option<String> {
    let target = fs::read_link(format!("/proc/{pid}/exe")).ok()?;
    let name = target.file_name()?.to_string_lossy();
    // the kernel marks replaced binaries
    Some(name.trim_end_matches(" (deleted)").to_string())
}

fn current_exe_name() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.file_name()?.to_string_lossy().into_owned())
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
