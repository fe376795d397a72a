use std::fs::{self, OpenOptions};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use screenocr_config::{Config, Paths};
use screenocr_types::{CycleOutcome, DaemonStatus};
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::controller::AppController;
use crate::coordinator::{Coordinator, CycleSlot};
use crate::lifecycle::{self, LockError, LockGuard, LockRecord, process_alive};
use crate::state::AppState;
use crate::status::{CycleStats, read_status, write_status};

const POLL: Duration = Duration::from_millis(100);
/// Extra wait on top of the daemon's own drain grace
const STOP_SLACK: Duration = Duration::from_secs(1);
const KILL_WAIT: Duration = Duration::from_secs(1);
const TASK_WAIT: Duration = Duration::from_secs(2);

pub struct Supervisor {
    paths: Paths,
    config: Config,
}

impl Supervisor {
    pub fn new(paths: Paths, config: Config) -> Self {
        Self { paths, config }
    }

    /// `daemon start`. Without `foreground` the daemon is re-executed in
    /// the background and this returns once its hotkey is registered.
    pub async fn run(self, foreground: bool) -> Result<()> {
        if foreground {
            self.run_foreground().await
        } else {
            self.detach().await
        }
    }

    async fn run_foreground(self) -> Result<()> {
        let mut lock = LockRecord::acquire(&self.paths.state_dir, &self.config.hotkey)?;
        tracing::info!(
            "Daemon started (pid {}, hotkey {})",
            lock.record().pid,
            self.config.hotkey
        );

        let mut term = signal(SignalKind::terminate()).context("Failed to watch SIGTERM")?;
        let mut hup = signal(SignalKind::hangup()).context("Failed to watch SIGHUP")?;

        let state = Arc::new(AppState::new(self.config.clone(), self.paths.clone()));
        if let Err(e) = write_status(&self.paths.status_file(), &CycleStats::default()) {
            tracing::warn!("{e:#}");
        }

        let coordinator = Arc::new(Coordinator::from_config(&self.config));
        let controller = AppController::new(state.clone(), coordinator);
        let mut tasks = controller.spawn_tasks();
        let mut registered = controller.spawn_hotkey(&mut tasks, self.config.hotkey.clone());
        let mut awaiting_hotkey = true;

        let result = loop {
            tokio::select! {
                done = &mut registered, if awaiting_hotkey => {
                    awaiting_hotkey = false;
                    // on failure the hotkey thread's error arrives via join_next
                    if done.is_ok() {
                        match lock.mark_ready() {
                            Ok(()) => tracing::info!("Daemon ready"),
                            Err(e) => tracing::warn!("{e}"),
                        }
                    }
                }
                _ = term.recv() => {
                    tracing::info!("SIGTERM received, shutting down");
                    break Ok(());
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, shutting down");
                    break Ok(());
                }
                _ = hup.recv() => {
                    self.reload(&state, &controller, &mut tasks, &mut lock).await;
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok(Ok(()))) => tracing::debug!("Task finished"),
                    Some(Ok(Err(e))) => break Err(e),
                    Some(Err(e)) => break Err(anyhow!("Task panicked: {e}")),
                    None => break Err(anyhow!("All daemon tasks exited")),
                },
            }
        };

        let grace = state.config.read().await.stop_grace();
        controller.drain(grace).await;
        controller.shutdown();

        let joined = tokio::time::timeout(TASK_WAIT, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if joined.is_err() {
            tracing::warn!("Some tasks did not stop in time");
        }

        let stats = state.status.snapshot().await;
        if let Err(e) = write_status(&self.paths.status_file(), &stats) {
            tracing::warn!("{e:#}");
        }

        lock.release()?;
        tracing::info!(
            "Daemon stopped after {} cycles ({} dropped presses)",
            stats.cycles,
            stats.dropped_presses
        );
        result
    }

    /// SIGHUP: reread the config file, rebuild the cycle stages and
    /// re-register the hotkey if it changed
    async fn reload(
        &self,
        state: &AppState,
        controller: &AppController,
        tasks: &mut JoinSet<Result<()>>,
        lock: &mut LockGuard,
    ) {
        let config = match Config::load(&self.paths.config_file) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Reload failed, keeping current configuration: {e}");
                return;
            }
        };

        controller.replace_coordinator(Coordinator::from_config(&config));

        let binding = config.hotkey.clone();
        let changed = {
            let mut current = state.config.write().await;
            let changed = current.hotkey != binding;
            *current = config;
            changed
        };

        if !changed {
            tracing::info!("Configuration reloaded");
            return;
        }

        controller.restart_hotkey(tasks, binding.clone());
        if let Err(e) = lock.update_binding(&binding) {
            tracing::warn!("{e}");
        }
    }

    async fn detach(self) -> Result<()> {
        let dir = &self.paths.state_dir;
        if let Some(holder) = LockRecord::read(dir)?
            && holder.is_alive()
        {
            return Err(LockError::AlreadyRunning { pid: holder.pid }.into());
        }

        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let log_path = self.paths.log_file();
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open {}", log_path.display()))?;

        let exe = std::env::current_exe().context("Failed to locate own executable")?;
        let mut child = Command::new(exe)
            .args(std::env::args_os().skip(1))
            .arg("--foreground")
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log)
            .process_group(0)
            .spawn()
            .context("Failed to spawn daemon")?;

        let child_pid = child.id();
        let deadline = Instant::now() + Duration::from_millis(self.config.daemon.start_wait_ms);

        loop {
            if let Some(status) = child.try_wait()? {
                bail!(
                    "daemon exited during startup ({status}), see {}",
                    log_path.display()
                );
            }
            if LockRecord::is_ready(dir, child_pid)? {
                println!("daemon started (pid {child_pid})");
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!(
                    "daemon did not register its hotkey in time, see {}",
                    log_path.display()
                );
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// `daemon stop`: SIGTERM, wait out the drain grace, then SIGKILL
    pub async fn stop(&self) -> Result<()> {
        let dir = &self.paths.state_dir;
        let record = match LockRecord::read(dir)? {
            Some(record) if record.is_alive() => record,
            stale => {
                if stale.is_some() {
                    lifecycle::clear_stale(&LockRecord::path(dir), stale.as_ref())?;
                }
                return Err(LockError::NotRunning.into());
            }
        };

        let pid = Pid::from_raw(i32::try_from(record.pid).context("pid out of range")?);
        send(pid, Signal::SIGTERM)?;
        tracing::info!("Sent SIGTERM to pid {}", record.pid);

        if wait_exit(record.pid, self.config.stop_grace() + STOP_SLACK).await {
            println!("daemon stopped");
            return Ok(());
        }

        tracing::warn!("Daemon pid {} ignored SIGTERM, killing it", record.pid);
        send(pid, Signal::SIGKILL)?;
        if !wait_exit(record.pid, KILL_WAIT).await {
            bail!("daemon pid {} survived SIGKILL", record.pid);
        }

        lifecycle::clear_stale(&LockRecord::path(dir), Some(&record))?;
        println!("daemon killed");
        Ok(())
    }

    pub fn status(&self) -> Result<DaemonStatus> {
        let holder = LockRecord::read(&self.paths.state_dir)?.filter(LockRecord::is_alive);
        let stats = read_status(&self.paths.status_file());

        Ok(DaemonStatus {
            running: holder.is_some(),
            pid: holder.as_ref().map(|h| h.pid),
            started_at: holder.as_ref().map(|h| h.started_at),
            binding: holder.map(|h| h.binding),
            cycles: stats.cycles,
            successes: stats.successes,
            last_outcome: stats.last_outcome,
        })
    }

    /// One cycle in this process, no daemon involved
    pub async fn trigger(&self) -> Result<CycleOutcome> {
        let coordinator = Coordinator::from_config(&self.config);
        let slot = CycleSlot::new();
        let token = slot
            .try_acquire()
            .ok_or_else(|| anyhow!("cycle slot unexpectedly busy"))?;

        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });

        let outcome = coordinator.run_cycle(token, &cancel).await;

        if outcome.is_success() {
            // let the clipboard tool take ownership before we exit
            tokio::time::sleep(Duration::from_millis(self.config.clipboard.linger_ms)).await;
        }
        Ok(outcome)
    }
}

fn send(pid: Pid, signal: Signal) -> Result<()> {
    match kill(pid, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(anyhow!("Failed to send {signal:?} to pid {pid}: {e}")),
    }
}

async fn wait_exit(pid: u32, limit: Duration) -> bool {
    let deadline = Instant::now() + limit;
    while process_alive(pid) {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL).await;
    }
    true
}
