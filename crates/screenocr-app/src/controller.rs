use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use kanal::{AsyncReceiver, AsyncSender};
use screenocr_config::HotkeyBinding;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::coordinator::{Coordinator, CycleSlot, CycleToken};
use crate::listener::run_listener;
use crate::state::AppState;
use crate::status::{AppStatus, write_status};

/// How long an aborted cycle gets to unwind
const ABORT_WAIT: Duration = Duration::from_secs(1);

/// Centralized channel management
pub struct ChannelSet {
    pub presses: (AsyncSender<()>, AsyncReceiver<()>),
    pub cycles: (AsyncSender<CycleToken>, AsyncReceiver<CycleToken>),
}

impl ChannelSet {
    pub fn new() -> Self {
        Self {
            presses: kanal::bounded_async(8), // key-repeat bursts
            cycles: kanal::bounded_async(1),  // single flight
        }
    }
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Application controller for task spawning and lifecycle
pub struct AppController {
    channels: ChannelSet,
    state: Arc<AppState>,
    /// Replaced on reload; each cycle runs on the latest one
    coordinator: watch::Sender<Arc<Coordinator>>,
    slot: CycleSlot,
    cancel_token: CancellationToken,
    /// Listener and hotkey thread; cancelled first on shutdown
    listen_token: CancellationToken,
    /// Aborts the in-flight cycle
    cycle_token: CancellationToken,
    hotkey_token: Mutex<CancellationToken>,
    /// Held by the hotkey thread while its chord is registered
    hotkey_gate: Arc<Mutex<()>>,
}

impl AppController {
    pub fn new(state: Arc<AppState>, coordinator: Arc<Coordinator>) -> Self {
        let cancel_token = CancellationToken::new();
        let listen_token = cancel_token.child_token();
        let cycle_token = cancel_token.child_token();
        let hotkey_token = Mutex::new(listen_token.child_token());

        Self {
            channels: ChannelSet::new(),
            state,
            coordinator: watch::Sender::new(coordinator),
            slot: CycleSlot::new(),
            cancel_token,
            listen_token,
            cycle_token,
            hotkey_token,
            hotkey_gate: Arc::new(Mutex::new(())),
        }
    }

    #[cfg(test)]
    pub(crate) fn slot(&self) -> &CycleSlot {
        &self.slot
    }

    /// Presses fed in here go through the same path as the global hotkey
    #[cfg(test)]
    pub(crate) fn press_sender(&self) -> AsyncSender<()> {
        self.channels.presses.0.clone()
    }

    /// Listener and cycle runner. The hotkey thread is added separately so
    /// it can be replaced on reload.
    pub fn spawn_tasks(&self) -> JoinSet<anyhow::Result<()>> {
        let mut tasks = JoinSet::new();

        tasks.spawn(run_listener(
            self.channels.presses.1.clone(),
            self.slot.clone(),
            self.channels.cycles.0.clone(),
            self.state.status.clone(),
            self.listen_token.clone(),
        ));

        tasks.spawn(cycle_loop(
            self.coordinator.subscribe(),
            self.channels.cycles.1.clone(),
            self.state.status.clone(),
            self.state.paths.status_file(),
            self.cycle_token.clone(),
            self.cancel_token.clone(),
        ));

        tasks
    }

    /// Register `binding` on a dedicated blocking thread. The receiver
    /// resolves once the chord is grabbed.
    pub fn spawn_hotkey(
        &self,
        tasks: &mut JoinSet<anyhow::Result<()>>,
        binding: HotkeyBinding,
    ) -> oneshot::Receiver<()> {
        let token = self.listen_token.child_token();
        match self.hotkey_token.lock() {
            Ok(mut current) => *current = token.clone(),
            Err(poisoned) => *poisoned.into_inner() = token.clone(),
        }

        let presses = self.channels.presses.0.clone().to_sync();
        let gate = self.hotkey_gate.clone();
        let (registered, on_registered) = oneshot::channel();

        tasks.spawn_blocking(move || {
            // wait for the previous registration to be dropped
            let _held = gate
                .lock()
                .map_err(|_| anyhow!("hotkey thread panicked earlier"))?;
            screenocr_ocr::listen_hotkey(&binding, presses, token, move || {
                let _ = registered.send(());
            })
        });
        on_registered
    }

    /// Swap the registered chord without touching the listener
    pub fn restart_hotkey(&self, tasks: &mut JoinSet<anyhow::Result<()>>, binding: HotkeyBinding) {
        match self.hotkey_token.lock() {
            Ok(current) => current.cancel(),
            Err(poisoned) => poisoned.into_inner().cancel(),
        }
        tracing::info!("Re-registering hotkey as {binding}");
        // the daemon is already marked ready
        let _ = self.spawn_hotkey(tasks, binding);
    }

    /// Cycles started from now on use `coordinator`; a running cycle
    /// finishes on the one it started with.
    pub fn replace_coordinator(&self, coordinator: Coordinator) {
        self.coordinator.send_replace(Arc::new(coordinator));
        tracing::info!("Capture, selector, OCR and clipboard settings reloaded");
    }

    /// Stop admitting presses
    pub fn stop_listening(&self) {
        self.listen_token.cancel();
    }

    /// Stop listening, then wait up to `grace` for the current cycle.
    /// Returns false when the cycle had to be aborted.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.stop_listening();

        if tokio::time::timeout(grace, self.slot.wait_idle()).await.is_ok() {
            return true;
        }

        tracing::warn!("Cycle still running after {grace:?}, cancelling it");
        self.abort_cycle();
        if tokio::time::timeout(ABORT_WAIT, self.slot.wait_idle())
            .await
            .is_err()
        {
            tracing::error!("Cancelled cycle did not unwind");
        }
        false
    }

    pub fn abort_cycle(&self) {
        self.cycle_token.cancel();
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

/// Runs each admitted cycle on its own task so a panic in one stage is
/// contained to that cycle.
async fn cycle_loop(
    coordinators: watch::Receiver<Arc<Coordinator>>,
    cycles: AsyncReceiver<CycleToken>,
    status: AppStatus,
    status_file: PathBuf,
    abort: CancellationToken,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let token = tokio::select! {
            _ = cancel.cancelled() => break,
            token = cycles.recv() => match token {
                Ok(token) => token,
                Err(_) => break,
            },
        };

        let handle = {
            let coordinator = coordinators.borrow().clone();
            let abort = abort.clone();
            tokio::spawn(async move { coordinator.run_cycle(token, &abort).await })
        };

        match handle.await {
            Ok(outcome) => {
                let stats = status.record(&outcome).await;
                if let Err(e) = write_status(&status_file, &stats) {
                    tracing::warn!("{e:#}");
                }
            }
            Err(e) => tracing::error!("Cycle task failed: {e}"),
        }
    }

    Ok(())
}
