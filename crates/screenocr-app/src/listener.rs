use kanal::{AsyncReceiver, AsyncSender};
use tokio_util::sync::CancellationToken;

use crate::coordinator::{CycleSlot, CycleToken};
use crate::status::AppStatus;

/// Turn hotkey presses into cycles.
///
/// A press claims the cycle slot and hands the token on. A press that finds
/// the slot taken is dropped, never queued.
pub async fn run_listener(
    presses: AsyncReceiver<()>,
    slot: CycleSlot,
    cycles: AsyncSender<CycleToken>,
    status: AppStatus,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    tracing::debug!("Listener started");

    loop {
        let press = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            press = presses.recv() => press,
        };

        if press.is_err() {
            tracing::debug!("Press channel closed");
            break;
        }

        match slot.try_acquire() {
            Some(token) => {
                tracing::debug!("Starting cycle {}", token.id);
                if cycles.send(token).await.is_err() {
                    tracing::debug!("Cycle channel closed");
                    break;
                }
            }
            None => {
                let dropped = status.dropped_press().await;
                tracing::info!("Cycle already running, press ignored ({dropped} so far)");
            }
        }
    }

    tracing::info!("Listener stopped, no new cycles will start");
    Ok(())
}
