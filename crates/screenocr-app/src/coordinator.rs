use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use screenocr_config::Config;
use screenocr_core::{
    CaptureService, DeliverySink, PipelineOptions, RecognitionError, RecognitionPipeline,
    RegionSelector, SessionGuard,
};
use screenocr_types::{CaptureFailure, CycleOutcome, CycleStage, SelectionFailure};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// The single cycle slot. Whoever holds the [`CycleToken`] owns the only
/// cycle that may run.
#[derive(Clone)]
pub struct CycleSlot {
    permits: Arc<Semaphore>,
}

/// Proof of owning the slot; dropping it frees the slot
#[derive(Debug)]
pub struct CycleToken {
    pub id: Uuid,
    _permit: OwnedSemaphorePermit,
}

impl CycleSlot {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
        }
    }

    /// Never waits: a busy slot is `None`
    pub fn try_acquire(&self) -> Option<CycleToken> {
        let permit = self.permits.clone().try_acquire_owned().ok()?;
        Some(CycleToken {
            id: Uuid::new_v4(),
            _permit: permit,
        })
    }

    pub fn is_idle(&self) -> bool {
        self.permits.available_permits() == 1
    }

    /// Resolves once no cycle is running
    pub async fn wait_idle(&self) {
        // taken and dropped immediately
        let _ = self.permits.acquire().await;
    }
}

impl Default for CycleSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub enum Bounded<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

/// Await `fut`, giving up when `cancel` fires or `limit` runs out.
/// Cancellation wins over a result that is ready at the same time.
pub async fn bounded<F: Future>(
    cancel: &CancellationToken,
    limit: Option<Duration>,
    fut: F,
) -> Bounded<F::Output> {
    let deadline = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Bounded::Cancelled,
        out = fut => Bounded::Done(out),
        _ = deadline => Bounded::TimedOut,
    }
}

/// The four external stages a cycle walks through
pub struct Stages {
    pub capture: Arc<dyn CaptureService>,
    pub selector: Arc<dyn RegionSelector>,
    pub pipeline: RecognitionPipeline,
    pub sink: DeliverySink,
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub capture: Duration,
    /// Watchdog on the foreground selector
    pub selector: Duration,
}

impl From<&Config> for Timeouts {
    fn from(config: &Config) -> Self {
        Self {
            capture: config.capture_timeout(),
            selector: config.selector_timeout(),
        }
    }
}

pub struct Coordinator {
    stages: Stages,
    timeouts: Timeouts,
    stage: watch::Sender<CycleStage>,
}

impl Coordinator {
    pub fn new(stages: Stages, timeouts: Timeouts) -> Self {
        let (stage, _) = watch::channel(CycleStage::Idle);
        Self {
            stages,
            timeouts,
            stage,
        }
    }

    /// Production stages: portal, command selector, tesseract, wl-copy
    pub fn from_config(config: &Config) -> Self {
        let engine = Arc::new(screenocr_ocr::TesseractEngine::from_config(&config.ocr));
        let stages = Stages {
            capture: Arc::new(screenocr_ocr::PortalCapture::new(config.selector_timeout())),
            selector: Arc::new(screenocr_ocr::CommandSelector::from_config(&config.selector)),
            pipeline: RecognitionPipeline::new(engine, PipelineOptions::from(&config.ocr)),
            sink: screenocr_io::delivery_sink(&config.clipboard),
        };
        Self::new(stages, Timeouts::from(config))
    }

    pub fn subscribe(&self) -> watch::Receiver<CycleStage> {
        self.stage.subscribe()
    }

    pub fn stage(&self) -> CycleStage {
        self.stage.borrow().clone()
    }

    /// Run one cycle to its outcome. The slot stays taken until the
    /// coordinator is back in `Idle`.
    pub async fn run_cycle(&self, token: CycleToken, cancel: &CancellationToken) -> CycleOutcome {
        let span = tracing::info_span!("cycle", id = %token.id);
        let outcome = self.cycle(cancel).instrument(span.clone()).await;

        span.in_scope(|| log_outcome(&outcome));
        drop(token);
        outcome
    }

    async fn cycle(&self, cancel: &CancellationToken) -> CycleOutcome {
        let state = StateGuard::new(&self.stage);

        state.enter(CycleStage::Capturing);
        let capture = self.stages.capture.request_full_screen();
        let session = match bounded(cancel, Some(self.timeouts.capture), capture).await {
            Bounded::Done(Ok(session)) => session,
            Bounded::Done(Err(e)) => {
                return state.finish(CycleOutcome::CaptureFailed {
                    reason: e.into_failure(),
                });
            }
            Bounded::TimedOut => {
                return state.finish(CycleOutcome::CaptureFailed {
                    reason: CaptureFailure::Timeout,
                });
            }
            Bounded::Cancelled => return state.finish(CycleOutcome::Cancelled),
        };
        let session = SessionGuard::new(self.stages.capture.clone(), session);

        state.enter(CycleStage::Selecting);
        let window = watchdog_window(
            self.timeouts.selector,
            session.session().expires_at,
            Instant::now(),
        );
        let selection = self.stages.selector.select(session.session());
        let rect = match bounded(cancel, Some(window), selection).await {
            Bounded::Done(Ok(rect)) => rect,
            Bounded::Done(Err(e)) => {
                return state.finish(match e.into_failure() {
                    Some(reason) => CycleOutcome::SelectionFailed { reason },
                    None => CycleOutcome::Cancelled,
                });
            }
            Bounded::TimedOut => {
                tracing::warn!("Selector gave no answer within {window:?}, releasing session");
                return state.finish(CycleOutcome::SelectionFailed {
                    reason: SelectionFailure::Timeout,
                });
            }
            Bounded::Cancelled => return state.finish(CycleOutcome::Cancelled),
        };
        tracing::debug!("Selected {rect}");

        state.enter(CycleStage::Recognizing);
        let image = session.session().image.clone();
        // the pipeline enforces the engine timeout itself
        let recognized = bounded(cancel, None, self.stages.pipeline.recognize(image, rect)).await;
        session.release();

        let result = match recognized {
            Bounded::Done(Ok(result)) => result,
            Bounded::Done(Err(e)) => {
                return state.finish(CycleOutcome::RecognitionFailed {
                    reason: e.into_failure(),
                });
            }
            Bounded::TimedOut => {
                return state.finish(CycleOutcome::RecognitionFailed {
                    reason: RecognitionError::EngineTimeout.into_failure(),
                });
            }
            Bounded::Cancelled => return state.finish(CycleOutcome::Cancelled),
        };
        tracing::debug!(
            "Recognized {} fragments (confidence {:.2})",
            result.boxes.len(),
            result.confidence
        );

        state.enter(CycleStage::Delivering);
        match bounded(cancel, None, self.stages.sink.deliver(&result.text)).await {
            Bounded::Done(Ok(delivered)) => {
                if delivered.fallback_used {
                    tracing::info!("Delivered through fallback {}", delivered.via);
                }
                state.finish(CycleOutcome::Success { text: result.text })
            }
            Bounded::Done(Err(e)) => state.finish(CycleOutcome::DeliveryFailed {
                reason: e.reason,
                text: e.text,
            }),
            Bounded::TimedOut | Bounded::Cancelled => state.finish(CycleOutcome::Cancelled),
        }
    }
}

/// Selector watchdog: the configured window, cut short by session expiry
pub fn watchdog_window(limit: Duration, expires_at: Option<Instant>, now: Instant) -> Duration {
    match expires_at {
        Some(deadline) => limit.min(deadline.saturating_duration_since(now)),
        None => limit,
    }
}

/// Publishes stage changes and puts the coordinator back in `Idle` when the
/// cycle ends, including by panic.
struct StateGuard<'a> {
    tx: &'a watch::Sender<CycleStage>,
}

impl<'a> StateGuard<'a> {
    fn new(tx: &'a watch::Sender<CycleStage>) -> Self {
        Self { tx }
    }

    fn enter(&self, stage: CycleStage) {
        tracing::debug!("Stage {stage:?}");
        self.tx.send_replace(stage);
    }

    fn finish(&self, outcome: CycleOutcome) -> CycleOutcome {
        match &outcome {
            CycleOutcome::Success { .. } => {}
            CycleOutcome::Cancelled => self.enter(CycleStage::Cancelled),
            other => self.enter(CycleStage::Failed(other.message())),
        }
        outcome
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.tx.send_replace(CycleStage::Idle);
    }
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Success { text } => {
            tracing::info!("Cycle succeeded: {}", outcome.message());
            tracing::debug!("Copied text: {text:?}");
        }
        CycleOutcome::DeliveryFailed { reason, text } => {
            tracing::warn!("Clipboard write failed ({reason}); recognized text follows");
            tracing::warn!("{text}");
        }
        _ if outcome.is_fault() => match outcome.detail() {
            Some(detail) => tracing::error!("Cycle failed: {} ({detail})", outcome.message()),
            None => tracing::error!("Cycle failed: {}", outcome.message()),
        },
        _ => tracing::info!("Cycle ended: {}", outcome.message()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_admits_one_holder() {
        let slot = CycleSlot::new();
        let token = slot.try_acquire().unwrap();

        assert!(!slot.is_idle());
        assert!(slot.try_acquire().is_none());

        drop(token);
        assert!(slot.is_idle());
        assert!(slot.try_acquire().is_some());
    }

    #[test]
    fn test_watchdog_window_is_cut_by_expiry() {
        let now = Instant::now();
        let limit = Duration::from_secs(60);

        assert_eq!(watchdog_window(limit, None, now), limit);
        assert_eq!(
            watchdog_window(limit, Some(now + Duration::from_secs(5)), now),
            Duration::from_secs(5)
        );
        assert_eq!(
            watchdog_window(limit, Some(now - Duration::from_secs(1)), now),
            Duration::ZERO
        );
    }

    #[tokio::test]
    async fn test_bounded_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let out = bounded(&cancel, None, async { 7 }).await;
        assert!(matches!(out, Bounded::Cancelled));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let cancel = CancellationToken::new();
        let out = bounded(
            &cancel,
            Some(Duration::from_millis(10)),
            std::future::pending::<()>(),
        )
        .await;
        assert!(matches!(out, Bounded::TimedOut));
    }

    #[tokio::test]
    async fn test_wait_idle_resolves_when_token_dropped() {
        let slot = CycleSlot::new();
        let token = slot.try_acquire().unwrap();

        let waiter = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.wait_idle().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(token);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait_idle did not resolve")
            .unwrap();
    }
}
