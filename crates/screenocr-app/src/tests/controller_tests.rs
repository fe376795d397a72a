//! Controller shutdown order and reload

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use screenocr_config::{Config, Paths};
use screenocr_types::SelectionRect;
use tokio::time::{sleep, timeout};

use super::fakes::{
    FakeCapture, FakeClipboard, FakeEngine, FakeSelector, SelectScript, coordinator,
};
use crate::controller::AppController;
use crate::coordinator::Coordinator;
use crate::state::AppState;

fn controller(root: &Path, coordinator: Coordinator) -> AppController {
    let paths = Paths::with_config_file(root.join("config.json"));
    let state = Arc::new(AppState::new(Config::default(), paths));
    AppController::new(state, Arc::new(coordinator))
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let polled = timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for {what}");
}

#[tokio::test]
async fn test_drain_lets_a_short_cycle_finish() {
    let dir = tempfile::tempdir().unwrap();
    let capture = FakeCapture::screen();
    let clipboard = FakeClipboard::working();
    let selector = FakeSelector::delayed(
        SelectScript::Rect(SelectionRect::new(50, 50, 100, 50).unwrap()),
        Duration::from_millis(100),
    );
    let controller = controller(
        dir.path(),
        coordinator(capture.clone(), selector, FakeEngine::def_foo(), clipboard.clone()),
    );
    let _tasks = controller.spawn_tasks();

    controller.press_sender().send(()).await.unwrap();
    wait_until("cycle start", || !controller.slot().is_idle()).await;

    assert!(controller.drain(Duration::from_secs(2)).await);
    assert!(controller.slot().is_idle());
    assert_eq!(clipboard.contents().as_deref(), Some("def foo():"));
    assert_eq!(capture.released(), 1);
}

#[tokio::test]
async fn test_drain_aborts_a_hanging_cycle_after_grace() {
    let dir = tempfile::tempdir().unwrap();
    let capture = FakeCapture::screen();
    let clipboard = FakeClipboard::working();
    let controller = controller(
        dir.path(),
        coordinator(
            capture.clone(),
            FakeSelector::new(SelectScript::Hang),
            FakeEngine::def_foo(),
            clipboard.clone(),
        ),
    );
    let _tasks = controller.spawn_tasks();

    controller.press_sender().send(()).await.unwrap();
    wait_until("cycle start", || !controller.slot().is_idle()).await;

    assert!(!controller.drain(Duration::from_millis(50)).await);
    assert!(controller.slot().is_idle());
    assert_eq!(capture.released(), 1);
    assert_eq!(clipboard.contents(), None);
}

#[tokio::test]
async fn test_press_after_drain_starts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let capture = FakeCapture::screen();
    let controller = controller(
        dir.path(),
        coordinator(
            capture.clone(),
            FakeSelector::drag(),
            FakeEngine::def_foo(),
            FakeClipboard::working(),
        ),
    );
    let mut tasks = controller.spawn_tasks();

    assert!(controller.drain(Duration::from_millis(100)).await);
    let _ = controller.press_sender().send(()).await;
    sleep(Duration::from_millis(100)).await;

    assert!(controller.slot().is_idle());
    assert_eq!(capture.requests.load(Ordering::SeqCst), 0);

    controller.shutdown();
    let joined = timeout(Duration::from_secs(2), async {
        while let Some(task) = tasks.join_next().await {
            task.unwrap().unwrap();
        }
    })
    .await;
    assert!(joined.is_ok(), "tasks kept running after shutdown");
}

#[tokio::test]
async fn test_replaced_coordinator_runs_the_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let old_clipboard = FakeClipboard::working();
    let new_clipboard = FakeClipboard::working();
    let controller = controller(
        dir.path(),
        coordinator(
            FakeCapture::screen(),
            FakeSelector::drag(),
            FakeEngine::def_foo(),
            old_clipboard.clone(),
        ),
    );
    let _tasks = controller.spawn_tasks();

    controller.replace_coordinator(coordinator(
        FakeCapture::screen(),
        FakeSelector::drag(),
        FakeEngine::def_foo(),
        new_clipboard.clone(),
    ));
    controller.press_sender().send(()).await.unwrap();

    wait_until("delivery", || new_clipboard.contents().is_some()).await;
    assert_eq!(new_clipboard.contents().as_deref(), Some("def foo():"));
    assert_eq!(old_clipboard.contents(), None);

    assert!(controller.drain(Duration::from_secs(1)).await);
}
