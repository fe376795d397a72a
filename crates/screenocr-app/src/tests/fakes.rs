//! In-memory stand-ins for the capture service, selector, engine and clipboard

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use screenocr_core::{
    BoundingBox, CaptureError, CaptureService, CaptureSession, ClipboardError,
    ClipboardMechanism, DeliverySink, Fragment, PipelineOptions, RecognitionEngine,
    RecognitionError, RecognitionPipeline, RegionSelector, SelectionError,
};
use screenocr_types::SelectionRect;

use crate::coordinator::{Coordinator, Stages, Timeouts};

pub enum CaptureScript {
    Screen(u32, u32),
    Fail(fn() -> CaptureError),
    Hang,
}

pub struct FakeCapture {
    script: CaptureScript,
    pub requests: AtomicUsize,
    pub released: AtomicUsize,
}

impl FakeCapture {
    pub fn new(script: CaptureScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            requests: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        })
    }

    pub fn screen() -> Arc<Self> {
        Self::new(CaptureScript::Screen(400, 300))
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureService for FakeCapture {
    async fn request_full_screen(&self) -> Result<CaptureSession, CaptureError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            CaptureScript::Screen(w, h) => Ok(CaptureSession::new(DynamicImage::new_rgb8(*w, *h))),
            CaptureScript::Fail(make) => Err(make()),
            CaptureScript::Hang => std::future::pending().await,
        }
    }

    fn release(&self, _session: &CaptureSession) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

pub enum SelectScript {
    Rect(SelectionRect),
    Fail(SelectionError),
    Hang,
}

pub struct FakeSelector {
    script: SelectScript,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeSelector {
    pub fn new(script: SelectScript) -> Arc<Self> {
        Self::delayed(script, Duration::ZERO)
    }

    pub fn delayed(script: SelectScript, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    /// A 100x50 drag inside the default fake screen
    pub fn drag() -> Arc<Self> {
        Self::new(SelectScript::Rect(
            SelectionRect::new(50, 50, 100, 50).expect("non-empty rect"),
        ))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegionSelector for FakeSelector {
    async fn select(&self, _session: &CaptureSession) -> Result<SelectionRect, SelectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match &self.script {
            SelectScript::Rect(rect) => Ok(*rect),
            SelectScript::Fail(e) => Err(e.clone()),
            SelectScript::Hang => std::future::pending().await,
        }
    }
}

pub struct FakeEngine {
    fragments: Vec<Fragment>,
    panic: bool,
    pub calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new(fragments: Vec<Fragment>) -> Arc<Self> {
        Arc::new(Self {
            fragments,
            panic: false,
            calls: AtomicUsize::new(0),
        })
    }

    /// "def" and "foo():" on one line, as seen after the x2 upscale
    pub fn def_foo() -> Arc<Self> {
        Self::new(vec![
            Fragment::new("foo():", BoundingBox::new(60, 20, 96, 30), 0.8),
            Fragment::new("def", BoundingBox::new(10, 22, 48, 28), 1.0),
        ])
    }

    pub fn panicking() -> Arc<Self> {
        Arc::new(Self {
            fragments: Vec::new(),
            panic: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognitionEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn detect(&self, _image: &DynamicImage) -> Result<Vec<Fragment>, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic {
            panic!("engine blew up");
        }
        Ok(self.fragments.clone())
    }
}

pub struct FakeClipboard {
    fail: bool,
    pub contents: Mutex<Option<String>>,
}

impl FakeClipboard {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            contents: Mutex::new(None),
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            contents: Mutex::new(None),
        })
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClipboardMechanism for FakeClipboard {
    fn name(&self) -> &str {
        "fake-clipboard"
    }

    async fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        if self.fail {
            return Err(ClipboardError::Missing("fake-clipboard".to_string()));
        }
        *self.contents.lock().unwrap() = Some(text.to_string());
        Ok(())
    }
}

pub fn timeouts() -> Timeouts {
    Timeouts {
        capture: Duration::from_millis(300),
        selector: Duration::from_millis(300),
    }
}

pub fn coordinator(
    capture: Arc<FakeCapture>,
    selector: Arc<FakeSelector>,
    engine: Arc<FakeEngine>,
    clipboard: Arc<FakeClipboard>,
) -> Coordinator {
    let options = PipelineOptions {
        preprocess: true,
        code_aware: true,
        timeout: Duration::from_secs(2),
    };

    Coordinator::new(
        Stages {
            capture,
            selector,
            pipeline: RecognitionPipeline::new(engine, options),
            sink: DeliverySink::new(clipboard),
        },
        timeouts(),
    )
}
