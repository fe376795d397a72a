use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use image::DynamicImage;
use screenocr_types::{CaptureFailure, Geometry};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("screenshot request was denied")]
    Denied,

    #[error("screenshot request timed out")]
    Timeout,

    #[error("screenshot service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("unusable screenshot response: {0}")]
    InvalidResponse(String),
}

impl CaptureError {
    pub fn into_failure(self) -> CaptureFailure {
        match self {
            CaptureError::Denied => CaptureFailure::Denied,
            CaptureError::Timeout => CaptureFailure::Timeout,
            CaptureError::ServiceUnavailable(detail) => CaptureFailure::ServiceUnavailable(detail),
            CaptureError::InvalidResponse(detail) => {
                CaptureFailure::ServiceUnavailable(format!("invalid response: {detail}"))
            }
        }
    }
}

/// One full-screen capture, alive from acquisition until it is released
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub id: Uuid,
    pub geometry: Geometry,
    pub image: Arc<DynamicImage>,
    /// Backing file handed out by the capture service, if any
    pub image_path: Option<PathBuf>,
    pub expires_at: Option<Instant>,
}

impl CaptureSession {
    pub fn new(image: DynamicImage) -> Self {
        let geometry = Geometry::new(image.width(), image.height());
        Self {
            id: Uuid::new_v4(),
            geometry,
            image: Arc::new(image),
            image_path: None,
            expires_at: None,
        }
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.image_path = Some(path);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.expires_at = Some(deadline);
        self
    }
}

#[async_trait]
pub trait CaptureService: Send + Sync {
    /// Ask the capture service for the whole screen
    async fn request_full_screen(&self) -> Result<CaptureSession, CaptureError>;

    /// Free everything the session holds. Called exactly once per session.
    fn release(&self, session: &CaptureSession);
}

/// Owns a session for the length of one cycle and releases it on drop,
/// whichever way the cycle ends.
pub struct SessionGuard {
    service: Arc<dyn CaptureService>,
    session: CaptureSession,
    released: bool,
}

impl SessionGuard {
    pub fn new(service: Arc<dyn CaptureService>, session: CaptureSession) -> Self {
        tracing::debug!("Capture session {} acquired", session.id);
        Self {
            service,
            session,
            released: false,
        }
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.service.release(&self.session);
        tracing::debug!("Capture session {} released", self.session.id);
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
