use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ashpd::desktop::screenshot::Screenshot;
use async_trait::async_trait;
use image::DynamicImage;
use screenocr_core::capture::{CaptureError, CaptureService, CaptureSession};

const READ_ATTEMPTS: usize = 60;
const READ_DELAY: Duration = Duration::from_millis(50);

/// Full-screen capture through the xdg-desktop-portal Screenshot interface
pub struct PortalCapture {
    /// How long a session may live; the selector watchdog window
    session_ttl: Duration,
}

impl PortalCapture {
    pub fn new(session_ttl: Duration) -> Self {
        Self { session_ttl }
    }
}

#[async_trait]
impl CaptureService for PortalCapture {
    async fn request_full_screen(&self) -> Result<CaptureSession, CaptureError> {
        let uri = request_screenshot().await?;
        tracing::debug!("Portal returned {uri}");

        let file = TempFile::new(uri_to_path(&uri)?);
        let session = load_session(file).await?;

        tracing::info!(
            "Captured {}x{} screen from portal",
            session.geometry.width,
            session.geometry.height
        );

        Ok(session.with_deadline(Instant::now() + self.session_ttl))
    }

    fn release(&self, session: &CaptureSession) {
        if let Some(path) = &session.image_path {
            remove_temp_file(path);
        }
    }
}

async fn request_screenshot() -> Result<String, CaptureError> {
    let request = Screenshot::request()
        .interactive(false)
        .modal(false)
        .send()
        .await
        .map_err(map_portal_error)?;

    let response = request.response().map_err(map_portal_error)?;
    Ok(response.uri().to_string())
}

fn map_portal_error(err: ashpd::Error) -> CaptureError {
    match err {
        ashpd::Error::Response(e) => {
            tracing::debug!("Screenshot request refused: {e}");
            CaptureError::Denied
        }
        other => CaptureError::ServiceUnavailable(other.to_string()),
    }
}

pub fn uri_to_path(uri: &str) -> Result<PathBuf, CaptureError> {
    let url = url::Url::parse(uri)
        .map_err(|e| CaptureError::InvalidResponse(format!("invalid file URI '{uri}': {e}")))?;

    url.to_file_path()
        .map_err(|_| CaptureError::InvalidResponse(format!("not a local file URI: {uri}")))
}

/// Some portals hand out the URI before the file is fully written
async fn read_when_ready(path: &Path) -> Result<Vec<u8>, CaptureError> {
    for attempt in 1..=READ_ATTEMPTS {
        match tokio::fs::read(path).await {
            Ok(bytes) if !bytes.is_empty() => return Ok(bytes),
            Ok(_) => tracing::trace!("{} still empty ({attempt}/{READ_ATTEMPTS})", path.display()),
            Err(e) => tracing::trace!(
                "{} not ready ({attempt}/{READ_ATTEMPTS}): {e}",
                path.display()
            ),
        }
        tokio::time::sleep(READ_DELAY).await;
    }

    Err(CaptureError::InvalidResponse(format!(
        "{} not ready after {READ_ATTEMPTS} attempts",
        path.display()
    )))
}

async fn load_image(path: &Path) -> Result<DynamicImage, CaptureError> {
    let bytes = read_when_ready(path).await?;

    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|e| CaptureError::InvalidResponse(format!("decoder task failed: {e}")))?
        .map_err(|e| CaptureError::InvalidResponse(format!("undecodable screenshot: {e}")))
}

/// The portal's screenshot file, removed on drop until a session owns it
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            remove_temp_file(&self.path);
        }
    }
}

/// Decode the screenshot. Dropping this future part-way removes the file.
async fn load_session(file: TempFile) -> Result<CaptureSession, CaptureError> {
    let image = load_image(&file.path).await?;
    Ok(CaptureSession::new(image).with_path(file.keep()))
}

fn remove_temp_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed portal temp file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {e}", path.display()),
    }
}
