use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arboard::Clipboard;
use async_trait::async_trait;
use screenocr_core::delivery::{ClipboardError, ClipboardMechanism};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// `wl-copy`, fed the text on stdin.
///
/// wl-copy stays in the background to serve the selection, so a process that
/// is still alive when the timeout runs out counts as success.
pub struct WlCopy {
    program: String,
    timeout: Duration,
}

impl WlCopy {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn failed(&self, reason: impl ToString) -> ClipboardError {
        ClipboardError::Failed {
            mechanism: self.program.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ClipboardMechanism for WlCopy {
    fn name(&self) -> &str {
        &self.program
    }

    async fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut child = Command::new(&self.program)
            .args(["--type", "text/plain"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => ClipboardError::Missing(self.program.clone()),
                _ => self.failed(e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| self.failed(e))?;
        }

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(self.failed(format!("exited with {status}"))),
            Ok(Err(e)) => Err(self.failed(e)),
            Err(_) => {
                tracing::debug!("{} still serving the selection", self.program);
                Ok(())
            }
        }
    }
}

/// In-process clipboard. The handle is kept for the life of the daemon so
/// the selection survives after `set_text` returns.
#[derive(Default)]
pub struct ArboardClipboard {
    inner: Arc<Mutex<Option<Clipboard>>>,
}

impl ArboardClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClipboardMechanism for ArboardClipboard {
    fn name(&self) -> &str {
        "arboard"
    }

    async fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        let inner = self.inner.clone();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let mut slot = inner.lock().map_err(|_| "clipboard lock poisoned".to_string())?;
            if slot.is_none() {
                *slot = Some(Clipboard::new().map_err(|e| e.to_string())?);
            }
            let result = match slot.as_mut() {
                Some(clipboard) => clipboard.set_text(text).map_err(|e| e.to_string()),
                None => Err("clipboard unavailable".to_string()),
            };
            if result.is_err() {
                // rebuilt on the next call
                *slot = None;
            }
            result
        })
        .await
        .map_err(|e| e.to_string())
        .and_then(|r| r)
        .map_err(|reason| ClipboardError::Failed {
            mechanism: "arboard".to_string(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_tool_is_reported_as_missing() {
        let wl = WlCopy::new("screenocr-no-such-copy", Duration::from_millis(200));
        assert_eq!(
            wl.set_text("x").await,
            Err(ClipboardError::Missing("screenocr-no-such-copy".into()))
        );
    }

    #[tokio::test]
    async fn test_tool_exiting_zero_is_success() {
        // `true` ignores its arguments and exits 0
        let wl = WlCopy::new("true", Duration::from_secs(2));
        assert_eq!(wl.set_text("hello").await, Ok(()));
    }

    #[tokio::test]
    async fn test_tool_failing_is_an_error() {
        let wl = WlCopy::new("false", Duration::from_secs(2));
        assert!(matches!(
            wl.set_text("hello").await,
            Err(ClipboardError::Failed { .. })
        ));
    }
}
