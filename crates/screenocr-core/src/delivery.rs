use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClipboardError {
    #[error("{0} is not installed")]
    Missing(String),

    #[error("{mechanism} failed: {reason}")]
    Failed { mechanism: String, reason: String },
}

/// One way of putting text on the clipboard
#[async_trait]
pub trait ClipboardMechanism: Send + Sync {
    fn name(&self) -> &str;

    async fn set_text(&self, text: &str) -> Result<(), ClipboardError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub via: String,
    pub fallback_used: bool,
}

/// Both mechanisms failed. The text is handed back so it is not lost.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("clipboard delivery failed: {reason}")]
pub struct DeliveryError {
    pub reason: String,
    pub text: String,
}

pub struct DeliverySink {
    primary: Arc<dyn ClipboardMechanism>,
    fallback: Option<Arc<dyn ClipboardMechanism>>,
}

impl DeliverySink {
    pub fn new(primary: Arc<dyn ClipboardMechanism>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn ClipboardMechanism>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub async fn deliver(&self, text: &str) -> Result<Delivered, DeliveryError> {
        let primary_err = match self.primary.set_text(text).await {
            Ok(()) => {
                return Ok(Delivered {
                    via: self.primary.name().to_string(),
                    fallback_used: false,
                });
            }
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(DeliveryError {
                reason: primary_err.to_string(),
                text: text.to_string(),
            });
        };

        tracing::warn!("{primary_err}, trying {}", fallback.name());

        match fallback.set_text(text).await {
            Ok(()) => Ok(Delivered {
                via: fallback.name().to_string(),
                fallback_used: true,
            }),
            Err(fallback_err) => Err(DeliveryError {
                reason: format!("{primary_err}; {fallback_err}"),
                text: text.to_string(),
            }),
        }
    }
}
