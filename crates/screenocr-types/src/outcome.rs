use serde::{Deserialize, Serialize};

/// Terminal result of one hotkey-to-clipboard cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleOutcome {
    Success { text: String },
    Cancelled,
    CaptureFailed { reason: CaptureFailure },
    SelectionFailed { reason: SelectionFailure },
    RecognitionFailed { reason: RecognitionFailure },
    /// The text survives here so it can be copied by hand
    DeliveryFailed { reason: String, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureFailure {
    Denied,
    Timeout,
    ServiceUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionFailure {
    Timeout,
    Crashed(String),
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionFailure {
    EngineUnavailable(String),
    EngineTimeout,
    NoTextFound,
    InvalidImage(String),
}

/// What outlives a cycle on disk. Carries no recognized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub kind: String,
    pub message: String,
    pub fault: bool,
}

impl From<&CycleOutcome> for OutcomeSummary {
    fn from(outcome: &CycleOutcome) -> Self {
        Self {
            kind: outcome.kind().to_string(),
            message: outcome.message(),
            fault: outcome.is_fault(),
        }
    }
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Success { .. })
    }

    /// Variant name as it appears in serialized form
    pub fn kind(&self) -> &'static str {
        match self {
            CycleOutcome::Success { .. } => "success",
            CycleOutcome::Cancelled => "cancelled",
            CycleOutcome::CaptureFailed { .. } => "capture_failed",
            CycleOutcome::SelectionFailed { .. } => "selection_failed",
            CycleOutcome::RecognitionFailed { .. } => "recognition_failed",
            CycleOutcome::DeliveryFailed { .. } => "delivery_failed",
        }
    }

    /// Short user-facing description
    pub fn message(&self) -> String {
        match self {
            CycleOutcome::Success { text } => {
                let lines = text.lines().count().max(1);
                format!("copied {} characters ({lines} lines)", text.chars().count())
            }
            CycleOutcome::Cancelled => "selection cancelled".to_string(),
            CycleOutcome::CaptureFailed { reason } => match reason {
                CaptureFailure::Denied => "no screenshot permission".to_string(),
                CaptureFailure::Timeout => "screenshot request timed out".to_string(),
                CaptureFailure::ServiceUnavailable(_) => {
                    "screenshot service unavailable".to_string()
                }
            },
            CycleOutcome::SelectionFailed { reason } => match reason {
                SelectionFailure::Timeout => "region selection timed out".to_string(),
                SelectionFailure::Crashed(_) => "region selector crashed".to_string(),
                SelectionFailure::Unavailable(_) => "region selector not available".to_string(),
            },
            CycleOutcome::RecognitionFailed { reason } => match reason {
                RecognitionFailure::NoTextFound => "no text detected".to_string(),
                RecognitionFailure::EngineUnavailable(_) => {
                    "text recognition engine unavailable".to_string()
                }
                RecognitionFailure::EngineTimeout => "text recognition timed out".to_string(),
                RecognitionFailure::InvalidImage(_) => "captured image unusable".to_string(),
            },
            CycleOutcome::DeliveryFailed { .. } => {
                "clipboard write failed, text logged for manual copy".to_string()
            }
        }
    }

    /// Underlying detail for logs, when there is one
    pub fn detail(&self) -> Option<&str> {
        match self {
            CycleOutcome::CaptureFailed {
                reason: CaptureFailure::ServiceUnavailable(detail),
            }
            | CycleOutcome::SelectionFailed {
                reason: SelectionFailure::Crashed(detail) | SelectionFailure::Unavailable(detail),
            }
            | CycleOutcome::RecognitionFailed {
                reason:
                    RecognitionFailure::EngineUnavailable(detail)
                    | RecognitionFailure::InvalidImage(detail),
            }
            | CycleOutcome::DeliveryFailed { reason: detail, .. } => Some(detail.as_str()),
            _ => None,
        }
    }

    /// `NoTextFound` and user cancellation are clean, non-fault endings
    pub fn is_fault(&self) -> bool {
        !matches!(
            self,
            CycleOutcome::Success { .. }
                | CycleOutcome::Cancelled
                | CycleOutcome::RecognitionFailed {
                    reason: RecognitionFailure::NoTextFound
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_specific() {
        let denied = CycleOutcome::CaptureFailed {
            reason: CaptureFailure::Denied,
        };
        assert_eq!(denied.message(), "no screenshot permission");

        let empty = CycleOutcome::RecognitionFailed {
            reason: RecognitionFailure::NoTextFound,
        };
        assert_eq!(empty.message(), "no text detected");
        assert!(!empty.is_fault());

        let success = CycleOutcome::Success {
            text: "def foo():".to_string(),
        };
        assert_eq!(success.message(), "copied 10 characters (1 lines)");
        assert!(success.is_success());
    }

    #[test]
    fn test_delivery_failure_keeps_text() {
        let outcome = CycleOutcome::DeliveryFailed {
            reason: "wl-copy: not found".to_string(),
            text: "hello".to_string(),
        };
        assert!(outcome.is_fault());
        assert_eq!(outcome.detail(), Some("wl-copy: not found"));

        let json = serde_json::to_string(&outcome).unwrap();
        let back: CycleOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_summary_leaves_the_text_behind() {
        let outcome = CycleOutcome::DeliveryFailed {
            reason: "wl-copy: not found".to_string(),
            text: "hunter2".to_string(),
        };
        let summary = OutcomeSummary::from(&outcome);

        assert_eq!(summary.kind, "delivery_failed");
        assert!(summary.fault);
        assert!(!serde_json::to_string(&summary).unwrap().contains("hunter2"));
    }
}
