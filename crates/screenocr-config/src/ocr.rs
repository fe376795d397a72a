use serde::{Deserialize, Serialize};

fn default_command() -> String {
    "tesseract".to_string()
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_page_segmentation() -> u8 {
    6
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OcrConfig {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Tesseract `--psm`; 6 treats the crop as one uniform block
    #[serde(default = "default_page_segmentation")]
    pub page_segmentation: u8,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_enabled")]
    pub preprocess: bool,
    /// Apply code-aware normalization to the recognized text
    #[serde(default = "default_enabled")]
    pub code_aware: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            language: default_language(),
            page_segmentation: default_page_segmentation(),
            timeout_ms: default_timeout_ms(),
            preprocess: default_enabled(),
            code_aware: default_enabled(),
        }
    }
}
