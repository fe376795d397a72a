pub mod clipboard;

use std::sync::Arc;
use std::time::Duration;

use screenocr_config::clipboard::ClipboardConfig;
use screenocr_core::delivery::DeliverySink;

pub use clipboard::{ArboardClipboard, WlCopy};

/// Primary tool from the config, with the in-process clipboard behind it
pub fn delivery_sink(config: &ClipboardConfig) -> DeliverySink {
    let primary = WlCopy::new(
        config.primary.clone(),
        Duration::from_millis(config.timeout_ms),
    );
    let sink = DeliverySink::new(Arc::new(primary));

    if config.fallback {
        sink.with_fallback(Arc::new(ArboardClipboard::new()))
    } else {
        sink
    }
}
