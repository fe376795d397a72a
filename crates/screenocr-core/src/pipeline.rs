use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use screenocr_config::ocr::OcrConfig;
use screenocr_types::SelectionRect;

use crate::layout::{self, Fragment};
use crate::postprocess;
use crate::preprocess::{DefaultPreprocessor, Passthrough, Preprocessed, Preprocessor};
use crate::recognition::{RecognitionEngine, RecognitionError, RecognitionResult};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub preprocess: bool,
    pub code_aware: bool,
    pub timeout: Duration,
}

impl From<&OcrConfig> for PipelineOptions {
    fn from(config: &OcrConfig) -> Self {
        Self {
            preprocess: config.preprocess,
            code_aware: config.code_aware,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// crop -> preprocess -> engine -> reading order -> normalization
pub struct RecognitionPipeline {
    engine: Arc<dyn RecognitionEngine>,
    preprocessor: Arc<dyn Preprocessor>,
    options: PipelineOptions,
}

impl RecognitionPipeline {
    pub fn new(engine: Arc<dyn RecognitionEngine>, options: PipelineOptions) -> Self {
        let preprocessor: Arc<dyn Preprocessor> = if options.preprocess {
            Arc::new(DefaultPreprocessor)
        } else {
            Arc::new(Passthrough)
        };

        Self {
            engine,
            preprocessor,
            options,
        }
    }

    pub async fn recognize(
        &self,
        image: Arc<DynamicImage>,
        rect: SelectionRect,
    ) -> Result<RecognitionResult, RecognitionError> {
        let bounds = screenocr_types::Geometry::new(image.width(), image.height());
        if !rect.is_within(bounds) {
            return Err(RecognitionError::InvalidImage(format!(
                "selection {rect} outside {}x{} capture",
                bounds.width, bounds.height
            )));
        }

        let preprocessor = self.preprocessor.clone();
        let Preprocessed {
            image: prepared,
            scale,
        } = tokio::task::spawn_blocking(move || {
            let crop = image.crop_imm(rect.x(), rect.y(), rect.width(), rect.height());
            preprocessor.process(&crop)
        })
        .await
        .map_err(|e| RecognitionError::InvalidImage(format!("preprocessing failed: {e}")))?;

        tracing::debug!(
            "Running {} on {}x{} (scale {scale})",
            self.engine.name(),
            prepared.width(),
            prepared.height()
        );

        let detections = tokio::time::timeout(self.options.timeout, self.engine.detect(&prepared))
            .await
            .map_err(|_| RecognitionError::EngineTimeout)??;

        let boxes: Vec<Fragment> = detections
            .into_iter()
            .filter(|f| !f.text.trim().is_empty())
            .map(|f| Fragment {
                bbox: f.bbox.unscale(scale),
                ..f
            })
            .collect();

        if boxes.is_empty() {
            return Err(RecognitionError::NoTextFound);
        }

        let text = if self.options.code_aware {
            postprocess::normalize_code(&layout::reassemble(&boxes, rect.width()))
        } else {
            layout::reading_order(&boxes)
        };
        let text = postprocess::clean_text(&text);

        if text.trim().is_empty() {
            return Err(RecognitionError::NoTextFound);
        }

        Ok(RecognitionResult {
            confidence: layout::aggregate_confidence(&boxes),
            text,
            boxes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::layout::BoundingBox;

    struct ScriptedEngine {
        fragments: Vec<Fragment>,
        seen: Mutex<Vec<(u32, u32)>>,
        delay: Duration,
    }

    impl ScriptedEngine {
        fn new(fragments: Vec<Fragment>) -> Self {
            Self {
                fragments,
                seen: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl RecognitionEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn detect(&self, image: &DynamicImage) -> Result<Vec<Fragment>, RecognitionError> {
            self.seen.lock().unwrap().push((image.width(), image.height()));
            tokio::time::sleep(self.delay).await;
            Ok(self.fragments.clone())
        }
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            preprocess: true,
            code_aware: true,
            timeout: Duration::from_secs(2),
        }
    }

    fn screen() -> Arc<DynamicImage> {
        Arc::new(DynamicImage::new_rgb8(400, 300))
    }

    #[tokio::test]
    async fn test_def_foo_on_one_line() {
        // engine sees the crop upscaled x2
        let engine = Arc::new(ScriptedEngine::new(vec![
            Fragment::new("foo():", BoundingBox::new(60, 20, 96, 30), 0.8),
            Fragment::new("def", BoundingBox::new(10, 22, 48, 28), 1.0),
        ]));
        let pipeline = RecognitionPipeline::new(engine.clone(), options());
        let rect = SelectionRect::new(50, 50, 100, 50).unwrap();

        let result = pipeline.recognize(screen(), rect).await.unwrap();

        assert_eq!(result.text, "def foo():");
        assert_eq!(engine.seen.lock().unwrap().as_slice(), &[(200, 100)]);
        assert_eq!(result.boxes[0].bbox, BoundingBox::new(30, 10, 48, 15));
        let expected = (6.0 * 0.8 + 3.0 * 1.0) / 9.0;
        assert!((result.confidence - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_empty_detections_are_no_text() {
        let engine = Arc::new(ScriptedEngine::new(vec![Fragment::new(
            "   ",
            BoundingBox::new(0, 0, 5, 5),
            0.3,
        )]));
        let pipeline = RecognitionPipeline::new(engine, options());
        let rect = SelectionRect::new(0, 0, 10, 10).unwrap();

        assert_eq!(
            pipeline.recognize(screen(), rect).await,
            Err(RecognitionError::NoTextFound)
        );
    }

    #[tokio::test]
    async fn test_slow_engine_times_out() {
        let mut engine = ScriptedEngine::new(vec![]);
        engine.delay = Duration::from_millis(500);
        let mut opts = options();
        opts.timeout = Duration::from_millis(20);

        let pipeline = RecognitionPipeline::new(Arc::new(engine), opts);
        let rect = SelectionRect::new(0, 0, 10, 10).unwrap();

        assert_eq!(
            pipeline.recognize(screen(), rect).await,
            Err(RecognitionError::EngineTimeout)
        );
    }

    #[tokio::test]
    async fn test_rect_outside_capture_is_invalid() {
        let pipeline = RecognitionPipeline::new(Arc::new(ScriptedEngine::new(vec![])), options());
        let rect = SelectionRect::new(390, 0, 20, 10).unwrap();

        assert!(matches!(
            pipeline.recognize(screen(), rect).await,
            Err(RecognitionError::InvalidImage(_))
        ));
    }

    #[tokio::test]
    async fn test_without_preprocessing_engine_sees_raw_crop() {
        let engine = Arc::new(ScriptedEngine::new(vec![Fragment::new(
            "hello",
            BoundingBox::new(0, 0, 40, 10),
            0.9,
        )]));
        let mut opts = options();
        opts.preprocess = false;
        opts.code_aware = false;

        let pipeline = RecognitionPipeline::new(engine.clone(), opts);
        let rect = SelectionRect::new(10, 10, 64, 32).unwrap();
        let result = pipeline.recognize(screen(), rect).await.unwrap();

        assert_eq!(result.text, "hello");
        assert_eq!(engine.seen.lock().unwrap().as_slice(), &[(64, 32)]);
    }

    #[tokio::test]
    async fn test_plain_mode_keeps_symbols() {
        let engine = Arc::new(ScriptedEngine::new(vec![Fragment::new(
            "E = mc\u{00B2} \u{2014} 5 \u{338F}",
            BoundingBox::new(0, 0, 80, 10),
            0.9,
        )]));
        let mut opts = options();
        opts.code_aware = false;

        let pipeline = RecognitionPipeline::new(engine, opts);
        let rect = SelectionRect::new(0, 0, 100, 20).unwrap();
        let result = pipeline.recognize(screen(), rect).await.unwrap();

        assert_eq!(result.text, "E = mc\u{00B2} \u{2014} 5 \u{338F}");
    }
}
