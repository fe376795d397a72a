use std::io::{Cursor, ErrorKind};
use std::process::Stdio;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use screenocr_config::ocr::OcrConfig;
use screenocr_core::layout::{BoundingBox, Fragment};
use screenocr_core::recognition::{RecognitionEngine, RecognitionError};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// TSV level of a single word
const WORD_LEVEL: &str = "5";

/// Tesseract CLI, fed a PNG on stdin, answering in TSV on stdout
pub struct TesseractEngine {
    command: String,
    language: String,
    page_segmentation: u8,
}

impl TesseractEngine {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            command: config.command.clone(),
            language: config.language.clone(),
            page_segmentation: config.page_segmentation,
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.command);
        command
            .args(["stdin", "stdout", "-l", &self.language, "--psm"])
            .arg(self.page_segmentation.to_string())
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn detect(&self, image: &DynamicImage) -> Result<Vec<Fragment>, RecognitionError> {
        let image = image.clone();
        let png = tokio::task::spawn_blocking(move || {
            let mut bytes = Cursor::new(Vec::new());
            image.write_to(&mut bytes, ImageFormat::Png)?;
            Ok::<_, image::ImageError>(bytes.into_inner())
        })
        .await
        .map_err(|e| RecognitionError::InvalidImage(e.to_string()))?
        .map_err(|e| RecognitionError::InvalidImage(e.to_string()))?;

        let mut child = self.command().spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                RecognitionError::EngineUnavailable(format!("{} not found", self.command))
            }
            _ => RecognitionError::EngineUnavailable(format!("{}: {e}", self.command)),
        })?;

        // feed stdin concurrently so a large TSV answer cannot stall the pipe
        let writer = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                let result = stdin.write_all(&png).await;
                drop(stdin);
                result
            })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RecognitionError::EngineUnavailable(e.to_string()))?;

        if let Some(writer) = writer
            && let Ok(Err(e)) = writer.await
        {
            tracing::debug!("Writing image to {} failed: {e}", self.command);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::EngineUnavailable(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let fragments = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        tracing::debug!("{} returned {} words", self.command, fragments.len());
        Ok(fragments)
    }
}

/// Word rows of tesseract's TSV output as fragments
pub fn parse_tsv(tsv: &str) -> Vec<Fragment> {
    tsv.lines()
        .filter_map(|row| {
            let cols: Vec<&str> = row.split('\t').collect();
            if cols.len() < 12 || cols[0] != WORD_LEVEL {
                return None;
            }

            let confidence: f32 = cols[10].trim().parse().ok()?;
            let text = cols[11..].join("\t");
            if confidence < 0.0 || text.trim().is_empty() {
                return None;
            }

            let num = |i: usize| cols[i].trim().parse::<u32>().ok();
            let bbox = BoundingBox::new(num(6)?, num(7)?, num(8)?, num(9)?);

            Some(Fragment::new(text.trim(), bbox, confidence / 100.0))
        })
        .collect()
}
