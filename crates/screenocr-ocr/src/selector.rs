use std::io::ErrorKind;
use std::process::Stdio;

use async_trait::async_trait;
use screenocr_config::selector::SelectorConfig;
use screenocr_core::capture::CaptureSession;
use screenocr_core::selection::{DragSession, PointerEvent, RegionSelector, SelectionError};
use screenocr_types::SelectionRect;
use tokio::process::Command;

const IMAGE_PLACEHOLDER: &str = "{image}";

/// Runs an external interactive selector (slurp by default) and reads
/// `X,Y WxH` from its stdout.
///
/// The child is killed if the returned future is dropped, which is how the
/// cycle watchdog tears down a hung selector.
pub struct CommandSelector {
    command: Vec<String>,
    cancel_exit_code: i32,
    min_size: u32,
}

impl CommandSelector {
    pub fn from_config(config: &SelectorConfig) -> Self {
        Self {
            command: config.command.clone(),
            cancel_exit_code: config.cancel_exit_code,
            min_size: config.min_size,
        }
    }

    fn build_command(&self, session: &CaptureSession) -> Result<Command, SelectionError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| SelectionError::Unavailable("selector command is empty".into()))?;

        let image_path = session.image_path.as_ref().map(|p| p.display().to_string());

        let mut command = Command::new(program);
        for arg in args {
            if arg.contains(IMAGE_PLACEHOLDER) {
                let path = image_path.as_deref().ok_or_else(|| {
                    SelectionError::Unavailable("selector needs an image file".into())
                })?;
                command.arg(arg.replace(IMAGE_PLACEHOLDER, path));
            } else {
                command.arg(arg);
            }
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }
}

#[async_trait]
impl RegionSelector for CommandSelector {
    async fn select(&self, session: &CaptureSession) -> Result<SelectionRect, SelectionError> {
        let mut command = self.build_command(session)?;
        let program = self.command.first().cloned().unwrap_or_default();

        let child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => SelectionError::Unavailable(format!("{program} not found")),
            _ => SelectionError::Crashed(format!("failed to start {program}: {e}")),
        })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SelectionError::Crashed(format!("{program}: {e}")))?;

        if !output.status.success() {
            return match output.status.code() {
                Some(code) if code == self.cancel_exit_code => Err(SelectionError::Cancelled),
                Some(code) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(SelectionError::Crashed(format!(
                        "{program} exited with {code}: {}",
                        stderr.trim()
                    )))
                }
                None => Err(SelectionError::Crashed(format!(
                    "{program} terminated by signal"
                ))),
            };
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some((x, y, width, height)) = parse_geometry(&stdout) else {
            if stdout.trim().is_empty() {
                return Err(SelectionError::Cancelled);
            }
            return Err(SelectionError::Crashed(format!(
                "unreadable selection '{}'",
                stdout.trim()
            )));
        };

        let mut drag = DragSession::new(session.geometry, self.min_size);
        drag.feed(PointerEvent::Press { x, y });
        drag.feed(PointerEvent::Release {
            x: x.saturating_add(width),
            y: y.saturating_add(height),
        });
        drag.into_selection()
    }
}

/// `X,Y WxH`, as printed by `slurp -f "%x,%y %wx%h"`
pub fn parse_geometry(output: &str) -> Option<(i64, i64, i64, i64)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (position, size) = line.split_once(' ')?;
    let (x, y) = position.split_once(',')?;
    let (w, h) = size.trim().split_once('x')?;

    let parse = |s: &str| s.trim().parse::<i64>().ok();
    let (width, height) = (parse(w)?, parse(h)?);
    if width < 0 || height < 0 {
        return None;
    }
    Some((parse(x)?, parse(y)?, width, height))
}

#[cfg(test)]
mod tests {
    use image::DynamicImage;

    use super::*;

    fn selector(command: &[&str]) -> CommandSelector {
        CommandSelector {
            command: command.iter().map(|s| s.to_string()).collect(),
            cancel_exit_code: 1,
            min_size: 1,
        }
    }

    fn session() -> CaptureSession {
        CaptureSession::new(DynamicImage::new_rgb8(1920, 1080))
    }

    #[test]
    fn test_parse_geometry() {
        assert_eq!(parse_geometry("10,20 300x40\n"), Some((10, 20, 300, 40)));
        assert_eq!(parse_geometry("\n-5,7 1x1"), Some((-5, 7, 1, 1)));
        assert_eq!(parse_geometry("10,20"), None);
        assert_eq!(parse_geometry("a,b cxd"), None);
        assert_eq!(parse_geometry(""), None);
    }

    #[tokio::test]
    async fn test_selection_read_from_stdout() {
        let rect = selector(&["echo", "100,200 100x50"])
            .select(&session())
            .await
            .unwrap();
        assert_eq!(rect, SelectionRect::new(100, 200, 100, 50).unwrap());
    }

    #[tokio::test]
    async fn test_selection_clamped_to_screen() {
        let rect = selector(&["echo", "1900,1000 100x100"])
            .select(&session())
            .await
            .unwrap();
        assert_eq!(rect, SelectionRect::new(1900, 1000, 20, 80).unwrap());
    }

    #[tokio::test]
    async fn test_huge_coordinates_clamp_instead_of_overflowing() {
        let result = selector(&["echo", "9223372036854775807,0 1x1"])
            .select(&session())
            .await;
        // collapses against the right edge
        assert_eq!(result, Err(SelectionError::Cancelled));

        let rect = selector(&["echo", "1910,1070 9223372036854775807x9223372036854775807"])
            .select(&session())
            .await
            .unwrap();
        assert_eq!(rect, SelectionRect::new(1910, 1070, 10, 10).unwrap());
    }

    #[tokio::test]
    async fn test_zero_area_is_cancelled() {
        let result = selector(&["echo", "10,10 0x50"]).select(&session()).await;
        assert_eq!(result, Err(SelectionError::Cancelled));
    }

    #[tokio::test]
    async fn test_escape_exit_code_is_cancelled() {
        let result = selector(&["sh", "-c", "exit 1"]).select(&session()).await;
        assert_eq!(result, Err(SelectionError::Cancelled));
    }

    #[tokio::test]
    async fn test_other_failure_is_crash() {
        let result = selector(&["sh", "-c", "echo boom >&2; exit 3"])
            .select(&session())
            .await;
        assert!(matches!(result, Err(SelectionError::Crashed(msg)) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let result = selector(&["screenocr-no-such-selector"])
            .select(&session())
            .await;
        assert!(matches!(result, Err(SelectionError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_image_placeholder_needs_a_file() {
        let result = selector(&["echo", "{image}"]).select(&session()).await;
        assert!(matches!(result, Err(SelectionError::Unavailable(_))));

        let session = session().with_path("/tmp/shot.png".into());
        let result = selector(&["sh", "-c", "test \"$0\" = /tmp/shot.png && echo '1,1 5x5'", "{image}"])
            .select(&session)
            .await;
        assert_eq!(result, Ok(SelectionRect::new(1, 1, 5, 5).unwrap()));
    }

    #[tokio::test]
    async fn test_dropping_the_future_kills_the_child() {
        let selector = selector(&["sleep", "30"]);
        let session = session();
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(100), selector.select(&session))
                .await;
        assert!(result.is_err());
    }
}
