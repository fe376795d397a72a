use async_trait::async_trait;
use screenocr_types::{Geometry, SelectionFailure, SelectionRect};

use crate::capture::CaptureSession;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("selection cancelled")]
    Cancelled,

    #[error("selector did not answer in time")]
    Timeout,

    #[error("selector crashed: {0}")]
    Crashed(String),

    #[error("selector unavailable: {0}")]
    Unavailable(String),
}

impl SelectionError {
    /// `None` for a user cancel, which is not a failure
    pub fn into_failure(self) -> Option<SelectionFailure> {
        match self {
            SelectionError::Cancelled => None,
            SelectionError::Timeout => Some(SelectionFailure::Timeout),
            SelectionError::Crashed(detail) => Some(SelectionFailure::Crashed(detail)),
            SelectionError::Unavailable(detail) => Some(SelectionFailure::Unavailable(detail)),
        }
    }
}

#[async_trait]
pub trait RegionSelector: Send + Sync {
    /// Single-shot: one interactive drag over the captured screen
    async fn select(&self, session: &CaptureSession) -> Result<SelectionRect, SelectionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Press { x: i64, y: i64 },
    Motion { x: i64, y: i64 },
    Release { x: i64, y: i64 },
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging {
        origin: (i64, i64),
        current: (i64, i64),
    },
    Committed(SelectionRect),
    Cancelled,
}

/// Pointer-driven rectangle selection.
///
/// `Idle -> Dragging -> Committed`, or `Cancelled` from either of the first
/// two. Terminal states ignore further input; there is no way back to `Idle`.
#[derive(Debug, Clone)]
pub struct DragSession {
    bounds: Geometry,
    min_size: u32,
    state: DragState,
}

impl DragSession {
    pub fn new(bounds: Geometry, min_size: u32) -> Self {
        Self {
            bounds,
            min_size: min_size.max(1),
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, DragState::Committed(_) | DragState::Cancelled)
    }

    pub fn feed(&mut self, event: PointerEvent) -> DragState {
        self.state = match (self.state, event) {
            (DragState::Committed(_) | DragState::Cancelled, _) => self.state,

            (_, PointerEvent::Cancel) => DragState::Cancelled,

            (DragState::Idle, PointerEvent::Press { x, y }) => DragState::Dragging {
                origin: (x, y),
                current: (x, y),
            },
            (DragState::Idle, _) => DragState::Idle,

            (DragState::Dragging { origin, .. }, PointerEvent::Motion { x, y })
            | (DragState::Dragging { origin, .. }, PointerEvent::Press { x, y }) => {
                DragState::Dragging {
                    origin,
                    current: (x, y),
                }
            }
            (DragState::Dragging { origin, .. }, PointerEvent::Release { x, y }) => {
                self.commit(origin, (x, y))
            }
        };
        self.state
    }

    fn commit(&self, origin: (i64, i64), end: (i64, i64)) -> DragState {
        match SelectionRect::from_corners(origin, end, self.bounds) {
            Some(rect) if rect.width() >= self.min_size && rect.height() >= self.min_size => {
                DragState::Committed(rect)
            }
            _ => {
                tracing::debug!("Drag {origin:?} -> {end:?} too small, treating as cancel");
                DragState::Cancelled
            }
        }
    }

    /// Anything short of a committed rectangle is a cancellation
    pub fn into_selection(self) -> Result<SelectionRect, SelectionError> {
        match self.state {
            DragState::Committed(rect) => Ok(rect),
            _ => Err(SelectionError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> DragSession {
        DragSession::new(Geometry::new(1920, 1080), 1)
    }

    #[test]
    fn test_press_drag_release_commits() {
        let mut drag = session();
        drag.feed(PointerEvent::Press { x: 100, y: 200 });
        drag.feed(PointerEvent::Motion { x: 150, y: 220 });
        let state = drag.feed(PointerEvent::Release { x: 200, y: 250 });

        let rect = SelectionRect::new(100, 200, 100, 50).unwrap();
        assert_eq!(state, DragState::Committed(rect));
        assert_eq!(drag.into_selection(), Ok(rect));
    }

    #[test]
    fn test_escape_during_drag_cancels() {
        let mut drag = session();
        drag.feed(PointerEvent::Press { x: 10, y: 10 });
        drag.feed(PointerEvent::Motion { x: 40, y: 40 });
        assert_eq!(drag.feed(PointerEvent::Cancel), DragState::Cancelled);

        // terminal
        drag.feed(PointerEvent::Press { x: 0, y: 0 });
        drag.feed(PointerEvent::Release { x: 50, y: 50 });
        assert_eq!(drag.into_selection(), Err(SelectionError::Cancelled));
    }

    #[test]
    fn test_zero_area_release_is_cancel() {
        let mut drag = session();
        drag.feed(PointerEvent::Press { x: 300, y: 300 });
        assert_eq!(
            drag.feed(PointerEvent::Release { x: 300, y: 420 }),
            DragState::Cancelled
        );
    }

    #[test]
    fn test_below_minimum_is_cancel() {
        let mut drag = DragSession::new(Geometry::new(800, 600), 5);
        drag.feed(PointerEvent::Press { x: 10, y: 10 });
        assert_eq!(
            drag.feed(PointerEvent::Release { x: 13, y: 40 }),
            DragState::Cancelled
        );
    }

    #[test]
    fn test_release_outside_screen_is_clamped() {
        let mut drag = DragSession::new(Geometry::new(800, 600), 1);
        drag.feed(PointerEvent::Press { x: 700, y: 500 });
        let rect = match drag.feed(PointerEvent::Release { x: 2000, y: -50 }) {
            DragState::Committed(rect) => rect,
            other => panic!("expected commit, got {other:?}"),
        };

        assert_eq!((rect.x(), rect.y(), rect.width(), rect.height()), (700, 0, 100, 500));
        assert!(rect.is_within(Geometry::new(800, 600)));
    }

    #[test]
    fn test_release_without_press_stays_idle() {
        let mut drag = session();
        assert_eq!(drag.feed(PointerEvent::Motion { x: 1, y: 1 }), DragState::Idle);
        assert_eq!(drag.feed(PointerEvent::Release { x: 9, y: 9 }), DragState::Idle);
        assert!(!drag.is_finished());
        assert_eq!(drag.into_selection(), Err(SelectionError::Cancelled));
    }

    #[test]
    fn test_cancel_is_not_a_failure() {
        assert_eq!(SelectionError::Cancelled.into_failure(), None);
        assert_eq!(
            SelectionError::Timeout.into_failure(),
            Some(SelectionFailure::Timeout)
        );
    }
}
