pub mod capture;
pub mod delivery;
pub mod layout;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod recognition;
pub mod selection;

pub use capture::{CaptureError, CaptureService, CaptureSession, SessionGuard};
pub use delivery::{ClipboardError, ClipboardMechanism, Delivered, DeliveryError, DeliverySink};
pub use layout::{BoundingBox, Fragment};
pub use pipeline::{PipelineOptions, RecognitionPipeline};
pub use recognition::{RecognitionEngine, RecognitionError, RecognitionResult};
pub use selection::{DragSession, DragState, PointerEvent, RegionSelector, SelectionError};
