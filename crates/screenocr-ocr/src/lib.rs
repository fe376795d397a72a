mod hotkey;
mod portal;
mod selector;
mod tesseract;

pub use hotkey::{HotkeyManager, listen as listen_hotkey, to_hotkey};
pub use portal::{PortalCapture, uri_to_path};
pub use selector::{CommandSelector, parse_geometry};
pub use tesseract::{TesseractEngine, parse_tsv};
