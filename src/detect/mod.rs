mod annotate;
mod backend;
pub mod backends;
mod result;
mod stage;
mod timed;

pub use annotate::{decode_jpeg, draw_detections, encode_jpeg};
pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Detection};
pub use stage::{Annotated, DetectionStage, StageOptions};
pub use timed::{SharedStage, TimedDetector};
