//! mjpeg-watch
//!
//! Watches an MJPEG camera stream over HTTP, runs object detection on the
//! frames, and keeps the most recent annotated frame available for polling.
//!
//! # Architecture
//!
//! One background worker per pipeline owns the connection and the frame
//! buffer. Everything else talks to it through [`LifecycleController`]:
//!
//! 1. **Ingest**: `HttpConnector` opens the stream; `ChunkReader` moves socket
//!    reads off the worker; `FrameExtractor` cuts JPEGs out of the byte flow.
//! 2. **Detect**: `TimedDetector` runs the `DetectionStage` (decode, backend,
//!    filter, annotate, re-encode) with a per-frame deadline.
//! 3. **Publish**: results land in `LatestResultStore`, an atomic single slot
//!    that any number of readers can poll without blocking the worker.
//!
//! Only connect failures past the reconnect budget end a run. Malformed data,
//! detection timeouts and detector errors are recovered in place and counted.
//!
//! # Module Structure
//!
//! - `config`: pipeline knobs, stream source, daemon config loading
//! - `ingest`: connector, chunk reader, JPEG extractor
//! - `detect`: backend trait, detection stage, timeout wrapper, backends
//! - `store`: latest-result store and the polling snapshot
//! - `pipeline`: state machine, worker loop, lifecycle controller

pub mod config;
pub mod detect;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod store;

pub use config::{Credentials, DetectorSettings, PipelineConfig, SourceSpec, WatchConfig};
pub use detect::{
    Annotated, BoundingBox, Detection, DetectionStage, DetectorBackend, SharedStage, StageOptions,
    StubBackend, TimedDetector,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use error::PipelineError;
pub use ingest::{ByteStream, Connector, Extracted, FrameExtractor, HttpConnector};
pub use pipeline::{LifecycleController, PipelineState, StatsSnapshot, StatusReport};
pub use store::{DetectionResult, FrameSnapshot, LatestResultStore};

use std::sync::{Arc, Mutex};

/// Wrap a stage so it can be handed to a `LifecycleController`.
pub fn shared_stage(stage: DetectionStage) -> SharedStage {
    Arc::new(Mutex::new(stage))
}
