//! Stream ingestion.
//!
//! - `http`: opens the camera stream (`Connector`, `HttpConnector`)
//! - `reader`: moves blocking socket reads onto a dedicated thread
//! - `extractor`: rebuilds JPEG frames from arbitrary chunks
//!
//! Buffers and frames produced here belong to the pipeline worker and are
//! never shared with readers of the result store.

pub mod extractor;
pub mod http;
pub mod reader;

pub use extractor::{Extracted, FrameExtractor};
pub use http::{ByteStream, Connector, HttpConnector};
pub use reader::{ChunkEvent, ChunkReader};
