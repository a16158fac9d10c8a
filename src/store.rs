//! Latest-result hand-off between the pipeline worker and its readers.
//!
//! The store holds at most one `DetectionResult`. Publishing swaps in a new
//! immutable value; readers get an `Arc` to whichever complete value was
//! current at load time, so a frame and its detections always belong to the
//! same sequence number.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::detect::Detection;
use crate::pipeline::PipelineState;

/// One published frame with its detections.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// JPEG bytes, annotated when detection succeeded.
    pub encoded_frame: Vec<u8>,
    pub detections: Vec<Detection>,
    pub sequence_number: u64,
    pub captured_at: DateTime<Utc>,
    /// False when detection timed out or failed and the raw frame was published.
    pub annotated: bool,
    captured_instant: Instant,
}

impl DetectionResult {
    pub fn new(
        encoded_frame: Vec<u8>,
        detections: Vec<Detection>,
        sequence_number: u64,
        annotated: bool,
    ) -> Self {
        Self {
            encoded_frame,
            detections,
            sequence_number,
            captured_at: Utc::now(),
            annotated,
            captured_instant: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.captured_instant.elapsed()
    }
}

/// Single-slot, many-reader holder of the most recent result.
#[derive(Debug, Default)]
pub struct LatestResultStore {
    current: ArcSwapOption<DetectionResult>,
}

impl LatestResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current value.
    ///
    /// Results must be published with strictly increasing sequence numbers
    /// until the next `clear`; an out-of-order result is dropped and `false`
    /// is returned.
    pub fn publish(&self, result: DetectionResult) -> bool {
        if let Some(current) = &*self.current.load() {
            if result.sequence_number <= current.sequence_number {
                log::warn!(
                    "dropping out-of-order result #{} (current #{})",
                    result.sequence_number,
                    current.sequence_number
                );
                return false;
            }
        }
        self.current.store(Some(Arc::new(result)));
        true
    }

    pub fn read(&self) -> Option<Arc<DetectionResult>> {
        self.current.load_full()
    }

    /// Like `read`, but treats results older than `max_age` as absent.
    pub fn read_fresh(&self, max_age: Option<Duration>) -> Option<Arc<DetectionResult>> {
        let result = self.read()?;
        match max_age {
            Some(max_age) if result.age() > max_age => None,
            _ => Some(result),
        }
    }

    pub fn clear(&self) {
        self.current.store(None);
    }
}

/// What a polling client receives.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSnapshot {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoded_frame: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detections: Option<Vec<Detection>>,
    pub detection_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    pub state: PipelineState,
}

impl FrameSnapshot {
    pub fn new(result: Option<&DetectionResult>, state: PipelineState) -> Self {
        match result {
            Some(result) => Self {
                available: true,
                encoded_frame: Some(
                    base64::engine::general_purpose::STANDARD.encode(&result.encoded_frame),
                ),
                detections: Some(result.detections.clone()),
                detection_count: result.detections.len(),
                sequence_number: Some(result.sequence_number),
                captured_at: Some(result.captured_at),
                state,
            },
            None => Self {
                available: false,
                encoded_frame: None,
                detections: None,
                detection_count: 0,
                sequence_number: None,
                captured_at: None,
                state,
            },
        }
    }
}
