use std::time::Duration;

use thiserror::Error;

/// Failures observed by the streaming pipeline.
///
/// Only connect failures can end a run (after the reconnect budget is spent).
/// Everything else is recovered inside the worker loop and counted.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("{url} answered with HTTP {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("no frame boundary within {discarded} buffered bytes; buffer reset")]
    MalformedStream { discarded: usize },
    #[error("detection did not finish within {timeout:?}")]
    DetectionTimeout { timeout: Duration },
    #[error("detection stage failed: {0:#}")]
    DetectionStage(anyhow::Error),
    #[error("stream ended")]
    StreamEnded,
    #[error("stream read failed: {0}")]
    Read(#[from] std::io::Error),
}

impl PipelineError {
    /// True for failures that happen while opening the source.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::HttpStatus { .. })
    }

    /// True for failures that drop an established stream.
    pub fn is_stream_drop(&self) -> bool {
        matches!(self, Self::StreamEnded | Self::Read(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_connect_and_drop_failures() {
        let status = PipelineError::HttpStatus {
            url: "http://cam/stream".to_string(),
            status: 401,
        };
        assert!(status.is_connect_failure());
        assert!(!status.is_stream_drop());
        assert!(PipelineError::StreamEnded.is_stream_drop());
        assert!(!PipelineError::MalformedStream { discarded: 10 }.is_connect_failure());
        assert_eq!(status.to_string(), "http://cam/stream answered with HTTP 401");
    }
}
