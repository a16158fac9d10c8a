use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for one pipeline run. Written by the worker, read by status queries.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_extracted: AtomicU64,
    frames_processed: AtomicU64,
    frames_published: AtomicU64,
    detections_total: AtomicU64,
    max_detections: AtomicU64,
    malformed_resets: AtomicU64,
    detection_timeouts: AtomicU64,
    detection_failures: AtomicU64,
    reconnects: AtomicU64,
    bytes_read: AtomicU64,
}

/// Point-in-time copy of `PipelineStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_extracted: u64,
    pub frames_processed: u64,
    pub frames_published: u64,
    pub detections_total: u64,
    pub max_detections: u64,
    pub malformed_resets: u64,
    pub detection_timeouts: u64,
    pub detection_failures: u64,
    pub reconnects: u64,
    pub bytes_read: u64,
}

fn bump(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

impl PipelineStats {
    pub fn record_bytes(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_extracted(&self) -> u64 {
        bump(&self.frames_extracted)
    }

    pub fn record_processed(&self) -> u64 {
        bump(&self.frames_processed)
    }

    pub fn record_published(&self, detections: usize) {
        bump(&self.frames_published);
        self.detections_total
            .fetch_add(detections as u64, Ordering::Relaxed);
        self.max_detections
            .fetch_max(detections as u64, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) -> u64 {
        bump(&self.malformed_resets)
    }

    pub fn record_detection_timeout(&self) -> u64 {
        bump(&self.detection_timeouts)
    }

    pub fn record_detection_failure(&self) -> u64 {
        bump(&self.detection_failures)
    }

    pub fn record_reconnect(&self) -> u64 {
        bump(&self.reconnects)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_extracted: self.frames_extracted.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            detections_total: self.detections_total.load(Ordering::Relaxed),
            max_detections: self.max_detections.load(Ordering::Relaxed),
            malformed_resets: self.malformed_resets.load(Ordering::Relaxed),
            detection_timeouts: self.detection_timeouts.load(Ordering::Relaxed),
            detection_failures: self.detection_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_totals_and_peak_detections() {
        let stats = PipelineStats::default();
        stats.record_bytes(100);
        stats.record_bytes(28);
        stats.record_published(3);
        stats.record_published(1);
        assert_eq!(stats.record_reconnect(), 1);
        assert_eq!(stats.record_reconnect(), 2);

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_read, 128);
        assert_eq!(snap.frames_published, 2);
        assert_eq!(snap.detections_total, 4);
        assert_eq!(snap.max_detections, 3);
        assert_eq!(snap.reconnects, 2);
    }
}
