//! The streaming run loop.
//!
//! One `StreamWorker` drives one run: connect, stream frames through the
//! extractor and detector into the store, and on a drop back off and
//! reconnect until the budget runs out or the run is cancelled.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::config::{PipelineConfig, SourceSpec};
use crate::detect::{SharedStage, StageOptions, TimedDetector};
use crate::error::PipelineError;
use crate::ingest::{ByteStream, ChunkEvent, ChunkReader, Connector, Extracted, FrameExtractor};
use crate::store::DetectionResult;

use super::cancel::CancelToken;
use super::controller::Shared;
use super::state::PipelineState;
use super::stats::PipelineStats;

/// Upper bound on how long the worker waits for a chunk before re-checking
/// its cancel token.
const CHUNK_POLL: Duration = Duration::from_millis(50);
const PROGRESS_EVERY: u64 = 30;

/// Inputs for one run, assembled by the controller.
pub(crate) struct RunContext {
    pub shared: Arc<Shared>,
    pub run_id: u64,
    pub cancel: CancelToken,
    pub connector: Arc<dyn Connector>,
    pub stage: SharedStage,
    pub source: SourceSpec,
    pub config: PipelineConfig,
    pub stats: Arc<PipelineStats>,
}

enum Outcome {
    /// The run was stopped or superseded.
    Cancelled,
    /// The stream broke; reconnect if the budget allows. `produced_frames`
    /// is false when the connection never yielded a complete JPEG.
    Dropped {
        error: PipelineError,
        produced_frames: bool,
    },
}

pub(crate) struct StreamWorker {
    ctx: RunContext,
    sequence: u64,
}

impl StreamWorker {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx, sequence: 0 }
    }

    pub fn run(mut self) {
        let options = StageOptions::from_config(&self.ctx.config);
        let mut detector = match TimedDetector::spawn(
            self.ctx.stage.clone(),
            options,
            self.ctx.config.detection_timeout,
        ) {
            Ok(detector) => detector,
            Err(err) => {
                let reason = format!("failed to start detection thread: {}", err);
                log::error!("{}", reason);
                self.fail(reason);
                return;
            }
        };

        let max_attempts = self.ctx.config.max_reconnect_attempts;
        let mut attempts: u32 = 0;
        loop {
            if !self.enter(PipelineState::Connecting) {
                return;
            }
            let connected = self.ctx.connector.connect(&self.ctx.source, &self.ctx.config);
            let failure = match connected {
                Ok(stream) => {
                    if !self.enter(PipelineState::Streaming) {
                        return;
                    }
                    log::info!("streaming from {}", self.ctx.source.url());
                    match self.stream(stream, &mut detector) {
                        Outcome::Cancelled => return,
                        Outcome::Dropped {
                            error,
                            produced_frames,
                        } => {
                            // The budget resets only once a connection has delivered a frame.
                            if !produced_frames {
                                log::warn!(
                                    "{} answered but sent no frame ({})",
                                    self.ctx.source.url(),
                                    error
                                );
                            } else {
                                attempts = 0;
                                if error.is_stream_drop() {
                                    log::warn!("stream from {} dropped: {}", self.ctx.source.url(), error);
                                } else {
                                    log::error!("stream from {} failed: {}", self.ctx.source.url(), error);
                                }
                            }
                            error
                        }
                    }
                }
                Err(err) => {
                    log::warn!("connect attempt failed: {}", err);
                    err
                }
            };
            if self.ctx.cancel.is_cancelled() {
                return;
            }
            self.ctx
                .shared
                .record_error(self.ctx.run_id, failure.to_string());

            if max_attempts > 0 && attempts >= max_attempts {
                let reason = format!(
                    "giving up after {} reconnect attempts: {}",
                    attempts, failure
                );
                log::error!("{}", reason);
                self.fail(reason);
                return;
            }

            attempts += 1;
            let total = self.ctx.stats.record_reconnect();
            if !self.enter(PipelineState::Reconnecting) {
                return;
            }
            log::info!(
                "reconnecting in {:?} (attempt {}{}, {} total)",
                self.ctx.config.reconnect_backoff,
                attempts,
                if max_attempts > 0 {
                    format!("/{}", max_attempts)
                } else {
                    String::new()
                },
                total
            );
            if self.ctx.cancel.sleep(self.ctx.config.reconnect_backoff) {
                return;
            }
        }
    }

    fn enter(&self, next: PipelineState) -> bool {
        !self.ctx.cancel.is_cancelled() && self.ctx.shared.transition(self.ctx.run_id, next)
    }

    fn fail(&self, reason: String) {
        self.ctx
            .shared
            .record_error(self.ctx.run_id, reason.clone());
        self.ctx
            .shared
            .transition(self.ctx.run_id, PipelineState::Failed(reason));
    }

    fn stream(&mut self, stream: ByteStream, detector: &mut TimedDetector) -> Outcome {
        let reader = match ChunkReader::spawn(stream, self.ctx.config.chunk_size) {
            Ok(reader) => reader,
            Err(err) => {
                return Outcome::Dropped {
                    error: PipelineError::Read(err),
                    produced_frames: false,
                }
            }
        };
        let mut extractor = FrameExtractor::new(self.ctx.config.buffer_ceiling_bytes);
        let mut produced_frames = false;
        loop {
            if self.ctx.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            let error = match reader.receiver().recv_timeout(CHUNK_POLL) {
                Ok(ChunkEvent::Data(chunk)) => {
                    self.ctx.stats.record_bytes(chunk.len());
                    if let Some(outcome) =
                        self.consume(&mut extractor, &chunk, detector, &mut produced_frames)
                    {
                        return outcome;
                    }
                    continue;
                }
                Ok(ChunkEvent::Eof) | Err(RecvTimeoutError::Disconnected) => {
                    PipelineError::StreamEnded
                }
                Ok(ChunkEvent::Failed(err)) => PipelineError::Read(err),
                Err(RecvTimeoutError::Timeout) => continue,
            };
            return Outcome::Dropped {
                error,
                produced_frames,
            };
        }
    }

    fn consume(
        &mut self,
        extractor: &mut FrameExtractor,
        chunk: &[u8],
        detector: &mut TimedDetector,
        produced_frames: &mut bool,
    ) -> Option<Outcome> {
        for event in extractor.push(chunk) {
            match event {
                Extracted::Frame(frame) => {
                    *produced_frames = true;
                    if let Some(outcome) = self.handle_frame(frame, detector) {
                        return Some(outcome);
                    }
                }
                Extracted::Malformed { discarded } => {
                    let total = self.ctx.stats.record_malformed();
                    log::warn!(
                        "{} (reset #{})",
                        PipelineError::MalformedStream { discarded },
                        total
                    );
                }
            }
        }
        None
    }

    /// Detect, publish and throttle one frame. Returns an outcome only when
    /// the run must stop streaming.
    fn handle_frame(&mut self, frame: Vec<u8>, detector: &mut TimedDetector) -> Option<Outcome> {
        let extracted = self.ctx.stats.record_extracted();
        let stride = u64::from(self.ctx.config.detect_every_n);
        if (extracted - 1) % stride != 0 {
            return None;
        }
        let processed = self.ctx.stats.record_processed();

        let (encoded_frame, detections, annotated) = match detector.detect(&frame) {
            Ok(out) => (out.jpeg, out.detections, true),
            Err(err) => {
                let total = match &err {
                    PipelineError::DetectionTimeout { .. } => {
                        self.ctx.stats.record_detection_timeout()
                    }
                    _ => self.ctx.stats.record_detection_failure(),
                };
                log::warn!("frame {}: {} ({} so far); publishing raw frame", extracted, err, total);
                (frame, Vec::new(), false)
            }
        };

        self.sequence += 1;
        let detection_count = detections.len();
        let result = DetectionResult::new(encoded_frame, detections, self.sequence, annotated);
        if !self.ctx.shared.publish(self.ctx.run_id, result) {
            return Some(Outcome::Cancelled);
        }
        self.ctx.stats.record_published(detection_count);

        if processed % PROGRESS_EVERY == 0 {
            log::debug!(
                "processed {} frames (#{} published, {} detections)",
                processed,
                self.sequence,
                detection_count
            );
        }

        if self.ctx.cancel.sleep(self.ctx.config.inter_frame_delay) {
            return Some(Outcome::Cancelled);
        }
        None
    }
}
