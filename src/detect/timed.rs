use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::detect::stage::{Annotated, DetectionStage, StageOptions};
use crate::error::PipelineError;

/// Stage shared between runs. Only one detection thread holds the lock at a time.
pub type SharedStage = Arc<Mutex<DetectionStage>>;

struct Job {
    id: u64,
    jpeg: Vec<u8>,
}

struct JobOutcome {
    id: u64,
    result: anyhow::Result<Annotated>,
}

/// Runs a `DetectionStage` on a dedicated thread and bounds every call.
///
/// A call that overruns `timeout` is reported as `DetectionTimeout` and left
/// running. Until it finishes, later calls fail fast with the same error
/// rather than queueing behind it; its eventual output is discarded.
pub struct TimedDetector {
    jobs: Sender<Job>,
    outcomes: Receiver<JobOutcome>,
    timeout: Duration,
    next_id: u64,
    abandoned: Option<u64>,
}

impl TimedDetector {
    pub fn spawn(stage: SharedStage, options: StageOptions, timeout: Duration) -> std::io::Result<Self> {
        let (jobs_tx, jobs_rx) = bounded::<Job>(1);
        let (outcomes_tx, outcomes_rx) = bounded::<JobOutcome>(1);
        std::thread::Builder::new()
            .name("mjpeg-detect".to_string())
            .spawn(move || {
                for job in jobs_rx {
                    let result = {
                        let mut guard = stage.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                        guard.process(&job.jpeg, &options)
                    };
                    if outcomes_tx.send(JobOutcome { id: job.id, result }).is_err() {
                        return;
                    }
                }
            })?;
        Ok(Self {
            jobs: jobs_tx,
            outcomes: outcomes_rx,
            timeout,
            next_id: 0,
            abandoned: None,
        })
    }

    pub fn detect(&mut self, jpeg: &[u8]) -> Result<Annotated, PipelineError> {
        while let Ok(late) = self.outcomes.try_recv() {
            if self.abandoned == Some(late.id) {
                self.abandoned = None;
            }
        }
        if self.abandoned.is_some() {
            return Err(PipelineError::DetectionTimeout {
                timeout: self.timeout,
            });
        }

        self.next_id += 1;
        let id = self.next_id;
        self.jobs
            .send(Job {
                id,
                jpeg: jpeg.to_vec(),
            })
            .map_err(|_| PipelineError::DetectionStage(anyhow!("detection thread exited")))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.outcomes.recv_timeout(remaining) {
                Ok(outcome) if outcome.id == id => {
                    return outcome.result.map_err(PipelineError::DetectionStage);
                }
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    self.abandoned = Some(id);
                    return Err(PipelineError::DetectionTimeout {
                        timeout: self.timeout,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PipelineError::DetectionStage(anyhow!(
                        "detection thread exited"
                    )));
                }
            }
        }
    }
}
