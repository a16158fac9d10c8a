use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::{PipelineConfig, SourceSpec};
use crate::detect::SharedStage;
use crate::ingest::{Connector, HttpConnector};
use crate::store::{DetectionResult, FrameSnapshot, LatestResultStore};

use super::cancel::CancelToken;
use super::state::{PipelineState, StatusReport};
use super::stats::PipelineStats;
use super::worker::{RunContext, StreamWorker};

/// Everything guarded by the controller lock.
struct ControlState {
    state: PipelineState,
    last_error: Option<String>,
    run_id: u64,
    cancel: Option<CancelToken>,
    worker: Option<JoinHandle<()>>,
    source: Option<String>,
    stale_after: Option<Duration>,
    stats: Arc<PipelineStats>,
}

/// State shared between the controller and its worker.
///
/// Worker transitions and publishes carry the run id they were started with;
/// once a run is stopped or superseded they are rejected, so nothing from an
/// old run can leak into the store after `stop`.
pub(crate) struct Shared {
    control: Mutex<ControlState>,
    store: LatestResultStore,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.control
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move the run to `next`. Returns false when the run is no longer current.
    pub(crate) fn transition(&self, run_id: u64, next: PipelineState) -> bool {
        let mut control = self.lock();
        if control.run_id != run_id || control.state == PipelineState::Stopped {
            return false;
        }
        if control.state != next {
            log::info!("pipeline: {} -> {}", control.state, next);
            control.state = next;
        }
        true
    }

    pub(crate) fn record_error(&self, run_id: u64, message: String) {
        let mut control = self.lock();
        if control.run_id == run_id {
            control.last_error = Some(message);
        }
    }

    /// Publish under the lock so a concurrent `stop` either happens before
    /// (and the result is dropped) or after (and clears it).
    pub(crate) fn publish(&self, run_id: u64, result: DetectionResult) -> bool {
        let control = self.lock();
        if control.run_id != run_id || control.state != PipelineState::Streaming {
            return false;
        }
        self.store.publish(result)
    }
}

/// Start/stop/status facade over one stream pipeline.
///
/// All methods take `&self` and may be called from any thread. None of them
/// wait on the worker beyond acquiring the controller lock.
pub struct LifecycleController {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    stage: SharedStage,
}

impl LifecycleController {
    pub fn new(connector: Arc<dyn Connector>, stage: SharedStage) -> Self {
        Self {
            shared: Arc::new(Shared {
                control: Mutex::new(ControlState {
                    state: PipelineState::Idle,
                    last_error: None,
                    run_id: 0,
                    cancel: None,
                    worker: None,
                    source: None,
                    stale_after: None,
                    stats: Arc::new(PipelineStats::default()),
                }),
                store: LatestResultStore::new(),
            }),
            connector,
            stage,
        }
    }

    /// Controller that reads from HTTP(S) cameras.
    pub fn http(stage: SharedStage) -> Self {
        Self::new(Arc::new(HttpConnector::new()), stage)
    }

    /// Begin a run against `source`.
    ///
    /// While a run is already connecting, streaming or reconnecting this is a
    /// no-op returning the current state. From `Idle`, `Stopped` or `Failed` a
    /// fresh run starts with its sequence numbers and counters reset.
    pub fn start(&self, source: SourceSpec, config: PipelineConfig) -> Result<PipelineState> {
        config.validate().context("invalid pipeline config")?;

        let mut control = self.shared.lock();
        if control.state.is_active() {
            log::info!(
                "pipeline already {}; ignoring start for {}",
                control.state,
                source.url()
            );
            return Ok(control.state.clone());
        }

        if let Some(previous) = control.worker.take() {
            if previous.is_finished() {
                let _ = previous.join();
            }
        }

        control.run_id += 1;
        let cancel = CancelToken::new();
        let stats = Arc::new(PipelineStats::default());
        self.shared.store.clear();

        let ctx = RunContext {
            shared: self.shared.clone(),
            run_id: control.run_id,
            cancel: cancel.clone(),
            connector: self.connector.clone(),
            stage: self.stage.clone(),
            source: source.clone(),
            config: config.clone(),
            stats: stats.clone(),
        };
        let worker = std::thread::Builder::new()
            .name("mjpeg-pipeline".to_string())
            .spawn(move || StreamWorker::new(ctx).run())
            .context("spawn pipeline worker")?;

        log::info!("pipeline: {} -> {} ({})", control.state, PipelineState::Connecting, source.url());
        control.state = PipelineState::Connecting;
        control.last_error = None;
        control.cancel = Some(cancel);
        control.worker = Some(worker);
        control.source = Some(source.url().to_string());
        control.stale_after = config.stale_after;
        control.stats = stats;
        Ok(PipelineState::Connecting)
    }

    /// Stop the current run, if any, and clear the readable result.
    ///
    /// Returns immediately; the worker notices the cancel at its next wait
    /// or chunk boundary and exits on its own. The socket itself is released
    /// by the detached reader thread once its pending read returns, which on
    /// a stalled camera can take up to `read_timeout`. Nothing read in that
    /// window reaches the store.
    pub fn stop(&self) -> PipelineState {
        let mut control = self.shared.lock();
        if let Some(cancel) = control.cancel.take() {
            cancel.cancel();
        }
        if control.state != PipelineState::Stopped {
            log::info!("pipeline: {} -> {}", control.state, PipelineState::Stopped);
        }
        control.state = PipelineState::Stopped;
        self.shared.store.clear();
        if let Some(worker) = control.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
        PipelineState::Stopped
    }

    pub fn status(&self) -> PipelineState {
        self.shared.lock().state.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    pub fn status_report(&self) -> StatusReport {
        let control = self.shared.lock();
        let latest_sequence = self
            .shared
            .store
            .read_fresh(control.stale_after)
            .map(|result| result.sequence_number);
        StatusReport {
            state: control.state.clone(),
            last_error: control.last_error.clone(),
            source: control.source.clone(),
            latest_sequence,
            stats: control.stats.snapshot(),
        }
    }

    /// Most recent result, or `None` if nothing was published this run, the
    /// pipeline was stopped, or the result is older than `stale_after`.
    pub fn read(&self) -> Option<Arc<DetectionResult>> {
        let stale_after = self.shared.lock().stale_after;
        self.shared.store.read_fresh(stale_after)
    }

    /// `read` plus the current state, in the shape polling clients consume.
    pub fn snapshot(&self) -> FrameSnapshot {
        let (state, stale_after) = {
            let control = self.shared.lock();
            (control.state.clone(), control.stale_after)
        };
        let result = self.shared.store.read_fresh(stale_after);
        FrameSnapshot::new(result.as_deref(), state)
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        let control = self.shared.lock();
        if let Some(cancel) = &control.cancel {
            cancel.cancel();
        }
    }
}
