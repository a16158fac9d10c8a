//! mjpeg_watchd - watch one MJPEG camera and keep the latest detections
//!
//! This daemon:
//! 1. Loads the watch config (file, `MJPEG_WATCH_*` env, CLI flags)
//! 2. Builds the configured detector backend
//! 3. Runs one stream pipeline with automatic reconnects
//! 4. Logs a health line periodically until Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};

use mjpeg_watch::{
    shared_stage, DetectionStage, DetectorSettings, LifecycleController, PipelineState,
    StubBackend, WatchConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run object detection on an MJPEG camera stream")]
struct Args {
    /// Config file (.toml or .json).
    #[arg(long, env = "MJPEG_WATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Stream URL. Overrides the config file.
    #[arg(long, env = "MJPEG_WATCH_URL")]
    url: Option<String>,

    /// Basic-auth username.
    #[arg(long, env = "MJPEG_WATCH_USERNAME")]
    username: Option<String>,

    /// Basic-auth password (ignored without --username).
    #[arg(long, env = "MJPEG_WATCH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Minimum detection confidence in [0, 1].
    #[arg(long, env = "MJPEG_WATCH_CONFIDENCE")]
    confidence: Option<f32>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = WatchConfig::resolve(args.config.as_deref(), args.url.as_deref())?;
    if let Some(username) = &args.username {
        config.source = config
            .source
            .with_credentials(username, args.password.as_deref().unwrap_or(""));
    }
    if let Some(confidence) = args.confidence {
        config.pipeline.confidence_threshold = confidence;
    }
    config.pipeline.validate()?;

    let mut stage = DetectionStage::new(build_backend(&config.detector)?);
    stage.warm_up().context("detector warm-up failed")?;
    log::info!(
        "mjpeg_watchd {} using {} detector (threshold {:.2}, every {} frame(s))",
        env!("CARGO_PKG_VERSION"),
        stage.backend_name(),
        config.pipeline.confidence_threshold,
        config.pipeline.detect_every_n
    );

    let controller = LifecycleController::http(shared_stage(stage));
    controller.start(config.source.clone(), config.pipeline.clone())?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("watching {} (Ctrl-C to stop)", config.source.url());
    let outcome = loop {
        match rx.recv_timeout(config.health_log) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received, stopping pipeline...");
                break Ok(());
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        let report = controller.status_report();
        log::info!(
            "health state={} latest={} published={} detections={} max={} reconnects={} malformed={} timeouts={}",
            report.state,
            report
                .latest_sequence
                .map(|seq| format!("#{}", seq))
                .unwrap_or_else(|| "none".to_string()),
            report.stats.frames_published,
            report.stats.detections_total,
            report.stats.max_detections,
            report.stats.reconnects,
            report.stats.malformed_resets,
            report.stats.detection_timeouts
        );
        if report.state.is_terminal() {
            break match report.state {
                PipelineState::Failed(reason) => Err(anyhow!("pipeline failed: {}", reason)),
                other => Err(anyhow!("pipeline {} unexpectedly", other)),
            };
        }
    };

    let summary = controller.status_report().stats;
    controller.stop();
    log::info!(
        "run summary: {} frames extracted, {} processed, {} published, {} detections (max {} per frame), {} reconnects, {} KB read",
        summary.frames_extracted,
        summary.frames_processed,
        summary.frames_published,
        summary.detections_total,
        summary.max_detections,
        summary.reconnects,
        summary.bytes_read / 1024
    );
    outcome
}

fn build_backend(settings: &DetectorSettings) -> Result<Box<dyn mjpeg_watch::DetectorBackend>> {
    match settings.backend.as_str() {
        "stub" => {
            log::warn!("no model configured; stub detector reports no objects");
            Ok(Box::new(StubBackend::new()))
        }
        "tract" => build_tract(settings),
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectorSettings) -> Result<Box<dyn mjpeg_watch::DetectorBackend>> {
    let model_path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("detector.model_path is required for the tract backend"))?;
    let backend = mjpeg_watch::TractBackend::new(
        model_path,
        settings.input_width,
        settings.input_height,
    )?
    .with_class_names(settings.class_names.clone());
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectorSettings) -> Result<Box<dyn mjpeg_watch::DetectorBackend>> {
    Err(anyhow!(
        "tract backend requested but mjpeg_watchd was built without the backend-tract feature"
    ))
}
