use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use mjpeg_watch::config::WatchConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "MJPEG_WATCH_CONFIG",
        "MJPEG_WATCH_URL",
        "MJPEG_WATCH_USERNAME",
        "MJPEG_WATCH_PASSWORD",
        "MJPEG_WATCH_CONFIDENCE",
        "MJPEG_WATCH_MAX_RECONNECTS",
        "MJPEG_WATCH_DETECT_EVERY",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_json_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "source": {
                "url": "http://192.168.0.98:18080/video.cgi?media=MJPEG",
                "username": "admin",
                "password": "admin",
                "headers": { "User-Agent": "Mozilla/5.0" }
            },
            "pipeline": {
                "detect_every_n": 5,
                "inter_frame_delay_ms": 50,
                "target_classes": ["person"],
                "stale_after_ms": 3000
            },
            "health_log_secs": 10
        }"#,
    );

    std::env::set_var("MJPEG_WATCH_CONFIG", file.path());
    std::env::set_var("MJPEG_WATCH_CONFIDENCE", "0.3");
    std::env::set_var("MJPEG_WATCH_MAX_RECONNECTS", "0");

    let cfg = WatchConfig::load().expect("load config");
    clear_env();

    assert_eq!(
        cfg.source.url(),
        "http://192.168.0.98:18080/video.cgi?media=MJPEG"
    );
    let creds = cfg.source.credentials.clone().expect("credentials");
    assert_eq!(creds.username, "admin");
    assert_eq!(
        cfg.source.headers,
        vec![("User-Agent".to_string(), "Mozilla/5.0".to_string())]
    );
    assert_eq!(cfg.pipeline.detect_every_n, 5);
    assert_eq!(cfg.pipeline.inter_frame_delay, Duration::from_millis(50));
    assert_eq!(cfg.pipeline.target_classes, vec!["person".to_string()]);
    assert_eq!(cfg.pipeline.stale_after, Some(Duration::from_secs(3)));
    assert_eq!(cfg.pipeline.confidence_threshold, 0.3);
    assert_eq!(cfg.pipeline.max_reconnect_attempts, 0);
    assert_eq!(cfg.pipeline.reconnect_backoff, Duration::from_secs(2));
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.health_log, Duration::from_secs(10));
}

#[test]
fn env_credentials_replace_file_credentials() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{ "source": { "url": "http://cam.local/video", "username": "admin", "password": "admin" } }"#,
    );
    std::env::set_var("MJPEG_WATCH_CONFIG", file.path());
    std::env::set_var("MJPEG_WATCH_USERNAME", "viewer");
    std::env::set_var("MJPEG_WATCH_PASSWORD", "s3cret");

    let cfg = WatchConfig::load().expect("load config");
    clear_env();

    let creds = cfg.source.credentials.clone().expect("credentials");
    assert_eq!(creds.username, "viewer");
    assert_eq!(creds.password, "s3cret");
    assert_eq!(cfg.source.url(), "http://cam.local/video");
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
health_log_secs = 2

[source]
url = "https://cam.local/stream.mjpg"

[pipeline]
chunk_size = 8192
detection_timeout_ms = 500
jpeg_quality = 70

[detector]
backend = "tract"
model_path = "/models/yolo11n.onnx"
input_width = 320
input_height = 320
"#,
    );

    let cfg = WatchConfig::load_from(file.path()).expect("load toml");
    assert_eq!(cfg.source.url(), "https://cam.local/stream.mjpg");
    assert!(cfg.source.credentials.is_none());
    assert_eq!(cfg.pipeline.chunk_size, 8192);
    assert_eq!(cfg.pipeline.detection_timeout, Duration::from_millis(500));
    assert_eq!(cfg.pipeline.jpeg_quality, 70);
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(cfg.detector.input_width, 320);
    assert_eq!(cfg.health_log, Duration::from_secs(2));
}

#[test]
fn explicit_url_beats_env_and_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(".json", r#"{ "source": { "url": "http://file-cam/video" } }"#);
    std::env::set_var("MJPEG_WATCH_URL", "http://env-cam/video");

    let from_env = WatchConfig::load_from(file.path()).expect("env url");
    assert_eq!(from_env.source.url(), "http://env-cam/video");

    let explicit =
        WatchConfig::resolve(Some(file.path()), Some("http://user:pw@cli-cam/video")).expect("cli url");
    clear_env();
    assert_eq!(explicit.source.url(), "http://cli-cam/video");
    assert_eq!(explicit.source.credentials.unwrap().password, "pw");
}

#[test]
fn rejects_missing_url_and_bad_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    assert!(WatchConfig::resolve(None, None).is_err());

    let file = write_config(".json", r#"{ "source": { "url": "http://cam/video" } }"#);
    std::env::set_var("MJPEG_WATCH_DETECT_EVERY", "0");
    assert!(WatchConfig::load_from(file.path()).is_err());
    std::env::set_var("MJPEG_WATCH_DETECT_EVERY", "two");
    assert!(WatchConfig::load_from(file.path()).is_err());
    clear_env();

    let tract_without_model = write_config(
        ".json",
        r#"{ "source": { "url": "http://cam/video" }, "detector": { "backend": "tract" } }"#,
    );
    assert!(WatchConfig::load_from(tract_without_model.path()).is_err());

    let unknown_backend = write_config(
        ".json",
        r#"{ "source": { "url": "http://cam/video" }, "detector": { "backend": "opencv" } }"#,
    );
    assert!(WatchConfig::load_from(unknown_backend.path()).is_err());
}
