//! HTTP MJPEG source.
//!
//! The connector only opens the stream and checks the response status; all
//! framing happens in `FrameExtractor`. Any 2xx response is accepted
//! regardless of content type (some cameras send `image/jpeg` or
//! `application/octet-stream` for a multipart body).

use std::io::Read;

use base64::Engine;

use crate::config::{PipelineConfig, SourceSpec};
use crate::error::PipelineError;

/// An open byte stream.
pub type ByteStream = Box<dyn Read + Send>;

/// Opens byte streams for the pipeline.
///
/// Implementations must return within roughly `config.connect_timeout`.
pub trait Connector: Send + Sync {
    fn connect(&self, source: &SourceSpec, config: &PipelineConfig)
        -> Result<ByteStream, PipelineError>;
}

/// ureq-backed connector for HTTP(S) cameras.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector;

impl HttpConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for HttpConnector {
    fn connect(
        &self,
        source: &SourceSpec,
        config: &PipelineConfig,
    ) -> Result<ByteStream, PipelineError> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout_read(config.read_timeout)
            .user_agent(concat!("mjpeg-watch/", env!("CARGO_PKG_VERSION")))
            .build();

        let mut request = agent.get(source.url());
        if let Some(creds) = &source.credentials {
            request = request.set("Authorization", &basic_auth_header(&creds.username, &creds.password));
        }
        for (name, value) in &source.headers {
            request = request.set(name, value);
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(PipelineError::HttpStatus {
                    url: source.url().to_string(),
                    status,
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(PipelineError::Connect {
                    url: source.url().to_string(),
                    reason: transport.to_string(),
                })
            }
        };

        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(PipelineError::HttpStatus {
                url: source.url().to_string(),
                status,
            });
        }
        log::info!(
            "connected to {} (HTTP {}, content-type {})",
            source.url(),
            status,
            response.header("Content-Type").unwrap_or("unknown")
        );
        Ok(Box::new(response.into_reader()))
    }
}

pub(crate) fn basic_auth_header(username: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    format!("Basic {}", encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn basic_auth_header_is_rfc7617() {
        assert_eq!(
            basic_auth_header("Aladdin", "open sesame"),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }

    fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 2048];
                let _ = std::io::Read::read(&mut stream, &mut buf);
                let _ = stream.write_all(response);
            }
        });
        format!("http://{}/stream", addr)
    }

    fn quick_config() -> PipelineConfig {
        PipelineConfig {
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn non_success_status_is_a_connect_failure() {
        let url = serve_once(b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        let source = SourceSpec::new(&url).unwrap();
        let err = HttpConnector::new()
            .connect(&source, &quick_config())
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::HttpStatus { status: 401, .. }));
        assert!(err.is_connect_failure());
    }

    #[test]
    fn success_returns_body_reader() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=frame\r\nConnection: close\r\n\r\n--frame\r\n\xff\xd8abc\xff\xd9",
        );
        let source = SourceSpec::new(&url).unwrap();
        let mut reader = HttpConnector::new()
            .connect(&source, &quick_config())
            .unwrap();
        let mut body = Vec::new();
        reader.read_to_end(&mut body).unwrap();
        assert!(body.ends_with(b"\xff\xd8abc\xff\xd9"));
    }

    #[test]
    fn refused_connection_is_a_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let source = SourceSpec::new(&format!("http://{}/stream", addr)).unwrap();
        let err = HttpConnector::new()
            .connect(&source, &quick_config())
            .err()
            .unwrap();
        assert!(err.is_connect_failure());
    }
}
