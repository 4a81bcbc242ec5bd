//! Delivery of completed capture sessions
//!
//! A completed session is handed to a [`SessionSink`]: the collection server
//! over HTTP, or a local directory of JSON files. Delivery happens once; a
//! failure is reported to the caller and nothing is retried or queued.

use crate::config::UploadConfig;
use crate::error::ComputeError;
use crate::types::CapturePayload;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where a payload ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryReceipt {
    Uploaded { endpoint: String },
    Stored { path: PathBuf },
    /// Delivery is switched off in the upload configuration
    Skipped,
}

/// Destination for completed capture sessions
pub trait SessionSink {
    fn deliver(&self, payload: &CapturePayload) -> Result<DeliveryReceipt, ComputeError>;
}

/// Reply body of the collection server's save route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// "success" or "error"
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UploadResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Turn a server reply into a result
pub fn check_response(response: UploadResponse) -> Result<(), ComputeError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(ComputeError::UploadRejected(
            response.message.unwrap_or(response.status),
        ))
    }
}

/// Deliver `payload` unless uploads are switched off
pub fn deliver(
    payload: &CapturePayload,
    config: &UploadConfig,
    sink: &dyn SessionSink,
) -> Result<DeliveryReceipt, ComputeError> {
    if !config.should_upload {
        log::info!(
            "delivery disabled; keeping {} dataframes for '{}' local",
            payload.dataframes.len(),
            payload.label
        );
        return Ok(DeliveryReceipt::Skipped);
    }

    match sink.deliver(payload) {
        Ok(receipt) => {
            log::info!("delivered '{}': {:?}", payload.label, receipt);
            Ok(receipt)
        }
        Err(e) => {
            log::warn!("delivery of '{}' failed: {}", payload.label, e);
            Err(e)
        }
    }
}

/// POSTs payloads as JSON to the collection server
#[cfg(feature = "upload")]
pub struct HttpUploader {
    endpoint: String,
    agent: ureq::Agent,
}

#[cfg(feature = "upload")]
impl HttpUploader {
    pub fn new(config: &UploadConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout())
            .build();
        Ok(Self {
            endpoint: config.endpoint.clone(),
            agent,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(feature = "upload")]
impl SessionSink for HttpUploader {
    fn deliver(&self, payload: &CapturePayload) -> Result<DeliveryReceipt, ComputeError> {
        log::debug!(
            "POST {} ({} dataframes for '{}')",
            self.endpoint,
            payload.dataframes.len(),
            payload.label
        );

        let response = match self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
            .send_json(payload)
        {
            Ok(response) => response,
            // The server may still explain itself in the body
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                return match serde_json::from_str::<UploadResponse>(&body) {
                    Ok(reply) if !reply.is_success() => Err(ComputeError::UploadRejected(
                        reply.message.unwrap_or(reply.status),
                    )),
                    _ => Err(ComputeError::UploadRejected(format!(
                        "HTTP {}: {}",
                        code, body
                    ))),
                };
            }
            Err(e) => return Err(ComputeError::UploadFailed(e.to_string())),
        };

        let reply: UploadResponse = response
            .into_json()
            .map_err(|e| ComputeError::UploadFailed(format!("unreadable reply: {}", e)))?;
        check_response(reply)?;

        Ok(DeliveryReceipt::Uploaded {
            endpoint: self.endpoint.clone(),
        })
    }
}

/// Writes each payload to its own JSON file
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(label: &str) -> String {
        let safe: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{}-{}.json", safe, uuid::Uuid::new_v4())
    }
}

impl SessionSink for JsonFileStore {
    fn deliver(&self, payload: &CapturePayload) -> Result<DeliveryReceipt, ComputeError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(Self::file_name(&payload.label));
        fs::write(&path, payload.to_json()?)?;
        Ok(DeliveryReceipt::Stored { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    fn payload() -> CapturePayload {
        CapturePayload::new("Heart", vec![vec![vec![0.5, 0.0]; 2]])
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("handframe-test-{}", uuid::Uuid::new_v4()))
    }

    struct CountingSink {
        calls: Cell<usize>,
    }

    impl SessionSink for CountingSink {
        fn deliver(&self, _payload: &CapturePayload) -> Result<DeliveryReceipt, ComputeError> {
            self.calls.set(self.calls.get() + 1);
            Err(ComputeError::UploadFailed("offline".to_string()))
        }
    }

    #[test]
    fn test_deliver_honors_should_upload() {
        let sink = CountingSink {
            calls: Cell::new(0),
        };

        let receipt = deliver(&payload(), &UploadConfig::default(), &sink).unwrap();
        assert_eq!(receipt, DeliveryReceipt::Skipped);
        assert_eq!(sink.calls.get(), 0);

        let result = deliver(&payload(), &UploadConfig::new("http://localhost:1/save"), &sink);
        assert!(matches!(result, Err(ComputeError::UploadFailed(_))));
        assert_eq!(sink.calls.get(), 1);
    }

    #[test]
    fn test_check_response() {
        let ok: UploadResponse = serde_json::from_str(r#"{"status": "success"}"#).unwrap();
        assert!(check_response(ok).is_ok());

        let err: UploadResponse = serde_json::from_str(r#"{"status": "error"}"#).unwrap();
        assert!(matches!(
            check_response(err),
            Err(ComputeError::UploadRejected(msg)) if msg == "error"
        ));
    }

    #[test]
    fn test_file_store_writes_wire_format() {
        let dir = temp_dir();
        let store = JsonFileStore::new(&dir);

        let receipt = store.deliver(&payload()).unwrap();
        let DeliveryReceipt::Stored { path } = receipt else {
            panic!("expected a stored receipt");
        };

        assert!(path.starts_with(&dir));
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with("Heart-")));

        let loaded = CapturePayload::from_json(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, payload());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_name_is_sanitized() {
        let name = JsonFileStore::file_name("../thumbs up");
        assert!(name.starts_with("___thumbs_up-"));
        assert!(name.ends_with(".json"));
    }

    #[cfg(feature = "upload")]
    mod http {
        use super::*;
        use std::io::{BufRead, BufReader, Read, Write};
        use std::net::TcpListener;
        use std::thread;

        /// Serve one request with a canned reply, returning the request body
        fn serve_once(status_line: &'static str, body: &'static str) -> (String, thread::JoinHandle<String>) {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let url = format!("http://{}/save", listener.local_addr().unwrap());

            let handle = thread::spawn(move || {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut content_length = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                        content_length = value.trim().parse().unwrap();
                    }
                }

                let mut request = vec![0; content_length];
                reader.read_exact(&mut request).unwrap();

                let mut stream = stream;
                write!(
                    stream,
                    "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                )
                .unwrap();
                String::from_utf8(request).unwrap()
            });

            (url, handle)
        }

        #[test]
        fn test_upload_success() {
            let (url, server) = serve_once("HTTP/1.1 200 OK", r#"{"status": "success"}"#);
            let uploader = HttpUploader::new(&UploadConfig::new(url.clone())).unwrap();

            let receipt = uploader.deliver(&payload()).unwrap();
            assert_eq!(receipt, DeliveryReceipt::Uploaded { endpoint: url });

            let sent: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
            assert_eq!(sent["Heart"][0][1][0], 0.5);
        }

        #[test]
        fn test_upload_error_reply() {
            let (url, server) = serve_once("HTTP/1.1 200 OK", r#"{"status": "error"}"#);
            let uploader = HttpUploader::new(&UploadConfig::new(url)).unwrap();

            let result = uploader.deliver(&payload());
            assert!(matches!(result, Err(ComputeError::UploadRejected(_))));
            server.join().unwrap();
        }

        #[test]
        fn test_upload_http_failure() {
            let (url, server) = serve_once("HTTP/1.1 500 Internal Server Error", "oops");
            let uploader = HttpUploader::new(&UploadConfig::new(url)).unwrap();

            let result = uploader.deliver(&payload());
            assert!(matches!(result, Err(ComputeError::UploadRejected(msg)) if msg.contains("500")));
            server.join().unwrap();
        }

        #[test]
        fn test_rejects_non_http_endpoint() {
            assert!(HttpUploader::new(&UploadConfig::new("localhost:5000/save")).is_err());
        }
    }
}
