//! HTTP client for the pitch-shift backend

use std::io::Read;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const SERVE_WAV_PATH: &str = "/api/serve-wav/";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Message supplied by the server in its `error` field
    #[error("{0}")]
    Server(String),
    #[error("Request failed with status {0}")]
    Status(u16),
    #[error("Network error: {0}")]
    Transport(String),
}

#[derive(Debug, Serialize)]
struct PitchShiftRequest<'a> {
    text: &'a str,
    pitch: i32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Map a non-success response to an error, preferring the server's message
fn status_error(code: u16, body: &str) -> BackendError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error }) if !error.is_empty() => BackendError::Server(error),
        _ => BackendError::Status(code),
    }
}

#[derive(Clone)]
pub struct BackendClient {
    agent: ureq::Agent,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch `source` pitch-shifted by `semitones`; returns WAV bytes
    pub fn pitch_shift(&self, source: &str, semitones: i32) -> Result<Vec<u8>, BackendError> {
        let url = format!("{}{SERVE_WAV_PATH}", self.base_url);
        debug!(url = %url, semitones, "Requesting pitch shift");

        let body = PitchShiftRequest {
            text: source,
            pitch: semitones,
        };
        let response = match self.agent.post(&url).send_json(&body) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let text = response.into_string().unwrap_or_default();
                let err = status_error(code, &text);
                warn!(code, error = %err, "Backend rejected request");
                return Err(err);
            }
            Err(e) => {
                warn!(error = %e, "Backend unreachable");
                return Err(BackendError::Transport(e.to_string()));
            }
        };

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        info!(bytes = bytes.len(), semitones, "Received shifted audio");
        Ok(bytes)
    }

    /// Run [`pitch_shift`](Self::pitch_shift) on a worker thread
    pub fn spawn_pitch_shift(&self, source: &str, semitones: i32) -> PendingRequest {
        let (tx, rx) = bounded(1);
        let client = self.clone();
        let source = source.to_string();
        thread::spawn(move || {
            let _ = tx.send(client.pitch_shift(&source, semitones));
        });
        PendingRequest::new(rx)
    }
}

/// Lifecycle of a background request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Loading,
    Finished(Result<Vec<u8>, BackendError>),
    Cancelled,
}

/// Handle to a request running on a worker thread
pub struct PendingRequest {
    rx: Option<Receiver<Result<Vec<u8>, BackendError>>>,
    status: RequestStatus,
}

impl PendingRequest {
    fn new(rx: Receiver<Result<Vec<u8>, BackendError>>) -> Self {
        Self {
            rx: Some(rx),
            status: RequestStatus::Loading,
        }
    }

    pub fn is_loading(&mut self) -> bool {
        matches!(self.poll(), RequestStatus::Loading)
    }

    /// Non-blocking status check
    pub fn poll(&mut self) -> &RequestStatus {
        if let Some(rx) = &self.rx {
            match rx.try_recv() {
                Ok(result) => {
                    self.status = RequestStatus::Finished(result);
                    self.rx = None;
                }
                Err(TryRecvError::Disconnected) => {
                    self.status = RequestStatus::Finished(Err(BackendError::Transport(
                        "request worker exited".into(),
                    )));
                    self.rx = None;
                }
                Err(TryRecvError::Empty) => {}
            }
        }
        &self.status
    }

    /// Block until the request finishes
    pub fn wait(mut self) -> RequestStatus {
        if let Some(rx) = self.rx.take() {
            self.status = match rx.recv() {
                Ok(result) => RequestStatus::Finished(result),
                Err(_) => RequestStatus::Finished(Err(BackendError::Transport(
                    "request worker exited".into(),
                ))),
            };
        }
        self.status
    }

    /// Drop interest in the result; the worker's answer is discarded
    pub fn cancel(&mut self) {
        if self.rx.take().is_some() {
            debug!("Backend request cancelled");
            self.status = RequestStatus::Cancelled;
        }
    }
}
