//! Face Gate - Streaming Recognition
//!
//! A session is authenticated once when opened and bound to one
//! organization. Each inbound message is answered independently; a bad
//! message gets a structured error reply and the channel stays open.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::{ServiceError, ServiceResult};
use crate::recognition::RecognitionOrchestrator;
use crate::redact::ResultRedactor;

/// One recognize message on a session channel
#[derive(Debug, Clone, Deserialize)]
pub struct RecognizeMessage {
    pub image: String,
    #[serde(default)]
    pub threshold: Option<f32>,
    /// Must match the session's organization when present
    #[serde(default)]
    pub organization: Option<String>,
}

/// Authenticated recognize channel
pub struct RecognitionSession {
    recognition: Arc<RecognitionOrchestrator>,
    redactor: ResultRedactor,
    organization: String,
    default_threshold: f32,
    handled: u64,
}

impl RecognitionSession {
    pub fn new(
        recognition: Arc<RecognitionOrchestrator>,
        redactor: ResultRedactor,
        organization: &str,
        default_threshold: f32,
    ) -> Self {
        Self {
            recognition,
            redactor,
            organization: organization.to_string(),
            default_threshold,
            handled: 0,
        }
    }

    pub fn organization(&self) -> &str {
        &self.organization
    }

    /// Messages answered so far
    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// Answer one raw message; failures become `{"error": ..}` replies
    pub async fn handle_message(&mut self, raw: &str) -> Value {
        self.handled += 1;

        match self.process(raw).await {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Session message {} failed: {}", self.handled, e);
                json!({
                    "error": e.to_string(),
                    "status": e.status_code(),
                })
            }
        }
    }

    async fn process(&self, raw: &str) -> ServiceResult<Value> {
        let message: RecognizeMessage =
            serde_json::from_str(raw).map_err(|e| ServiceError::BadRequest(e.to_string()))?;

        if let Some(org) = &message.organization {
            if org != &self.organization {
                return Err(ServiceError::BadRequest(format!(
                    "session is bound to organization '{}'",
                    self.organization
                )));
            }
        }

        let threshold = message.threshold.unwrap_or(self.default_threshold);
        let result = self
            .recognition
            .recognize(message.image, threshold, &self.organization)
            .await?;
        self.redactor.redact(&result)
    }

    /// Serve messages until the inbound channel closes or the peer goes away
    pub async fn run(mut self, mut inbound: mpsc::Receiver<String>, outbound: mpsc::Sender<Value>) {
        while let Some(raw) = inbound.recv().await {
            let reply = self.handle_message(&raw).await;
            if outbound.send(reply).await.is_err() {
                log::debug!("Session peer dropped");
                break;
            }
        }

        log::info!(
            "Session for '{}' closed after {} message(s)",
            self.organization,
            self.handled
        );
    }
}
