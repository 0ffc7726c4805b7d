//! Face Gate - Registration
//!
//! Turns a batch of enrollment images into stored embeddings for one
//! identity. Images are processed concurrently and independently: a failed
//! or faceless image is recorded in the report and skipped. Everything
//! accepted is written to the index in one all-or-nothing batch.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{PipelineError, ServiceResult, Stage};
use crate::model::Embedding;
use crate::pipeline::{OrderedTasks, PipelineRunner};
use crate::store::EmbeddingIndex;

/// Outcome of one enrollment image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ImageStatus {
    /// At least one face embedded
    Enrolled,
    /// Detector ran and found no usable face
    NoFace,
    /// Detection failed, or every usable face failed to embed
    Failed,
}

/// Per-image diagnostics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReport {
    pub index: usize,
    pub status: ImageStatus,
    pub faces_detected: usize,
    pub faces_enrolled: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Registration outcome
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationReport {
    pub identity: String,
    pub organization: String,
    pub images: Vec<ImageReport>,
    /// Embeddings written to the index
    pub persisted: usize,
}

impl RegistrationReport {
    /// `true` iff at least one embedding was stored
    pub fn success(&self) -> bool {
        self.persisted > 0
    }
}

struct ImageOutcome {
    report: ImageReport,
    embeddings: Vec<Embedding>,
}

/// Enrollment orchestrator
pub struct RegistrationOrchestrator {
    runner: Arc<PipelineRunner>,
    index: Arc<dyn EmbeddingIndex>,
    /// Faces must score strictly above this to be enrolled
    min_confidence: f32,
}

impl RegistrationOrchestrator {
    pub fn new(runner: Arc<PipelineRunner>, index: Arc<dyn EmbeddingIndex>, min_confidence: f32) -> Self {
        Self {
            runner,
            index,
            min_confidence,
        }
    }

    /// Register `images` under `identity`; `true` iff something was stored
    pub async fn register(&self, images: Vec<String>, identity: &str, organization: &str) -> ServiceResult<bool> {
        Ok(self.register_detailed(images, identity, organization).await?.success())
    }

    /// Register and report per-image outcomes
    pub async fn register_detailed(
        &self,
        images: Vec<String>,
        identity: &str,
        organization: &str,
    ) -> ServiceResult<RegistrationReport> {
        let total = images.len();

        let mut tasks = OrderedTasks::new();
        for (index, image) in images.into_iter().enumerate() {
            let runner = Arc::clone(&self.runner);
            let min_confidence = self.min_confidence;
            tasks.spawn(async move { process_image(&runner, index, image, min_confidence).await });
        }

        // Draining in spawn order keeps reports aligned with the input
        let mut reports = Vec::with_capacity(total);
        let mut accumulated = Vec::new();
        let mut index = 0;
        while let Some(joined) = tasks.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    let err = PipelineError::Aborted {
                        stage: Stage::Detection,
                        message: e.to_string(),
                    };
                    log::warn!("Image {}/{}: {}", index + 1, total, err);
                    failed(index, err)
                }
            };
            accumulated.extend(outcome.embeddings);
            reports.push(outcome.report);
            index += 1;
        }

        let persisted = if accumulated.is_empty() {
            log::warn!("No faces found in any of {} image(s) for '{}'", total, identity);
            0
        } else {
            let index = Arc::clone(&self.index);
            let (who, org) = (identity.to_string(), organization.to_string());
            // Not bounded by the call timeout: the write must be reported as it ended
            self.runner
                .run_unbounded(Stage::Persist, move || index.upsert_embeddings(&who, &org, &accumulated))
                .await??
        };

        if persisted > 0 {
            log::info!(
                "Registered {} embedding(s) for '{}' in '{}'",
                persisted,
                identity,
                organization
            );
        }

        Ok(RegistrationReport {
            identity: identity.to_string(),
            organization: organization.to_string(),
            images: reports,
            persisted,
        })
    }
}

fn failed(index: usize, err: PipelineError) -> ImageOutcome {
    ImageOutcome {
        report: ImageReport {
            index,
            status: ImageStatus::Failed,
            faces_detected: 0,
            faces_enrolled: 0,
            errors: vec![err.to_string()],
        },
        embeddings: Vec::new(),
    }
}

async fn process_image(runner: &PipelineRunner, index: usize, image: String, min_confidence: f32) -> ImageOutcome {
    let batch = match runner.detect(image).await {
        Ok(batch) => batch,
        Err(e) => {
            log::warn!("Image {}: {}", index + 1, e);
            return failed(index, e);
        }
    };

    let faces_detected = batch.result.len();
    let mut embeddings = Vec::new();
    let mut errors = Vec::new();

    for detection in batch.result {
        if detection.confidence <= min_confidence {
            log::debug!(
                "Image {}: skipping face with confidence {:.2}",
                index + 1,
                detection.confidence
            );
            continue;
        }

        match runner.embed(detection.face_image).await {
            Ok(embedding) => embeddings.push(embedding),
            Err(e) => {
                log::warn!("Image {}: {}", index + 1, e);
                errors.push(e.to_string());
            }
        }
    }

    let status = if !embeddings.is_empty() {
        ImageStatus::Enrolled
    } else if !errors.is_empty() {
        ImageStatus::Failed
    } else {
        log::info!("No usable faces in image {}", index + 1);
        ImageStatus::NoFace
    };

    ImageOutcome {
        report: ImageReport {
            index,
            status,
            faces_detected,
            faces_enrolled: embeddings.len(),
            errors,
        },
        embeddings,
    }
}
