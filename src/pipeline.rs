//! Face Gate - Pipeline Collaborators
//!
//! Narrow interfaces to the face detector and embedding model, and the
//! runner that executes their blocking calls off the async executor with a
//! per-call timeout.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::{JoinError, JoinHandle};

use crate::error::{PipelineError, Stage};
use crate::model::{DetectionBatch, Embedding, FaceImage};

/// Locates faces in an image.
///
/// "No face" is `Ok` with an empty batch; `Err` is reserved for real failures.
pub trait Detector: Send + Sync {
    /// `image` is opaque to the service (path, URL or encoded payload)
    fn detect(&self, image: &str) -> Result<DetectionBatch, PipelineError>;
}

/// Maps a cropped face to a fixed-length vector
pub trait Embedder: Send + Sync {
    fn embed(&self, face: &FaceImage) -> Result<Embedding, PipelineError>;
}

/// Runs collaborator calls on the blocking pool
pub struct PipelineRunner {
    detector: Arc<dyn Detector>,
    embedder: Arc<dyn Embedder>,
    timeout: Duration,
}

impl PipelineRunner {
    pub fn new(detector: Arc<dyn Detector>, embedder: Arc<dyn Embedder>, timeout: Duration) -> Self {
        Self {
            detector,
            embedder,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `work` on the blocking pool, bounded by the call timeout.
    ///
    /// A timed-out call is abandoned, not interrupted: the worker thread runs
    /// to completion and its result is dropped.
    pub async fn run_blocking<T, F>(&self, stage: Stage, work: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(work);

        match tokio::time::timeout(self.timeout, handle).await {
            Err(_) => Err(PipelineError::Timeout {
                stage,
                after: self.timeout,
            }),
            Ok(Err(join_err)) => Err(PipelineError::Aborted {
                stage,
                message: join_err.to_string(),
            }),
            Ok(Ok(value)) => Ok(value),
        }
    }

    /// Run `work` on the blocking pool and wait for it to finish.
    ///
    /// For writes: a caller that gave up on a commit which then lands would
    /// report a failure for data that was stored.
    pub async fn run_unbounded<T, F>(&self, stage: Stage, work: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|join_err| PipelineError::Aborted {
                stage,
                message: join_err.to_string(),
            })
    }

    /// Detect faces, stamping the measured wall time on the batch
    pub async fn detect(&self, image: String) -> Result<DetectionBatch, PipelineError> {
        let detector = Arc::clone(&self.detector);
        let started = Instant::now();

        let mut batch = self
            .run_blocking(Stage::Detection, move || detector.detect(&image))
            .await??;

        batch.inference_time = started.elapsed().as_secs_f64();
        log::debug!(
            "Detected {} face(s) in {:.4}s",
            batch.result.len(),
            batch.inference_time
        );
        Ok(batch)
    }

    /// Extract one embedding
    pub async fn embed(&self, face: FaceImage) -> Result<Embedding, PipelineError> {
        let embedder = Arc::clone(&self.embedder);
        self.run_blocking(Stage::Embedding, move || embedder.embed(&face))
            .await?
    }
}

/// Spawned tasks drained in spawn order.
///
/// Whatever is still pending when this is dropped gets aborted, so an early
/// return does not leave work running in the background.
pub struct OrderedTasks<T> {
    pending: VecDeque<JoinHandle<T>>,
}

impl<T: Send + 'static> OrderedTasks<T> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.pending.push_back(tokio::spawn(task));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Result of the oldest task, `None` once all are drained
    pub async fn next(&mut self) -> Option<Result<T, JoinError>> {
        let result = self.pending.front_mut()?.await;
        self.pending.pop_front();
        Some(result)
    }
}

impl<T: Send + 'static> Default for OrderedTasks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for OrderedTasks<T> {
    fn drop(&mut self) {
        for handle in &self.pending {
            handle.abort();
        }
    }
}
