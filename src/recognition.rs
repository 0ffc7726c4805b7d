//! Face Gate - Recognition
//!
//! One query image in, one match decision per detected face out. Faces are
//! embedded and looked up concurrently; results keep detection order.

use std::sync::Arc;

use crate::error::{IndexError, PipelineError, ServiceError, ServiceResult, Stage};
use crate::model::{Detection, FaceMatch, MatchResult, RecognitionResult};
use crate::pipeline::{OrderedTasks, PipelineRunner};
use crate::store::EmbeddingIndex;

/// Outcome of one face before it is folded into the result
enum FaceOutcome {
    Decided(MatchResult),
    /// Index unavailable or unprovisioned; ends the whole request
    Fatal(IndexError),
}

/// Recognition orchestrator
pub struct RecognitionOrchestrator {
    runner: Arc<PipelineRunner>,
    index: Arc<dyn EmbeddingIndex>,
}

impl RecognitionOrchestrator {
    pub fn new(runner: Arc<PipelineRunner>, index: Arc<dyn EmbeddingIndex>) -> Self {
        Self { runner, index }
    }

    /// Detect faces in `image` and match each against `organization`.
    ///
    /// A face whose similarity is at least `threshold` takes the stored
    /// identity, otherwise it is reported as unknown. Zero faces is an empty
    /// result, not an error.
    pub async fn recognize(&self, image: String, threshold: f32, organization: &str) -> ServiceResult<RecognitionResult> {
        if threshold.is_nan() {
            return Err(ServiceError::BadRequest("threshold must be a number".into()));
        }

        let batch = self.runner.detect(image).await?;
        if batch.result.is_empty() {
            log::info!("No faces detected");
            return Ok(RecognitionResult {
                faces: Vec::new(),
                inference_time: batch.inference_time,
            });
        }

        let total = batch.result.len();
        let mut tasks = OrderedTasks::new();
        for (position, detection) in batch.result.iter().enumerate() {
            let runner = Arc::clone(&self.runner);
            let index = Arc::clone(&self.index);
            let organization = organization.to_string();
            let detection = detection.clone();
            tasks.spawn(async move {
                match_face(&runner, index, &organization, detection, threshold, position).await
            });
        }

        // A fatal outcome returns early; dropping `tasks` aborts the rest
        let mut faces = Vec::with_capacity(total);
        for detection in batch.result {
            let Some(joined) = tasks.next().await else {
                break;
            };
            let result = match joined {
                Ok(FaceOutcome::Decided(result)) => result,
                Ok(FaceOutcome::Fatal(e)) => return Err(e.into()),
                Err(e) => {
                    let err = PipelineError::Aborted {
                        stage: Stage::Embedding,
                        message: e.to_string(),
                    };
                    log::warn!("Face task failed: {}", err);
                    MatchResult::unresolved(err)
                }
            };
            faces.push(FaceMatch { detection, result });
        }

        log::info!(
            "Recognized {}/{} face(s) in '{}'",
            faces.iter().filter(|f| f.result.is_match()).count(),
            total,
            organization
        );

        Ok(RecognitionResult {
            faces,
            inference_time: batch.inference_time,
        })
    }
}

async fn match_face(
    runner: &PipelineRunner,
    index: Arc<dyn EmbeddingIndex>,
    organization: &str,
    detection: Detection,
    threshold: f32,
    position: usize,
) -> FaceOutcome {
    let embedding = match runner.embed(detection.face_image).await {
        Ok(embedding) => embedding,
        Err(e) => {
            log::warn!("Face {}: {}", position + 1, e);
            return FaceOutcome::Decided(MatchResult::unresolved(e));
        }
    };

    let org = organization.to_string();
    let lookup = runner
        .run_blocking(Stage::Lookup, move || index.query_nearest(&org, &embedding))
        .await;

    match lookup {
        Ok(Ok(nearest)) => FaceOutcome::Decided(MatchResult::decide(nearest, threshold)),
        Ok(Err(e @ IndexError::DimensionMismatch { .. })) => {
            log::warn!("Face {}: {}", position + 1, e);
            FaceOutcome::Decided(MatchResult::unresolved(e))
        }
        Ok(Err(e)) => FaceOutcome::Fatal(e),
        Err(e) => {
            log::warn!("Face {}: {}", position + 1, e);
            FaceOutcome::Decided(MatchResult::unresolved(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Embedding, MatchStatus, UNKNOWN_IDENTITY};
    use crate::store::{CredentialStore, SqliteStore};
    use crate::testing::{broken_face, face, unit, FakeDetector, FakeEmbedder, Scene, SlowEmbedder};
    use std::time::Duration;

    const DIM: usize = 4;

    fn setup(detector: FakeDetector) -> (Arc<SqliteStore>, RecognitionOrchestrator) {
        let store = Arc::new(SqliteStore::open_in_memory(DIM).unwrap());
        store.create_organization("acme").unwrap();
        store.create_organization("globex").unwrap();
        store
            .upsert_embedding("ana", "acme", &Embedding::new(unit(DIM, 0)))
            .unwrap();
        store
            .upsert_embedding("bo", "acme", &Embedding::new(unit(DIM, 1)))
            .unwrap();

        let runner = Arc::new(PipelineRunner::new(
            Arc::new(detector),
            Arc::new(FakeEmbedder),
            Duration::from_secs(5),
        ));
        let orchestrator = RecognitionOrchestrator::new(runner, store.clone());
        (store, orchestrator)
    }

    #[tokio::test]
    async fn test_matches_in_detection_order() {
        let detector = FakeDetector::new().scene(
            "group.jpg",
            Scene::Faces(vec![face(&unit(DIM, 1)), face(&unit(DIM, 0)), face(&unit(DIM, 3))]),
        );
        let detector = Arc::new(detector);
        let (store, _) = setup(FakeDetector::new());
        let runner = Arc::new(PipelineRunner::new(
            detector.clone(),
            Arc::new(FakeEmbedder),
            Duration::from_secs(5),
        ));
        let orch = RecognitionOrchestrator::new(runner, store);

        let result = orch.recognize("group.jpg".into(), 0.9, "acme").await.unwrap();
        assert_eq!(detector.call_count(), 1);
        assert_eq!(result.names(), vec!["bo", "ana", UNKNOWN_IDENTITY]);
        assert!(result.faces[0].result.is_match());
        assert_eq!(result.faces[2].result.status, MatchStatus::Unknown);
        assert!(result.inference_time >= 0.0);
    }

    #[tokio::test]
    async fn test_threshold_one_requires_perfect_similarity() {
        let near = vec![0.99, 0.1, 0.0, 0.0];
        let detector = FakeDetector::new().scene(
            "pair.jpg",
            Scene::Faces(vec![face(&near), face(&unit(DIM, 1))]),
        );
        let (_, orch) = setup(detector);

        let result = orch.recognize("pair.jpg".into(), 1.0, "acme").await.unwrap();
        assert_eq!(result.faces[0].result.name, UNKNOWN_IDENTITY);
        assert!(result.faces[0].result.similarity.unwrap() < 1.0);
        assert_eq!(result.faces[1].result.name, "bo");
    }

    #[tokio::test]
    async fn test_zero_faces_is_empty_success() {
        let (_, orch) = setup(FakeDetector::new());
        let result = orch.recognize("empty.jpg".into(), 0.5, "acme").await.unwrap();
        assert!(result.faces.is_empty());
    }

    #[tokio::test]
    async fn test_broken_face_does_not_abort_others() {
        let detector = FakeDetector::new().scene(
            "mixed.jpg",
            Scene::Faces(vec![broken_face(), face(&unit(DIM, 0))]),
        );
        let (_, orch) = setup(detector);

        let result = orch.recognize("mixed.jpg".into(), 0.5, "acme").await.unwrap();
        assert_eq!(result.faces.len(), 2);
        assert_eq!(result.faces[0].result.status, MatchStatus::Unresolved);
        assert!(result.faces[0].result.error.is_some());
        assert_eq!(result.faces[1].result.name, "ana");
    }

    #[tokio::test]
    async fn test_wrong_dimension_face_is_unresolved() {
        let detector = FakeDetector::new().scene("odd.jpg", Scene::Faces(vec![face(&[1.0, 0.0])]));
        let (_, orch) = setup(detector);

        let result = orch.recognize("odd.jpg".into(), 0.5, "acme").await.unwrap();
        assert_eq!(result.faces[0].result.status, MatchStatus::Unresolved);
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let detector = FakeDetector::new().scene("ana.jpg", Scene::Faces(vec![face(&unit(DIM, 0))]));
        let (_, orch) = setup(detector);

        let result = orch.recognize("ana.jpg".into(), 0.5, "globex").await.unwrap();
        assert_eq!(result.faces[0].result.name, UNKNOWN_IDENTITY);
        assert_eq!(result.faces[0].result.similarity, None);
    }

    #[tokio::test]
    async fn test_unprovisioned_index_is_fatal() {
        let detector = FakeDetector::new().scene("ana.jpg", Scene::Faces(vec![face(&unit(DIM, 0))]));
        let (_, orch) = setup(detector);

        let err = orch.recognize("ana.jpg".into(), 0.5, "initech").await.unwrap_err();
        assert!(err.is_request_fatal());
        assert!(matches!(err, ServiceError::Index(IndexError::NotProvisioned(_))));
    }

    #[tokio::test]
    async fn test_detection_failure_and_bad_threshold() {
        let detector = FakeDetector::new().scene("bad.jpg", Scene::Fail("corrupt".into()));
        let (_, orch) = setup(detector);

        let err = orch.recognize("bad.jpg".into(), 0.5, "acme").await.unwrap_err();
        assert!(matches!(err, ServiceError::Pipeline(PipelineError::Detection(_))));

        let err = orch.recognize("bad.jpg".into(), f32::NAN, "acme").await.unwrap_err();
        assert!(matches!(err, ServiceError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_slow_first_face_keeps_detection_order() {
        let detector = FakeDetector::new().scene(
            "pair.jpg",
            Scene::Faces(vec![face(&unit(DIM, 0)), face(&unit(DIM, 1))]),
        );
        let embedder = Arc::new(SlowEmbedder::new().delay(&unit(DIM, 0), Duration::from_millis(200)));
        let (store, _) = setup(FakeDetector::new());
        let runner = Arc::new(PipelineRunner::new(
            Arc::new(detector),
            embedder.clone(),
            Duration::from_secs(5),
        ));
        let orch = RecognitionOrchestrator::new(runner, store);

        let result = orch.recognize("pair.jpg".into(), 0.9, "acme").await.unwrap();

        // The second face was embedded first, the result follows detection
        assert_eq!(*embedder.completed.lock(), vec![unit(DIM, 1), unit(DIM, 0)]);
        assert_eq!(result.names(), vec!["ana", "bo"]);
    }
}
