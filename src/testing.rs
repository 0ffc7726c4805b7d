//! Test doubles for the detector and embedder.
//!
//! `FakeDetector` answers per image name. Each fake face carries the vector
//! the embedder should produce, packed into its pixel buffer; a face with an
//! empty buffer makes `FakeEmbedder` fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::PipelineError;
use crate::model::{BoundingBox, Detection, DetectionBatch, Embedding, FaceImage};
use crate::pipeline::{Detector, Embedder};

/// Canned detector response
#[derive(Clone)]
pub enum Scene {
    Faces(Vec<FakeFace>),
    Fail(String),
    Slow(Duration),
    /// Faces, returned after a delay
    SlowFaces(Duration, Vec<FakeFace>),
}

#[derive(Clone)]
pub struct FakeFace {
    pub confidence: f32,
    pub vector: Option<Vec<f32>>,
}

impl FakeFace {
    pub fn into_detection(self) -> Detection {
        let pixels = self
            .vector
            .map(|v| v.iter().flat_map(|x| x.to_le_bytes()).collect())
            .unwrap_or_default();

        Detection {
            bounding_box: BoundingBox { x: 10, y: 20, w: 64, h: 64 },
            confidence: self.confidence,
            face_image: FaceImage {
                width: 64,
                height: 64,
                pixels,
            },
        }
    }
}

/// Confident face embedding to `vector`
pub fn face(vector: &[f32]) -> FakeFace {
    FakeFace {
        confidence: 0.99,
        vector: Some(vector.to_vec()),
    }
}

/// Face below the enrollment cutoff
pub fn weak_face(vector: &[f32]) -> FakeFace {
    FakeFace {
        confidence: 0.5,
        vector: Some(vector.to_vec()),
    }
}

/// Face the embedder cannot process
pub fn broken_face() -> FakeFace {
    FakeFace {
        confidence: 0.99,
        vector: None,
    }
}

/// Unit vector along `axis`
pub fn unit(dim: usize, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[axis] = 1.0;
    v
}

#[derive(Default)]
pub struct FakeDetector {
    scenes: HashMap<String, Scene>,
    pub calls: AtomicUsize,
    /// Image names in the order their detection finished
    pub completed: Mutex<Vec<String>>,
}

impl FakeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scene(mut self, image: &str, scene: Scene) -> Self {
        self.scenes.insert(image.to_string(), scene);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for FakeDetector {
    fn detect(&self, image: &str) -> Result<DetectionBatch, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let batch = match self.scenes.get(image) {
            None => Ok(DetectionBatch::default()),
            Some(Scene::Fail(msg)) => Err(PipelineError::Detection(msg.clone())),
            Some(Scene::Slow(delay)) => {
                std::thread::sleep(*delay);
                Ok(DetectionBatch::default())
            }
            Some(Scene::Faces(faces)) => Ok(batch_of(faces)),
            Some(Scene::SlowFaces(delay, faces)) => {
                std::thread::sleep(*delay);
                Ok(batch_of(faces))
            }
        };

        self.completed.lock().push(image.to_string());
        batch
    }
}

fn batch_of(faces: &[FakeFace]) -> DetectionBatch {
    DetectionBatch {
        result: faces.iter().cloned().map(FakeFace::into_detection).collect(),
        inference_time: 0.0,
    }
}

pub struct FakeEmbedder;

impl Embedder for FakeEmbedder {
    fn embed(&self, face: &FaceImage) -> Result<Embedding, PipelineError> {
        if face.pixels.is_empty() || face.pixels.len() % 4 != 0 {
            return Err(PipelineError::Embedding("unreadable face region".into()));
        }

        let vector = face
            .pixels
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Embedding::new(vector))
    }
}

/// `FakeEmbedder` that stalls on chosen vectors and records completion order
#[derive(Default)]
pub struct SlowEmbedder {
    delays: Vec<(Vec<f32>, Duration)>,
    pub completed: Mutex<Vec<Vec<f32>>>,
}

impl SlowEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, vector: &[f32], delay: Duration) -> Self {
        self.delays.push((vector.to_vec(), delay));
        self
    }
}

impl Embedder for SlowEmbedder {
    fn embed(&self, face: &FaceImage) -> Result<Embedding, PipelineError> {
        let embedding = FakeEmbedder.embed(face)?;
        if let Some((_, delay)) = self.delays.iter().find(|(v, _)| *v == embedding.vector) {
            std::thread::sleep(*delay);
        }
        self.completed.lock().push(embedding.vector.clone());
        Ok(embedding)
    }
}
