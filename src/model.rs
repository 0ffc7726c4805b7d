//! Face Gate - Data Model
//!
//! Tenants, credentials, detections, embeddings and match decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity reported when no stored embedding clears the threshold
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Reference embedding dimension
pub const DEFAULT_EMBEDDING_DIM: usize = 512;

// ═══════════════════════════════════════════════════════════════════════════════
// TENANTS & CREDENTIALS
// ═══════════════════════════════════════════════════════════════════════════════

/// Tenant namespace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Identity tuple of a credential
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialKey {
    pub organization: String,
    pub owner: String,
    pub key_name: String,
}

impl CredentialKey {
    pub fn new(organization: &str, owner: &str, key_name: &str) -> Self {
        Self {
            organization: organization.to_string(),
            owner: owner.to_string(),
            key_name: key_name.to_string(),
        }
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.organization, self.owner, self.key_name)
    }
}

/// Stored credential record
///
/// Only the salted hash of the secret is ever held here. The hash is not
/// serialized so a record can be shown to callers without leaking it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: Uuid,
    pub organization: String,
    pub owner: String,
    pub key_name: String,
    #[serde(skip_serializing, default)]
    pub secret_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl Credential {
    /// New active credential for `key` with the given hash
    pub fn new(key: &CredentialKey, secret_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization: key.organization.clone(),
            owner: key.owner.clone(),
            key_name: key.key_name.clone(),
            secret_hash,
            created_at: Utc::now(),
            last_used_at: None,
            active: true,
        }
    }

    pub fn key(&self) -> CredentialKey {
        CredentialKey::new(&self.organization, &self.owner, &self.key_name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DETECTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Face location in source image pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Cropped face region (internal only)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaceImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// One detected face
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub confidence: f32,
    pub face_image: FaceImage,
}

/// Detector output for one image
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionBatch {
    pub result: Vec<Detection>,
    /// Seconds spent in the detector
    pub inference_time: f64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EMBEDDINGS & MATCHING
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-length face representation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    /// Cosine similarity, 0.0 for mismatched or zero-norm vectors
    pub fn cosine_similarity(&self, other: &[f32]) -> f32 {
        cosine_similarity(&self.vector, other)
    }
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

/// Closest stored embedding returned by the index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NearestMatch {
    pub identity: String,
    pub score: f32,
}

/// How a face's match was decided
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Matched,
    Unknown,
    /// Embedding or lookup failed for this face
    Unresolved,
}

/// Match decision for one face
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub name: String,
    pub similarity: Option<f32>,
    pub status: MatchStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl MatchResult {
    /// Apply the threshold rule to the index's best candidate
    pub fn decide(nearest: Option<NearestMatch>, threshold: f32) -> Self {
        match nearest {
            None => Self::unknown(None),
            Some(best) if best.score >= threshold => Self {
                name: best.identity,
                similarity: Some(best.score),
                status: MatchStatus::Matched,
                error: None,
            },
            Some(best) => Self::unknown(Some(best.score)),
        }
    }

    pub fn unknown(similarity: Option<f32>) -> Self {
        Self {
            name: UNKNOWN_IDENTITY.to_string(),
            similarity,
            status: MatchStatus::Unknown,
            error: None,
        }
    }

    pub fn unresolved(cause: impl std::fmt::Display) -> Self {
        Self {
            name: UNKNOWN_IDENTITY.to_string(),
            similarity: None,
            status: MatchStatus::Unresolved,
            error: Some(cause.to_string()),
        }
    }

    pub fn is_match(&self) -> bool {
        self.status == MatchStatus::Matched
    }
}

/// Detection paired with its match decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaceMatch {
    pub detection: Detection,
    #[serde(rename = "match")]
    pub result: MatchResult,
}

/// Per-face results for one query image, in detection order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    pub faces: Vec<FaceMatch>,
    pub inference_time: f64,
}

impl RecognitionResult {
    pub fn names(&self) -> Vec<&str> {
        self.faces.iter().map(|f| f.result.name.as_str()).collect()
    }
}
