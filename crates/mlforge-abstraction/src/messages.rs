//! Wire messages for the artifact transfer endpoints.
//!
//! These mirror the JSON form of the service's request and response messages.
//! Field names are snake_case, defaults are omitted by the service, so every
//! response field tolerates being absent.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifies the entity that owns an artifact.
///
/// Serialised (flattened into the enclosing message) as the id field the
/// entity's endpoints expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityRef {
    /// An experiment run, addressed by its string id.
    #[serde(rename = "id")]
    ExperimentRun(String),
    /// A registered model version, addressed by its numeric id.
    #[serde(rename = "model_version_id")]
    ModelVersion(u64),
}

/// HTTP method a presigned URL is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UrlMethod {
    /// Download.
    Get,
    /// Upload.
    Put,
}

/// Request for a presigned URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUrlForArtifact {
    #[serde(flatten)]
    pub entity: EntityRef,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<UrlMethod>,
    /// Part being requested; `0` means the whole object.
    #[serde(default)]
    pub part_number: u64,
}

impl GetUrlForArtifact {
    /// Creates a template with no method and part number `0`.
    #[must_use]
    pub fn new(entity: EntityRef, key: impl Into<String>) -> Self {
        Self { entity, key: key.into(), method: None, part_number: 0 }
    }
}

/// Response to [`GetUrlForArtifact`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUrlForArtifactResponse {
    #[serde(default)]
    pub url: String,
    /// Whether the backend accepts a chunked upload for this artifact.
    #[serde(default)]
    pub multipart_upload_ok: bool,
    /// Extra form fields for a single-shot POST upload.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// One uploaded part, identified by number and the ETag the object store returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPart {
    pub part_number: u64,
    pub etag: String,
}

/// Acknowledges a completed part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitArtifactPart {
    #[serde(flatten)]
    pub entity: EntityRef,
    pub key: String,
    #[serde(default)]
    pub artifact_part: ArtifactPart,
}

impl CommitArtifactPart {
    #[must_use]
    pub fn new(entity: EntityRef, key: impl Into<String>) -> Self {
        Self { entity, key: key.into(), artifact_part: ArtifactPart::default() }
    }
}

/// Finalizes a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMultipartArtifact {
    #[serde(flatten)]
    pub entity: EntityRef,
    pub key: String,
}

impl CommitMultipartArtifact {
    #[must_use]
    pub fn new(entity: EntityRef, key: impl Into<String>) -> Self {
        Self { entity, key: key.into() }
    }
}
