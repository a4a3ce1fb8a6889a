//! Artifact transfer abstraction layer for mlforge.
//!
//! This crate defines the error taxonomy, the wire messages exchanged with the
//! metadata service, and the [`ArtifactEndpoints`] capability trait that every
//! artifact-owning entity kind implements.

pub mod error;
pub mod messages;

pub use error::{ArtifactError, ArtifactResult};
pub use messages::{
    ArtifactPart, CommitArtifactPart, CommitMultipartArtifact, EntityRef, GetUrlForArtifact,
    GetUrlForArtifactResponse, UrlMethod,
};

/// The per-entity-kind wire contract for artifact transfer negotiation.
///
/// Experiment runs and model versions expose the same protocol under different
/// REST paths and with differently named id fields. An implementation binds one
/// entity id and one artifact key and hands out the endpoint paths plus
/// pre-filled message templates; the resolver copies a template and fills in
/// the per-call fields (`method`, `part_number`, `artifact_part`).
///
/// Implementations must be `Send + Sync` so a resolver can be shared by
/// concurrent part uploads.
pub trait ArtifactEndpoints: Send + Sync {
    /// The artifact key this contract is bound to.
    fn artifact_key(&self) -> &str;

    /// Path used to request a presigned URL.
    fn get_url_endpoint(&self) -> String;

    /// Template for the presigned URL request.
    fn get_url_message(&self) -> GetUrlForArtifact;

    /// Path used to acknowledge a completed part.
    fn commit_part_endpoint(&self) -> String;

    /// Template for the commit-part request.
    fn commit_part_message(&self) -> CommitArtifactPart;

    /// Path used to finalize a multipart upload.
    fn commit_artifact_endpoint(&self) -> String;

    /// Message sent as-is to finalize a multipart upload.
    fn commit_artifact_message(&self) -> CommitMultipartArtifact;
}
