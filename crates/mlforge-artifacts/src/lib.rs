//! Artifact transfer for mlforge.
//!
//! This crate drives the artifact transfer protocol against the metadata
//! service: a [`Connection`] carries authenticated, retried requests, an
//! [`ArtifactResolver`] negotiates presigned URLs for one artifact, and an
//! [`ArtifactManager`] moves the bytes (single-shot or multipart).
//!
//! # Supported entity kinds
//!
//! - **Experiment runs**: [`ExperimentRunArtifact`], [`ExperimentRun`]
//! - **Model versions**: [`ModelVersionArtifact`], [`ModelVersion`]

pub mod config;
pub mod connection;
pub mod endpoints;
pub mod entity;
pub mod manager;
pub mod resolver;
pub mod store_path;

pub use config::{ClientConfig, ConfigError, ConfigLayer};
pub use connection::{Connection, RetryPolicy};
pub use endpoints::{ExperimentRunArtifact, ModelVersionArtifact};
pub use entity::{ArtifactEntity, ExperimentRun, ModelVersion};
pub use manager::{ArtifactManager, UploadOptions, DEFAULT_PART_SIZE};
pub use resolver::{ArtifactResolver, UploadInfo};
pub use store_path::{artifact_basename, build_artifact_store_path, calc_sha256};

pub use mlforge_abstraction::{ArtifactEndpoints, ArtifactError, ArtifactResult};
