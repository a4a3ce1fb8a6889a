//! Entities that own artifacts.
//!
//! An [`ArtifactEntity`] knows how to build a resolver for any of its artifact
//! keys, and gets file and in-memory upload/download on top of that.

use crate::connection::Connection;
use crate::endpoints::{ExperimentRunArtifact, ModelVersionArtifact};
use crate::manager::{ArtifactManager, UploadOptions};
use crate::resolver::ArtifactResolver;
use crate::store_path::build_artifact_store_path;
use async_trait::async_trait;
use bytes::Bytes;
use mlforge_abstraction::{ArtifactEndpoints, ArtifactError, ArtifactResult};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// An entity whose artifacts can be transferred.
#[async_trait]
pub trait ArtifactEntity: Send + Sync {
    /// Endpoint contract of this entity kind.
    type Endpoints: ArtifactEndpoints + 'static;

    /// Connection used for every transfer.
    fn connection(&self) -> &Arc<Connection>;

    /// Endpoints for the artifact stored under `key`.
    fn artifact_endpoints(&self, key: &str) -> Self::Endpoints;

    /// Part size and concurrency used for uploads.
    fn upload_options(&self) -> UploadOptions {
        UploadOptions::default()
    }

    /// A fresh resolver for the artifact stored under `key`.
    fn artifact_resolver(&self, key: &str) -> ArtifactResolver<Self::Endpoints> {
        ArtifactResolver::new(Arc::clone(self.connection()), self.artifact_endpoints(key))
    }

    /// A fresh manager for the artifact stored under `key`.
    fn artifact_manager(&self, key: &str) -> ArtifactManager<Self::Endpoints> {
        ArtifactManager::new(Arc::clone(self.connection()), self.artifact_resolver(key))
            .with_options(self.upload_options())
    }

    /// Uploads the file at `path` as the artifact `key`.
    ///
    /// Returns the artifact's content-addressed store path,
    /// `<sha256>/<basename>`, where the basename carries the file's extension.
    ///
    /// # Errors
    /// Returns an `ArtifactError` if the file cannot be read or the upload fails.
    async fn upload_artifact_file(&self, key: &str, path: &Path) -> ArtifactResult<String> {
        let file = tokio::fs::File::open(path).await?;
        let store_path = file_store_path(path, key).await?;
        debug!(key = %key, path = %path.display(), store_path = %store_path, "Uploading artifact file");

        self.artifact_manager(key).upload(file).await?;
        Ok(store_path)
    }

    /// Uploads `bytes` as the artifact `key`.
    ///
    /// # Errors
    /// Returns an `ArtifactError` if the upload fails.
    async fn upload_artifact_bytes(&self, key: &str, bytes: Vec<u8>) -> ArtifactResult<()> {
        self.artifact_manager(key).upload(Cursor::new(bytes)).await
    }

    /// Downloads the artifact `key` into memory.
    ///
    /// # Errors
    /// Returns an `ArtifactError` if the download fails.
    async fn download_artifact(&self, key: &str) -> ArtifactResult<Bytes> {
        self.artifact_manager(key).download().await
    }

    /// Downloads the artifact `key` into a file at `path`, returning its size.
    ///
    /// An existing file at `path` is only replaced once the download succeeds.
    ///
    /// # Errors
    /// Returns an `ArtifactError` if the download fails or the file cannot be written.
    async fn download_artifact_to_file(&self, key: &str, path: &Path) -> ArtifactResult<u64> {
        self.artifact_manager(key).download_to_file(path).await
    }
}

/// Hashes the file off the async runtime and builds its store path.
async fn file_store_path(path: &Path, key: &str) -> ArtifactResult<String> {
    let path = path.to_path_buf();
    let key = key.to_string();

    tokio::task::spawn_blocking(move || {
        let ext = path.extension().and_then(|ext| ext.to_str());
        build_artifact_store_path(&path, &key, ext)
    })
    .await
    .map_err(|e| ArtifactError::Io(format!("store path computation failed: {}", e)))?
}

/// Handle to an experiment run.
#[derive(Debug, Clone)]
pub struct ExperimentRun {
    conn: Arc<Connection>,
    id: String,
    options: UploadOptions,
}

impl ExperimentRun {
    #[must_use]
    pub fn new(conn: Arc<Connection>, id: impl Into<String>) -> Self {
        Self { conn, id: id.into(), options: UploadOptions::default() }
    }

    #[must_use]
    pub fn with_upload_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl ArtifactEntity for ExperimentRun {
    type Endpoints = ExperimentRunArtifact;

    fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    fn artifact_endpoints(&self, key: &str) -> ExperimentRunArtifact {
        ExperimentRunArtifact::new(self.id.clone(), key)
    }

    fn upload_options(&self) -> UploadOptions {
        self.options
    }
}

/// Handle to a registered model version.
#[derive(Debug, Clone)]
pub struct ModelVersion {
    conn: Arc<Connection>,
    id: u64,
    options: UploadOptions,
}

impl ModelVersion {
    #[must_use]
    pub fn new(conn: Arc<Connection>, id: u64) -> Self {
        Self { conn, id, options: UploadOptions::default() }
    }

    #[must_use]
    pub fn with_upload_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl ArtifactEntity for ModelVersion {
    type Endpoints = ModelVersionArtifact;

    fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    fn artifact_endpoints(&self, key: &str) -> ModelVersionArtifact {
        ModelVersionArtifact::new(self.id, key)
    }

    fn upload_options(&self) -> UploadOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Arc<Connection> {
        Arc::new(Connection::new("http://localhost:3000"))
    }

    #[test]
    fn test_experiment_run_resolver() {
        let run = ExperimentRun::new(conn(), "run-7");
        let resolver = run.artifact_resolver("model.pkl");
        assert_eq!(resolver.endpoints().run_id(), "run-7");
        assert_eq!(resolver.artifact_key(), "model.pkl");
        assert!(resolver.cached_upload_info().is_none());
    }

    #[test]
    fn test_model_version_resolver() {
        let version = ModelVersion::new(conn(), 42);
        let resolver = version.artifact_resolver("weights");
        assert_eq!(resolver.endpoints().model_version_id(), 42);
        assert_eq!(resolver.artifact_key(), "weights");
    }

    #[test]
    fn test_upload_options_flow_into_manager() {
        let options = UploadOptions { part_size: 1024, max_concurrency: 4 };
        let run = ExperimentRun::new(conn(), "run-7").with_upload_options(options);
        assert_eq!(*run.artifact_manager("k").options(), options);

        let version = ModelVersion::new(conn(), 1);
        assert_eq!(*version.artifact_manager("k").options(), UploadOptions::default());
    }

    #[tokio::test]
    async fn test_file_store_path_uses_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.pkl");
        std::fs::write(&path, "hello").unwrap();

        let store_path = file_store_path(&path, "model").await.unwrap();
        assert_eq!(
            store_path,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824/model.pkl"
        );
        // a key that already ends in the extension is kept as-is
        assert!(file_store_path(&path, "model.pkl").await.unwrap().ends_with("/model.pkl"));
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let run = ExperimentRun::new(conn(), "run-7");
        let err = run
            .upload_artifact_file("k", Path::new("/nonexistent/artifact.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Io(_)));
    }
}
