//! Presigned URL negotiation for a single artifact.

use crate::connection::Connection;
use crate::endpoints::{ExperimentRunArtifact, ModelVersionArtifact};
use mlforge_abstraction::{
    ArtifactEndpoints, ArtifactError, ArtifactPart, ArtifactResult, GetUrlForArtifact,
    GetUrlForArtifactResponse, UrlMethod,
};
use reqwest::Method;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Upload capabilities the backend reports for an artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadInfo {
    /// Whether the artifact may be uploaded in parts.
    pub multipart_upload_ok: bool,
    /// Form fields required for a single-shot POST upload; empty means PUT.
    pub post_fields: BTreeMap<String, String>,
}

impl From<&GetUrlForArtifactResponse> for UploadInfo {
    fn from(response: &GetUrlForArtifactResponse) -> Self {
        Self {
            multipart_upload_ok: response.multipart_upload_ok,
            post_fields: response.fields.clone(),
        }
    }
}

/// Negotiates presigned URLs and commits for one artifact of one entity.
///
/// A resolver is meant for a single upload or download. The upload
/// capabilities are fetched at most once and then kept for the resolver's
/// lifetime, even if later URL requests report something different.
#[derive(Debug)]
pub struct ArtifactResolver<E> {
    conn: Arc<Connection>,
    endpoints: E,
    upload_info: OnceCell<UploadInfo>,
}

impl<E: ArtifactEndpoints> ArtifactResolver<E> {
    #[must_use]
    pub fn new(conn: Arc<Connection>, endpoints: E) -> Self {
        Self { conn, endpoints, upload_info: OnceCell::new() }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn endpoints(&self) -> &E {
        &self.endpoints
    }

    pub fn artifact_key(&self) -> &str {
        self.endpoints.artifact_key()
    }

    /// Requests a presigned download URL.
    ///
    /// # Errors
    /// Returns an `ArtifactError` if the request fails or is rejected.
    pub async fn get_download_url(&self) -> ArtifactResult<String> {
        let mut msg = self.endpoints.get_url_message();
        msg.method = Some(UrlMethod::Get);

        let response = self.request_url(&msg).await?;
        Ok(response.url)
    }

    /// Requests a presigned upload URL for `part_num` (`0` for the whole object).
    ///
    /// Every call goes to the network. The first response also populates the
    /// cached upload capabilities if nothing has populated them yet.
    ///
    /// # Errors
    /// Returns an `ArtifactError` if the request fails or is rejected.
    pub async fn get_upload_url(&self, part_num: u64) -> ArtifactResult<String> {
        let response = self.request_upload_url(part_num).await?;

        if self.upload_info.set(UploadInfo::from(&response)).is_ok() {
            debug!(
                key = %self.artifact_key(),
                multipart_upload_ok = response.multipart_upload_ok,
                "Cached upload capabilities"
            );
        }

        Ok(response.url)
    }

    /// Whether the backend accepts a multipart upload for this artifact.
    ///
    /// # Errors
    /// Returns an `ArtifactError` if the capabilities had to be fetched and the
    /// request failed.
    pub async fn is_multipart_upload_ok(&self) -> ArtifactResult<bool> {
        Ok(self.upload_info().await?.multipart_upload_ok)
    }

    /// Form fields required for a single-shot POST upload.
    ///
    /// # Errors
    /// Returns an `ArtifactError` if the capabilities had to be fetched and the
    /// request failed.
    pub async fn post_fields(&self) -> ArtifactResult<&BTreeMap<String, String>> {
        Ok(&self.upload_info().await?.post_fields)
    }

    /// The cached upload capabilities, without fetching them.
    pub fn cached_upload_info(&self) -> Option<&UploadInfo> {
        self.upload_info.get()
    }

    /// Acknowledges an uploaded part.
    ///
    /// # Errors
    /// Returns `ArtifactError::PartCommit` if the service rejects the commit.
    pub async fn commit_part(&self, part_num: u64, etag: &str) -> ArtifactResult<()> {
        let mut msg = self.endpoints.commit_part_message();
        msg.artifact_part = ArtifactPart { part_number: part_num, etag: etag.to_string() };

        let endpoint = self.endpoints.commit_part_endpoint();
        let response = self.conn.make_proto_request(Method::POST, &endpoint, Some(&msg)).await?;
        Connection::must_response(response, "commitArtifactPart").await.map_err(|e| match e {
            ArtifactError::Negotiation { status, message, .. } => {
                ArtifactError::PartCommit { part_number: part_num, status, message }
            }
            other => other,
        })?;

        debug!(key = %self.artifact_key(), part_number = part_num, "Committed part");
        Ok(())
    }

    /// Finalizes a multipart upload.
    ///
    /// # Errors
    /// Returns an `ArtifactError` if the service rejects the request.
    pub async fn commit_artifact(&self) -> ArtifactResult<()> {
        let msg = self.endpoints.commit_artifact_message();
        let endpoint = self.endpoints.commit_artifact_endpoint();

        let response = self.conn.make_proto_request(Method::POST, &endpoint, Some(&msg)).await?;
        Connection::must_response(response, "commitMultipartArtifact").await?;

        debug!(key = %self.artifact_key(), "Committed multipart artifact");
        Ok(())
    }

    async fn upload_info(&self) -> ArtifactResult<&UploadInfo> {
        self.upload_info
            .get_or_try_init(|| async {
                let response = self.request_upload_url(1).await?;
                Ok::<_, ArtifactError>(UploadInfo::from(&response))
            })
            .await
    }

    async fn request_upload_url(&self, part_num: u64) -> ArtifactResult<GetUrlForArtifactResponse> {
        let mut msg = self.endpoints.get_url_message();
        msg.method = Some(UrlMethod::Put);
        msg.part_number = part_num;

        self.request_url(&msg).await
    }

    async fn request_url(&self, msg: &GetUrlForArtifact) -> ArtifactResult<GetUrlForArtifactResponse> {
        let endpoint = self.endpoints.get_url_endpoint();
        debug!(
            key = %msg.key,
            method = ?msg.method,
            part_number = msg.part_number,
            "Requesting presigned URL"
        );

        let response = self.conn.make_proto_request(Method::POST, &endpoint, Some(msg)).await?;
        Connection::must_proto_response(response, "getUrlForArtifact").await
    }
}

impl ArtifactResolver<ExperimentRunArtifact> {
    /// Resolver for an artifact of an experiment run.
    #[must_use]
    pub fn for_experiment_run(conn: Arc<Connection>, run_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(conn, ExperimentRunArtifact::new(run_id, key))
    }
}

impl ArtifactResolver<ModelVersionArtifact> {
    /// Resolver for an artifact of a registered model version.
    #[must_use]
    pub fn for_model_version(conn: Arc<Connection>, model_version_id: u64, key: impl Into<String>) -> Self {
        Self::new(conn, ModelVersionArtifact::new(model_version_id, key))
    }
}
