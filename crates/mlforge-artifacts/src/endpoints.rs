//! Artifact endpoint contracts for each artifact-owning entity kind.

use mlforge_abstraction::{
    ArtifactEndpoints, CommitArtifactPart, CommitMultipartArtifact, EntityRef, GetUrlForArtifact,
};

/// Artifact endpoints of an experiment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentRunArtifact {
    run_id: String,
    key: String,
}

impl ExperimentRunArtifact {
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self { run_id: run_id.into(), key: key.into() }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn entity(&self) -> EntityRef {
        EntityRef::ExperimentRun(self.run_id.clone())
    }
}

impl ArtifactEndpoints for ExperimentRunArtifact {
    fn artifact_key(&self) -> &str {
        &self.key
    }

    fn get_url_endpoint(&self) -> String {
        "/api/v1/modeldb/experiment-run/getUrlForArtifact".to_string()
    }

    fn get_url_message(&self) -> GetUrlForArtifact {
        GetUrlForArtifact::new(self.entity(), self.key.clone())
    }

    fn commit_part_endpoint(&self) -> String {
        "/api/v1/modeldb/experiment-run/commitArtifactPart".to_string()
    }

    fn commit_part_message(&self) -> CommitArtifactPart {
        CommitArtifactPart::new(self.entity(), self.key.clone())
    }

    fn commit_artifact_endpoint(&self) -> String {
        "/api/v1/modeldb/experiment-run/commitMultipartArtifact".to_string()
    }

    fn commit_artifact_message(&self) -> CommitMultipartArtifact {
        CommitMultipartArtifact::new(self.entity(), self.key.clone())
    }
}

/// Artifact endpoints of a registered model version.
///
/// Unlike experiment runs, the registry puts the version id in the path as
/// well as in the message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVersionArtifact {
    model_version_id: u64,
    key: String,
}

impl ModelVersionArtifact {
    #[must_use]
    pub fn new(model_version_id: u64, key: impl Into<String>) -> Self {
        Self { model_version_id, key: key.into() }
    }

    pub fn model_version_id(&self) -> u64 {
        self.model_version_id
    }

    fn entity(&self) -> EntityRef {
        EntityRef::ModelVersion(self.model_version_id)
    }

    fn endpoint(&self, action: &str) -> String {
        format!("/api/v1/registry/model_versions/{}/{}", self.model_version_id, action)
    }
}

impl ArtifactEndpoints for ModelVersionArtifact {
    fn artifact_key(&self) -> &str {
        &self.key
    }

    fn get_url_endpoint(&self) -> String {
        self.endpoint("getUrlForArtifact")
    }

    fn get_url_message(&self) -> GetUrlForArtifact {
        GetUrlForArtifact::new(self.entity(), self.key.clone())
    }

    fn commit_part_endpoint(&self) -> String {
        self.endpoint("commitArtifactPart")
    }

    fn commit_part_message(&self) -> CommitArtifactPart {
        CommitArtifactPart::new(self.entity(), self.key.clone())
    }

    fn commit_artifact_endpoint(&self) -> String {
        self.endpoint("commitMultipartArtifact")
    }

    fn commit_artifact_message(&self) -> CommitMultipartArtifact {
        CommitMultipartArtifact::new(self.entity(), self.key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experiment_run_endpoints() {
        let endpoints = ExperimentRunArtifact::new("run-1", "model.pkl");
        assert_eq!(endpoints.artifact_key(), "model.pkl");
        assert_eq!(endpoints.get_url_endpoint(), "/api/v1/modeldb/experiment-run/getUrlForArtifact");
        assert_eq!(endpoints.commit_part_endpoint(), "/api/v1/modeldb/experiment-run/commitArtifactPart");
        assert_eq!(
            endpoints.commit_artifact_endpoint(),
            "/api/v1/modeldb/experiment-run/commitMultipartArtifact"
        );

        let msg = endpoints.get_url_message();
        assert_eq!(msg.entity, EntityRef::ExperimentRun("run-1".to_string()));
        assert_eq!(msg.key, "model.pkl");
        assert_eq!(msg.method, None);
    }

    #[test]
    fn test_model_version_endpoints() {
        let endpoints = ModelVersionArtifact::new(42, "weights");
        assert_eq!(endpoints.get_url_endpoint(), "/api/v1/registry/model_versions/42/getUrlForArtifact");
        assert_eq!(endpoints.commit_part_endpoint(), "/api/v1/registry/model_versions/42/commitArtifactPart");
        assert_eq!(
            endpoints.commit_artifact_endpoint(),
            "/api/v1/registry/model_versions/42/commitMultipartArtifact"
        );

        let msg = endpoints.commit_artifact_message();
        assert_eq!(msg.entity, EntityRef::ModelVersion(42));
        assert_eq!(msg.key, "weights");
    }
}
