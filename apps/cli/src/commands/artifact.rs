//! Artifact command implementation.

use crate::{ArtifactCommand, EntityArgs};
use anyhow::{Context, anyhow};
use colored::Colorize;
use mlforge_artifacts::{ArtifactEntity, ClientConfig, Connection, ExperimentRun, ModelVersion};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Execute the artifact command.
pub async fn execute(command: ArtifactCommand, mut config: ClientConfig) -> anyhow::Result<()> {
    match command {
        ArtifactCommand::Upload { target, key, part_size, concurrency, file } => {
            if let Some(part_size) = part_size {
                config.part_size = part_size;
            }
            if let Some(concurrency) = concurrency {
                config.max_concurrency = concurrency;
            }

            match entity_for(&target, &config)? {
                Entity::Run(run) => upload(&run, &key, &file).await,
                Entity::ModelVersion(version) => upload(&version, &key, &file).await,
            }
        }
        ArtifactCommand::Download { target, key, output } => match entity_for(&target, &config)? {
            Entity::Run(run) => download(&run, &key, output).await,
            Entity::ModelVersion(version) => download(&version, &key, output).await,
        },
    }
}

enum Entity {
    Run(ExperimentRun),
    ModelVersion(ModelVersion),
}

fn entity_for(target: &EntityArgs, config: &ClientConfig) -> anyhow::Result<Entity> {
    let conn = Arc::new(Connection::from_config(config)?);
    let options = config.upload_options();

    match (&target.run, target.model_version) {
        (Some(run_id), None) => Ok(Entity::Run(ExperimentRun::new(conn, run_id.clone()).with_upload_options(options))),
        (None, Some(id)) => Ok(Entity::ModelVersion(ModelVersion::new(conn, id).with_upload_options(options))),
        _ => Err(anyhow!("exactly one of --run or --model-version is required")),
    }
}

async fn upload<E: ArtifactEntity>(entity: &E, key: &str, file: &Path) -> anyhow::Result<()> {
    let size = tokio::fs::metadata(file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?
        .len();

    info!(key = %key, file = %file.display(), size, "Uploading artifact");
    let store_path = entity
        .upload_artifact_file(key, file)
        .await
        .with_context(|| format!("failed to upload {} as '{}'", file.display(), key))?;

    eprintln!("{} Uploaded {} ({} bytes) as '{}'", "✓".green(), file.display(), size, key.bold());
    eprintln!("  store path: {}", store_path);
    Ok(())
}

async fn download<E: ArtifactEntity>(entity: &E, key: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            let size = entity
                .download_artifact_to_file(key, &path)
                .await
                .with_context(|| format!("failed to download '{}'", key))?;
            eprintln!("{} Downloaded '{}' ({} bytes) to {}", "✓".green(), key.bold(), size, path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            entity
                .artifact_manager(key)
                .download_to_writer(&mut stdout)
                .await
                .with_context(|| format!("failed to download '{}'", key))?;
        }
    }
    Ok(())
}
