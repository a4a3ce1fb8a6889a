//! CLI configuration loading and merging.

use anyhow::Context;
use mlforge_artifacts::ClientConfig;
use std::path::Path;

/// Values given on the command line, applied last.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub email: Option<String>,
    pub dev_key: Option<String>,
}

/// Load and merge client configuration.
///
/// Configuration precedence:
/// 1. CLI arguments
/// 2. Environment variables
/// 3. `--config` file, or else the local config file (./.mlforgerc)
/// 4. Global config file (~/.mlforge/config.toml), unless `--config` is given
/// 5. Defaults
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> anyhow::Result<ClientConfig> {
    let mut config = match path {
        Some(path) => {
            let mut config = ClientConfig::load_from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            config.apply_env_from(|name| std::env::var(name).ok());
            config
        }
        None => ClientConfig::discover_and_load()?,
    };

    apply_overrides(&mut config, overrides);
    Ok(config)
}

fn apply_overrides(config: &mut ClientConfig, overrides: &ConfigOverrides) {
    if let Some(ref host) = overrides.host {
        config.host = Some(host.clone());
    }
    if let Some(ref email) = overrides.email {
        config.email = Some(email.clone());
    }
    if let Some(ref dev_key) = overrides.dev_key {
        config.dev_key = Some(dev_key.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win() {
        let mut config = ClientConfig {
            host: Some("from-file.example.com".to_string()),
            email: Some("file@example.com".to_string()),
            ..ClientConfig::default()
        };
        let overrides = ConfigOverrides { host: Some("http://localhost:3000".to_string()), ..Default::default() };

        apply_overrides(&mut config, &overrides);

        assert_eq!(config.host.as_deref(), Some("http://localhost:3000"));
        assert_eq!(config.email.as_deref(), Some("file@example.com"));
        assert_eq!(config.dev_key, None);
    }

    #[test]
    fn test_load_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mlforge.toml");
        std::fs::write(&path, "host = \"app.example.com\"\npart_size = 1024\n").unwrap();

        let overrides = ConfigOverrides { dev_key: Some("key".to_string()), ..Default::default() };
        let config = load_config(Some(&path), &overrides).unwrap();

        assert_eq!(config.part_size, 1024);
        assert_eq!(config.dev_key.as_deref(), Some("key"));
    }

    #[test]
    fn test_explicit_config_file_skips_discovered_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mlforge.toml");
        std::fs::write(&path, "host = \"app.example.com\"\nmax_concurrency = 1\nscheme = \"https\"\n").unwrap();

        let config = load_config(Some(&path), &ConfigOverrides::default()).unwrap();

        assert_eq!(config.max_concurrency, 1);
        assert_eq!(config.scheme, "https");
    }

    #[test]
    fn test_load_missing_explicit_config_file() {
        let err = load_config(Some(Path::new("/nonexistent/mlforge.toml")), &ConfigOverrides::default())
            .unwrap_err();
        assert!(err.to_string().contains("failed to load config"));
    }
}
