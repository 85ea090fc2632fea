use crate::prelude::*;
use mastodon_to_bluesky_core::config::{Credentials, PartialConfig};
use std::path::{Path, PathBuf};

/// `~/.config/mastodon-to-bluesky/config.json`
pub fn config_file_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| {
        home.join(".config")
            .join("mastodon-to-bluesky")
            .join("config.json")
    })
}

/// Read the JSON config file, a missing file is an empty config
pub fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        log::debug!("No config file at {}", path.display());
        return Ok(PartialConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .wrap_err_with(|| f!("Failed to read config file {}", path.display()))?;

    serde_json::from_str(&contents)
        .map_err(|e| Error::Config(f!("Invalid config file {}: {}", path.display(), e)).into())
}

/// Merge CLI values (flags or environment) over the config file
pub fn resolve_credentials(cli: PartialConfig, config_file: Option<&Path>) -> Result<Credentials> {
    let file_config = match config_file {
        Some(path) => load_config_file(path)?,
        None => PartialConfig::default(),
    };

    cli.merge(file_config)
        .into_credentials()
        .map_err(|e| Error::Config(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config_file(&temp_dir.path().join("config.json")).unwrap();
        assert_eq!(config, PartialConfig::default());
    }

    #[test]
    fn test_cli_values_override_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "mastodon_instance": "mastodon.social",
                "mastodon_token": "file-token",
                "bluesky_handle": "alice.bsky.social",
                "bluesky_password": "file-password"
            }"#,
        )
        .unwrap();

        let cli = PartialConfig {
            mastodon_token: Some("cli-token".to_string()),
            ..Default::default()
        };

        let creds = resolve_credentials(cli, Some(&path)).unwrap();

        assert_eq!(creds.mastodon_instance, "https://mastodon.social");
        assert_eq!(creds.mastodon_token, "cli-token");
        assert_eq!(creds.bluesky_password, "file-password");
        assert_eq!(creds.bluesky_pds, "https://bsky.social");
    }

    #[test]
    fn test_missing_credentials_error() {
        let err = resolve_credentials(PartialConfig::default(), None).unwrap_err();

        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));
        assert!(err.to_string().contains("mastodon_instance"));
        assert!(err.to_string().contains("bluesky_password"));
    }

    #[test]
    fn test_invalid_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(load_config_file(&path).is_err());
    }
}
