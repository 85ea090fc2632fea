//! Credential resolution
//!
//! Credentials come from CLI flags (which already include environment
//! variables) and from the JSON config file. The flags win.

use serde::{Deserialize, Serialize};

pub const DEFAULT_BLUESKY_PDS: &str = "https://bsky.social";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing credentials: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

/// Everything needed to talk to both services
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub mastodon_instance: String,
    pub mastodon_token: String,
    pub bluesky_handle: String,
    pub bluesky_password: String,
    pub bluesky_pds: String,
}

/// One credential source, any field may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub mastodon_instance: Option<String>,
    #[serde(default)]
    pub mastodon_token: Option<String>,
    #[serde(default)]
    pub bluesky_handle: Option<String>,
    #[serde(default)]
    pub bluesky_password: Option<String>,
    #[serde(default)]
    pub bluesky_pds: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl PartialConfig {
    /// Fill the gaps of `self` from `fallback`
    pub fn merge(self, fallback: PartialConfig) -> PartialConfig {
        PartialConfig {
            mastodon_instance: non_empty(self.mastodon_instance)
                .or_else(|| non_empty(fallback.mastodon_instance)),
            mastodon_token: non_empty(self.mastodon_token)
                .or_else(|| non_empty(fallback.mastodon_token)),
            bluesky_handle: non_empty(self.bluesky_handle)
                .or_else(|| non_empty(fallback.bluesky_handle)),
            bluesky_password: non_empty(self.bluesky_password)
                .or_else(|| non_empty(fallback.bluesky_password)),
            bluesky_pds: non_empty(self.bluesky_pds).or_else(|| non_empty(fallback.bluesky_pds)),
        }
    }

    /// Turn the merged config into credentials, listing whatever is missing
    pub fn into_credentials(self) -> Result<Credentials, ConfigError> {
        let mut missing = Vec::new();

        let mastodon_instance = non_empty(self.mastodon_instance);
        let mastodon_token = non_empty(self.mastodon_token);
        let bluesky_handle = non_empty(self.bluesky_handle);
        let bluesky_password = non_empty(self.bluesky_password);

        if mastodon_instance.is_none() {
            missing.push("mastodon_instance");
        }
        if mastodon_token.is_none() {
            missing.push("mastodon_token");
        }
        if bluesky_handle.is_none() {
            missing.push("bluesky_handle");
        }
        if bluesky_password.is_none() {
            missing.push("bluesky_password");
        }

        match (
            mastodon_instance,
            mastodon_token,
            bluesky_handle,
            bluesky_password,
        ) {
            (Some(instance), Some(token), Some(handle), Some(password)) => Ok(Credentials {
                mastodon_instance: normalize_instance_url(&instance),
                mastodon_token: token,
                bluesky_handle: handle.trim_start_matches('@').to_string(),
                bluesky_password: password,
                bluesky_pds: normalize_instance_url(
                    &non_empty(self.bluesky_pds)
                        .unwrap_or_else(|| DEFAULT_BLUESKY_PDS.to_string()),
                ),
            }),
            _ => Err(ConfigError::Missing(missing)),
        }
    }
}

/// Add `https://` when no scheme is given and drop trailing slashes
pub fn normalize_instance_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}
