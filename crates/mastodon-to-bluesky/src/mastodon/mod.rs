use crate::http::{send_with_retry, USER_AGENT};
use crate::prelude::*;
use log::{debug, info};
use mastodon_to_bluesky_core::backoff::RetryPolicy;
use mastodon_to_bluesky_core::mastodon::{
    guess_image_mime, is_older_than, matches_filter, next_max_id, MastodonAccount,
    MastodonStatus, PostFilter,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, LINK};

pub mod preview;

/// Statuses requested per page, the API maximum
const PAGE_SIZE: usize = 40;

/// Client for the Mastodon REST API
pub struct MastodonClient {
    instance: String,
    client: reqwest::Client,
    /// Media lives on CDNs that must not see the access token
    media_client: reqwest::Client,
    policy: RetryPolicy,
    account_id: Option<String>,
}

impl MastodonClient {
    pub fn new(instance: &str, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&f!("Bearer {token}"))
                .map_err(|e| eyre!("Invalid header value: {}", e))?,
        );

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

        let media_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            instance: instance.trim_end_matches('/').to_string(),
            client,
            media_client,
            policy: RetryPolicy::default(),
            account_id: None,
        })
    }

    #[cfg(test)]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Verify the token and remember whose statuses to fetch
    pub async fn authenticate(&mut self) -> Result<MastodonAccount> {
        let url = f!("{}/api/v1/accounts/verify_credentials", self.instance);

        let response = send_with_retry(&self.policy, "Failed to verify Mastodon credentials", || {
            self.client.get(&url)
        })
        .await?;

        let account: MastodonAccount = response
            .json()
            .await
            .map_err(|e| eyre!("Failed to parse Mastodon account: {}", e))?;

        info!("Authenticated with Mastodon as @{}", account.username);
        self.account_id = Some(account.id.clone());

        Ok(account)
    }

    /// Fetch the account's statuses, newest first
    ///
    /// Follows the pagination cursor until a page comes back empty, `limit`
    /// matching statuses were collected, or a status older than
    /// `filter.since` shows up.
    pub async fn get_posts(
        &self,
        limit: Option<usize>,
        filter: &PostFilter,
    ) -> Result<Vec<MastodonStatus>> {
        let account_id = self
            .account_id
            .as_deref()
            .ok_or(Error::NotAuthenticated("Mastodon"))?;
        let url = f!("{}/api/v1/accounts/{}/statuses", self.instance, account_id);

        let mut statuses = Vec::new();
        let mut max_id: Option<String> = None;

        loop {
            let mut query = vec![("limit", PAGE_SIZE.to_string())];
            if let Some(id) = &max_id {
                query.push(("max_id", id.clone()));
            }
            if !filter.include_replies {
                query.push(("exclude_replies", "true".to_string()));
            }
            if !filter.include_boosts {
                query.push(("exclude_reblogs", "true".to_string()));
            }

            let response = send_with_retry(&self.policy, "Failed to fetch Mastodon statuses", || {
                self.client.get(&url).query(&query)
            })
            .await?;

            let link = response
                .headers()
                .get(LINK)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let page: Vec<MastodonStatus> = response
                .json()
                .await
                .map_err(|e| eyre!("Failed to parse Mastodon statuses: {}", e))?;

            debug!("Fetched {} statuses (max_id: {:?})", page.len(), max_id);

            let next = next_max_id(link.as_deref(), &page);
            if page.is_empty() {
                break;
            }

            for status in page {
                if filter.since.is_some_and(|since| is_older_than(&status, since)) {
                    return Ok(statuses);
                }

                if matches_filter(&status, filter) {
                    statuses.push(status);
                    if limit.is_some_and(|limit| statuses.len() >= limit) {
                        return Ok(statuses);
                    }
                }
            }

            match next {
                Some(id) if max_id.as_ref() != Some(&id) => max_id = Some(id),
                _ => break,
            }
        }

        Ok(statuses)
    }

    /// Download an attachment, returning its bytes and MIME type
    pub async fn download_media(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let response = send_with_retry(&self.policy, "Failed to download media", || {
            self.media_client.get(url)
        })
        .await?;

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| guess_image_mime(url).to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| eyre!("Failed to read media {}: {}", url, e))?;

        Ok((bytes.to_vec(), mime_type))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub fn account_json() -> serde_json::Value {
        serde_json::json!({
            "id": "1",
            "username": "alice",
            "acct": "alice",
            "display_name": "Alice",
            "url": "https://mastodon.example/@alice"
        })
    }

    pub fn status_json(id: &str, content: &str, created_at: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "content": content,
            "created_at": created_at,
            "visibility": "public",
            "spoiler_text": "",
            "in_reply_to_id": null,
            "reblog": null,
            "media_attachments": [],
            "language": "en"
        })
    }
}
