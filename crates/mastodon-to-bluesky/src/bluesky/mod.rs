use crate::http::{send_request, send_with_retry, RequestKind, USER_AGENT};
use crate::prelude::*;
use log::{debug, info, warn};
use mastodon_to_bluesky_core::backoff::RetryPolicy;
use mastodon_to_bluesky_core::bluesky::{
    build_facets, detect_mentions, BlobRef, CreateRecordRequest, CreateRecordResponse, Facet,
    PostRecord, ResolveHandleResponse, Session, StrongRef, UploadBlobResponse, POST_COLLECTION,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response};
use std::collections::HashMap;

/// Client for the AT Protocol XRPC endpoints of a PDS
pub struct BlueskyClient {
    pds: String,
    handle: String,
    password: String,
    client: reqwest::Client,
    policy: RetryPolicy,
    session: Option<Session>,
    /// Handle to DID, `None` for handles that did not resolve
    did_cache: HashMap<String, Option<String>>,
}

impl BlueskyClient {
    pub fn new(pds: &str, handle: &str, password: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            pds: pds.trim_end_matches('/').to_string(),
            handle: handle.to_string(),
            password: password.to_string(),
            client,
            policy: RetryPolicy::default(),
            session: None,
            did_cache: HashMap::new(),
        })
    }

    #[cfg(test)]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[cfg(test)]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    fn xrpc(&self, method: &str) -> String {
        f!("{}/xrpc/{}", self.pds, method)
    }

    fn require_session(&self) -> Result<&Session> {
        Ok(self
            .session
            .as_ref()
            .ok_or(Error::NotAuthenticated("Bluesky"))?)
    }

    /// Log in with the handle and app password
    pub async fn authenticate(&mut self) -> Result<Session> {
        let url = self.xrpc("com.atproto.server.createSession");
        let body = serde_json::json!({
            "identifier": self.handle,
            "password": self.password,
        });

        let response = send_with_retry(&self.policy, "Failed to log in to Bluesky", || {
            self.client.post(&url).json(&body)
        })
        .await?;

        let session: Session = response
            .json()
            .await
            .map_err(|e| eyre!("Failed to parse Bluesky session: {}", e))?;

        info!("Authenticated with Bluesky as {} ({})", session.handle, session.did);
        self.session = Some(session.clone());

        Ok(session)
    }

    /// Trade the refresh token for a new access token
    pub async fn refresh(&mut self) -> Result<()> {
        let refresh_jwt = self.require_session()?.refresh_jwt.clone();
        let url = self.xrpc("com.atproto.server.refreshSession");

        let response = send_with_retry(&self.policy, "Failed to refresh Bluesky session", || {
            self.client.post(&url).bearer_auth(&refresh_jwt)
        })
        .await?;

        let session: Session = response
            .json()
            .await
            .map_err(|e| eyre!("Failed to parse Bluesky session: {}", e))?;

        debug!("Refreshed Bluesky session for {}", session.handle);
        self.session = Some(session);

        Ok(())
    }

    /// Send an authenticated request, refreshing the session once if the access token expired
    async fn send_authorized<F>(
        &mut self,
        kind: RequestKind,
        context: &str,
        build: F,
    ) -> Result<Response>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let token = self.require_session()?.access_jwt.clone();
        let result = send_request(&self.policy, kind, context, || {
            build(&self.client).bearer_auth(&token)
        })
        .await;

        match result {
            Err(err)
                if err
                    .downcast_ref::<Error>()
                    .is_some_and(Error::is_expired_token) =>
            {
                warn!("Bluesky access token expired, refreshing session");
                self.refresh().await?;

                let token = self.require_session()?.access_jwt.clone();
                send_request(&self.policy, kind, context, || {
                    build(&self.client).bearer_auth(&token)
                })
                .await
            }
            other => other,
        }
    }

    /// Resolve a handle to a DID, `None` when it does not resolve
    pub async fn resolve_handle(&mut self, handle: &str) -> Option<String> {
        let key = handle.to_lowercase();
        if let Some(cached) = self.did_cache.get(&key) {
            return cached.clone();
        }

        let url = self.xrpc("com.atproto.identity.resolveHandle");
        let result = send_with_retry(&self.policy, "Failed to resolve handle", || {
            self.client.get(&url).query(&[("handle", key.as_str())])
        })
        .await;

        let did = match result {
            Ok(response) => response
                .json::<ResolveHandleResponse>()
                .await
                .map(|r| r.did)
                .ok(),
            Err(err) => {
                debug!("Could not resolve @{handle}: {err}");
                None
            }
        };

        self.did_cache.insert(key, did.clone());
        did
    }

    /// Post text with link, tag and resolved mention facets
    pub async fn create_rich_text(&mut self, text: &str) -> (String, Vec<Facet>) {
        let mut dids = HashMap::new();

        for mention in detect_mentions(text) {
            let handle = mention.value.to_lowercase();
            if dids.contains_key(&handle) {
                continue;
            }
            if let Some(did) = self.resolve_handle(&handle).await {
                dids.insert(handle, did);
            }
        }

        (text.to_string(), build_facets(text, &dids))
    }

    pub async fn upload_image(&mut self, bytes: Vec<u8>, mime_type: &str) -> Result<BlobRef> {
        let url = self.xrpc("com.atproto.repo.uploadBlob");
        let size = bytes.len();

        let response = self
            .send_authorized(
                RequestKind::Idempotent,
                "Failed to upload image to Bluesky",
                |client| {
                    client
                        .post(&url)
                        .header(CONTENT_TYPE, mime_type)
                        .body(bytes.clone())
                },
            )
            .await?;

        let uploaded: UploadBlobResponse = response
            .json()
            .await
            .map_err(|e| eyre!("Failed to parse upload response: {}", e))?;

        debug!("Uploaded {size} bytes ({mime_type})");

        Ok(uploaded.blob)
    }

    /// Create an `app.bsky.feed.post` record in the user's repo
    pub async fn create_post(&mut self, record: &PostRecord) -> Result<StrongRef> {
        let url = self.xrpc("com.atproto.repo.createRecord");
        let repo = self.require_session()?.did.clone();
        let request = CreateRecordRequest {
            repo: &repo,
            collection: POST_COLLECTION,
            record,
        };

        let response = self
            .send_authorized(RequestKind::Write, "Failed to create Bluesky post", |client| {
                client.post(&url).json(&request)
            })
            .await?;

        let created: CreateRecordResponse = response
            .json()
            .await
            .map_err(|e| eyre!("Failed to parse createRecord response: {}", e))?;

        debug!("Created {}", created.uri);

        Ok(created)
    }
}
