use crate::bluesky::BlueskyClient;
use crate::mastodon::MastodonClient;
use crate::prelude::{eprintln, println, *};
use chrono::Utc;
use colored::Colorize;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, warn};
use mastodon_to_bluesky_core::bluesky::{
    build_external_embed, build_image_embed, BlobRef, PostRecord, PostedThread, ThreadCursor,
    MAX_BLOB_BYTES,
};
use mastodon_to_bluesky_core::mastodon::{MastodonStatus, PostFilter};
use mastodon_to_bluesky_core::state::{
    is_transferred, load_state, record_transfer, save_state, TransferState,
};
use mastodon_to_bluesky_core::transfer::{dry_run_line, plan_status, TransferStats};
use std::path::PathBuf;

/// Which statuses a run covers
#[derive(Debug, Clone, Default)]
pub struct TransferScope {
    pub limit: Option<usize>,
    pub filter: PostFilter,
    pub skip_existing: bool,
}

/// Moves statuses from one Mastodon account to one Bluesky account
pub struct TransferManager {
    mastodon: MastodonClient,
    bluesky: BlueskyClient,
    state_path: PathBuf,
    dry_run: bool,
    show_progress: bool,
    state: TransferState,
    would_transfer: Vec<String>,
}

impl TransferManager {
    /// Expects both clients to be authenticated
    pub fn new(
        mastodon: MastodonClient,
        bluesky: BlueskyClient,
        state_path: PathBuf,
        dry_run: bool,
    ) -> Self {
        let state = match load_state(&state_path) {
            Ok(state) => state,
            Err(err) => {
                warn!("{err}, starting with a fresh state");
                eprintln!("{} {}, starting fresh", "Warning:".yellow().bold(), err);
                TransferState::default()
            }
        };

        Self {
            mastodon,
            bluesky,
            state_path,
            dry_run,
            show_progress: true,
            state,
            would_transfer: Vec::new(),
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn state(&self) -> &TransferState {
        &self.state
    }

    /// Ids a dry run would have posted, oldest first
    pub fn would_transfer(&self) -> &[String] {
        &self.would_transfer
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new(len as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=> "),
        );
        progress
    }

    /// Fetch the selected statuses and publish them oldest first
    ///
    /// A status that fails is reported and counted, and the run goes on.
    /// The state file is saved after every published status.
    pub async fn transfer_posts(&mut self, scope: &TransferScope) -> Result<TransferStats> {
        let mut statuses = self.mastodon.get_posts(scope.limit, &scope.filter).await?;
        statuses.reverse();

        let progress = self.progress_bar(statuses.len());
        let mut stats = TransferStats::default();

        for status in &statuses {
            stats.processed += 1;
            progress.set_message(f!("post {}", status.id));

            if scope.skip_existing && is_transferred(&self.state, &status.id) {
                debug!("Skipping {}: already transferred", status.id);
                stats.skipped += 1;
                progress.inc(1);
                continue;
            }

            if self.dry_run {
                if plan_status(status).is_empty() {
                    debug!("Skipping {}: nothing to post", status.id);
                    stats.skipped += 1;
                } else {
                    // `--json` owns stdout
                    if self.show_progress {
                        progress.suspend(|| println!("{}", dry_run_line(status)));
                    }
                    self.would_transfer.push(status.id.clone());
                    stats.transferred += 1;
                }
                progress.inc(1);
                continue;
            }

            match self.transfer_post(status).await {
                Ok(Some(thread)) => {
                    record_transfer(&mut self.state, &status.id, Some(thread), Utc::now());
                    save_state(&self.state_path, &self.state)
                        .wrap_err("Failed to save transfer state")?;
                    stats.transferred += 1;
                }
                Ok(None) => {
                    debug!("Skipping {}: nothing to post", status.id);
                    stats.skipped += 1;
                }
                Err(err) => {
                    error!("Failed to transfer {}: {err:#}", status.id);
                    progress.suspend(|| {
                        eprintln!(
                            "{} Failed to transfer post {}: {:#}",
                            "✗".red(),
                            status.id,
                            err
                        )
                    });
                    stats.errors += 1;
                }
            }

            progress.inc(1);
        }

        progress.finish_and_clear();

        Ok(stats)
    }

    /// Publish one status as a Bluesky thread
    ///
    /// Returns `None` when the status has nothing to post, including a
    /// media-only status whose images were all dropped. Media problems only
    /// drop the affected image; failing to create a record fails the status.
    pub async fn transfer_post(&mut self, status: &MastodonStatus) -> Result<Option<PostedThread>> {
        let plan = plan_status(status);
        if plan.is_empty() {
            return Ok(None);
        }

        let downloads = join_all(
            plan.images
                .iter()
                .map(|media| self.mastodon.download_media(&media.url)),
        )
        .await;

        let mut images = Vec::new();
        for (media, download) in plan.images.iter().zip(downloads) {
            let (bytes, mime_type) = match download {
                Ok(download) => download,
                Err(err) => {
                    warn!("Skipping image {} of {}: {err:#}", media.id, status.id);
                    continue;
                }
            };

            if bytes.len() > MAX_BLOB_BYTES {
                warn!(
                    "Skipping image {} of {}: {} bytes is over the {} byte limit",
                    media.id,
                    status.id,
                    bytes.len(),
                    MAX_BLOB_BYTES
                );
                continue;
            }

            match self.bluesky.upload_image(bytes, &mime_type).await {
                Ok(blob) => images.push((blob, media.description.clone())),
                Err(err) => warn!("Skipping image {} of {}: {err:#}", media.id, status.id),
            }
        }

        let mut embed = build_image_embed(images);
        if embed.is_none() {
            if let Some(card) = &plan.card {
                let thumb = match &card.image {
                    Some(url) => self.upload_thumb(url).await,
                    None => None,
                };
                embed = Some(build_external_embed(card, thumb));
            }
        }

        if embed.is_none() && !plan.has_text() {
            warn!("Skipping {}: none of its media could be transferred", status.id);
            return Ok(None);
        }

        let parent = plan
            .reply_to
            .as_ref()
            .and_then(|id| self.state.threads.get(id))
            .cloned();
        let mut cursor = ThreadCursor::new(parent.as_ref());

        for chunk in &plan.chunks {
            let (text, facets) = self.bluesky.create_rich_text(chunk).await;

            let mut record = PostRecord::new(text, plan.created_at);
            record.facets = facets;
            record.langs = plan.langs.clone();
            record.reply = cursor.reply();
            record.embed = embed.take();

            let posted = self.bluesky.create_post(&record).await?;
            debug!("Posted {} as {}", status.id, posted.uri);
            cursor.advance(posted);
        }

        Ok(cursor.finish())
    }

    /// Link card thumbnails are best effort
    async fn upload_thumb(&mut self, url: &str) -> Option<BlobRef> {
        let (bytes, mime_type) = match self.mastodon.download_media(url).await {
            Ok(download) => download,
            Err(err) => {
                debug!("Skipping card thumbnail {url}: {err:#}");
                return None;
            }
        };

        if bytes.len() > MAX_BLOB_BYTES {
            debug!("Skipping card thumbnail {url}: too large");
            return None;
        }

        self.bluesky
            .upload_image(bytes, &mime_type)
            .await
            .map_err(|err| debug!("Skipping card thumbnail {url}: {err:#}"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluesky::fixtures::{blob_json, record_json, session_json};
    use crate::http::test_policy;
    use crate::mastodon::fixtures::{account_json, status_json};
    use mastodon_to_bluesky_core::bluesky::StrongRef;
    use tempfile::TempDir;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, Request, ResponseTemplate,
    };

    async fn mount_statuses(mock_server: &MockServer, statuses: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/verify_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(account_json()))
            .mount(mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/1/statuses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(statuses))
            .up_to_n_times(1)
            .mount(mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/1/statuses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(session_json("access-1", "refresh-1")),
            )
            .mount(mock_server)
            .await;
    }

    /// Answers createRecord with a uri numbered by call order
    struct RecordResponder {
        counter: std::sync::atomic::AtomicU32,
    }

    impl wiremock::Respond for RecordResponder {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            let n = self
                .counter
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
                + 1;
            ResponseTemplate::new(200).set_body_json(record_json(n))
        }
    }

    async fn mount_create_record(mock_server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.createRecord"))
            .respond_with(RecordResponder {
                counter: std::sync::atomic::AtomicU32::new(0),
            })
            .mount(mock_server)
            .await;
    }

    async fn manager(
        mock_server: &MockServer,
        state_path: PathBuf,
        dry_run: bool,
    ) -> TransferManager {
        let mut mastodon = MastodonClient::new(&mock_server.uri(), "token")
            .unwrap()
            .with_retry_policy(test_policy());
        mastodon.authenticate().await.unwrap();

        let mut bluesky = BlueskyClient::new(&mock_server.uri(), "alice.bsky.social", "pw")
            .unwrap()
            .with_retry_policy(test_policy());
        bluesky.authenticate().await.unwrap();

        TransferManager::new(mastodon, bluesky, state_path, dry_run).with_progress(false)
    }

    async fn posted_records(mock_server: &MockServer) -> Vec<serde_json::Value> {
        mock_server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/xrpc/com.atproto.repo.createRecord")
            .map(|r| r.body_json::<serde_json::Value>().unwrap()["record"].clone())
            .collect()
    }

    fn scope() -> TransferScope {
        TransferScope {
            skip_existing: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_transfers_oldest_first_and_saves_state() {
        let mock_server = MockServer::start().await;
        mount_statuses(
            &mock_server,
            serde_json::json!([
                status_json("2", "<p>Second</p>", "2024-01-02T10:00:00Z"),
                status_json("1", "<p>First</p>", "2024-01-01T10:00:00Z")
            ]),
        )
        .await;
        mount_create_record(&mock_server).await;

        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state.json");
        let mut manager = manager(&mock_server, state_path.clone(), false).await;

        let stats = manager.transfer_posts(&scope()).await.unwrap();

        assert_eq!(
            stats,
            TransferStats {
                processed: 2,
                transferred: 2,
                skipped: 0,
                errors: 0,
            }
        );

        let texts: Vec<String> = posted_records(&mock_server)
            .await
            .iter()
            .map(|r| r["text"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["First", "Second"]);

        let saved = load_state(&state_path).unwrap();
        assert!(is_transferred(&saved, "1"));
        assert!(is_transferred(&saved, "2"));
        assert_eq!(saved.last_mastodon_id.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_skips_already_transferred() {
        let mock_server = MockServer::start().await;
        mount_statuses(
            &mock_server,
            serde_json::json!([
                status_json("2", "<p>Second</p>", "2024-01-02T10:00:00Z"),
                status_json("1", "<p>First</p>", "2024-01-01T10:00:00Z")
            ]),
        )
        .await;
        mount_create_record(&mock_server).await;

        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state.json");
        let mut existing = TransferState::default();
        record_transfer(&mut existing, "1", None, Utc::now());
        save_state(&state_path, &existing).unwrap();

        let mut manager = manager(&mock_server, state_path, false).await;
        let stats = manager.transfer_posts(&scope()).await.unwrap();

        assert_eq!(stats.processed, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.transferred, 1);
        assert_eq!(posted_records(&mock_server).await.len(), 1);
    }

    #[tokio::test]
    async fn test_no_skip_existing_reposts() {
        let mock_server = MockServer::start().await;
        mount_statuses(
            &mock_server,
            serde_json::json!([status_json("1", "<p>First</p>", "2024-01-01T10:00:00Z")]),
        )
        .await;
        mount_create_record(&mock_server).await;

        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state.json");
        let mut existing = TransferState::default();
        record_transfer(&mut existing, "1", None, Utc::now());
        save_state(&state_path, &existing).unwrap();

        let mut manager = manager(&mock_server, state_path, false).await;
        let stats = manager
            .transfer_posts(&TransferScope::default())
            .await
            .unwrap();

        assert_eq!(stats.transferred, 1);
        assert_eq!(stats.skipped, 0);
    }

    #[tokio::test]
    async fn test_dry_run_does_not_post_or_save() {
        let mock_server = MockServer::start().await;
        mount_statuses(
            &mock_server,
            serde_json::json!([status_json("1", "<p>First</p>", "2024-01-01T10:00:00Z")]),
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.createRecord"))
            .respond_with(ResponseTemplate::new(200).set_body_json(record_json(1)))
            .expect(0)
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state.json");
        let mut manager = manager(&mock_server, state_path.clone(), true).await;

        let stats = manager.transfer_posts(&scope()).await.unwrap();

        assert_eq!(stats.transferred, 1);
        assert_eq!(manager.would_transfer(), ["1".to_string()]);
        assert!(!state_path.exists());
    }

    #[tokio::test]
    async fn test_dry_run_skips_statuses_with_nothing_to_post() {
        let mock_server = MockServer::start().await;
        let mut video = status_json("2", "", "2024-01-02T10:00:00Z");
        video["media_attachments"] = serde_json::json!([
            {"id": "v1", "type": "video", "url": format!("{}/media/clip.mp4", mock_server.uri())}
        ]);
        mount_statuses(
            &mock_server,
            serde_json::json!([
                video,
                status_json("1", "<p>First</p>", "2024-01-01T10:00:00Z")
            ]),
        )
        .await;

        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&mock_server, temp_dir.path().join("state.json"), true).await;

        let stats = manager.transfer_posts(&scope()).await.unwrap();

        assert_eq!(
            stats,
            TransferStats {
                processed: 2,
                transferred: 1,
                skipped: 1,
                errors: 0,
            }
        );
        assert_eq!(manager.would_transfer(), ["1".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_status_is_counted_and_run_continues() {
        let mock_server = MockServer::start().await;
        mount_statuses(
            &mock_server,
            serde_json::json!([
                status_json("3", "<p>Third</p>", "2024-01-03T10:00:00Z"),
                status_json("2", "<p>Broken</p>", "2024-01-02T10:00:00Z"),
                status_json("1", "<p>First</p>", "2024-01-01T10:00:00Z")
            ]),
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.createRecord"))
            .and(body_partial_json(serde_json::json!({"record": {"text": "Broken"}})))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "InvalidRequest",
                "message": "Record is invalid"
            })))
            .mount(&mock_server)
            .await;
        mount_create_record(&mock_server).await;

        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state.json");
        let mut manager = manager(&mock_server, state_path.clone(), false).await;

        let stats = manager.transfer_posts(&scope()).await.unwrap();

        assert_eq!(stats.processed, 3);
        assert_eq!(stats.transferred, 2);
        assert_eq!(stats.errors, 1);

        let saved = load_state(&state_path).unwrap();
        assert!(!is_transferred(&saved, "2"));
        assert!(is_transferred(&saved, "3"));
    }

    #[tokio::test]
    async fn test_long_status_is_posted_as_thread() {
        let mock_server = MockServer::start().await;
        let long = format!("<p>{}</p>", "This is a sentence. ".repeat(40));
        mount_statuses(
            &mock_server,
            serde_json::json!([status_json("1", &long, "2024-01-01T10:00:00Z")]),
        )
        .await;
        mount_create_record(&mock_server).await;

        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&mock_server, temp_dir.path().join("state.json"), false).await;

        manager.transfer_posts(&scope()).await.unwrap();

        let records = posted_records(&mock_server).await;
        assert!(records.len() > 1);
        assert!(records[0].get("reply").is_none());
        assert!(records[0]["text"].as_str().unwrap().starts_with("[1/"));

        let first_uri = "at://did:plc:alice/app.bsky.feed.post/1";
        assert_eq!(records[1]["reply"]["root"]["uri"], first_uri);
        assert_eq!(records[1]["reply"]["parent"]["uri"], first_uri);
        if records.len() > 2 {
            assert_eq!(records[2]["reply"]["root"]["uri"], first_uri);
            assert_eq!(
                records[2]["reply"]["parent"]["uri"],
                "at://did:plc:alice/app.bsky.feed.post/2"
            );
        }

        let thread = manager.state().threads.get("1").unwrap();
        assert_eq!(thread.root.uri, first_uri);
    }

    #[tokio::test]
    async fn test_self_reply_is_threaded_under_parent() {
        let mock_server = MockServer::start().await;
        let mut reply = status_json("2", "<p>More thoughts</p>", "2024-01-02T10:00:00Z");
        reply["in_reply_to_id"] = serde_json::json!("1");
        mount_statuses(&mock_server, serde_json::json!([reply])).await;
        mount_create_record(&mock_server).await;

        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state.json");
        let parent = StrongRef {
            uri: "at://did:plc:alice/app.bsky.feed.post/parent".to_string(),
            cid: "bafyreiparent".to_string(),
        };
        let mut existing = TransferState::default();
        record_transfer(
            &mut existing,
            "1",
            Some(PostedThread {
                root: parent.clone(),
                last: parent,
            }),
            Utc::now(),
        );
        save_state(&state_path, &existing).unwrap();

        let mut manager = manager(&mock_server, state_path, false).await;
        let scope = TransferScope {
            skip_existing: true,
            filter: PostFilter {
                include_replies: true,
                ..Default::default()
            },
            ..Default::default()
        };
        manager.transfer_posts(&scope).await.unwrap();

        let records = posted_records(&mock_server).await;
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0]["reply"]["parent"]["uri"],
            "at://did:plc:alice/app.bsky.feed.post/parent"
        );
    }

    #[tokio::test]
    async fn test_images_are_uploaded_and_embedded() {
        let mock_server = MockServer::start().await;
        let mut status = status_json("1", "<p>Cats</p>", "2024-01-01T10:00:00Z");
        status["media_attachments"] = serde_json::json!([
            {"id": "m1", "type": "image", "url": format!("{}/media/cat.png", mock_server.uri()), "description": "A cat"},
            {"id": "m2", "type": "image", "url": format!("{}/media/huge.jpg", mock_server.uri())}
        ]);
        mount_statuses(&mock_server, serde_json::json!([status])).await;
        mount_create_record(&mock_server).await;

        Mock::given(method("GET"))
            .and(path("/media/cat.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "image/png")
                    .set_body_bytes(vec![7u8; 16]),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/media/huge.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "image/jpeg")
                    .set_body_bytes(vec![0u8; MAX_BLOB_BYTES + 1]),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.uploadBlob"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(blob_json("bafkreicat", "image/png", 16)),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&mock_server, temp_dir.path().join("state.json"), false).await;

        let stats = manager.transfer_posts(&scope()).await.unwrap();
        assert_eq!(stats.transferred, 1);

        let records = posted_records(&mock_server).await;
        let embed = &records[0]["embed"];
        assert_eq!(embed["$type"], "app.bsky.embed.images");
        assert_eq!(embed["images"].as_array().unwrap().len(), 1);
        assert_eq!(embed["images"][0]["alt"], "A cat");
        assert_eq!(embed["images"][0]["image"]["ref"]["$link"], "bafkreicat");
    }

    #[tokio::test]
    async fn test_failed_upload_drops_only_that_image() {
        let mock_server = MockServer::start().await;
        let mut status = status_json("1", "<p>Pets</p>", "2024-01-01T10:00:00Z");
        status["media_attachments"] = serde_json::json!([
            {"id": "m1", "type": "image", "url": format!("{}/media/cat.png", mock_server.uri())},
            {"id": "m2", "type": "image", "url": format!("{}/media/dog.jpg", mock_server.uri())}
        ]);
        mount_statuses(&mock_server, serde_json::json!([status])).await;
        mount_create_record(&mock_server).await;

        Mock::given(method("GET"))
            .and(path("/media/cat.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "image/png")
                    .set_body_bytes(vec![7u8; 16]),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/media/dog.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "image/jpeg")
                    .set_body_bytes(vec![9u8; 16]),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.uploadBlob"))
            .and(header("content-type", "image/png"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(blob_json("bafkreicat", "image/png", 16)),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.repo.uploadBlob"))
            .and(header("content-type", "image/jpeg"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&mock_server, temp_dir.path().join("state.json"), false).await;

        let stats = manager.transfer_posts(&scope()).await.unwrap();
        assert_eq!(stats.transferred, 1);
        assert_eq!(stats.errors, 0);

        let records = posted_records(&mock_server).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["text"], "Pets");
        let images = records[0]["embed"]["images"].as_array().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["image"]["ref"]["$link"], "bafkreicat");
    }

    #[tokio::test]
    async fn test_media_only_status_with_no_usable_image_is_skipped() {
        let mock_server = MockServer::start().await;
        let mut status = status_json("1", "", "2024-01-01T10:00:00Z");
        status["media_attachments"] = serde_json::json!([
            {"id": "m1", "type": "image", "url": format!("{}/media/gone.png", mock_server.uri())}
        ]);
        mount_statuses(&mock_server, serde_json::json!([status])).await;
        mount_create_record(&mock_server).await;

        Mock::given(method("GET"))
            .and(path("/media/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state.json");
        let mut manager = manager(&mock_server, state_path.clone(), false).await;

        let stats = manager.transfer_posts(&scope()).await.unwrap();

        assert_eq!(
            stats,
            TransferStats {
                processed: 1,
                transferred: 0,
                skipped: 1,
                errors: 0,
            }
        );
        assert!(posted_records(&mock_server).await.is_empty());
        assert!(!is_transferred(manager.state(), "1"));
        assert!(!state_path.exists());
    }

    #[tokio::test]
    async fn test_card_becomes_external_embed() {
        let mock_server = MockServer::start().await;
        let mut status = status_json(
            "1",
            "<p>Read this https://example.com/article</p>",
            "2024-01-01T10:00:00Z",
        );
        status["card"] = serde_json::json!({
            "url": "https://example.com/article",
            "title": "An article",
            "description": "Worth reading",
            "image": null
        });
        mount_statuses(&mock_server, serde_json::json!([status])).await;
        mount_create_record(&mock_server).await;

        let temp_dir = TempDir::new().unwrap();
        let mut manager = manager(&mock_server, temp_dir.path().join("state.json"), false).await;

        manager.transfer_posts(&scope()).await.unwrap();

        let records = posted_records(&mock_server).await;
        let embed = &records[0]["embed"];
        assert_eq!(embed["$type"], "app.bsky.embed.external");
        assert_eq!(embed["external"]["uri"], "https://example.com/article");
        assert_eq!(embed["external"]["title"], "An article");
        assert_eq!(
            records[0]["facets"][0]["features"][0]["uri"],
            "https://example.com/article"
        );
    }

    #[tokio::test]
    async fn test_unreadable_state_starts_fresh() {
        let mock_server = MockServer::start().await;
        mount_statuses(&mock_server, serde_json::json!([])).await;

        let temp_dir = TempDir::new().unwrap();
        let state_path = temp_dir.path().join("state.json");
        std::fs::write(&state_path, "{ broken").unwrap();

        let manager = manager(&mock_server, state_path, false).await;

        assert!(manager.state().transferred_ids.is_empty());
    }
}
