//! Planning how a Mastodon status becomes a Bluesky thread

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bluesky::{MAX_IMAGES, MAX_POST_CHARS};
use crate::mastodon::{MastodonStatus, MediaAttachment, PreviewCard};
use crate::text::{apply_content_warning, html_to_text, split_text, truncate_chars};

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    pub processed: usize,
    pub transferred: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Everything needed to publish one status, minus the uploads
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPlan {
    pub mastodon_id: String,
    /// Post texts, one record each, posted as a thread
    pub chunks: Vec<String>,
    /// Image attachments for the first record
    pub images: Vec<MediaAttachment>,
    /// Link card for the first record, only used when there are no images
    pub card: Option<PreviewCard>,
    pub created_at: DateTime<Utc>,
    pub langs: Vec<String>,
    /// Mastodon id of the status this one replies to
    pub reply_to: Option<String>,
}

impl TransferPlan {
    /// Nothing to post: no text, no images, no card
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.card.is_none() && !self.has_text()
    }

    /// Whether any chunk carries text; media-only statuses have none
    pub fn has_text(&self) -> bool {
        self.chunks.iter().any(|chunk| !chunk.trim().is_empty())
    }
}

/// Plan the Bluesky thread for a status
///
/// Boosts republish the boosted status' text and media with a
/// `🔁 @account:` prefix. The text gets the content warning prefix and is
/// split to the post length limit. Only images are carried over (at most
/// four); the link card is kept only for posts without images.
pub fn plan_status(status: &MastodonStatus) -> TransferPlan {
    let (source, prefix) = match &status.reblog {
        Some(original) => {
            let prefix = match &original.account {
                Some(account) if !account.acct.is_empty() => format!("🔁 @{}: ", account.acct),
                _ => "🔁 ".to_string(),
            };
            (original.as_ref(), prefix)
        }
        None => (status, String::new()),
    };

    let body = format!("{prefix}{}", html_to_text(&source.content));
    let text = apply_content_warning(body.trim(), &source.spoiler_text);
    let chunks = split_text(&text, MAX_POST_CHARS);

    let images: Vec<MediaAttachment> = source
        .media_attachments
        .iter()
        .filter(|media| media.is_image())
        .take(MAX_IMAGES)
        .cloned()
        .collect();

    let card = if images.is_empty() {
        source.card.clone()
    } else {
        None
    };

    let langs = source
        .language
        .iter()
        .filter(|lang| !lang.is_empty())
        .cloned()
        .collect();

    TransferPlan {
        mastodon_id: status.id.clone(),
        chunks,
        images,
        card,
        created_at: status.created_at,
        langs,
        reply_to: status
            .reblog
            .is_none()
            .then(|| status.in_reply_to_id.clone())
            .flatten(),
    }
}

/// Line printed for each status in a dry run
pub fn dry_run_line(status: &MastodonStatus) -> String {
    let text = html_to_text(&status.content).replace('\n', " ");
    format!(
        "Would transfer post {}: {}...",
        status.id,
        truncate_chars(&text, 50)
    )
}
