//! AT Protocol record models, rich text facets and embeds for Bluesky posts

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::mastodon::PreviewCard;
use crate::text::truncate_chars;

/// Bluesky post length limit
pub const MAX_POST_CHARS: usize = 300;
/// Images per post
pub const MAX_IMAGES: usize = 4;
/// Alt text limit per image
pub const MAX_ALT_CHARS: usize = 1000;
/// Blob size accepted by `uploadBlob` for images
pub const MAX_BLOB_BYTES: usize = 1_000_000;

pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Link card title/description limits used when building external embeds
const MAX_CARD_TITLE_CHARS: usize = 300;
const MAX_CARD_DESCRIPTION_CHARS: usize = 1000;

const MAX_TAG_CHARS: usize = 64;

/// Characters stripped from the end of detected links
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"'];

// =============================================================================
// API Response Types
// =============================================================================

/// Session returned by `com.atproto.server.createSession` and `refreshSession`
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub did: String,
    pub handle: String,
    pub access_jwt: String,
    pub refresh_jwt: String,
}

/// Reference to an uploaded blob
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BlobRef {
    #[serde(rename = "$type", default = "blob_type")]
    pub blob_type: String,
    #[serde(rename = "ref")]
    pub link: CidLink,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub size: u64,
}

fn blob_type() -> String {
    "blob".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CidLink {
    #[serde(rename = "$link")]
    pub link: String,
}

/// Response of `com.atproto.repo.uploadBlob`
#[derive(Debug, Deserialize, Clone)]
pub struct UploadBlobResponse {
    pub blob: BlobRef,
}

/// Response of `com.atproto.identity.resolveHandle`
#[derive(Debug, Deserialize, Clone)]
pub struct ResolveHandleResponse {
    pub did: String,
}

/// uri + cid pair identifying a record version
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

/// Response of `com.atproto.repo.createRecord`
pub type CreateRecordResponse = StrongRef;

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

impl ByteSlice {
    fn overlaps(&self, other: &ByteSlice) -> bool {
        self.byte_start < other.byte_end && other.byte_start < self.byte_end
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention { did: String },
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "$type")]
pub enum Embed {
    #[serde(rename = "app.bsky.embed.images")]
    Images { images: Vec<EmbedImage> },
    #[serde(rename = "app.bsky.embed.external")]
    External { external: ExternalLink },
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmbedImage {
    pub image: BlobRef,
    pub alt: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExternalLink {
    pub uri: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thumb: Option<BlobRef>,
}

/// `app.bsky.feed.post` record
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub record_type: String,
    pub text: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub facets: Vec<Facet>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub embed: Option<Embed>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reply: Option<ReplyRef>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub langs: Vec<String>,
}

impl PostRecord {
    pub fn new(text: String, created_at: DateTime<Utc>) -> Self {
        Self {
            record_type: POST_COLLECTION.to_string(),
            text,
            created_at: format_created_at(created_at),
            facets: vec![],
            embed: None,
            reply: None,
            langs: vec![],
        }
    }
}

/// Request body of `com.atproto.repo.createRecord`
#[derive(Debug, Serialize, Clone)]
pub struct CreateRecordRequest<'a> {
    pub repo: &'a str,
    pub collection: &'a str,
    pub record: &'a PostRecord,
}

/// Timestamps in records use millisecond precision and a `Z` suffix
pub fn format_created_at(created_at: DateTime<Utc>) -> String {
    created_at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// =============================================================================
// Rich text facets
// =============================================================================

/// A span of text that may become a facet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetCandidate {
    pub index: ByteSlice,
    /// URL, tag without `#`, or handle without `@`
    pub value: String,
}

/// Find `http(s)://` links, trimming trailing punctuation
pub fn detect_links(text: &str) -> Vec<FacetCandidate> {
    let url = Regex::new(r#"https?://[^\s<>"]+"#).unwrap();

    url.find_iter(text)
        .filter_map(|found| {
            let mut value = found.as_str();
            loop {
                let trimmed = value.trim_end_matches(TRAILING_PUNCTUATION);
                let trimmed = if trimmed.ends_with(')') && !trimmed.contains('(') {
                    &trimmed[..trimmed.len() - 1]
                } else {
                    trimmed
                };
                if trimmed.len() == value.len() {
                    break;
                }
                value = trimmed;
            }

            // A bare scheme is not a link
            if value.ends_with("://") {
                return None;
            }

            Some(FacetCandidate {
                index: ByteSlice {
                    byte_start: found.start(),
                    byte_end: found.start() + value.len(),
                },
                value: value.to_string(),
            })
        })
        .collect()
}

/// Find `#hashtags` that start the text or follow whitespace
pub fn detect_tags(text: &str) -> Vec<FacetCandidate> {
    let tag = Regex::new(r"(?:^|\s)(#[^\s#]+)").unwrap();

    tag.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|found| {
            let name = found.as_str()[1..]
                .trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '_');

            if name.is_empty()
                || name.chars().all(|c| c.is_ascii_digit())
                || name.chars().count() > MAX_TAG_CHARS
            {
                return None;
            }

            Some(FacetCandidate {
                index: ByteSlice {
                    byte_start: found.start(),
                    byte_end: found.start() + 1 + name.len(),
                },
                value: name.to_string(),
            })
        })
        .collect()
}

/// Find `@handle.domain` mentions that start the text or follow whitespace or `(`
pub fn detect_mentions(text: &str) -> Vec<FacetCandidate> {
    let mention = Regex::new(
        r"(?:^|[\s(])(@(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)",
    )
    .unwrap();

    mention
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        // `@alice@mastodon.social` is a fediverse address, not a Bluesky handle
        .filter(|found| !text[found.end()..].starts_with('@'))
        .map(|found| FacetCandidate {
            index: ByteSlice {
                byte_start: found.start(),
                byte_end: found.end(),
            },
            value: found.as_str()[1..].to_string(),
        })
        .collect()
}

/// Build facets for a post text
///
/// Links and tags are always faceted. Mentions are faceted only when `dids`
/// maps their handle to a DID; the rest stay plain text. Overlapping spans
/// keep the first one found in link, mention, tag order.
pub fn build_facets(text: &str, dids: &HashMap<String, String>) -> Vec<Facet> {
    let links = detect_links(text).into_iter().map(|c| Facet {
        index: c.index,
        features: vec![FacetFeature::Link { uri: c.value }],
    });

    let mentions = detect_mentions(text).into_iter().filter_map(|c| {
        dids.get(&c.value.to_lowercase()).map(|did| Facet {
            index: c.index,
            features: vec![FacetFeature::Mention { did: did.clone() }],
        })
    });

    let tags = detect_tags(text).into_iter().map(|c| Facet {
        index: c.index,
        features: vec![FacetFeature::Tag { tag: c.value }],
    });

    let mut facets: Vec<Facet> = Vec::new();
    for facet in links.chain(mentions).chain(tags) {
        if !facets.iter().any(|f| f.index.overlaps(&facet.index)) {
            facets.push(facet);
        }
    }

    facets.sort_by_key(|f| f.index.byte_start);
    facets
}

// =============================================================================
// Embeds
// =============================================================================

/// Images embed for up to four uploaded images, or `None` when there are none
pub fn build_image_embed(images: Vec<(BlobRef, Option<String>)>) -> Option<Embed> {
    let images: Vec<EmbedImage> = images
        .into_iter()
        .take(MAX_IMAGES)
        .map(|(image, alt)| EmbedImage {
            image,
            alt: alt
                .map(|alt| truncate_chars(&alt, MAX_ALT_CHARS))
                .unwrap_or_default(),
        })
        .collect();

    if images.is_empty() {
        None
    } else {
        Some(Embed::Images { images })
    }
}

/// External link embed built from a Mastodon preview card
pub fn build_external_embed(card: &PreviewCard, thumb: Option<BlobRef>) -> Embed {
    let title = if card.title.trim().is_empty() {
        card.url.clone()
    } else {
        card.title.clone()
    };

    Embed::External {
        external: ExternalLink {
            uri: card.url.clone(),
            title: truncate_chars(&title, MAX_CARD_TITLE_CHARS),
            description: truncate_chars(&card.description, MAX_CARD_DESCRIPTION_CHARS),
            thumb,
        },
    }
}

// =============================================================================
// Threads
// =============================================================================

/// A thread created for one Mastodon status
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PostedThread {
    /// Root of the Bluesky thread the status belongs to
    pub root: StrongRef,
    /// Last record created for the status; replies attach here
    pub last: StrongRef,
}

/// Reply reference placing a record under `parent` in the thread started by `root`
pub fn thread_reply(root: &StrongRef, parent: &StrongRef) -> ReplyRef {
    ReplyRef {
        root: root.clone(),
        parent: parent.clone(),
    }
}

/// Tracks root and parent while the chunks of a status are posted
#[derive(Debug, Clone, Default)]
pub struct ThreadCursor {
    root: Option<StrongRef>,
    parent: Option<StrongRef>,
}

impl ThreadCursor {
    /// Start a new thread, or continue below an already transferred status
    pub fn new(reply_to: Option<&PostedThread>) -> Self {
        match reply_to {
            Some(thread) => Self {
                root: Some(thread.root.clone()),
                parent: Some(thread.last.clone()),
            },
            None => Self::default(),
        }
    }

    /// Reply reference for the next record, `None` for a thread's first record
    pub fn reply(&self) -> Option<ReplyRef> {
        match (&self.root, &self.parent) {
            (Some(root), Some(parent)) => Some(thread_reply(root, parent)),
            _ => None,
        }
    }

    /// Record that `posted` was created; it becomes the next parent
    pub fn advance(&mut self, posted: StrongRef) {
        if self.root.is_none() {
            self.root = Some(posted.clone());
        }
        self.parent = Some(posted);
    }

    /// The thread as posted so far, `None` for a new thread with nothing posted
    pub fn finish(self) -> Option<PostedThread> {
        match (self.root, self.parent) {
            (Some(root), Some(last)) => Some(PostedThread { root, last }),
            _ => None,
        }
    }
}
