//! Mastodon REST API models, filtering and pagination

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text::{html_to_text, truncate_display};

/// Visibilities that are safe to republish on a public network
const PUBLIC_VISIBILITIES: &[&str] = &["public", "unlisted"];

/// Account returned by `verify_credentials`
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MastodonAccount {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub acct: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: String,
}

/// A status (post) from the Mastodon API
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MastodonStatus {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    #[serde(default)]
    pub in_reply_to_account_id: Option<String>,
    #[serde(default)]
    pub reblog: Option<Box<MastodonStatus>>,
    #[serde(default)]
    pub media_attachments: Vec<MediaAttachment>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default = "default_visibility")]
    pub visibility: String,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub spoiler_text: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub card: Option<PreviewCard>,
    #[serde(default)]
    pub account: Option<MastodonAccount>,
}

fn default_visibility() -> String {
    "public".to_string()
}

/// Media attached to a status
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MediaAttachment {
    pub id: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: String,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl MediaAttachment {
    pub fn is_image(&self) -> bool {
        self.media_type == "image"
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Mention {
    pub id: String,
    pub username: String,
    pub acct: String,
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub url: String,
}

/// Link preview card attached to a status
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PreviewCard {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// What kind of status this is, for display and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Post,
    Reply,
    Boost,
}

impl std::fmt::Display for PostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PostKind::Post => write!(f, "post"),
            PostKind::Reply => write!(f, "reply"),
            PostKind::Boost => write!(f, "boost"),
        }
    }
}

/// Which statuses to fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostFilter {
    /// Only statuses created at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only statuses created before this instant
    pub until: Option<DateTime<Utc>>,
    pub include_replies: bool,
    pub include_boosts: bool,
    /// Also transfer followers-only and direct statuses
    pub include_private: bool,
}

/// Counts shown after listing statuses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostSummary {
    pub total: usize,
    pub with_media: usize,
    pub replies: usize,
    pub boosts: usize,
}

/// A status prepared for a table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewRow {
    pub id: String,
    pub date: String,
    pub content: String,
    pub media: usize,
    pub kind: PostKind,
}

/// Error parsing a `YYYY-MM-DD` date
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("Invalid date '{0}': expected YYYY-MM-DD")]
pub struct DateError(pub String);

/// Classify a status. A boost is reported as a boost even if it is also a reply.
pub fn post_kind(status: &MastodonStatus) -> PostKind {
    if status.reblog.is_some() {
        PostKind::Boost
    } else if status.in_reply_to_id.is_some() {
        PostKind::Reply
    } else {
        PostKind::Post
    }
}

/// Whether the status passes the transfer filter
pub fn matches_filter(status: &MastodonStatus, filter: &PostFilter) -> bool {
    match post_kind(status) {
        PostKind::Reply if !filter.include_replies => return false,
        PostKind::Boost if !filter.include_boosts => return false,
        _ => {}
    }

    if !filter.include_private && !PUBLIC_VISIBILITIES.contains(&status.visibility.as_str()) {
        return false;
    }

    if filter.since.is_some_and(|since| status.created_at < since) {
        return false;
    }

    if filter.until.is_some_and(|until| status.created_at >= until) {
        return false;
    }

    true
}

/// Statuses come newest first, so the first one older than `since` ends pagination
pub fn is_older_than(status: &MastodonStatus, since: DateTime<Utc>) -> bool {
    status.created_at < since
}

/// Work out the `max_id` cursor for the next page
///
/// Prefers the `rel="next"` entry of the `Link` header and falls back to the
/// id of the last status of the page. Returns `None` when the page is empty.
pub fn next_max_id(link_header: Option<&str>, page: &[MastodonStatus]) -> Option<String> {
    if page.is_empty() {
        return None;
    }

    link_header
        .and_then(parse_next_max_id)
        .or_else(|| page.last().map(|status| status.id.clone()))
}

/// Extract `max_id` from the `rel="next"` link of a `Link` header
pub fn parse_next_max_id(link_header: &str) -> Option<String> {
    let max_id = Regex::new(r"[?&]max_id=([^&>]+)").unwrap();

    link_header
        .split(',')
        .find(|part| part.contains(r#"rel="next""#))
        .and_then(|part| max_id.captures(part))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Count statuses by kind
pub fn summarize(statuses: &[MastodonStatus]) -> PostSummary {
    PostSummary {
        total: statuses.len(),
        with_media: statuses
            .iter()
            .filter(|s| !s.media_attachments.is_empty())
            .count(),
        replies: statuses.iter().filter(|s| s.in_reply_to_id.is_some()).count(),
        boosts: statuses.iter().filter(|s| s.reblog.is_some()).count(),
    }
}

/// Build table rows for at most `max_rows` statuses
pub fn preview_rows(statuses: &[MastodonStatus], max_rows: usize) -> Vec<PreviewRow> {
    statuses
        .iter()
        .take(max_rows)
        .map(|status| PreviewRow {
            id: status.id.clone(),
            date: status.created_at.format("%Y-%m-%d %H:%M").to_string(),
            content: truncate_display(&html_to_text(&status.content).replace('\n', " "), 50),
            media: status.media_attachments.len(),
            kind: post_kind(status),
        })
        .collect()
}

/// Parse a `YYYY-MM-DD` CLI value as midnight UTC
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, DateError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| DateError(value.to_string()))
}

/// Best guess of an image MIME type from its URL, used when the server sends none
pub fn guess_image_mime(url: &str) -> &'static str {
    let path = url
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or(url)
        .to_lowercase();

    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}
