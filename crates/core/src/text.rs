//! Plain text handling: Mastodon HTML to text and splitting long posts into threads

use regex::Regex;
use scraper::{ElementRef, Html};

/// Marker appended to a chunk that continues in the next one (and prepended to the next one)
pub const ELLIPSIS: &str = "...";

/// Characters kept free in every chunk for the ellipsis markers and the `[i/n] ` prefix
const THREAD_RESERVE: usize = 10;

/// Count characters (Unicode scalar values), which is how post limits are measured
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Truncate text to at most `max` characters without splitting a code point
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Truncate text for display, replacing the tail with `...` when it is too long
///
/// Text longer than `max` characters keeps its first `max - 3` characters.
pub fn truncate_display(text: &str, max: usize) -> String {
    if char_len(text) > max {
        format!(
            "{}{ELLIPSIS}",
            truncate_chars(text, max.saturating_sub(ELLIPSIS.len()))
        )
    } else {
        text.to_string()
    }
}

/// Convert Mastodon status HTML to plain text
///
/// `<br>` becomes a newline and every `<p>` is followed by a blank line.
/// Entities are decoded by the parser, runs of three or more newlines are
/// collapsed to two and the result is trimmed.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut text = String::new();
    collect_text(fragment.root_element(), &mut text);

    let newlines = Regex::new(r"\n{3,}").unwrap();
    newlines.replace_all(&text, "\n\n").trim().to_string()
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_element) = ElementRef::wrap(child) {
            match child_element.value().name() {
                "br" => out.push('\n'),
                "p" => {
                    collect_text(child_element, out);
                    out.push_str("\n\n");
                }
                _ => collect_text(child_element, out),
            }
        }
    }
}

/// Prefix the text with the status content warning, if any
pub fn apply_content_warning(text: &str, spoiler_text: &str) -> String {
    let spoiler = spoiler_text.trim();
    if spoiler.is_empty() {
        text.to_string()
    } else {
        format!("CW: {spoiler}\n\n{text}")
    }
}

/// Split text into chunks that fit within `max_len` characters
///
/// Short text is returned unchanged. Longer text is packed sentence by
/// sentence, falling back to words (and to hard splits for words that are
/// too long on their own). Continued chunks end with `...`, continuations
/// start with `...`, and every chunk of a multi-chunk result is prefixed
/// with `[i/n] `. No chunk is longer than `max_len` characters as long as
/// `max_len` leaves room for the markers (anything from ~20 up).
pub fn split_text(text: &str, max_len: usize) -> Vec<String> {
    if char_len(text) <= max_len {
        return vec![text.to_string()];
    }

    let sentences = split_sentences(text);
    let mut reserve = THREAD_RESERVE;

    loop {
        let budget = max_len.saturating_sub(reserve).max(ELLIPSIS.len() + 1);
        let chunks = pack_chunks(&sentences, budget);
        let total = chunks.len();
        let needed = ELLIPSIS.len() + thread_prefix(total, total).len();

        // The prefix grows with the number of chunks, so re-pack with a
        // larger reserve until the widest prefix fits.
        if needed <= reserve || budget == ELLIPSIS.len() + 1 {
            return chunks
                .into_iter()
                .enumerate()
                .map(|(idx, chunk)| format!("{}{chunk}", thread_prefix(idx + 1, total)))
                .collect();
        }
        reserve = needed;
    }
}

fn thread_prefix(position: usize, total: usize) -> String {
    format!("[{position}/{total}] ")
}

/// Split on `.`, `!` or `?` followed by whitespace, keeping the punctuation
fn split_sentences(text: &str) -> Vec<&str> {
    let boundary = Regex::new(r"[.!?]\s+").unwrap();
    let mut sentences = Vec::new();
    let mut start = 0;

    for found in boundary.find_iter(text) {
        // The punctuation is a single ASCII byte.
        let end = found.start() + 1;
        sentences.push(&text[start..end]);
        start = found.end();
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn pack_chunks(sentences: &[&str], budget: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let piece_budget = budget - ELLIPSIS.len();

    for sentence in sentences {
        if char_len(sentence) + ELLIPSIS.len() > budget {
            for word in sentence.split_whitespace() {
                for piece in hard_split(word, piece_budget) {
                    push_piece(&mut chunks, &mut current, &piece, budget);
                }
            }
        } else {
            push_piece(&mut chunks, &mut current, sentence, budget);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn push_piece(chunks: &mut Vec<String>, current: &mut String, piece: &str, budget: usize) {
    let separator = usize::from(!current.is_empty());

    if char_len(current) + separator + char_len(piece) <= budget {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(piece);
    } else {
        if !current.is_empty() {
            chunks.push(format!("{current}{ELLIPSIS}"));
        }
        *current = format!("{ELLIPSIS}{piece}");
    }
}

fn hard_split(word: &str, size: usize) -> Vec<String> {
    if char_len(word) <= size {
        return vec![word.to_string()];
    }

    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|piece| piece.iter().collect())
        .collect()
}
