//! Prompt builders and completion parsers
//!
//! Builders render pipeline data into a [`StructuredPrompt`]. Parsers are pure
//! and never fail: unexpected oracle text degrades to an empty or default
//! result.

use serde::Deserialize;
use std::collections::HashSet;
use uuid::Uuid;
use reqdesk_common::db::{Request, Tag};

use super::StructuredPrompt;

/// Title used when the oracle gives no usable group title
pub const DEFAULT_GROUP_TITLE: &str = "Group of similar requests";

/// Characters of each candidate body shown in a similarity prompt
pub const CANDIDATE_EXCERPT_CHARS: usize = 100;

const NO_TAGS_MARKER: &str = "no tags yet";

/// Ask for a comma-separated list of English labels for one request
pub fn tag_analysis(request: &Request, existing_tags: &[Tag]) -> StructuredPrompt {
    let vocabulary = if existing_tags.is_empty() {
        NO_TAGS_MARKER.to_string()
    } else {
        existing_tags
            .iter()
            .map(|t| format!("{} ({})", t.name, t.localized_name))
            .collect::<Vec<_>>()
            .join(", ")
    };

    StructuredPrompt::new(
        format!(
            "You analyze requests submitted by young people and choose the tags that fit them.\n\
             Existing tags: {}\n\
             If the request matches an existing tag, use it. If no tag fits, suggest a new one.\n\
             Reply with only the tag names in English, separated by commas, for example: \
             education,scholarship,travel",
            vocabulary
        ),
        format!("Title: {}\n\nContent: {}", request.title, request.body),
    )
}

/// Ask for the localized display name of a new label
pub fn tag_translation(label: &str) -> StructuredPrompt {
    StructuredPrompt::new(
        "You are a translator. Translate the following tag into the local display language. \
         Reply with only the translation and no other text.",
        label,
    )
}

/// Ask which candidates are similar to the reference request
///
/// Candidates are enumerated from 1 in slice order.
pub fn similarity(reference: &Request, candidates: &[Request]) -> StructuredPrompt {
    let listing = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let excerpt: String = c.body.chars().take(CANDIDATE_EXCERPT_CHARS).collect();
            format!("{}. [{}] {}: {}...", i + 1, c.id, c.title, excerpt)
        })
        .collect::<Vec<_>>()
        .join("\n");

    StructuredPrompt::new(
        "You find similar requests. Decide which of the listed requests are similar to the \
         reference request.\n\
         Reply with only the identifiers of the similar requests, separated by commas. \
         If none are similar, reply \"none\".",
        format!(
            "Reference request:\nTitle: {}\nContent: {}\n\nOther requests:\n{}",
            reference.title, reference.body, listing
        ),
    )
}

/// Ask for a JSON `{title, description}` summary of a group's members
pub fn group_summary(members: &[Request]) -> StructuredPrompt {
    let listing = members
        .iter()
        .map(|m| format!("- {}: {}", m.title, m.body))
        .collect::<Vec<_>>()
        .join("\n");

    StructuredPrompt::new(
        "You summarize a set of similar requests. Write a short title and description for the \
         group.\n\
         Reply with JSON only: {\"title\": \"...\", \"description\": \"...\"}",
        format!("Requests:\n{}", listing),
    )
}

/// Ask for a version of a staff response tailored to one member request
pub fn personalization(request: &Request, staff_body: &str) -> StructuredPrompt {
    StructuredPrompt::new(
        "You tailor the ministry's general response to an individual request. Make the reply \
         personal and direct, and make sure it answers the specific points raised in the request.",
        format!(
            "Original request:\nTitle: {}\nContent: {}\n\nMinistry response: {}",
            request.title, request.body, staff_body
        ),
    )
}

/// Split a label reply into distinct labels
///
/// Labels are trimmed (including stray quotes and trailing periods); empty
/// entries are dropped and duplicates removed case-insensitively, keeping the
/// first spelling.
pub fn parse_label_list(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut labels = Vec::new();

    for raw in text.split([',', '\n']) {
        let label = raw
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
            .trim();
        if label.is_empty() {
            continue;
        }
        if seen.insert(label.to_lowercase()) {
            labels.push(label.to_string());
        }
    }

    labels
}

/// Resolve a similarity reply to candidate ids
///
/// A token matches a candidate if it is the candidate's 1-based enumeration
/// number or its id. Unknown tokens are dropped; `none` yields an empty set.
pub fn parse_similar_ids(text: &str, candidate_ids: &[Uuid]) -> HashSet<Uuid> {
    let mut matched = HashSet::new();
    if text.trim().eq_ignore_ascii_case("none") {
        return matched;
    }

    let tokens = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|t| t.trim_matches(|c: char| c == '[' || c == ']' || c == '.' || c == '"'))
        .filter(|t| !t.is_empty());

    for token in tokens {
        if let Ok(n) = token.parse::<usize>() {
            if let Some(id) = n.checked_sub(1).and_then(|i| candidate_ids.get(i)) {
                matched.insert(*id);
            }
            continue;
        }
        if let Ok(id) = Uuid::parse_str(token) {
            if candidate_ids.contains(&id) {
                matched.insert(id);
            }
        }
    }

    matched
}

/// Parsed group summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryText {
    pub title: String,
    pub description: Option<String>,
    /// The reply was not valid summary JSON and was used verbatim
    pub malformed: bool,
}

#[derive(Deserialize)]
struct RawSummary {
    title: Option<String>,
    description: Option<String>,
}

/// Parse a `{title, description}` reply, tolerating a fenced code block
pub fn parse_group_summary(text: &str) -> SummaryText {
    let body = strip_code_fence(text);

    match serde_json::from_str::<RawSummary>(body) {
        Ok(raw) => SummaryText {
            title: raw
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_GROUP_TITLE.to_string()),
            description: raw
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            malformed: false,
        },
        Err(_) => {
            let raw = text.trim();
            SummaryText {
                title: DEFAULT_GROUP_TITLE.to_string(),
                description: (!raw.is_empty()).then(|| raw.to_string()),
                malformed: true,
            }
        }
    }
}

/// Localized name from a translation reply, falling back to the label itself
pub fn parse_translation(text: &str, label: &str) -> String {
    let translated = text.trim().trim_matches('"').trim();
    if translated.is_empty() {
        label.to_string()
    } else {
        translated.to_string()
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
