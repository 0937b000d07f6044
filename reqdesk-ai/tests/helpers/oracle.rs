//! Scripted oracle
//!
//! Answers each prompt with a test-supplied function and records every call.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use reqdesk_ai::oracle::{Oracle, OracleError, StructuredPrompt};

type Handler = dyn Fn(&StructuredPrompt) -> Result<String, OracleError> + Send + Sync;

/// Which pipeline step produced a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    TagAnalysis,
    Translation,
    Similarity,
    Summary,
    Personalization,
}

pub fn prompt_kind(prompt: &StructuredPrompt) -> PromptKind {
    let system = prompt.system.as_str();
    if system.contains("choose the tags") {
        PromptKind::TagAnalysis
    } else if system.contains("translator") {
        PromptKind::Translation
    } else if system.contains("find similar requests") {
        PromptKind::Similarity
    } else if system.contains("summarize") {
        PromptKind::Summary
    } else if system.contains("tailor") {
        PromptKind::Personalization
    } else {
        panic!("unrecognized prompt: {}", system)
    }
}

pub struct ScriptedOracle {
    handler: Box<Handler>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<StructuredPrompt>>,
}

impl ScriptedOracle {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&StructuredPrompt) -> Result<String, OracleError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts of one kind, in call order
    pub fn prompts_of(&self, kind: PromptKind) -> Vec<StructuredPrompt> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| prompt_kind(p) == kind)
            .cloned()
            .collect()
    }

    pub fn calls_of(&self, kind: PromptKind) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| prompt_kind(p) == kind)
            .count()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, prompt: &StructuredPrompt) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        (self.handler)(prompt)
    }
}

/// First `Title:` line of a prompt's user content
pub fn first_title(prompt: &StructuredPrompt) -> String {
    prompt
        .user
        .lines()
        .find_map(|l| l.strip_prefix("Title: "))
        .unwrap_or_default()
        .to_string()
}

/// Topic of a title: its first word, lowercased
pub fn topic(title: &str) -> String {
    title.split_whitespace().next().unwrap_or_default().to_lowercase()
}

/// `(number, title)` for each enumerated candidate in a similarity prompt
pub fn candidates(prompt: &StructuredPrompt) -> Vec<(usize, String)> {
    prompt
        .user
        .split("Other requests:\n")
        .nth(1)
        .unwrap_or_default()
        .lines()
        .filter_map(|line| {
            let (number, rest) = line.split_once(". [")?;
            let (_, after_id) = rest.split_once("] ")?;
            let (title, _) = after_id.split_once(':')?;
            Some((number.parse().ok()?, title.to_string()))
        })
        .collect()
}

/// Member titles listed in a group summary prompt
pub fn summary_titles(prompt: &StructuredPrompt) -> Vec<String> {
    prompt
        .user
        .lines()
        .filter_map(|l| l.strip_prefix("- "))
        .filter_map(|l| l.split_once(':').map(|(t, _)| t.to_string()))
        .collect()
}

/// Default reply for each prompt kind
///
/// Labels and similarity follow the first word of each title, so
/// "Housing ..." requests share a tag and cluster together.
pub fn topical_reply(prompt: &StructuredPrompt) -> Result<String, OracleError> {
    Ok(match prompt_kind(prompt) {
        PromptKind::TagAnalysis => topic(&first_title(prompt)),
        PromptKind::Translation => format!("{}-localized", prompt.user.trim()),
        PromptKind::Similarity => {
            let reference = topic(&first_title(prompt));
            let similar: Vec<String> = candidates(prompt)
                .into_iter()
                .filter(|(_, title)| topic(title) == reference)
                .map(|(n, _)| n.to_string())
                .collect();
            if similar.is_empty() {
                "none".to_string()
            } else {
                similar.join(", ")
            }
        }
        PromptKind::Summary => {
            let titles = summary_titles(prompt);
            serde_json::json!({
                "title": format!("Group: {}", titles.first().cloned().unwrap_or_default()),
                "description": format!("{} similar requests", titles.len()),
            })
            .to_string()
        }
        PromptKind::Personalization => {
            let staff = prompt
                .user
                .split("Ministry response: ")
                .nth(1)
                .unwrap_or_default();
            format!("Dear author of '{}': {}", first_title(prompt), staff)
        }
    })
}

pub fn topical_oracle() -> Arc<ScriptedOracle> {
    ScriptedOracle::new(topical_reply)
}
