//! Keyword classifier for tenant messages.
//!
//! Category keyword sets are checked in a fixed priority order:
//! Maintenance > AccessRequest > RentInquiry > General. The first category
//! with a matching keyword wins; a message matching nothing is
//! `Unclassified`. Classification never fails.

use regex::Regex;
use tracing::debug;

use crate::error::PipelineError;
use crate::pipeline::policy::TriagePolicy;
use crate::pipeline::types::{InboundMessage, RequestCategory};

/// A compiled list of keywords.
///
/// Matching is whole-word and case-insensitive. A keyword ending in `*`
/// matches any word that starts with it (`leak*` matches "leaking").
/// Multi-word keywords tolerate any run of whitespace between words.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    patterns: Vec<(String, Regex)>,
    combined: Option<Regex>,
}

impl KeywordSet {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Result<Self, regex::Error> {
        let mut patterns = Vec::new();
        let mut fragments = Vec::new();

        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            let Some(fragment) = keyword_fragment(&keyword) else {
                continue;
            };
            patterns.push((
                keyword.trim_end_matches('*').to_string(),
                Regex::new(&format!("(?i){fragment}"))?,
            ));
            fragments.push(fragment);
        }

        let combined = if fragments.is_empty() {
            None
        } else {
            Some(Regex::new(&format!("(?i)(?:{})", fragments.join("|")))?)
        };

        Ok(Self { patterns, combined })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.combined.as_ref().is_some_and(|r| r.is_match(text))
    }

    /// First keyword, in list order, that occurs in `text`.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(_, regex)| regex.is_match(text))
            .map(|(keyword, _)| keyword.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Regex fragment for one keyword, or `None` for blank keywords.
fn keyword_fragment(keyword: &str) -> Option<String> {
    let (stem, prefix) = match keyword.strip_suffix('*') {
        Some(stem) => (stem.trim(), true),
        None => (keyword, false),
    };
    if stem.is_empty() {
        return None;
    }

    let body = stem
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");

    // `\b` only holds next to a word character, so keywords that start or
    // end with punctuation are anchored on their word-character sides only.
    let lead = if stem.starts_with(is_word_char) { r"\b" } else { "" };
    let tail = if prefix {
        r"\w*"
    } else if stem.ends_with(is_word_char) {
        r"\b"
    } else {
        ""
    };
    Some(format!("{lead}{body}{tail}"))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Deterministic, total message classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    /// Keyword sets in priority order.
    rules: Vec<(RequestCategory, KeywordSet)>,
}

impl Classifier {
    /// Compile the classifier from policy keyword lists.
    ///
    /// Categories are always evaluated in `RequestCategory::PRIORITY` order,
    /// whatever order the policy lists them in.
    pub fn new(policy: &TriagePolicy) -> Result<Self, PipelineError> {
        let mut rules = Vec::new();
        for category in RequestCategory::PRIORITY {
            let Some(keywords) = policy.keywords.get(&category) else {
                continue;
            };
            let set = KeywordSet::new(keywords).map_err(|e| {
                PipelineError::Policy(format!("keywords for {category}: {e}"))
            })?;
            if !set.is_empty() {
                rules.push((category, set));
            }
        }
        Ok(Self { rules })
    }

    /// Classify a message from its subject and body.
    pub fn classify(&self, message: &InboundMessage) -> RequestCategory {
        let category = self.classify_text(&message.classification_text());
        debug!(id = %message.id, category = %category, "Message classified");
        category
    }

    /// Classify raw text.
    pub fn classify_text(&self, text: &str) -> RequestCategory {
        self.rules
            .iter()
            .find(|(_, set)| set.is_match(text))
            .map(|(category, _)| *category)
            .unwrap_or(RequestCategory::Unclassified)
    }
}
