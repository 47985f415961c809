//! Message processing — turning chat turns into memories.
//!
//! [`TextProcessor`] is a rule-based filter over one user message:
//!
//! 1. clean the text (drop URLs, e-mail addresses and stray symbols,
//!    collapse whitespace; case is kept),
//! 2. split it into sentences,
//! 3. keep sentences that state something personal, a preference, or a
//!    plain third-person fact, and that pass [`TextProcessor::is_valid_memory`].
//!
//! It also spots "forget ..." style requests. [`MemoryStore::process_message`]
//! applies both halves to the store in one transaction.

use std::sync::LazyLock;
use std::time::Instant;

use chrono::Utc;
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ProcessingConfig;
use crate::error::Result;
use crate::extraction::is_stop_word;
use crate::store::{self, MemoryStore, validate_user};
use crate::types::{DEFAULT_IMPORTANCE, MemoryId, NewMemory};

/// Boost for sentences carrying personal information.
pub const PERSONAL_BOOST: f64 = 0.2;
/// Boost for sentences stating a preference.
pub const PREFERENCE_BOOST: f64 = 0.15;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"https?://\S+|www\.\S+").expect("url regex")
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\S+@\S+").expect("email regex")
});

static SYMBOL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r#"[^\w\s.,!?;:'"()\-]"#).expect("symbol regex")
});

static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\s+").expect("whitespace regex")
});

static SENTENCE_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[.!?]\s+").expect("sentence end regex")
});

static PERSONAL: LazyLock<RegexSet> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    RegexSet::new([
        r"(?i)\b(i|my|we|our)\b.*\b(name|live|work|from|born|age|birthday|address|email|phone|number)\b",
        r"(?i)\b(i am|i'm)\b.*\b(from|a|an|the|working|studying)\b",
        r"(?i)\b(i|we)\b.*\b(like|love|hate|enjoy|prefer|use|have|own)\b",
        r"(?i)\b(my|our)\b.*\b(favorite|favourite|hobby|interest|passion|job|profession|career)\b",
    ])
    .expect("personal patterns")
});

static PREFERENCE: LazyLock<RegexSet> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    RegexSet::new([
        r"(?i)\b(i|we)\b.*\b(like|love|hate|enjoy|prefer|favorite|favourite)\b",
        r"(?i)\b(i|we)\b.*\b(don't|do not|doesn't|does not)\b.*\b(like|love|enjoy|want)\b",
        r"(?i)\b(i|we)\b.*\b(would|wouldn't|would not)\b.*\b(like|love|enjoy|want|prefer)\b",
    ])
    .expect("preference patterns")
});

static FIRST_PERSON: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?i)\b(i|my|we|our|me)\b").expect("first person regex")
});

static FACTUAL: LazyLock<RegexSet> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    RegexSet::new([
        r"(?i)\b(is|are|was|were|has|have|had|do|does|did)\b",
        r"\b\w+s\b",
        r"\b\w+ed\b",
    ])
    .expect("factual patterns")
});

/// `forget about X`, `don't remember X`, `remove/delete the memory about X`.
static DELETION: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    let compile = |pattern: &str| Regex::new(pattern).expect("deletion regex");
    [
        compile(r"(?i)\bforget\s+(?:about\s+|that\s+)?(.+?)\s*(?:[.!?]|$)"),
        compile(r"(?i)\bdon't\s+remember\s+(.+?)\s*(?:[.!?]|$)"),
        compile(
            r"(?i)\b(?:remove|delete)\s+(?:the\s+)?(?:memory|memories|information|data)\s+(?:about\s+|that\s+)?(.+?)\s*(?:[.!?]|$)",
        ),
    ]
});

// ---------------------------------------------------------------------------
// TextProcessor
// ---------------------------------------------------------------------------

/// Rule-based memory candidate and deletion-request extractor.
#[derive(Debug, Clone)]
pub struct TextProcessor {
    min_words: usize,
    max_words: usize,
    max_stop_word_ratio: f64,
}

impl Default for TextProcessor {
    fn default() -> Self {
        Self::new(&ProcessingConfig::default())
    }
}

impl TextProcessor {
    /// Build a processor with the thresholds from `config`.
    #[must_use]
    pub fn new(config: &ProcessingConfig) -> Self {
        Self {
            min_words: config.min_words,
            max_words: config.max_words,
            max_stop_word_ratio: config.max_stop_word_ratio,
        }
    }

    /// Sentences of `text` worth remembering, cleaned, in message order.
    ///
    /// Sentences that are themselves deletion requests are never returned.
    #[must_use]
    pub fn extract_memory_candidates(&self, text: &str) -> Vec<String> {
        let cleaned = clean_text(text);
        split_sentences(&cleaned)
            .into_iter()
            .filter(|sentence| sentence.split_whitespace().count() >= self.min_words)
            .filter(|sentence| {
                contains_personal_info(sentence)
                    || contains_preference(sentence)
                    || is_factual_statement(sentence)
            })
            .filter(|sentence| self.is_valid_memory(sentence))
            .filter(|sentence| self.extract_deletion_requests(sentence).is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Whether `text` is worth storing: within the word-count bounds, not
    /// dominated by stop-words, and carrying at least one content word.
    #[must_use]
    pub fn is_valid_memory(&self, text: &str) -> bool {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !(c.is_alphanumeric() || c == '\'')).to_lowercase())
            .collect();
        if words.len() < self.min_words || words.len() > self.max_words {
            return false;
        }

        let stop = words.iter().filter(|w| is_stop_word(w)).count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = stop as f64 / words.len() as f64;
        if ratio > self.max_stop_word_ratio {
            return false;
        }

        words.iter().any(|w| !w.is_empty() && !is_stop_word(w))
    }

    /// Content fragments the user asked to forget, de-duplicated in order.
    #[must_use]
    pub fn extract_deletion_requests(&self, text: &str) -> Vec<String> {
        let mut requests: Vec<String> = Vec::new();
        for pattern in DELETION.iter() {
            for caps in pattern.captures_iter(text) {
                let Some(target) = caps.get(1) else { continue };
                let target = target.as_str().trim();
                if !target.is_empty() && !requests.iter().any(|r| r == target) {
                    requests.push(target.to_string());
                }
            }
        }
        requests
    }

    /// Importance for a candidate: [`DEFAULT_IMPORTANCE`] plus
    /// [`PERSONAL_BOOST`] and [`PREFERENCE_BOOST`] when they apply.
    #[must_use]
    pub fn calculate_text_importance(&self, text: &str) -> f64 {
        let mut score = DEFAULT_IMPORTANCE;
        if contains_personal_info(text) {
            score += PERSONAL_BOOST;
        }
        if contains_preference(text) {
            score += PREFERENCE_BOOST;
        }
        score.clamp(0.0, 1.0)
    }
}

/// Strip URLs, e-mail addresses and symbols, then collapse whitespace.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let text = URL_RE.replace_all(text, " ");
    let text = EMAIL_RE.replace_all(&text, " ");
    let text = SYMBOL_RE.replace_all(&text, "");
    SPACE_RE.replace_all(text.trim(), " ").into_owned()
}

/// Split after `.`, `!` or `?` followed by whitespace; the terminator stays
/// with its sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for end in SENTENCE_END_RE.find_iter(text) {
        sentences.push(text[start..=end.start()].trim());
        start = end.end();
    }
    sentences.push(text[start..].trim());
    sentences.retain(|s| !s.is_empty());
    sentences
}

fn contains_personal_info(sentence: &str) -> bool {
    PERSONAL.is_match(sentence)
}

fn contains_preference(sentence: &str) -> bool {
    PREFERENCE.is_match(sentence)
}

fn is_factual_statement(sentence: &str) -> bool {
    !FIRST_PERSON.is_match(sentence) && FACTUAL.is_match(sentence)
}

// ---------------------------------------------------------------------------
// Store integration
// ---------------------------------------------------------------------------

/// A memory created from a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMemory {
    /// Id of the new memory.
    pub memory_id: MemoryId,
    /// The sentence that was stored.
    pub content: String,
}

/// A memory removed because of a deletion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletedMemory {
    /// Id of the removed memory.
    pub memory_id: MemoryId,
    /// The fragment that matched it.
    pub pattern: String,
}

/// What [`MemoryStore::process_message`] did with one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedMessage {
    /// Author of the message.
    pub user_id: String,
    /// Conversation the new memories were filed under.
    pub conversation_id: String,
    /// Memories created, in sentence order.
    pub stored: Vec<StoredMemory>,
    /// Memories deleted, in request order.
    pub deleted: Vec<DeletedMemory>,
}

/// Conversation id used when the caller does not supply one.
#[must_use]
pub fn default_conversation_id(user_id: &str) -> String {
    format!("conv_{}_{user_id}", Utc::now().format("%Y%m%d%H%M%S"))
}

impl MemoryStore {
    /// Store the memory-worthy sentences of `message` and honour any
    /// deletion requests it contains.
    ///
    /// Each candidate is stored with `message` as its source, the
    /// processor's importance score and concepts from the store's
    /// extractor. Deletion requests run afterwards, against the user's
    /// memories including the ones just stored. Everything commits in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// [`StoreError::Validation`](crate::StoreError::Validation) for an
    /// empty user id or conversation id;
    /// [`StoreError::Database`](crate::StoreError::Database) on SQLite
    /// failures, in which case nothing is stored or deleted.
    pub fn process_message(
        &self,
        user_id: &str,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<ProcessedMessage> {
        let start = Instant::now();
        validate_user(user_id)?;
        let conversation_id = match conversation_id {
            Some(id) if id.trim().is_empty() => {
                return Err(crate::StoreError::invalid("conversation id must not be empty"));
            }
            Some(id) => id.to_string(),
            None => default_conversation_id(user_id),
        };

        let processor = &self.processor;
        let candidates = processor
            .extract_memory_candidates(message)
            .into_iter()
            .map(|content| {
                let importance = processor.calculate_text_importance(&content);
                self.prepare(
                    NewMemory::new(user_id, content)
                        .source_message(message)
                        .conversation(conversation_id.as_str())
                        .importance(importance),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let requests = processor.extract_deletion_requests(message);

        let (stored, deleted) = self.write(|tx| {
            let mut stored = Vec::with_capacity(candidates.len());
            for candidate in &candidates {
                let memory_id = store::insert_memory(tx, candidate)?;
                stored.push(StoredMemory {
                    memory_id,
                    content: candidate.new.content.clone(),
                });
            }
            let mut deleted = Vec::new();
            for pattern in &requests {
                for memory_id in store::delete_matching(tx, user_id, pattern)? {
                    deleted.push(DeletedMemory {
                        memory_id,
                        pattern: pattern.clone(),
                    });
                }
            }
            Ok((stored, deleted))
        })?;

        if !deleted.is_empty() {
            info!(user = %user_id, count = deleted.len(), "Forgot memories on request");
        }
        debug!(
            user = %user_id,
            conversation = %conversation_id,
            stored = stored.len(),
            deleted = deleted.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Processed message"
        );
        Ok(ProcessedMessage {
            user_id: user_id.to_string(),
            conversation_id,
            stored,
            deleted,
        })
    }
}
