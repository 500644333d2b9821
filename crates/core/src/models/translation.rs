//! `TranslationCache` — self-purging cache of target-script translations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationEngine {
    /// Lowest priority: no translation has ever been recorded.
    Empty,
    /// Any LLM-backed engine (gemini, openai, ...).
    Llm,
    /// A human-entered translation; always wins a merge.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationCacheEntry {
    pub original_text: String,
    pub translated_text: String,
    pub engine_used: TranslationEngine,
    pub last_updated_at: DateTime<Utc>,
}

/// Whether `text` contains at least one target-script (CJK) character.
/// Grounded in the source's `contains_chinese` check used both to gate
/// translation validity and to filter actor-subscription titles.
pub fn contains_target_script(text: &str) -> bool {
    text.chars().any(|c| {
        let cp = c as u32;
        (0x4E00..=0x9FFF).contains(&cp) // CJK Unified Ideographs
            || (0x3400..=0x4DBF).contains(&cp) // CJK Extension A
            || (0xF900..=0xFAFF).contains(&cp) // CJK Compatibility Ideographs
    })
}
