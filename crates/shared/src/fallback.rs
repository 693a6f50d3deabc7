use std::collections::BTreeMap;

use crate::cleaner;
use crate::models::{Category, CategorySummary, NewsletterDocument, Priority, StructuredSummary, SummaryMeta};
use crate::requester::DEFAULT_READING_TIME;

pub const TRUNCATE_CHARS: usize = 300;
const SENTENCE_SCAN_CHARS: usize = 50;
const FALLBACK_DOCUMENTS: usize = 5;
const SENTENCE_ENDINGS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Cut `body` to roughly [`TRUNCATE_CHARS`] characters, preferring a sentence end.
///
/// Bodies up to the limit come back unchanged. Longer ones are cut after the
/// last sentence terminator among the final 50 characters of the window (a `.`
/// right after an uppercase letter is treated as an abbreviation), or at the
/// limit itself, and always get a trailing `...`.
pub fn truncate_at_sentence(body: &str) -> String {
    let chars: Vec<char> = body.chars().collect();
    if chars.len() <= TRUNCATE_CHARS {
        return body.to_string();
    }

    let window = &chars[..TRUNCATE_CHARS];
    let cut = (TRUNCATE_CHARS - SENTENCE_SCAN_CHARS..TRUNCATE_CHARS)
        .rev()
        .find(|&i| {
            let c = window[i];
            if !SENTENCE_ENDINGS.contains(&c) {
                return false;
            }
            !(c == '.' && i > 0 && window[i - 1].is_uppercase())
        })
        .map(|i| i + 1)
        .unwrap_or(TRUNCATE_CHARS);

    let mut truncated: String = window[..cut].iter().collect();
    truncated.push_str("...");
    truncated
}

/// Deterministic digest built without the AI service. Never fails.
pub fn fallback(documents: &[NewsletterDocument], processing_timestamp: String) -> StructuredSummary {
    let shown = &documents[..documents.len().min(FALLBACK_DOCUMENTS)];

    let highlights = shown
        .iter()
        .map(|doc| {
            let cleaned = cleaner::clean(doc.body());
            let body = if cleaned.is_empty() { doc.body() } else { cleaned.as_str() };
            format!("{}: {}", doc.title(), truncate_at_sentence(body))
        })
        .collect();

    let mut categories = BTreeMap::new();
    categories.insert(
        Category::General,
        CategorySummary {
            summary: format!(
                "Today's digest includes {} newsletters covering technology, business, and other key domains.",
                documents.len()
            ),
            priority: Priority::High,
            items: shown.iter().map(|doc| doc.title().to_string()).collect(),
        },
    );

    StructuredSummary {
        highlights,
        categories,
        estimated_reading_time: DEFAULT_READING_TIME.to_string(),
        meta: SummaryMeta {
            total_sources: documents.len(),
            processing_timestamp,
            fallback_mode: true,
            batch_processed: false,
            batch_count: 0,
        },
    }
}
