use crate::cleaner;
use crate::models::NewsletterDocument;

/// Links per newsletter that count toward the request (and are sent to the AI).
pub const MAX_LINKS_PER_DOCUMENT: usize = 5;

/// Heuristic constants for sizing AI requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTuning {
    /// Token-equivalent cost of the system prompt.
    pub base_overhead: usize,
    pub chars_per_token: usize,
    /// Largest estimate still sent as a single request.
    pub token_threshold: usize,
    pub batch_size: usize,
}

impl Default for BatchTuning {
    fn default() -> Self {
        Self {
            base_overhead: 1000,
            chars_per_token: 4,
            token_threshold: 12000,
            batch_size: 3,
        }
    }
}

/// Approximate request size, in token-equivalent units, for a set of newsletters.
///
/// This is a coarse estimate. Callers may rely on it for threshold comparison
/// and relative ordering only, never as an exact token count.
pub fn estimate_tokens(documents: &[NewsletterDocument], tuning: &BatchTuning) -> usize {
    let total_chars: usize = documents
        .iter()
        .map(|doc| {
            let cleaned = cleaner::clean(doc.body());
            let links: usize = doc
                .links()
                .iter()
                .take(MAX_LINKS_PER_DOCUMENT)
                .map(|link| link.chars().count())
                .sum();

            doc.title().chars().count() + doc.source().chars().count() + cleaned.chars().count() + links
        })
        .sum();

    tuning.base_overhead + total_chars / tuning.chars_per_token.max(1)
}

#[derive(Debug, PartialEq, Eq)]
pub enum BatchPlan<'a> {
    Single(&'a [NewsletterDocument]),
    Multi(Vec<&'a [NewsletterDocument]>),
}

/// Choose between one request for everything and consecutive fixed-size batches.
///
/// Expects at least one document; the summarizer rejects empty input first.
pub fn plan<'a>(documents: &'a [NewsletterDocument], tuning: &BatchTuning) -> BatchPlan<'a> {
    if estimate_tokens(documents, tuning) <= tuning.token_threshold {
        return BatchPlan::Single(documents);
    }

    BatchPlan::Multi(documents.chunks(tuning.batch_size.max(1)).collect())
}
