use std::collections::BTreeMap;

use crate::models::{Category, CategorySummary, Priority, StructuredSummary, SummaryMeta};

pub const MAX_HIGHLIGHTS: usize = 5;
pub const MAX_MERGED_ITEMS: usize = 8;
const MAX_MERGED_SUMMARIES: usize = 2;

/// Combine per-batch summaries into one digest.
///
/// `batch_summaries` must hold at least one successful batch; when every batch
/// failed the caller falls back instead of merging.
pub fn merge(
    batch_summaries: &[StructuredSummary],
    total_source_count: usize,
    processing_timestamp: String,
) -> StructuredSummary {
    let highlights = batch_summaries
        .iter()
        .flat_map(|batch| batch.highlights.iter().cloned())
        .take(MAX_HIGHLIGHTS)
        .collect();

    let mut categories = BTreeMap::new();
    for category in Category::SUBSTANTIVE {
        if let Some(merged) = merge_category(category, batch_summaries) {
            categories.insert(category, merged);
        }
    }

    let batch_count = batch_summaries.len();

    StructuredSummary {
        highlights,
        categories,
        estimated_reading_time: reading_time(batch_count),
        meta: SummaryMeta {
            total_sources: total_source_count,
            processing_timestamp,
            fallback_mode: false,
            batch_processed: true,
            batch_count,
        },
    }
}

fn merge_category(category: Category, batches: &[StructuredSummary]) -> Option<CategorySummary> {
    let mut items = Vec::new();
    let mut summaries = Vec::new();
    let mut priority = Priority::Low;

    for section in batches.iter().filter_map(|b| b.categories.get(&category)) {
        items.extend(section.items.iter().cloned());
        if !section.summary.trim().is_empty() {
            summaries.push(section.summary.as_str());
        }
        // "high" always wins; otherwise the first non-"low" value sticks.
        if section.priority == Priority::High || priority == Priority::Low {
            priority = section.priority;
        }
    }

    if items.is_empty() && summaries.is_empty() {
        return None;
    }

    let summary = if summaries.is_empty() {
        format!("Combined insights from multiple newsletters in {}", category.key())
    } else {
        summaries[..summaries.len().min(MAX_MERGED_SUMMARIES)].join(" ")
    };
    items.truncate(MAX_MERGED_ITEMS);

    Some(CategorySummary {
        summary,
        priority,
        items,
    })
}

/// Coarse estimate that grows with the number of batches, not with word counts.
pub fn reading_time(batch_count: usize) -> String {
    format!(
        "Estimated {}-{} minutes",
        8 + batch_count * 2,
        12 + batch_count * 3
    )
}
