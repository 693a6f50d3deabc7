use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{AiRequestError, EmptyInputError};
use crate::error_tracker::{ErrorTracker, AI_BATCH_PROCESSING};
use crate::fallback;
use crate::merger;
use crate::models::{NewsletterDocument, StructuredSummary, SummaryMeta};
use crate::planner::{self, BatchPlan, BatchTuning};
use crate::requester::{AiTransport, SummaryRequester};

/// Entry point of summarization: plan, request, then merge or fall back.
///
/// Holds no per-call state. Batches are requested one after another so
/// highlight order follows input order.
pub struct Summarizer<T> {
    requester: SummaryRequester<T>,
    tuning: BatchTuning,
    errors: Option<Arc<ErrorTracker>>,
}

impl<T: AiTransport> Summarizer<T> {
    pub fn new(requester: SummaryRequester<T>, tuning: BatchTuning) -> Self {
        Self {
            requester,
            tuning,
            errors: None,
        }
    }

    /// Record failed AI requests in `tracker`.
    pub fn with_error_tracker(mut self, tracker: Arc<ErrorTracker>) -> Self {
        self.errors = Some(tracker);
        self
    }

    /// Summarize `documents`. Only empty input is an error; AI failures degrade
    /// to the deterministic fallback digest.
    pub async fn summarize(
        &self,
        documents: &[NewsletterDocument],
    ) -> Result<StructuredSummary, EmptyInputError> {
        if documents.is_empty() {
            return Err(EmptyInputError);
        }

        info!("Starting AI summarization for {} newsletters", documents.len());
        let timestamp = now();

        match planner::plan(documents, &self.tuning) {
            BatchPlan::Single(batch) => {
                info!("Processing all newsletters in a single batch");
                match self.requester.request_summary(batch).await {
                    Ok(mut summary) => {
                        summary.meta = SummaryMeta {
                            total_sources: documents.len(),
                            processing_timestamp: timestamp,
                            fallback_mode: false,
                            batch_processed: false,
                            batch_count: 1,
                        };
                        Ok(summary)
                    }
                    Err(e) => {
                        warn!("AI summarization failed: {}, using fallback", e);
                        self.record(&e);
                        Ok(fallback::fallback(documents, timestamp))
                    }
                }
            }
            BatchPlan::Multi(batches) => {
                info!(
                    "Content exceeds token budget, processing {} newsletters in {} batches",
                    documents.len(),
                    batches.len()
                );

                let mut succeeded = Vec::with_capacity(batches.len());
                for (i, batch) in batches.iter().enumerate() {
                    info!(
                        "Processing batch {}/{} with {} newsletters",
                        i + 1,
                        batches.len(),
                        batch.len()
                    );
                    match self.requester.request_summary(batch).await {
                        Ok(summary) => succeeded.push(summary),
                        Err(e) => {
                            warn!("Batch {} failed: {}, continuing with remaining batches", i + 1, e);
                            self.record(&e);
                        }
                    }
                }

                if succeeded.is_empty() {
                    error!("All batches failed, using fallback");
                    return Ok(fallback::fallback(documents, timestamp));
                }

                Ok(merger::merge(&succeeded, documents.len(), timestamp))
            }
        }
    }

    fn record(&self, e: &AiRequestError) {
        if let Some(tracker) = &self.errors {
            tracker.record_error(AI_BATCH_PROCESSING, e.kind(), e);
        }
    }
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
