use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::DocumentError;

/// One newsletter handed to the summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsletterDocument {
    title: String,
    body: String,
    source: String,
    published_date: String,
    links: Vec<String>,
}

impl NewsletterDocument {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
        source: impl Into<String>,
        published_date: impl Into<String>,
        links: Vec<String>,
    ) -> Result<Self, DocumentError> {
        let doc = Self {
            title: title.into(),
            body: body.into(),
            source: source.into(),
            published_date: published_date.into(),
            links,
        };

        if doc.title.is_empty() {
            return Err(DocumentError("title"));
        }
        if doc.body.is_empty() {
            return Err(DocumentError("body"));
        }
        if doc.source.is_empty() {
            return Err(DocumentError("source"));
        }
        if doc.published_date.is_empty() {
            return Err(DocumentError("date"));
        }

        Ok(doc)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn published_date(&self) -> &str {
        &self.published_date
    }

    pub fn links(&self) -> &[String] {
        &self.links
    }
}

/// Topical bucket of the digest. Declaration order is rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Technology,
    Business,
    IndustryTrends,
    ToolsResources,
    General,
}

impl Category {
    /// The categories an AI batch is expected to fill; `General` is the fallback bucket.
    pub const SUBSTANTIVE: [Category; 4] = [
        Category::Technology,
        Category::Business,
        Category::IndustryTrends,
        Category::ToolsResources,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Category::Technology => "technology",
            Category::Business => "business",
            Category::IndustryTrends => "industry_trends",
            Category::ToolsResources => "tools_resources",
            Category::General => "general",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Technology => "Technology",
            Category::Business => "Business",
            Category::IndustryTrends => "Industry Trends",
            Category::ToolsResources => "Tools & Resources",
            Category::General => "General",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategorySummary {
    pub summary: String,
    pub priority: Priority,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryMeta {
    pub total_sources: usize,
    pub processing_timestamp: String,
    pub fallback_mode: bool,
    pub batch_processed: bool,
    pub batch_count: usize,
}

/// The summarizer's output, rendered by the digest stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredSummary {
    #[serde(rename = "daily_highlights")]
    pub highlights: Vec<String>,
    pub categories: BTreeMap<Category, CategorySummary>,
    #[serde(rename = "reading_time")]
    pub estimated_reading_time: String,
    pub meta: SummaryMeta,
}

/// A processed digest as saved to disk
#[derive(Debug, Serialize, Deserialize)]
pub struct DigestRecord {
    pub version: String,
    pub created_at: String,
    pub subject: String,
    pub summary: StructuredSummary,
}

impl DigestRecord {
    pub fn new(subject: impl Into<String>, summary: StructuredSummary) -> Self {
        Self {
            version: "1.0".to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            subject: subject.into(),
            summary,
        }
    }
}
