use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::error::EmailError;
use crate::models::{Category, Priority, StructuredSummary};

const ITEMS_SHOWN: usize = 5;
const RULE_WIDTH: usize = 60;
const CATEGORY_RULE_WIDTH: usize = 40;

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").unwrap());

const STYLE: &str = r#"  <style>
    body { margin: 0; padding: 0; font-family: Arial, sans-serif; background-color: #f5f5f5; line-height: 1.6; }
    .container { max-width: 600px; margin: 0 auto; background-color: #ffffff; padding: 20px; }
    .header { text-align: center; border-bottom: 3px solid #2c3e50; padding-bottom: 20px; margin-bottom: 30px; }
    .header h1 { color: #2c3e50; font-size: 28px; margin: 0; }
    .meta-info { color: #7f8c8d; font-size: 14px; margin-top: 10px; }
    .section { margin-bottom: 30px; }
    .section-title { color: #2c3e50; font-size: 22px; margin-bottom: 15px; padding-bottom: 10px; border-bottom: 2px solid #ecf0f1; }
    .highlight-item { background-color: #f8f9fa; padding: 15px; margin-bottom: 10px; border-left: 4px solid #3498db; border-radius: 4px; }
    .category { border: 1px solid #ecf0f1; border-radius: 8px; padding: 20px; margin-bottom: 20px; }
    .category-header { display: flex; align-items: center; margin-bottom: 15px; }
    .category-title { color: #2c3e50; font-size: 18px; margin: 0 10px 0 0; }
    .priority-badge { padding: 4px 8px; border-radius: 12px; font-size: 12px; font-weight: bold; color: white; }
    .priority-high { background-color: #e74c3c; }
    .priority-medium { background-color: #f39c12; }
    .priority-low { background-color: #27ae60; }
    .category-summary { color: #34495e; margin-bottom: 15px; }
    .items-list { padding-left: 0; list-style: none; }
    .items-list li { background-color: #f8f9fa; padding: 10px 15px; margin-bottom: 8px; border-radius: 4px; border-left: 3px solid #3498db; }
    .items-list a { color: #3498db; text-decoration: none; }
    .items-list a:hover { text-decoration: underline; }
    .footer { background-color: #ecf0f1; padding: 20px; text-align: center; color: #7f8c8d; font-size: 14px; margin-top: 30px; border-radius: 8px; }
    .footer-stats div { margin-bottom: 5px; }
    @media only screen and (max-width: 600px) {
      .container { padding: 15px; }
      .header h1 { font-size: 24px; }
    }
  </style>
"#;

/// Renders a summary into the email subject and bodies.
pub struct DigestRenderer;

impl DigestRenderer {
    /// Subject line dated by the first newsletter, or by `today` when its date does not parse.
    pub fn subject(first_date: &str, today: NaiveDate) -> String {
        let date = DateTime::parse_from_rfc2822(first_date.trim())
            .map(|dt| dt.date_naive())
            .unwrap_or(today);
        format!("📧 Daily Newsletter Summary - {}", date.format("%Y-%m-%d"))
    }

    pub fn render_text(summary: &StructuredSummary, now: NaiveDateTime) -> String {
        let mut text = String::new();
        let rule = "=".repeat(RULE_WIDTH);

        text.push_str(&format!(
            "🌅 Daily Newsletter Summary - {}\n\n",
            now.format("%Y-%m-%d")
        ));
        text.push_str(&format!(
            "📖 {} | 🗂️ {} newsletters\n\n{}\n",
            summary.estimated_reading_time, summary.meta.total_sources, rule
        ));

        text.push_str("\n🎯 Today's Highlights\n\n");
        for (i, highlight) in summary.highlights.iter().enumerate() {
            text.push_str(&format!("{}. {}\n", i + 1, highlight));
        }
        text.push_str(&format!("\n{}\n", rule));

        text.push_str("\n📂 Category Breakdown\n\n");
        for (category, section) in &summary.categories {
            text.push_str(&format!(
                "{} {} {}\n",
                category_emoji(*category),
                category.display_name(),
                priority_marker(section.priority)
            ));
            text.push_str(&format!("{}\n\n", section.summary));

            if !section.items.is_empty() {
                text.push_str("Key Items:\n");
                for item in section.items.iter().take(ITEMS_SHOWN) {
                    text.push_str(&format!("• {}\n", item));
                }
                text.push('\n');
            }
            text.push_str(&format!("{}\n\n", "─".repeat(CATEGORY_RULE_WIDTH)));
        }

        text.push_str("📊 Processing Summary\n");
        text.push_str(&format!("• Sources: {} newsletters\n", summary.meta.total_sources));
        text.push_str(&format!("• Processing Time: {}\n", now.format("%Y-%m-%d %H:%M:%S")));
        text.push_str(&format!("• AI Mode: {}\n", ai_mode(summary)));
        text
    }

    pub fn render_html(summary: &StructuredSummary, now: NaiveDateTime) -> String {
        let mut html = String::new();

        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
        html.push_str("  <meta charset=\"UTF-8\">\n");
        html.push_str(
            "  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
        );
        html.push_str("  <title>Daily Newsletter Summary</title>\n");
        html.push_str(STYLE);
        html.push_str("</head>\n<body>\n<div class=\"container\">\n");

        html.push_str("  <div class=\"header\">\n");
        html.push_str("    <h1>🌅 Daily Newsletter Summary</h1>\n");
        html.push_str(&format!(
            "    <div class=\"meta-info\"><strong>{}</strong><br>📖 {} | 🗂️ {} newsletters</div>\n",
            now.format("%Y-%m-%d"),
            Self::escape_html(&summary.estimated_reading_time),
            summary.meta.total_sources
        ));
        html.push_str("  </div>\n");

        if !summary.highlights.is_empty() {
            html.push_str("  <div class=\"section\">\n");
            html.push_str("    <h2 class=\"section-title\">🎯 Today's Highlights</h2>\n");
            for (i, highlight) in summary.highlights.iter().enumerate() {
                html.push_str(&format!(
                    "    <div class=\"highlight-item\"><strong>{}.</strong> {}</div>\n",
                    i + 1,
                    Self::format_links(highlight)
                ));
            }
            html.push_str("  </div>\n");
        }

        if !summary.categories.is_empty() {
            html.push_str("  <div class=\"section\">\n");
            html.push_str("    <h2 class=\"section-title\">📂 Category Breakdown</h2>\n");
            for (category, section) in &summary.categories {
                html.push_str("    <div class=\"category\">\n");
                html.push_str(&format!(
                    "      <div class=\"category-header\"><h3 class=\"category-title\">{} {}</h3><span class=\"priority-badge priority-{}\">{}</span></div>\n",
                    category_emoji(*category),
                    Self::escape_html(category.display_name()),
                    section.priority.as_str(),
                    section.priority.as_str().to_uppercase()
                ));
                html.push_str(&format!(
                    "      <div class=\"category-summary\">{}</div>\n",
                    Self::format_links(&section.summary)
                ));
                if !section.items.is_empty() {
                    html.push_str("      <ul class=\"items-list\">\n");
                    for item in section.items.iter().take(ITEMS_SHOWN) {
                        html.push_str(&format!("        <li>{}</li>\n", Self::format_links(item)));
                    }
                    html.push_str("      </ul>\n");
                }
                html.push_str("    </div>\n");
            }
            html.push_str("  </div>\n");
        }

        html.push_str("  <div class=\"footer\">\n");
        html.push_str("    <div class=\"footer-stats\">\n");
        html.push_str("      <div><strong>📊 Processing Summary</strong></div>\n");
        html.push_str(&format!(
            "      <div>Sources: {} newsletters</div>\n",
            summary.meta.total_sources
        ));
        html.push_str(&format!(
            "      <div>Processing Time: {}</div>\n",
            now.format("%Y-%m-%d %H:%M:%S")
        ));
        html.push_str(&format!("      <div>AI Mode: {}</div>\n", ai_mode(summary)));
        html.push_str("    </div>\n");
        html.push_str("  </div>\n");

        html.push_str("</div>\n</body>\n</html>");
        html
    }

    /// Escape, then turn `[text](http...)` into anchors.
    fn format_links(text: &str) -> String {
        let escaped = Self::escape_html(text);
        MARKDOWN_LINK
            .replace_all(&escaped, |caps: &Captures| {
                let url = &caps[2];
                if url.starts_with("http://") || url.starts_with("https://") {
                    format!("<a href=\"{}\" target=\"_blank\">{}</a>", url, &caps[1])
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    }

    fn escape_html(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&#39;")
    }
}

fn category_emoji(category: Category) -> &'static str {
    match category {
        Category::Technology => "🚀",
        Category::Business => "💰",
        Category::IndustryTrends => "📈",
        Category::ToolsResources => "🔧",
        Category::General => "📰",
    }
}

fn priority_marker(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "🔴",
        Priority::Medium => "🟡",
        Priority::Low => "🟢",
    }
}

fn ai_mode(summary: &StructuredSummary) -> &'static str {
    if summary.meta.fallback_mode {
        "Fallback"
    } else {
        "Normal"
    }
}

/// A ready-to-send digest message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEmail {
    recipient: String,
    subject: String,
    text_body: String,
    html_body: String,
}

impl DigestEmail {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        text_body: impl Into<String>,
        html_body: impl Into<String>,
    ) -> Result<Self, EmailError> {
        let email = Self {
            recipient: recipient.into(),
            subject: subject.into(),
            text_body: text_body.into(),
            html_body: html_body.into(),
        };

        if !email.recipient.contains('@') {
            return Err(EmailError::InvalidRecipient(email.recipient));
        }
        if email.subject.trim().is_empty() {
            return Err(EmailError::MissingField("subject"));
        }
        if email.text_body.trim().is_empty() {
            return Err(EmailError::MissingField("text body"));
        }
        Ok(email)
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn text_body(&self) -> &str {
        &self.text_body
    }

    pub fn html_body(&self) -> &str {
        &self.html_body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategorySummary, SummaryMeta};
    use std::collections::BTreeMap;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 3)
            .unwrap()
            .and_hms_opt(7, 30, 0)
            .unwrap()
    }

    fn summary(fallback_mode: bool) -> StructuredSummary {
        let mut categories = BTreeMap::new();
        categories.insert(
            Category::ToolsResources,
            CategorySummary {
                summary: "Handy <tools> & tips.".into(),
                priority: Priority::Low,
                items: (1..=7)
                    .map(|i| format!("Tool {i} ([link](https://tools.example/{i})) - useful"))
                    .collect(),
            },
        );
        categories.insert(
            Category::Technology,
            CategorySummary {
                summary: "Compilers got faster.".into(),
                priority: Priority::High,
                items: vec!["Bad ([link](javascript:alert(1)))".into()],
            },
        );
        StructuredSummary {
            highlights: vec!["Rust 1.90 ships ([link](https://blog.rust-lang.org))".into(), "Markets calm".into()],
            categories,
            estimated_reading_time: "Estimated 10-15 minutes".into(),
            meta: SummaryMeta {
                total_sources: 4,
                processing_timestamp: "2024-01-03 07:29:00".into(),
                fallback_mode,
                batch_processed: true,
                batch_count: 1,
            },
        }
    }

    #[test]
    fn subject_uses_first_newsletter_date() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        assert_eq!(
            DigestRenderer::subject("Wed, 3 Jan 2024 06:00:00 +0000", today),
            "📧 Daily Newsletter Summary - 2024-01-03"
        );
        assert_eq!(
            DigestRenderer::subject("sometime yesterday", today),
            "📧 Daily Newsletter Summary - 2024-01-09"
        );
    }

    #[test]
    fn text_lists_categories_in_order_and_caps_items() {
        let text = DigestRenderer::render_text(&summary(false), now());

        assert!(text.starts_with("🌅 Daily Newsletter Summary - 2024-01-03\n"));
        assert!(text.contains("📖 Estimated 10-15 minutes | 🗂️ 4 newsletters"));
        assert!(text.contains("1. Rust 1.90 ships"));
        let tech = text.find("🚀 Technology 🔴").unwrap();
        let tools = text.find("🔧 Tools & Resources 🟢").unwrap();
        assert!(tech < tools);
        assert!(text.contains("• Tool 5 "));
        assert!(!text.contains("• Tool 6 "));
        assert!(text.contains("• Processing Time: 2024-01-03 07:30:00"));
        assert!(text.ends_with("• AI Mode: Normal\n"));
    }

    #[test]
    fn html_escapes_and_converts_web_links_only() {
        let html = DigestRenderer::render_html(&summary(true), now());

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Handy &lt;tools&gt; &amp; tips."));
        assert!(html.contains("<a href=\"https://tools.example/1\" target=\"_blank\">link</a>"));
        assert!(!html.contains("https://tools.example/6"));
        assert!(!html.contains("href=\"javascript:"));
        assert!(html.contains("<span class=\"priority-badge priority-high\">HIGH</span>"));
        assert!(html.contains("Tools &amp; Resources"));
        assert!(html.contains("<div>AI Mode: Fallback</div>"));
        assert!(html.ends_with("</html>"));
    }

    #[test]
    fn empty_highlights_omit_section() {
        let mut summary = summary(false);
        summary.highlights.clear();
        let html = DigestRenderer::render_html(&summary, now());
        assert!(!html.contains("Today's Highlights"));
    }

    #[test]
    fn digest_email_validates_fields() {
        assert!(DigestEmail::new("me@example.com", "Subject", "text", "").is_ok());
        assert_eq!(
            DigestEmail::new("nobody", "Subject", "text", "").unwrap_err(),
            EmailError::InvalidRecipient("nobody".into())
        );
        assert_eq!(
            DigestEmail::new("me@example.com", " ", "text", "").unwrap_err(),
            EmailError::MissingField("subject")
        );
        assert_eq!(
            DigestEmail::new("me@example.com", "Subject", "", "").unwrap_err(),
            EmailError::MissingField("text body")
        );
    }
}
