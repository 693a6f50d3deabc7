use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::cleaner;
use crate::error::AiRequestError;
use crate::models::{Category, CategorySummary, NewsletterDocument, StructuredSummary, SummaryMeta};
use crate::planner::MAX_LINKS_PER_DOCUMENT;

pub const DEFAULT_READING_TIME: &str = "Estimated 8-12 minutes";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = r#"You are an information analyst who condenses many newsletters into one efficient daily briefing. Busy technology and business professionals should get the most important 80% of the day's news in about ten minutes.

Respond with JSON only, in exactly this shape:
{
  "daily_highlights": [
    "3-5 of the day's most important points, 1-2 sentences each, with links when available"
  ],
  "categories": {
    "technology": {
      "summary": "What happened in technology",
      "priority": "high|medium|low",
      "items": ["Title ([link](url)) - brief description"]
    },
    "business": {
      "summary": "What happened in business and finance",
      "priority": "high|medium|low",
      "items": ["Title ([link](url)) - brief description"]
    },
    "industry_trends": {
      "summary": "Industry trends and market insight",
      "priority": "high|medium|low",
      "items": ["Title ([link](url)) - brief description"]
    },
    "tools_resources": {
      "summary": "Useful tools, resources and actionable content",
      "priority": "high|medium|low",
      "items": ["Title ([link](url)) - brief description"]
    }
  },
  "reading_time": "Estimated reading time"
}

Guidelines:
1. Favor high-impact, time-sensitive information.
2. Merge overlapping stories instead of repeating them.
3. Keep each category summary between 100 and 150 words.
4. Prefer practical tools, resources and links.
5. Write links as Title ([link](url)).
6. Use clear, concise, professional English.
7. Only use the category keys shown above; omit a category with nothing to report."#;

/// Request/response access to an AI completion service.
#[async_trait]
pub trait AiTransport: Send + Sync {
    /// Send one system instruction plus user payload and return the raw response text.
    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String>;
}

#[async_trait]
impl<T: AiTransport + ?Sized> AiTransport for std::sync::Arc<T> {
    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        (**self).complete(system, user, max_tokens).await
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiTransport {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiTransport {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AiTransport for OpenAiTransport {
    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            max_tokens,
            temperature: 0.3,
            messages: vec![
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to AI API")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("unknown error"));
            anyhow::bail!("AI API error {}: {}", status, error_text);
        }

        let chat_response = response
            .json::<ChatResponse>()
            .await
            .context("Failed to parse AI API response")?;

        Ok(chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct SummaryPayload {
    daily_highlights: Vec<String>,
    categories: BTreeMap<Category, CategorySummary>,
    #[serde(default)]
    reading_time: Option<String>,
}

/// Issues exactly one AI call per batch and validates the answer.
pub struct SummaryRequester<T> {
    transport: T,
    max_tokens: u32,
}

impl<T: AiTransport> SummaryRequester<T> {
    pub fn new(transport: T, max_tokens: u32) -> Self {
        Self {
            transport,
            max_tokens,
        }
    }

    pub async fn request_summary(
        &self,
        batch: &[NewsletterDocument],
    ) -> Result<StructuredSummary, AiRequestError> {
        let user_prompt = user_prompt(batch);
        debug!(
            newsletters = batch.len(),
            prompt_chars = user_prompt.len(),
            "sending summarization request"
        );

        let response = self
            .transport
            .complete(SYSTEM_PROMPT, &user_prompt, self.max_tokens)
            .await
            .map_err(|e| AiRequestError::Transport(format!("{:#}", e)))?;

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        parse_summary_response(&response, batch.len(), timestamp)
    }
}

/// Validate an AI response body against the summary shape.
pub fn parse_summary_response(
    response: &str,
    total_sources: usize,
    processing_timestamp: String,
) -> Result<StructuredSummary, AiRequestError> {
    let body = strip_code_fence(response);
    if body.is_empty() {
        return Err(AiRequestError::EmptyResponse);
    }

    let payload: SummaryPayload = serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        warn!("AI response did not match summary shape: {} ({}...)", e, preview);
        AiRequestError::MalformedResponse(e.to_string())
    })?;

    Ok(StructuredSummary {
        highlights: payload.daily_highlights,
        categories: payload.categories,
        estimated_reading_time: payload
            .reading_time
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_READING_TIME.to_string()),
        meta: SummaryMeta {
            total_sources,
            processing_timestamp,
            fallback_mode: false,
            batch_processed: false,
            batch_count: 1,
        },
    })
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string ("json"), which may run straight into the payload
    // when the fence sits on one line.
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.trim_end().trim_end_matches("```").trim()
}

/// One delimited section per newsletter.
pub fn combined_content(batch: &[NewsletterDocument]) -> String {
    batch
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let mut section = format!(
                "=== Newsletter {}: {} ===\nSource: {}\nContent: {}\n",
                i + 1,
                doc.title(),
                doc.source(),
                cleaner::clean(doc.body())
            );
            if !doc.links().is_empty() {
                section.push_str("Key Links:\n");
                for link in doc.links().iter().take(MAX_LINKS_PER_DOCUMENT) {
                    section.push_str(&format!("- {}\n", link));
                }
            }
            section
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn user_prompt(batch: &[NewsletterDocument]) -> String {
    format!(
        r#"Analyze the following {} newsletters and produce today's summary:

{}
Focus on:
- Breaking trends and significant news
- Practical tools, resources and actionable insight
- Major business developments and market moves
- Notable technology breakthroughs
- Original article links wherever available

Output requirements:
- Strict JSON matching the requested shape, with meaningful content in every field
- Items formatted as Title ([link](url)) - description
- High-impact, actionable information first"#,
        batch.len(),
        combined_content(batch)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID: &str = r#"{
        "daily_highlights": ["Chip exports tighten", "New Rust release"],
        "categories": {
            "technology": {"summary": "Rust ships.", "priority": "high", "items": ["Rust 1.90 ([link](https://blog.rust-lang.org)) - release notes"]},
            "business": {"summary": "Markets calm.", "priority": "low"}
        },
        "reading_time": "Estimated 6-9 minutes",
        "meta": {"total_sources": "2", "processing_date": "today"}
    }"#;

    fn docs() -> Vec<NewsletterDocument> {
        vec![
            NewsletterDocument::new(
                "Rust Weekly",
                "<p>Rust 1.90 is out with faster builds.</p>",
                "rust@example.com",
                "Mon, 1 Jan 2024",
                (0..7).map(|i| format!("https://example.com/{i}")).collect(),
            )
            .unwrap(),
            NewsletterDocument::new("Market Wrap", "Stocks closed flat on Monday.", "markets@example.com", "Mon, 1 Jan 2024", vec![])
                .unwrap(),
        ]
    }

    #[test]
    fn parses_valid_response_and_ignores_model_meta() {
        let summary = parse_summary_response(VALID, 2, "2024-01-01 08:00:00".into()).unwrap();
        assert_eq!(summary.highlights.len(), 2);
        assert_eq!(summary.categories.len(), 2);
        assert!(summary.categories[&Category::Business].items.is_empty());
        assert_eq!(summary.estimated_reading_time, "Estimated 6-9 minutes");
        assert_eq!(summary.meta.total_sources, 2);
        assert!(!summary.meta.fallback_mode);
    }

    #[test]
    fn accepts_fenced_json() {
        let fenced = format!("```json\n{}\n```", VALID);
        assert!(parse_summary_response(&fenced, 2, String::new()).is_ok());

        let one_line = format!("```json{}```", VALID.replace('\n', " "));
        assert!(parse_summary_response(&one_line, 2, String::new()).is_ok());

        let bare = format!("```{}```", VALID.replace('\n', " "));
        assert!(parse_summary_response(&bare, 2, String::new()).is_ok());
    }

    #[test]
    fn rejects_schema_mismatches() {
        let cases = [
            "not json at all",
            r#"{"categories": {}}"#,
            r#"{"daily_highlights": [1, 2], "categories": {}}"#,
            r#"{"daily_highlights": [], "categories": {"sports": {"summary": "x", "priority": "low"}}}"#,
            r#"{"daily_highlights": [], "categories": {"business": {"summary": "x", "priority": "urgent"}}}"#,
            r#"{"daily_highlights": [], "categories": {"business": {"priority": "low"}}}"#,
        ];
        for case in cases {
            let err = parse_summary_response(case, 1, String::new()).unwrap_err();
            assert_eq!(err.kind(), "malformed_response", "case: {case}");
        }
    }

    #[test]
    fn blank_response_is_empty_error() {
        let err = parse_summary_response("  \n ", 1, String::new()).unwrap_err();
        assert!(matches!(err, AiRequestError::EmptyResponse));
    }

    #[test]
    fn combined_content_caps_links_and_cleans_bodies() {
        let content = combined_content(&docs());
        assert!(content.starts_with("=== Newsletter 1: Rust Weekly ===\nSource: rust@example.com\n"));
        assert!(content.contains("Content: Rust 1.90 is out with faster builds.\n"));
        assert!(content.contains("- https://example.com/4\n"));
        assert!(!content.contains("https://example.com/5"));
        assert!(content.contains("=== Newsletter 2: Market Wrap ==="));
        assert_eq!(content.matches("Key Links:").count(), 1);
    }

    #[tokio::test]
    async fn openai_transport_returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": VALID}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = OpenAiTransport::new("sk-test".into(), "gpt-test".into(), server.uri()).unwrap();
        let requester = SummaryRequester::new(transport, 1000);
        let summary = requester.request_summary(&docs()).await.unwrap();
        assert_eq!(summary.highlights[0], "Chip exports tighten");
    }

    #[tokio::test]
    async fn http_error_becomes_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate_limit_exceeded"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = OpenAiTransport::new("sk-test".into(), "gpt-test".into(), server.uri()).unwrap();
        let err = SummaryRequester::new(transport, 1000)
            .request_summary(&docs())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("rate_limit_exceeded"));
    }

    #[tokio::test]
    async fn missing_content_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": null}}]
            })))
            .mount(&server)
            .await;

        let transport = OpenAiTransport::new("sk-test".into(), "gpt-test".into(), server.uri()).unwrap();
        let err = SummaryRequester::new(transport, 1000)
            .request_summary(&docs())
            .await
            .unwrap_err();
        assert!(matches!(err, AiRequestError::EmptyResponse));
    }
}
