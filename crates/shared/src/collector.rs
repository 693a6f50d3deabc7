use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use native_tls::TlsConnector;
use regex::Regex;
use scraper::{Html, Selector};
use std::io::{Read, Write};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::EmailConfig;
use crate::models::NewsletterDocument;

const TEXT_WIDTH: usize = 100;

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static PLAIN_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'()\[\]]+"#).unwrap());

/// Reads recent newsletters from an IMAP mailbox over implicit TLS.
#[derive(Clone)]
pub struct NewsletterCollector {
    server: String,
    port: u16,
    account: String,
    password: String,
    mailbox: String,
}

impl NewsletterCollector {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            server: config.imap_server.clone(),
            port: config.imap_port,
            account: config.account.clone(),
            password: config.password.clone(),
            mailbox: config.mailbox.clone(),
        }
    }

    /// Fetch up to `limit` messages received in the last `days` days, most recent first.
    ///
    /// Messages are fetched with `BODY.PEEK[]` so they stay unread. A message
    /// that cannot be parsed into a newsletter is skipped.
    pub async fn collect_recent(&self, days: u32, limit: usize) -> Result<Vec<NewsletterDocument>> {
        let collector = self.clone();
        tokio::task::spawn_blocking(move || collector.collect_blocking(days, limit))
            .await
            .context("IMAP worker failed")?
    }

    fn collect_blocking(&self, days: u32, limit: usize) -> Result<Vec<NewsletterDocument>> {
        let since = since_date(chrono::Local::now().date_naive(), days)?;
        let tls = TlsConnector::builder()
            .build()
            .context("Failed to create TLS connector")?;

        info!("Connecting to {}:{} as {}", self.server, self.port, self.account);
        let client = imap::connect((self.server.as_str(), self.port), &self.server, &tls)
            .map_err(|e| anyhow!("IMAP connect to {}:{} failed: {}", self.server, self.port, e))?;

        let mut session = client
            .login(&self.account, &self.password)
            .map_err(|(e, _)| anyhow!("IMAP login failed for {}: {}", self.account, e))?;

        let result = self.fetch_recent(&mut session, &since, limit);
        let _ = session.logout();
        result
    }

    fn fetch_recent<T: Read + Write>(
        &self,
        session: &mut imap::Session<T>,
        since: &str,
        limit: usize,
    ) -> Result<Vec<NewsletterDocument>> {
        session
            .select(&self.mailbox)
            .map_err(|e| anyhow!("IMAP select of {} failed: {}", self.mailbox, e))?;

        let query = format!("SINCE {}", since);
        let mut ids: Vec<u32> = session
            .search(&query)
            .map_err(|e| anyhow!("IMAP search failed: {}", e))?
            .into_iter()
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.truncate(limit);

        if ids.is_empty() {
            info!("No messages matched {}", query);
            return Ok(Vec::new());
        }
        debug!("Fetching {} messages: {:?}", ids.len(), ids);

        let sequence_set = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let fetches = session
            .fetch(sequence_set, "BODY.PEEK[]")
            .map_err(|e| anyhow!("IMAP fetch failed: {}", e))?;

        let mut messages: Vec<(u32, &[u8])> = fetches
            .iter()
            .filter_map(|fetch| fetch.body().map(|body| (fetch.message, body)))
            .collect();
        messages.sort_by(|a, b| b.0.cmp(&a.0));

        let mut documents = Vec::with_capacity(messages.len());
        for (seq, raw) in messages {
            match parse_newsletter(raw) {
                Ok(doc) => documents.push(doc),
                Err(e) => warn!("Skipping message {}: {:#}", seq, e),
            }
        }

        info!("Collected {} newsletters from {}", documents.len(), self.mailbox);
        Ok(documents)
    }
}

/// IMAP `SINCE` date (`dd-Mon-yyyy`) for `days` before `today`.
pub fn since_date(today: NaiveDate, days: u32) -> Result<String> {
    let start = today
        .checked_sub_days(chrono::Days::new(days.into()))
        .ok_or_else(|| anyhow!("DAYS_TO_LOOK_BACK of {} reaches before the earliest date", days))?;
    Ok(start.format("%d-%b-%Y").to_string())
}

/// Turn one raw RFC 822 message into a newsletter document.
pub fn parse_newsletter(raw: &[u8]) -> Result<NewsletterDocument> {
    let mail = mailparse::parse_mail(raw).context("Failed to parse MIME message")?;

    let title = mail.headers.get_first_value("Subject").unwrap_or_default();
    let source = mail.headers.get_first_value("From").unwrap_or_default();
    let date = mail.headers.get_first_value("Date").unwrap_or_default();

    let mut bodies = Bodies::default();
    bodies.collect(&mail)?;

    let (body, links) = match (bodies.html, bodies.plain) {
        (Some(html), _) => (html_to_text(&html), html_links(&html)),
        (None, Some(plain)) => (plain.trim().to_string(), text_links(&plain)),
        (None, None) => (String::new(), Vec::new()),
    };

    NewsletterDocument::new(title.trim(), body, source.trim(), date.trim(), links)
        .with_context(|| format!("Message {:?} is not a usable newsletter", title.trim()))
}

#[derive(Default)]
struct Bodies {
    html: Option<String>,
    plain: Option<String>,
}

impl Bodies {
    fn collect(&mut self, part: &ParsedMail) -> Result<()> {
        if matches!(part.get_content_disposition().disposition, DispositionType::Attachment) {
            return Ok(());
        }

        if !part.subparts.is_empty() {
            for sub in &part.subparts {
                self.collect(sub)?;
            }
            return Ok(());
        }

        match part.ctype.mimetype.as_str() {
            "text/html" if self.html.is_none() => {
                self.html = Some(part.get_body().context("Failed to decode HTML part")?);
            }
            "text/plain" if self.plain.is_none() => {
                self.plain = Some(part.get_body().context("Failed to decode text part")?);
            }
            _ => {}
        }
        Ok(())
    }
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), TEXT_WIDTH).trim().to_string()
}

fn html_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let hrefs = document
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string);
    distinct_web_links(hrefs)
}

fn text_links(text: &str) -> Vec<String> {
    let urls = PLAIN_URL
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']).to_string());
    distinct_web_links(urls)
}

fn distinct_web_links(candidates: impl Iterator<Item = String>) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for candidate in candidates {
        let Ok(url) = Url::parse(candidate.trim()) else {
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }
        let link = url.to_string();
        if !links.contains(&link) {
            links.push(link);
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIPART: &str = "From: Rust Weekly <news@rust.example>\r\n\
Subject: =?UTF-8?Q?This_Week_in_Rust_=E2=80=93_#600?=\r\n\
Date: Wed, 3 Jan 2024 06:00:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Plain version https://plain.example/only\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><body><h1>Rust 1.90 released</h1>\
<p>Read the <a href=\"https://blog.rust-lang.org/1.90\">announcement</a>.</p>\
<p><a href=\"mailto:news@rust.example\">Reply</a> \
<a href=\"https://blog.rust-lang.org/1.90\">again</a> \
<a href=\"https://crates.io/\">crates</a></p></body></html>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: text/html\r\n\
Content-Disposition: attachment; filename=\"archive.html\"\r\n\
\r\n\
<a href=\"https://attachment.example/\">nope</a>\r\n\
--outer--\r\n";

    #[test]
    fn parses_html_part_with_decoded_headers() {
        let doc = parse_newsletter(MULTIPART.as_bytes()).unwrap();

        assert_eq!(doc.title(), "This Week in Rust – #600");
        assert_eq!(doc.source(), "Rust Weekly <news@rust.example>");
        assert_eq!(doc.published_date(), "Wed, 3 Jan 2024 06:00:00 +0000");
        assert!(doc.body().contains("Rust 1.90 released"));
        assert!(!doc.body().contains("<p>"));
        assert_eq!(
            doc.links(),
            &["https://blog.rust-lang.org/1.90".to_string(), "https://crates.io/".to_string()]
        );
    }

    #[test]
    fn plain_only_message_uses_text_links() {
        let raw = "From: markets@example.com\r\n\
Subject: Market Wrap\r\n\
Date: Tue, 2 Jan 2024 18:00:00 -0500\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Stocks closed flat. Details at https://markets.example/wrap, and\r\n\
again at https://markets.example/wrap plus http://charts.example/spx.\r\n";
        let doc = parse_newsletter(raw.as_bytes()).unwrap();

        assert!(doc.body().starts_with("Stocks closed flat."));
        assert_eq!(
            doc.links(),
            &["https://markets.example/wrap".to_string(), "http://charts.example/spx".to_string()]
        );
    }

    #[test]
    fn message_without_subject_is_rejected() {
        let raw = "From: someone@example.com\r\nDate: Tue, 2 Jan 2024\r\n\r\nHello there\r\n";
        let err = parse_newsletter(raw.as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("newsletter title is required"));
    }

    #[test]
    fn since_date_uses_imap_format() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(since_date(today, 1).unwrap(), "29-Feb-2024");
        assert_eq!(since_date(today, 0).unwrap(), "01-Mar-2024");
    }

    #[test]
    fn since_date_out_of_range_is_an_error() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let err = since_date(today, 200_000_000).unwrap_err();
        assert!(err.to_string().contains("DAYS_TO_LOOK_BACK"));
    }

    #[test]
    fn non_web_and_duplicate_links_are_dropped() {
        let links = distinct_web_links(
            ["ftp://files.example/x", "https://a.example/", "not a url", "https://a.example/"]
                .into_iter()
                .map(String::from),
        );
        assert_eq!(links, vec!["https://a.example/"]);
    }
}
