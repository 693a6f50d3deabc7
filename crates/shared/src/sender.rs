use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use lettre::message::header::{Header, HeaderName, HeaderValue};
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use rand::Rng;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::EmailConfig;
use crate::digest::DigestEmail;

const MAILER: &str = "Morning Digest v1.0";
const MESSAGE_ID_DOMAIN: &str = "morning-digest";

pub const SEND_INTERVAL: Duration = Duration::from_secs(2);
pub const DAILY_SEND_LIMIT: u32 = 100;

type HeaderParseError = Box<dyn std::error::Error + Send + Sync>;

macro_rules! text_header {
    ($name:ident, $field:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        struct $name(String);

        impl Header for $name {
            fn name() -> HeaderName {
                HeaderName::new_from_ascii_str($field)
            }

            fn parse(s: &str) -> Result<Self, HeaderParseError> {
                Ok(Self(s.to_string()))
            }

            fn display(&self) -> HeaderValue {
                HeaderValue::new(Self::name(), self.0.clone())
            }
        }
    };
}

text_header!(XMailer, "X-Mailer");
text_header!(XPriority, "X-Priority");
text_header!(XMsMailPriority, "X-MSMail-Priority");

/// Delivers digest emails over SMTP with STARTTLS.
pub struct DigestSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    guard: SendGuard,
}

impl DigestSender {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let creds = Credentials::new(config.sender.clone(), config.sender_password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
            .with_context(|| format!("Invalid SMTP server {}", config.smtp_server))?
            .port(config.smtp_port)
            .credentials(creds)
            .build();

        let from = config
            .sender
            .parse()
            .with_context(|| format!("Invalid sender address {}", config.sender))?;

        Ok(Self {
            mailer,
            from,
            guard: SendGuard::new(SEND_INTERVAL, DAILY_SEND_LIMIT),
        })
    }

    /// Send `email` as plain text plus HTML. Returns the server's response code.
    ///
    /// Sends are spaced at least [`SEND_INTERVAL`] apart and capped at
    /// [`DAILY_SEND_LIMIT`] per calendar day.
    pub async fn send(&self, email: &DigestEmail) -> Result<String> {
        let wait = self.guard.delay(Instant::now(), Local::now().date_naive())?;
        if !wait.is_zero() {
            info!("Waiting {:.1}s before the next send", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }

        let message = self.build_message(email)?;

        let response = self
            .mailer
            .send(message)
            .await
            .with_context(|| format!("Failed to send digest to {}", email.recipient()))?;

        self.guard.record(Instant::now(), Local::now().date_naive());

        let code = response.code().to_string();
        info!("Digest sent to {} ({})", email.recipient(), code);
        Ok(code)
    }

    /// Connect and authenticate without sending anything.
    pub async fn check_connection(&self) -> Result<bool> {
        self.mailer
            .test_connection()
            .await
            .context("SMTP connection test failed")
    }

    fn build_message(&self, email: &DigestEmail) -> Result<Message> {
        let to: Mailbox = email
            .recipient()
            .parse()
            .with_context(|| format!("Invalid recipient address {}", email.recipient()))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject())
            .message_id(Some(message_id(Local::now().timestamp())))
            .header(XMailer(MAILER.to_string()))
            .header(XPriority("3 (Normal)".to_string()))
            .header(XMsMailPriority("Normal".to_string()))
            .multipart(MultiPart::alternative_plain_html(
                email.text_body().to_string(),
                email.html_body().to_string(),
            ))
            .context("Failed to build digest email")
    }
}

/// `<timestamp.nnnn@morning-digest>` with a random four digit suffix.
fn message_id(timestamp: i64) -> String {
    let suffix: u16 = rand::rng().random_range(1000..=9999);
    format!("<{}.{}@{}>", timestamp, suffix, MESSAGE_ID_DOMAIN)
}

#[derive(Debug)]
struct SendLog {
    last_send: Option<Instant>,
    day: Option<NaiveDate>,
    count: u32,
}

/// Spacing and daily cap for outgoing mail.
#[derive(Debug)]
pub struct SendGuard {
    interval: Duration,
    daily_limit: u32,
    log: Mutex<SendLog>,
}

impl SendGuard {
    pub fn new(interval: Duration, daily_limit: u32) -> Self {
        Self {
            interval,
            daily_limit,
            log: Mutex::new(SendLog {
                last_send: None,
                day: None,
                count: 0,
            }),
        }
    }

    /// Time to wait before sending at `now`. Fails once today's cap is used up.
    pub fn delay(&self, now: Instant, today: NaiveDate) -> Result<Duration> {
        let mut log = self.lock();
        if log.day != Some(today) {
            log.day = Some(today);
            log.count = 0;
        }

        if log.count >= self.daily_limit {
            bail!(
                "Daily send limit reached: {}/{}",
                log.count,
                self.daily_limit
            );
        }

        Ok(match log.last_send {
            Some(last) => self.interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        })
    }

    pub fn record(&self, now: Instant, today: NaiveDate) {
        let mut log = self.lock();
        if log.day != Some(today) {
            log.day = Some(today);
            log.count = 0;
        }
        log.last_send = Some(now);
        log.count += 1;
        debug!("Recorded send, {} today", log.count);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SendLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            imap_server: "imap.example.com".into(),
            imap_port: 993,
            mailbox: "INBOX".into(),
            smtp_server: "smtp.example.com".into(),
            smtp_port: 587,
            account: "reader@example.com".into(),
            password: "secret".into(),
            sender: "digest@example.com".into(),
            sender_password: "secret".into(),
            recipient: "reader@example.com".into(),
        }
    }

    #[test]
    fn builds_multipart_alternative_message() {
        let sender = DigestSender::new(&config()).unwrap();
        let email = DigestEmail::new(
            "reader@example.com",
            "Daily Newsletter Summary - 2024-01-03",
            "Plain body",
            "<p>HTML body</p>",
        )
        .unwrap();

        let raw = String::from_utf8(sender.build_message(&email).unwrap().formatted()).unwrap();

        assert!(raw.contains("From: digest@example.com"));
        assert!(raw.contains("To: reader@example.com"));
        assert!(raw.contains("Subject: Daily Newsletter Summary - 2024-01-03"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("Plain body"));
        assert!(raw.contains("<p>HTML body</p>"));
    }

    #[test]
    fn adds_deliverability_headers() {
        let sender = DigestSender::new(&config()).unwrap();
        let email = DigestEmail::new("reader@example.com", "Digest", "Plain", "<p>HTML</p>").unwrap();

        let raw = String::from_utf8(sender.build_message(&email).unwrap().formatted()).unwrap();

        assert!(raw.contains("X-Mailer: Morning Digest v1.0"));
        assert!(raw.contains("X-Priority: 3 (Normal)"));
        assert!(raw.contains("X-MSMail-Priority: Normal"));
        assert!(raw.contains("@morning-digest>"));
        assert!(raw.contains("Message-ID: <"));
    }

    #[test]
    fn message_id_has_timestamp_and_suffix() {
        let id = message_id(1_704_067_200);
        let inner = id
            .strip_prefix("<1704067200.")
            .and_then(|rest| rest.strip_suffix("@morning-digest>"))
            .unwrap();
        let suffix: u16 = inner.parse().unwrap();
        assert!((1000..=9999).contains(&suffix));
    }

    #[test]
    fn guard_spaces_sends() {
        let guard = SendGuard::new(Duration::from_secs(2), 100);
        let day = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let start = Instant::now();

        assert_eq!(guard.delay(start, day).unwrap(), Duration::ZERO);
        guard.record(start, day);

        let wait = guard.delay(start + Duration::from_millis(500), day).unwrap();
        assert_eq!(wait, Duration::from_millis(1500));
        assert_eq!(guard.delay(start + Duration::from_secs(3), day).unwrap(), Duration::ZERO);
    }

    #[test]
    fn guard_caps_daily_sends_and_resets_next_day() {
        let guard = SendGuard::new(Duration::ZERO, 2);
        let day = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let now = Instant::now();

        guard.record(now, day);
        guard.record(now, day);
        let err = guard.delay(now, day).unwrap_err();
        assert!(err.to_string().contains("Daily send limit reached: 2/2"));

        let next = day.succ_opt().unwrap();
        assert_eq!(guard.delay(now, next).unwrap(), Duration::ZERO);
    }

    #[test]
    fn rejects_unparsable_sender() {
        let mut config = config();
        config.sender = "not an address".into();
        assert!(DigestSender::new(&config).is_err());
    }
}
