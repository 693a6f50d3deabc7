use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use crate::planner::BatchTuning;
use crate::requester::DEFAULT_BASE_URL;

const APP_DIR: &str = "morning-digest";

/// Upper bound for `DAYS_TO_LOOK_BACK` (ten years).
pub const MAX_DAYS_TO_LOOK_BACK: u32 = 3650;

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_server: String,
    pub imap_port: u16,
    pub mailbox: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub account: String,
    pub password: String,
    pub sender: String,
    pub sender_password: String,
    pub recipient: String,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub max_newsletters: usize,
    pub days_to_look_back: u32,
    pub tuning: BatchTuning,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub email: EmailConfig,
    pub ai: AiConfig,
    pub processing: ProcessingConfig,
}

impl Config {
    /// Load `.env` (an explicit file first when given), then read the environment.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path)
                    .with_context(|| format!("Failed to load env file {}", path.display()))?;
            }
            None => Self::try_load_dotenv(),
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let account = required(&lookup, "NEWSLETTER_EMAIL", "the mailbox newsletters arrive in")?;
        let password = required(&lookup, "NEWSLETTER_APP_PASSWORD", "an app password for that mailbox")?;
        let api_key = required(&lookup, "OPENAI_API_KEY", "your AI API key")?;

        let sender = get("SENDER_EMAIL", &account);
        let sender_password = get("SENDER_APP_PASSWORD", &password);
        let recipient = get("RECIPIENT_EMAIL", &sender);

        let defaults = BatchTuning::default();

        Ok(Self {
            email: EmailConfig {
                imap_server: get("EMAIL_IMAP_SERVER", "imap.gmail.com"),
                imap_port: parse_or(&lookup, "EMAIL_IMAP_PORT", 993)?,
                mailbox: get("EMAIL_IMAP_MAILBOX", "INBOX"),
                smtp_server: get("EMAIL_SMTP_SERVER", "smtp.gmail.com"),
                smtp_port: parse_or(&lookup, "EMAIL_SMTP_PORT", 587)?,
                account,
                password,
                sender,
                sender_password,
                recipient,
            },
            ai: AiConfig {
                api_key,
                model: get("OPENAI_MODEL", "gpt-3.5-turbo"),
                max_tokens: parse_or(&lookup, "OPENAI_MAX_TOKENS", 1000)?,
                base_url: get("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            },
            processing: ProcessingConfig {
                max_newsletters: parse_or(&lookup, "MAX_NEWSLETTERS_PER_RUN", 10)?,
                days_to_look_back: parse_or(&lookup, "DAYS_TO_LOOK_BACK", 1)?,
                tuning: BatchTuning {
                    base_overhead: parse_or(&lookup, "SUMMARY_BASE_OVERHEAD", defaults.base_overhead)?,
                    chars_per_token: parse_or(&lookup, "SUMMARY_CHARS_PER_TOKEN", defaults.chars_per_token)?,
                    token_threshold: parse_or(&lookup, "SUMMARY_TOKEN_THRESHOLD", defaults.token_threshold)?,
                    batch_size: parse_or(&lookup, "SUMMARY_BATCH_SIZE", defaults.batch_size)?,
                },
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        for (name, address) in [
            ("NEWSLETTER_EMAIL", &self.email.account),
            ("SENDER_EMAIL", &self.email.sender),
            ("RECIPIENT_EMAIL", &self.email.recipient),
        ] {
            if !address.contains('@') {
                bail!("{} must be an email address, got {:?}", name, address);
            }
        }
        if self.ai.api_key.trim().is_empty() {
            bail!("OPENAI_API_KEY must not be empty");
        }
        if self.email.imap_port == 0 {
            bail!("EMAIL_IMAP_PORT must be greater than 0");
        }
        if self.email.smtp_port == 0 {
            bail!("EMAIL_SMTP_PORT must be greater than 0");
        }
        if self.processing.max_newsletters == 0 {
            bail!("MAX_NEWSLETTERS_PER_RUN must be greater than 0");
        }
        if self.processing.days_to_look_back > MAX_DAYS_TO_LOOK_BACK {
            bail!(
                "DAYS_TO_LOOK_BACK must be at most {}, got {}",
                MAX_DAYS_TO_LOOK_BACK,
                self.processing.days_to_look_back
            );
        }
        if self.ai.max_tokens == 0 {
            bail!("OPENAI_MAX_TOKENS must be greater than 0");
        }

        let tuning = &self.processing.tuning;
        if tuning.chars_per_token == 0 {
            bail!("SUMMARY_CHARS_PER_TOKEN must be greater than 0");
        }
        if tuning.batch_size == 0 {
            bail!("SUMMARY_BATCH_SIZE must be greater than 0");
        }
        if tuning.token_threshold == 0 {
            bail!("SUMMARY_TOKEN_THRESHOLD must be greater than 0");
        }
        Ok(())
    }

    fn try_load_dotenv() {
        // 1. Current directory (for development)
        if dotenvy::dotenv().is_ok() {
            return;
        }

        // 2. ~/.config/morning-digest/.env
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join(APP_DIR).join(".env");
            if config_path.exists() && dotenvy::from_path(&config_path).is_ok() {
                return;
            }
        }

        // 3. ~/.env
        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".env");
            if home_path.exists() {
                let _ = dotenvy::from_path(&home_path);
            }
        }

        // Variables may still be set system-wide.
    }
}

fn required<F>(lookup: &F, key: &str, what: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            anyhow!(
                "{key} not found.\n\n\
                To fix this, set {key} to {what} in ~/.config/{APP_DIR}/.env, ./.env \
                or the environment, for example:\n  \
                NEWSLETTER_EMAIL=you@example.com\n  \
                NEWSLETTER_APP_PASSWORD=your_app_password\n  \
                OPENAI_API_KEY=your_key_here"
            )
        })
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        Some(value) if !value.is_empty() => value
            .parse()
            .map_err(|e| anyhow!("{} must be a non-negative number, got {:?}: {}", key, value, e)),
        _ => Ok(default),
    }
}
