use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use shared::config::MAX_DAYS_TO_LOOK_BACK;
use shared::{
    save_digest, Config, DigestEmail, DigestRecord, DigestRenderer, DigestSender, ErrorTracker,
    NewsletterCollector, OpenAiTransport, Summarizer, SummaryRequester,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "morning-digest")]
#[command(about = "Collect newsletters, summarize them with AI and email a daily digest")]
struct Args {
    /// Steps to run: collect, process, send or all (comma separated)
    #[arg(long, default_value = "all", value_delimiter = ',')]
    steps: Vec<String>,

    /// Save the digest to the output directory instead of emailing it
    #[arg(long)]
    no_send: bool,

    /// Maximum number of newsletters to collect
    #[arg(short, long)]
    limit: Option<usize>,

    /// Number of days to look back for newsletters
    #[arg(short, long)]
    days: Option<u32>,

    /// Directory for saved digests
    #[arg(short, long, default_value = "output_samples")]
    output_dir: PathBuf,

    /// Explicit .env file to load before the default locations
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Show what would run without touching the network
    #[arg(long)]
    dry_run: bool,

    /// Log in to the SMTP server and exit without sending
    #[arg(long)]
    check_connection: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Steps {
    collect: bool,
    process: bool,
    send: bool,
}

impl Steps {
    fn parse(names: &[String]) -> Result<Self> {
        let mut steps = Steps {
            collect: false,
            process: false,
            send: false,
        };

        for name in names {
            match name.trim().to_lowercase().as_str() {
                "all" => {
                    steps.collect = true;
                    steps.process = true;
                    steps.send = true;
                }
                "collect" => steps.collect = true,
                "process" => steps.process = true,
                "send" => steps.send = true,
                other => anyhow::bail!(
                    "Invalid step: {}. Use 'collect', 'process', 'send' or 'all'",
                    other
                ),
            }
        }

        if !steps.collect && !steps.process && !steps.send {
            anyhow::bail!("No steps selected");
        }
        if steps.process && !steps.collect {
            anyhow::bail!("The 'process' step needs 'collect'");
        }
        if steps.send && !steps.process {
            anyhow::bail!("The 'send' step needs 'process'");
        }
        Ok(steps)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let steps = Steps::parse(&args.steps)?;
    let config = Config::load(args.env_file.as_deref())?;
    config.validate().context("Invalid configuration")?;

    let limit = args.limit.unwrap_or(config.processing.max_newsletters);
    let days = args.days.unwrap_or(config.processing.days_to_look_back);
    if limit == 0 {
        anyhow::bail!("--limit must be greater than 0");
    }
    if days > MAX_DAYS_TO_LOOK_BACK {
        anyhow::bail!("--days must be at most {}", MAX_DAYS_TO_LOOK_BACK);
    }

    if args.check_connection {
        println!(
            "🔌 Checking SMTP login to {}:{} as {}...",
            config.email.smtp_server, config.email.smtp_port, config.email.sender
        );
        let sender = DigestSender::new(&config.email)?;
        if !sender.check_connection().await? {
            anyhow::bail!("SMTP server {} refused the connection test", config.email.smtp_server);
        }
        println!("✅ SMTP connection OK");
        return Ok(());
    }

    if args.dry_run {
        println!("🧪 Dry run, nothing will be fetched or sent");
        println!(
            "  • Collect: up to {} newsletters from the last {} days in {} on {}",
            limit, days, config.email.mailbox, config.email.imap_server
        );
        if steps.process {
            println!(
                "  • Process: summarize with {} (batches of {} above {} tokens)",
                config.ai.model,
                config.processing.tuning.batch_size,
                config.processing.tuning.token_threshold
            );
        }
        if steps.send && !args.no_send {
            println!(
                "  • Send: email the digest to {} via {}",
                config.email.recipient, config.email.smtp_server
            );
        } else if steps.process {
            println!("  • Save: write the digest to {}", args.output_dir.display());
        }
        return Ok(());
    }

    println!(
        "\n📬 Collecting newsletters from the last {} days (up to {})...",
        days, limit
    );
    let collector = NewsletterCollector::new(&config.email);
    let newsletters = collector
        .collect_recent(days, limit)
        .await
        .context("Failed to collect newsletters")?;

    if newsletters.is_empty() {
        warn!("No newsletters found in the past {} days", days);
        println!("No newsletters found in the past {} days.", days);
        return Ok(());
    }

    println!("✓ Found {} newsletters", newsletters.len());
    for newsletter in &newsletters {
        println!("  • {} ({})", newsletter.title(), newsletter.source());
    }

    if !steps.process {
        return Ok(());
    }

    println!("\n🤖 Summarizing newsletters with AI...");
    println!("  (This may take a minute...)");
    let tracker = Arc::new(ErrorTracker::new());
    let transport = OpenAiTransport::new(
        config.ai.api_key.clone(),
        config.ai.model.clone(),
        config.ai.base_url.clone(),
    )?;
    let summarizer = Summarizer::new(
        SummaryRequester::new(transport, config.ai.max_tokens),
        config.processing.tuning,
    )
    .with_error_tracker(tracker.clone());

    let summary = summarizer.summarize(&newsletters).await?;

    let stats = tracker.stats();
    if stats.total_errors > 0 {
        warn!(
            "{} errors during processing: {:?}",
            stats.total_errors, stats.error_kinds
        );
        for entry in &stats.recent_errors {
            warn!("  [{}] {}: {}", entry.kind, entry.subject, entry.message);
        }
    }

    if summary.meta.fallback_mode {
        println!("⚠ AI summary unavailable, using fallback digest");
    } else {
        println!(
            "✓ Summarized {} newsletters in {} batch(es)",
            summary.meta.total_sources, summary.meta.batch_count
        );
    }

    let first_date = newsletters
        .first()
        .map(|n| n.published_date())
        .unwrap_or_default();
    let subject = DigestRenderer::subject(first_date, Local::now().date_naive());
    let record = DigestRecord::new(subject, summary);

    if !steps.send || args.no_send {
        let path = save_digest(&args.output_dir, &record).context("Failed to save digest")?;
        println!("\n💾 Digest saved to: {}", path.display());
        return Ok(());
    }

    println!("\n📤 Sending digest to {}...", config.email.recipient);
    let now = Local::now().naive_local();
    let email = DigestEmail::new(
        config.email.recipient.clone(),
        record.subject.clone(),
        DigestRenderer::render_text(&record.summary, now),
        DigestRenderer::render_html(&record.summary, now),
    )?;
    let sender = DigestSender::new(&config.email)?;
    let code = sender.send(&email).await?;

    println!("\n✅ Digest sent (server response {})", code);

    Ok(())
}
