use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use shared::{list_digests, load_digest, write_renderings, DigestRecord};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "render-digest")]
#[command(about = "Re-render a saved digest into HTML and plain text")]
struct Args {
    /// Digest JSON file to render (if not provided, the newest in --dir is used)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Directory holding saved digests
    #[arg(short, long, default_value = "output_samples")]
    dir: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();

    let (path, record) = match args.file {
        Some(path) => {
            println!("📖 Reading digest: {}", path.display());
            let record = load_digest(&path)?;
            (path, record)
        }
        None => newest_digest(&args.dir)?,
    };

    println!("✓ {}", record.subject);
    println!(
        "  {} highlights, {} categories, {} sources{}",
        record.summary.highlights.len(),
        record.summary.categories.len(),
        record.summary.meta.total_sources,
        if record.summary.meta.fallback_mode {
            " (fallback)"
        } else {
            ""
        }
    );

    println!("\n📝 Rendering HTML and text...");
    let (html_path, text_path) =
        write_renderings(&path, &record).context("Failed to render digest")?;

    println!("✓ HTML saved to: {}", html_path.display());
    println!("✓ Text saved to: {}", text_path.display());
    println!("\n✅ Done!");

    Ok(())
}

fn newest_digest(dir: &Path) -> Result<(PathBuf, DigestRecord)> {
    let digests = list_digests(dir)?;
    if digests.is_empty() {
        anyhow::bail!("No digest files found in {}", dir.display());
    }

    println!("Available digests:\n");
    for (i, (path, record)) in digests.iter().enumerate() {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let created = DateTime::parse_from_rfc3339(&record.created_at)
            .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        println!("  {}) {} (created: {})", i + 1, filename, created);
    }
    println!();

    digests
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("No digest files found in {}", dir.display()))
}
