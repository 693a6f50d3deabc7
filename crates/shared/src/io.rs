use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::digest::DigestRenderer;
use crate::models::DigestRecord;

pub const DIGEST_VERSION: &str = "1.0";

/// Save a digest record as JSON plus its HTML and text renderings.
///
/// Returns the path of the JSON file.
pub fn save_digest(dir: &Path, record: &DigestRecord) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let filename = format!("digest-{}.json", Local::now().format("%Y%m%d_%H%M%S"));
    let filepath = dir.join(filename);

    let json = serde_json::to_string_pretty(record).context("Failed to serialize digest")?;
    fs::write(&filepath, json)
        .with_context(|| format!("Failed to write digest file {}", filepath.display()))?;

    write_renderings(&filepath, record)?;

    Ok(filepath)
}

/// Write `{stem}.html` and `{stem}.txt` next to a digest JSON file.
pub fn write_renderings(json_path: &Path, record: &DigestRecord) -> Result<(PathBuf, PathBuf)> {
    let rendered_at = rendered_at(record);
    let html_path = json_path.with_extension("html");
    let text_path = json_path.with_extension("txt");

    fs::write(&html_path, DigestRenderer::render_html(&record.summary, rendered_at))
        .with_context(|| format!("Failed to write {}", html_path.display()))?;
    fs::write(&text_path, DigestRenderer::render_text(&record.summary, rendered_at))
        .with_context(|| format!("Failed to write {}", text_path.display()))?;

    Ok((html_path, text_path))
}

/// Load a digest record from a JSON file
pub fn load_digest(filepath: &Path) -> Result<DigestRecord> {
    if !filepath.exists() {
        anyhow::bail!("Digest file not found: {}", filepath.display());
    }

    let content = fs::read_to_string(filepath)
        .with_context(|| format!("Failed to read digest file: {}", filepath.display()))?;

    let record: DigestRecord = serde_json::from_str(&content).with_context(|| {
        format!(
            "Failed to parse digest JSON from {}. The file may be corrupted or not a digest file.",
            filepath.display()
        )
    })?;

    if record.version != DIGEST_VERSION {
        anyhow::bail!(
            "Unsupported digest file version: {}. Expected {}.",
            record.version,
            DIGEST_VERSION
        );
    }

    Ok(record)
}

/// List loadable digest records in `dir`, newest first
pub fn list_digests(dir: &Path) -> Result<Vec<(PathBuf, DigestRecord)>> {
    let mut files = Vec::new();

    if dir.exists() {
        for entry in fs::read_dir(dir)
            .with_context(|| format!("Failed to read digest directory {}", dir.display()))?
        {
            let path = entry?.path();

            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                match load_digest(&path) {
                    Ok(record) => files.push((path, record)),
                    Err(e) => warn!("Could not load {}: {:#}", path.display(), e),
                }
            }
        }
    }

    files.sort_by(|a, b| {
        let time_a = DateTime::parse_from_rfc3339(&a.1.created_at).ok();
        let time_b = DateTime::parse_from_rfc3339(&b.1.created_at).ok();
        time_b.cmp(&time_a)
    });

    Ok(files)
}

fn rendered_at(record: &DigestRecord) -> NaiveDateTime {
    DateTime::parse_from_rfc3339(&record.created_at)
        .map(|dt| dt.with_timezone(&Local).naive_local())
        .unwrap_or_else(|_| Local::now().naive_local())
}
