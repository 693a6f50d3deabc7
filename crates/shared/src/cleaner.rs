use regex::Regex;
use std::sync::LazyLock;

/// Upper bound on cleaned content, in characters.
pub const MAX_CLEANED_CHARS: usize = 1500;

const MIN_LINE_CHARS: usize = 10;
const SHORT_LINE_CHARS: usize = 100;
const HEADER_PREFIXES: [&str; 6] = [">", "From:", "To:", "Subject:", "Date:", "Reply-To:"];

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Strip markup, quoted/header lines and boilerplate from a newsletter body.
///
/// The result is a single line of at most [`MAX_CLEANED_CHARS`] characters.
/// Cleaning is total and idempotent: empty or all-boilerplate input yields an
/// empty string, and cleaning a cleaned string returns it unchanged.
pub fn clean(raw_body: &str) -> String {
    let without_tags = HTML_TAG.replace_all(raw_body, " ");

    let kept: Vec<String> = without_tags
        .split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| is_content_line(line))
        .collect();

    let joined = kept.join(" ");
    let truncated: String = joined.chars().take(MAX_CLEANED_CHARS).collect();

    truncated.trim().to_string()
}

fn is_content_line(line: &str) -> bool {
    if HEADER_PREFIXES.iter().any(|prefix| line.starts_with(prefix)) {
        return false;
    }

    let length = line.chars().count();
    if length < SHORT_LINE_CHARS && line.to_lowercase().contains("unsubscribe") {
        return false;
    }

    length >= MIN_LINE_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "From: Weekly Tech <news@example.com>\n\
        Subject: This week in AI\n\
        > quoted reply line that should vanish\n\
        <html><body><h1>Big model release</h1>\n\
        <p>The new model   doubles   context length and halves cost.</p>\n\
        ok\n\
        Click here to unsubscribe\n\
        </body></html>";

    #[test]
    fn strips_headers_tags_and_noise() {
        let cleaned = clean(SAMPLE);
        assert_eq!(
            cleaned,
            "Big model release The new model doubles context length and halves cost."
        );
    }

    #[test]
    fn cleaning_is_idempotent() {
        let long_body = format!(
            "<div>{}</div>\nTo: someone\n{}",
            "Rust 2024 edition lands with async closures. ".repeat(30),
            "Tools: cargo-nextest, bacon, and jj are trending this week."
        );
        for input in [SAMPLE, long_body.as_str(), "", "   ", "short\nlines\nonly"] {
            let once = clean(input);
            assert_eq!(clean(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn truncates_to_hard_cap() {
        let body = "A sentence about databases and storage engines. ".repeat(100);
        let cleaned = clean(&body);
        assert!(cleaned.chars().count() <= MAX_CLEANED_CHARS);
        assert!(cleaned.starts_with("A sentence about databases"));
    }

    #[test]
    fn all_boilerplate_yields_empty() {
        assert_eq!(clean("From: a@b.c\nTo: d@e.f\nunsubscribe here\n<br>"), "");
        assert_eq!(clean(""), "");
    }

    #[test]
    fn long_lines_mentioning_unsubscribe_survive() {
        let line = format!("{} unsubscribe", "This paragraph is long enough to count as real content. ".repeat(3));
        assert!(clean(&line).contains("unsubscribe"));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let body = "日本語のニュースレターの本文です。".repeat(200);
        let cleaned = clean(&body);
        assert_eq!(cleaned.chars().count(), MAX_CLEANED_CHARS);
    }
}
