//! Progress extraction from fetcher output lines

use crate::types::{ExecutableKind, Progress};
use regex::Regex;
use std::sync::LazyLock;

/// Longest failure excerpt carried in an outcome
pub const MAX_EXCERPT_CHARS: usize = 200;

#[allow(clippy::expect_used)]
fn literal(pattern: &str) -> Regex {
    // Only called with the literal patterns below, which the tests compile
    Regex::new(pattern).expect("progress pattern is a valid literal")
}

/// `[download]  45.2% of 123.45MiB at 1.23MiB/s ETA 00:30`
static VIDEO_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| literal(r"\[download\]\s+(\d+(?:\.\d+)?)%"));

/// wget dot output (`  5120K .......... 42% 1.2M 3s`) and curl's progress bar (`### 45.2%`)
static BARE_PERCENT: LazyLock<Regex> = LazyLock::new(|| literal(r"(\d{1,3}(?:\.\d+)?)%"));

fn capture_percent(re: &Regex, line: &str) -> Option<Progress> {
    re.captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(Progress::from_percent)
}

fn is_diagnostic(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("error") || lower.contains("warning")
}

/// Classify one output line
///
/// Returns `None` for lines that carry no progress information.
pub fn parse_progress(kind: ExecutableKind, line: &str) -> Option<Progress> {
    match kind {
        ExecutableKind::VideoExtractor => capture_percent(&VIDEO_PERCENT, line),
        // The gallery extractor prints one line per file it writes and never a percentage
        ExecutableKind::GalleryExtractor => {
            (!line.trim().is_empty() && !is_diagnostic(line)).then_some(Progress::Indeterminate)
        }
        ExecutableKind::HttpFetcher | ExecutableKind::TransferClient => {
            capture_percent(&BARE_PERCENT, line)
        }
    }
}

/// Tracks the line to report if the process fails
#[derive(Debug, Default)]
pub(crate) struct ExcerptTracker {
    last_error: Option<String>,
    last_other: Option<String>,
}

impl ExcerptTracker {
    pub(crate) fn observe(&mut self, line: &str, was_progress: bool) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if line.to_ascii_lowercase().contains("error") {
            self.last_error = Some(line.to_string());
        } else if !was_progress {
            self.last_other = Some(line.to_string());
        }
    }

    /// Truncated excerpt of the most relevant line, if any output was seen
    pub(crate) fn excerpt(&self) -> Option<String> {
        self.last_error
            .as_deref()
            .or(self.last_other.as_deref())
            .map(|line| truncate_chars(line, MAX_EXCERPT_CHARS))
    }
}

/// Truncate to at most `max` characters on a char boundary
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
