//! Command building
//!
//! Each [`ExecutableKind`] has exactly one template function in [`TEMPLATES`].
//! A template turns a URL, an output directory and the shared settings into
//! an argument vector; [`build`] creates the output directory first.

use crate::error::{Error, Result};
use crate::types::ExecutableKind;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings shared by every template
#[derive(Clone, Debug)]
pub struct CommandSettings {
    /// Caller-facing quality name ("best", "1080p", "FLAC", ...)
    pub quality: String,
    /// Network timeout passed to the executable
    pub timeout: Duration,
    /// User-Agent header value
    pub user_agent: String,
}

/// A ready-to-spawn command line
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    /// Which executable this runs
    pub kind: ExecutableKind,
    /// Program path
    pub program: PathBuf,
    /// Arguments (not including the program)
    pub args: Vec<OsString>,
    /// Directory the executable writes into
    pub output_dir: PathBuf,
}

impl Invocation {
    /// Arguments as displayable strings, for logging
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

type TemplateFn = fn(&str, &Path, &CommandSettings) -> Vec<OsString>;

/// One template per executable kind
pub const TEMPLATES: &[(ExecutableKind, TemplateFn)] = &[
    (ExecutableKind::VideoExtractor, video_extractor_args),
    (ExecutableKind::GalleryExtractor, gallery_extractor_args),
    (ExecutableKind::HttpFetcher, http_fetcher_args),
    (ExecutableKind::TransferClient, transfer_client_args),
];

/// Caller quality vocabulary → video extractor format selector
const QUALITY_SELECTORS: &[(&str, &str)] = &[
    ("FLAC", "bestaudio[ext=flac]/bestaudio"),
    ("WAV", "bestaudio[ext=wav]/bestaudio"),
    ("MP3 320kbps", "bestaudio[ext=mp3][abr>=320]/bestaudio"),
    ("MP3 256kbps", "bestaudio[ext=mp3][abr>=256]/bestaudio"),
    ("MP3 128kbps", "bestaudio[ext=mp3][abr>=128]/bestaudio"),
    ("4K", "bestvideo[height<=2160]+bestaudio/best"),
    ("1080p", "bestvideo[height<=1080]+bestaudio/best"),
    ("720p", "bestvideo[height<=720]+bestaudio/best"),
    ("480p", "bestvideo[height<=480]+bestaudio/best"),
    ("best", "best"),
    ("worst", "worst"),
];

/// Translate a quality name, defaulting to `"best"` for anything unknown
pub fn format_selector(quality: &str) -> &'static str {
    QUALITY_SELECTORS
        .iter()
        .find(|(name, _)| *name == quality.trim())
        .map(|(_, selector)| *selector)
        .unwrap_or("best")
}

fn template_for(kind: ExecutableKind) -> Result<TemplateFn> {
    TEMPLATES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, template)| *template)
        .ok_or_else(|| Error::UnsupportedExecutable(kind.to_string()))
}

/// Build the invocation for `kind`, creating `output_dir` first
pub async fn build(
    kind: ExecutableKind,
    program: &Path,
    url: &str,
    output_dir: &Path,
    settings: &CommandSettings,
) -> Result<Invocation> {
    let template = template_for(kind)?;

    tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!(
                "Failed to create output directory '{}': {}",
                output_dir.display(),
                e
            ),
        ))
    })?;

    Ok(Invocation {
        kind,
        program: program.to_path_buf(),
        args: template(url, output_dir, settings),
        output_dir: output_dir.to_path_buf(),
    })
}

fn os(s: impl Into<OsString>) -> OsString {
    s.into()
}

fn video_extractor_args(url: &str, out: &Path, settings: &CommandSettings) -> Vec<OsString> {
    vec![
        os("--no-playlist"),
        os("--newline"),
        os("--output"),
        out.join("%(uploader)s - %(title)s.%(ext)s").into_os_string(),
        os("--format"),
        os(format_selector(&settings.quality)),
        os("--no-warnings"),
        os("--socket-timeout"),
        os(settings.timeout.as_secs().to_string()),
        os("--user-agent"),
        os(settings.user_agent.as_str()),
        os(url),
    ]
}

fn gallery_extractor_args(url: &str, out: &Path, settings: &CommandSettings) -> Vec<OsString> {
    // --directory writes files flat into `out` instead of per-site subfolders
    vec![
        os("--directory"),
        out.as_os_str().to_os_string(),
        os("--no-skip"),
        os("--http-timeout"),
        os(settings.timeout.as_secs().to_string()),
        os("--user-agent"),
        os(settings.user_agent.as_str()),
        os(url),
    ]
}

fn http_fetcher_args(url: &str, out: &Path, settings: &CommandSettings) -> Vec<OsString> {
    vec![
        os("--directory-prefix"),
        out.as_os_str().to_os_string(),
        os("--timeout"),
        os(settings.timeout.as_secs().to_string()),
        os("--user-agent"),
        os(settings.user_agent.as_str()),
        os("--progress=dot:mega"),
        os(url),
    ]
}

fn transfer_client_args(url: &str, out: &Path, settings: &CommandSettings) -> Vec<OsString> {
    vec![
        os("--location"),
        os("--fail"),
        os("--progress-bar"),
        os("--output"),
        out.join(filename_from_url(url)).into_os_string(),
        os("--connect-timeout"),
        os(settings.timeout.as_secs().to_string()),
        os("--user-agent"),
        os(settings.user_agent.as_str()),
        os(url),
    ]
}

/// Last non-empty path segment of the URL, or `"download"`
fn filename_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
                .map(|s| s.to_string())
        })
        .filter(|name| name != "." && name != "..")
        .unwrap_or_else(|| "download".to_string())
}
