//! Built-in known-origin table

use crate::types::{Category, ExecutableKind};

/// Successes credited to a seeded origin so that early failures don't immediately flip it
pub const SEED_SUCCESS_COUNT: u32 = 10;

/// One entry of the known-origin table
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeedRecord {
    /// Origin key (already normalized)
    pub origin: &'static str,
    /// Preferred executable
    pub executable: ExecutableKind,
    /// Starting confidence
    pub confidence: f64,
    /// Content category
    pub category: Category,
    /// Sensitive-content flag
    pub is_sensitive: bool,
}

const fn seed(
    origin: &'static str,
    executable: ExecutableKind,
    confidence: f64,
    category: Category,
) -> SeedRecord {
    SeedRecord {
        origin,
        executable,
        confidence,
        category,
        is_sensitive: false,
    }
}

use ExecutableKind::{GalleryExtractor as Gallery, VideoExtractor as Video};

/// Known origins loaded at start-up
pub const KNOWN_ORIGINS: &[SeedRecord] = &[
    seed("youtube.com", Video, 0.98, Category::Video),
    seed("youtu.be", Video, 0.98, Category::Video),
    seed("dailymotion.com", Video, 0.95, Category::Video),
    seed("vimeo.com", Video, 0.95, Category::Video),
    seed("tiktok.com", Video, 0.86, Category::Video),
    seed("soundcloud.com", Video, 0.94, Category::Audio),
    seed("bandcamp.com", Video, 0.92, Category::Audio),
    seed("spotify.com", Video, 0.85, Category::Audio),
    seed("gelbooru.com", Gallery, 0.93, Category::Gallery),
    seed("danbooru.donmai.us", Gallery, 0.93, Category::Gallery),
    seed("imgur.com", Gallery, 0.90, Category::Images),
    seed("flickr.com", Gallery, 0.88, Category::Images),
    seed("deviantart.com", Gallery, 0.87, Category::Images),
    seed("twitter.com", Gallery, 0.85, Category::Social),
    seed("x.com", Gallery, 0.85, Category::Social),
    seed("instagram.com", Gallery, 0.83, Category::Social),
    seed("reddit.com", Gallery, 0.82, Category::Social),
    seed("bunkr.cr", Gallery, 0.90, Category::Filehost),
    seed("bunkr.is", Gallery, 0.90, Category::Filehost),
    seed("bunkr.si", Gallery, 0.90, Category::Filehost),
    seed("imgbox.com", Gallery, 0.88, Category::Filehost),
    seed("twitch.tv", Video, 0.89, Category::Streaming),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_known_origins_are_unique_normalized_and_in_bounds() {
        let mut seen = HashSet::new();
        for record in KNOWN_ORIGINS {
            assert!(seen.insert(record.origin), "duplicate seed {}", record.origin);
            assert_eq!(record.origin, record.origin.to_ascii_lowercase());
            assert!(!record.origin.starts_with("www."));
            assert!((0.01..=0.99).contains(&record.confidence));
        }
    }
}
