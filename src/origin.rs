//! Origin key extraction
//!
//! The origin key is the routing key for everything the registry learns: the
//! URL's host, lower-cased, with one leading `www.` label removed, plus the
//! port when one is given explicitly. User info, path, query and fragment are
//! ignored.

use crate::error::{Error, Result};
use url::Url;

/// Normalize a URL to its origin key
///
/// Fails with [`Error::InvalidUrl`] when the URL does not parse or has no host.
///
/// # Examples
///
/// ```
/// use routed_dl::origin::extract_origin;
///
/// assert_eq!(extract_origin("https://WWW.YouTube.com/watch?v=1").unwrap(), "youtube.com");
/// assert_eq!(extract_origin("http://files.example:8080/a.zip").unwrap(), "files.example:8080");
/// assert!(extract_origin("not a url").is_err());
/// ```
pub fn extract_origin(url: &str) -> Result<String> {
    let parsed = Url::parse(url.trim()).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::InvalidUrl(format!("{url}: no host")))?
        .to_ascii_lowercase();

    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return Err(Error::InvalidUrl(format!("{url}: empty host")));
    }

    Ok(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Whether the URL's path ends in a common image extension
pub(crate) fn has_image_suffix(url: &str) -> bool {
    const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];

    let path = match Url::parse(url.trim()) {
        Ok(parsed) => parsed.path().to_ascii_lowercase(),
        Err(_) => return false,
    };
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_www_and_lowercases() {
        assert_eq!(
            extract_origin("https://WWW.Example.COM/path").unwrap(),
            "example.com"
        );
        assert_eq!(
            extract_origin("https://video-host.example/watch?id=1").unwrap(),
            "video-host.example"
        );
    }

    #[test]
    fn test_strips_only_a_leading_www_label() {
        assert_eq!(
            extract_origin("https://www.www.example.com/").unwrap(),
            "www.example.com"
        );
        assert_eq!(
            extract_origin("https://wwwexample.com/").unwrap(),
            "wwwexample.com"
        );
        assert_eq!(
            extract_origin("https://cdn.www.example.com/").unwrap(),
            "cdn.www.example.com"
        );
    }

    #[test]
    fn test_keeps_explicit_port_and_drops_userinfo() {
        assert_eq!(
            extract_origin("http://user:pw@host.example:8080/x").unwrap(),
            "host.example:8080"
        );
        // Default ports are not "explicit" once normalized
        assert_eq!(
            extract_origin("https://host.example:443/x").unwrap(),
            "host.example"
        );
    }

    #[test]
    fn test_is_deterministic() {
        let url = "https://www.Gallery.example/album/42";
        assert_eq!(extract_origin(url).unwrap(), extract_origin(url).unwrap());
    }

    #[test]
    fn test_rejects_urls_without_authority() {
        for bad in ["", "not a url", "youtube.com/watch?v=1", "mailto:a@b.c", "file:///tmp/x"] {
            match extract_origin(bad) {
                Err(Error::InvalidUrl(_)) => {}
                other => panic!("expected InvalidUrl for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn test_detects_image_suffixes() {
        assert!(has_image_suffix("https://img.example/a/b/photo.JPG"));
        assert!(has_image_suffix("https://img.example/x.webp?size=large"));
        assert!(!has_image_suffix("https://img.example/x.mp4"));
        assert!(!has_image_suffix("garbage"));
    }
}
