//! Pre-dispatch safety gate.

/// Decides whether a URL may be fetched at all
///
/// Called before resolution. A `false` answer fails the item with
/// "blocked by policy" and nothing else runs.
pub trait SafetyPolicy: Send + Sync {
    /// Whether `url` may be fetched
    fn is_allowed(&self, url: &str) -> bool;
}

/// Policy that allows every URL
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl SafetyPolicy for AllowAll {
    fn is_allowed(&self, _url: &str) -> bool {
        true
    }
}

impl<F> SafetyPolicy for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_allowed(&self, url: &str) -> bool {
        self(url)
    }
}
