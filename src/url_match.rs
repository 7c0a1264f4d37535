//! Fragment-insensitive URL comparison.

use url::Url;

/// Returns true when both URLs are equal after dropping any `#fragment`.
///
/// URLs that fail to parse never compare equal.
pub fn equal_without_fragment(a: &str, b: &str) -> bool {
    match (strip_fragment(a), strip_fragment(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn strip_fragment(raw: &str) -> Option<Url> {
    let mut url = Url::parse(raw).ok()?;
    url.set_fragment(None);
    Some(url)
}
