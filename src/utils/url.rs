//! Browser URL boundary: decode on input, encode on output.
//!
//! Page keys are kept decoded internally (`docs/with space.md`) and only
//! percent-encoded when written into links.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Characters left alone inside one path segment.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Split a request target into its path and query (without `?`).
///
/// Fragments never reach the server, but a stray `#` is dropped anyway.
pub fn split_target(target: &str) -> (&str, &str) {
    let target = target.split('#').next().unwrap_or(target);
    match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    }
}

/// Percent-decode a path. Invalid UTF-8 falls back to the raw text so the
/// lookup fails with a 404 instead of panicking.
pub fn decode_path(path: &str) -> String {
    percent_decode_str(path)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

/// Encode a page key for an `href`, segment by segment.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("/files/a.md?x=1"), ("/files/a.md", "x=1"));
        assert_eq!(split_target("/files/a.md"), ("/files/a.md", ""));
        assert_eq!(split_target("/a#frag"), ("/a", ""));
    }

    #[test]
    fn test_decode_path() {
        assert_eq!(decode_path("docs/with%20space.md"), "docs/with space.md");
        assert_eq!(decode_path("%E6%97%A5.md"), "日.md");
        assert_eq!(decode_path("bad%FF"), "bad%FF");
    }

    #[test]
    fn test_encode_key_keeps_separators() {
        assert_eq!(encode_key("docs/with space.md"), "docs/with%20space.md");
        assert_eq!(encode_key("a-b_c~d.md"), "a-b_c~d.md");
        assert_eq!(decode_path(&encode_key("日本/#?.md")), "日本/#?.md");
    }
}
