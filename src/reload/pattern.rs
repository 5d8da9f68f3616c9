//! Subscription path patterns.
//!
//! `docs/x.md` matches only `docs/x.md`. A trailing `*` turns the rest into a
//! literal prefix: `docs/*` matches `docs/a.md` and `docs/sub/b.md`, and a bare
//! `*` matches everything. Matching is case-sensitive, separators are literal,
//! and there is no other glob syntax.

use std::fmt;

use crate::cache::normalize_key;

/// Wildcard marker, only meaningful as the last character.
pub const WILDCARD: char = '*';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    Exact(String),
    Prefix(String),
}

impl PathPattern {
    /// Parse a pattern taken from the websocket route (`/ws/{pattern}`).
    ///
    /// The fixed part is normalized like a cache key (empty and `.` segments
    /// dropped), so `/ws/docs//x.md` and `/files/docs//x.md` name the same
    /// page. A pattern that can never name a key (`..` segments) becomes an
    /// empty `Exact`, which matches nothing.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_suffix(WILDCARD) {
            Some(prefix) => match normalize_prefix(prefix) {
                Some(prefix) => Self::Prefix(prefix),
                None => Self::Exact(String::new()),
            },
            None => Self::Exact(normalize_key(raw).unwrap_or_default()),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == path,
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

/// `normalize_key` for the part before `*`, keeping a trailing separator.
///
/// `None` for prefixes no key can start with.
fn normalize_prefix(prefix: &str) -> Option<String> {
    if prefix
        .split('/')
        .any(|part| part == ".." || part.contains('\\'))
    {
        return None;
    }
    let Some(key) = normalize_key(prefix) else {
        // Only empty and `.` segments: everything matches.
        return Some(String::new());
    };
    let directory = prefix.ends_with('/') || prefix.ends_with("/.");
    Some(if directory { format!("{key}/") } else { key })
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(exact) => f.write_str(exact),
            Self::Prefix(prefix) => write!(f, "{prefix}{WILDCARD}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact() {
        let p = PathPattern::parse("docs/x.md");
        assert!(p.matches("docs/x.md"));
        assert!(!p.matches("docs/x.md.bak"));
        assert!(!p.matches("Docs/x.md"));
        assert!(!p.matches("other"));
    }

    #[test]
    fn test_prefix() {
        let p = PathPattern::parse("/docs/*");
        assert_eq!(p, PathPattern::Prefix("docs/".into()));
        assert!(p.matches("docs/a.md"));
        assert!(p.matches("docs/sub/b.md"));
        assert!(!p.matches("doc.md"));
        assert!(!p.matches("other/docs/a.md"));
    }

    #[test]
    fn test_bare_wildcard_matches_all() {
        let p = PathPattern::parse("*");
        assert!(p.matches("a.md"));
        assert!(p.matches("deep/nested/b.md"));
    }

    #[test]
    fn test_inner_star_is_literal() {
        let p = PathPattern::parse("a*/b.md");
        assert!(p.matches("a*/b.md"));
        assert!(!p.matches("ab/b.md"));
    }

    #[test]
    fn test_normalized_like_keys() {
        assert_eq!(
            PathPattern::parse("docs//x.md"),
            PathPattern::Exact("docs/x.md".into())
        );
        assert!(PathPattern::parse("/./docs/x.md").matches("docs/x.md"));
        assert_eq!(
            PathPattern::parse("./docs//*"),
            PathPattern::Prefix("docs/".into())
        );
        assert_eq!(
            PathPattern::parse("docs/./a*"),
            PathPattern::Prefix("docs/a".into())
        );
        assert_eq!(PathPattern::parse("//*"), PathPattern::Prefix(String::new()));
    }

    #[test]
    fn test_parent_segments_match_nothing() {
        for raw in ["../a.md", "docs/../a.md", "../*", ""] {
            let p = PathPattern::parse(raw);
            assert!(!p.matches("a.md"), "{raw}");
            assert!(!p.matches("docs/a.md"), "{raw}");
        }
    }

    #[test]
    fn test_display_roundtrip() {
        for raw in ["docs/*", "a.md", "*"] {
            assert_eq!(PathPattern::parse(raw).to_string(), raw);
        }
    }
}
