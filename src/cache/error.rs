//! Page cache error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by [`PageCache`](super::PageCache) operations.
///
/// `Clone` because a single-flight result is shared by every caller that
/// joined the same render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// One page failed to render. Isolated to that path.
    #[error("failed to render `{path}`: {message}")]
    Render { path: String, message: String },

    /// The source file for one page could not be read.
    #[error("failed to read `{path}`: {message}")]
    Source { path: String, message: String },

    /// The source tree itself is unreadable. Fatal to a full rescan.
    #[error("cannot scan source tree `{}`: {message}", root.display())]
    Scan { root: PathBuf, message: String },

    /// Path is not (or cannot be) in the cache.
    #[error("{0} page not found")]
    NotFound(String),
}

impl CacheError {
    /// Whether this error is confined to a single page.
    pub fn is_page_local(&self) -> bool {
        matches!(self, Self::Render { .. } | Self::Source { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::Render {
            path: "docs/a.md".into(),
            message: "bad utf-8".into(),
        };
        assert_eq!(err.to_string(), "failed to render `docs/a.md`: bad utf-8");

        let err = CacheError::NotFound("missing.md".into());
        assert_eq!(err.to_string(), "missing.md page not found");

        let err = CacheError::Scan {
            root: PathBuf::from("/nope"),
            message: "No such file or directory".into(),
        };
        assert!(err.to_string().contains("/nope"));
    }

    #[test]
    fn test_page_local() {
        assert!(
            CacheError::Source {
                path: "a".into(),
                message: "gone".into()
            }
            .is_page_local()
        );
        assert!(!CacheError::NotFound("a".into()).is_page_local());
    }
}
