//! Page rendering.
//!
//! The cache only knows the [`Renderer`] trait: bytes in, HTML out. The
//! markdown implementation lives in [`markdown`].

mod markdown;

pub use markdown::{MarkdownOptions, MarkdownRenderer};

use thiserror::Error;

/// Output of a single successful render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// Rendered HTML fragment (no `<html>` shell).
    pub html: String,
    /// Text of the first heading, if the document has one.
    pub title: Option<String>,
}

/// A single source failed to render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RenderError(pub String);

/// Pure `bytes -> html` conversion.
///
/// Implementations may block (I/O, network) and are always called without
/// any cache-wide lock held.
pub trait Renderer: Send + Sync {
    fn render(&self, source: &[u8]) -> Result<RenderedPage, RenderError>;
}
