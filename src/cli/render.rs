//! `markview render`: run one file through the renderer.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::compiler::{MarkdownRenderer, Renderer};
use crate::embed::serve::{PAGE_HTML, PageVars};

/// Render `file` and write the result to stdout.
///
/// With `body_only` the bare fragment is written, otherwise the same shell
/// `/files/*` serves (revision 0, since nothing was cached).
pub fn render_file(file: &Path, body_only: bool) -> Result<()> {
    let output = render_to_string(file, body_only)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

fn render_to_string(file: &Path, body_only: bool) -> Result<String> {
    let source = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let page = MarkdownRenderer::default()
        .render(&source)
        .with_context(|| format!("failed to render {}", file.display()))?;
    crate::debug!("render"; "{} -> {} bytes", file.display(), page.html.len());

    if body_only {
        return Ok(page.html);
    }

    let key = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(PAGE_HTML.render(&PageVars {
        key: &key,
        title: page.title.as_deref().unwrap_or(&key),
        revision: 0,
        body: &page.html,
    }))
}
