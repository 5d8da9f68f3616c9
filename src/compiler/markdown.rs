//! Markdown to HTML conversion using pulldown-cmark.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd, html};

use super::{RenderError, RenderedPage, Renderer};

/// Options for markdown conversion
#[derive(Debug, Clone, Default)]
pub struct MarkdownOptions {
    /// Enable tables extension
    pub tables: bool,
    /// Enable footnotes extension
    pub footnotes: bool,
    /// Enable strikethrough extension
    pub strikethrough: bool,
    /// Enable task lists extension
    pub task_lists: bool,
}

impl MarkdownOptions {
    /// GitHub flavored markdown: every extension GitHub renders.
    pub fn gfm() -> Self {
        Self {
            tables: true,
            footnotes: true,
            strikethrough: true,
            task_lists: true,
        }
    }

    fn to_pulldown_options(&self) -> Options {
        let mut opts = Options::empty();
        if self.tables {
            opts.insert(Options::ENABLE_TABLES);
        }
        if self.footnotes {
            opts.insert(Options::ENABLE_FOOTNOTES);
        }
        if self.strikethrough {
            opts.insert(Options::ENABLE_STRIKETHROUGH);
        }
        if self.task_lists {
            opts.insert(Options::ENABLE_TASKLISTS);
        }
        opts
    }
}

/// Renders markdown sources to HTML fragments.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    options: MarkdownOptions,
}

impl MarkdownRenderer {
    pub fn new(options: MarkdownOptions) -> Self {
        Self { options }
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(MarkdownOptions::gfm())
    }
}

impl Renderer for MarkdownRenderer {
    fn render(&self, source: &[u8]) -> Result<RenderedPage, RenderError> {
        let text = std::str::from_utf8(source)
            .map_err(|e| RenderError(format!("source is not valid UTF-8: {e}")))?;

        let events: Vec<Event<'_>> =
            Parser::new_ext(text, self.options.to_pulldown_options()).collect();
        let title = first_heading(&events);

        let mut out = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut out, events.into_iter());

        Ok(RenderedPage { html: out, title })
    }
}

/// Plain text of the first heading, any level.
fn first_heading(events: &[Event<'_>]) -> Option<String> {
    let mut title: Option<String> = None;

    for event in events {
        match event {
            Event::Start(Tag::Heading { .. }) => title = Some(String::new()),
            Event::End(TagEnd::Heading(_)) => {
                if let Some(text) = title.take() {
                    let text = text.trim();
                    if !text.is_empty() {
                        return Some(text.to_string());
                    }
                }
            }
            Event::Text(t) | Event::Code(t) => {
                if let Some(buf) = title.as_mut() {
                    buf.push_str(t);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(src: &str) -> RenderedPage {
        MarkdownRenderer::default().render(src.as_bytes()).unwrap()
    }

    #[test]
    fn test_heading_renders_h1() {
        let page = render("# Title");
        assert!(page.html.contains("<h1>Title</h1>"));
        assert_eq!(page.title.as_deref(), Some("Title"));
    }

    #[test]
    fn test_title_uses_first_heading_only() {
        let page = render("intro\n\n## `code` Second\n\n# Third");
        assert_eq!(page.title.as_deref(), Some("code Second"));
    }

    #[test]
    fn test_no_heading_no_title() {
        let page = render("just a paragraph");
        assert!(page.title.is_none());
        assert!(page.html.contains("<p>just a paragraph</p>"));
    }

    #[test]
    fn test_gfm_extensions() {
        let page = render("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n\n- [x] done");
        assert!(page.html.contains("<table>"));
        assert!(page.html.contains("<del>gone</del>"));
        assert!(page.html.contains("checkbox"));
    }

    #[test]
    fn test_invalid_utf8_is_render_error() {
        let err = MarkdownRenderer::default()
            .render(&[0xff, 0xfe, 0x00])
            .unwrap_err();
        assert!(err.0.contains("UTF-8"));
    }
}
