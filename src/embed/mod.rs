//! Embedded static resources for the preview server.
//!
//! - `template` - typed placeholder injection
//! - `serve` - pages, stylesheet and live reload script
//!
//! ```ignore
//! use embed::serve::{MAIN_JS, MainJsVars};
//! let js = MAIN_JS.render(&MainJsVars { ws_port: 35729 });
//! ```

mod template;

pub use template::{Template, TemplateVars, substitute};

pub mod serve {
    use super::{Template, TemplateVars, substitute};
    use crate::cache::IndexEntry;
    use crate::utils::html::{escape, escape_attr};
    use crate::utils::url::encode_key;

    /// Variables for main.js.
    pub struct MainJsVars {
        pub ws_port: u16,
    }

    impl TemplateVars for MainJsVars {
        fn apply(&self, content: &str) -> String {
            substitute(content, |name| match name {
                "WS_PORT" => Some(self.ws_port.to_string()),
                _ => None,
            })
        }
    }

    /// Live reload client. Reads the page key from `<body data-path>`.
    pub const MAIN_JS: Template<MainJsVars> = Template::new(include_str!("serve/main.js"));

    pub const GITHUB_MARKDOWN_CSS: &str = include_str!("serve/github-markdown.css");

    /// Login form shown at `/` until a session exists.
    pub const BEFORE_AUTH_HTML: &str = include_str!("serve/before_auth.html");

    /// Variables for page.html, the shell around one rendered page.
    pub struct PageVars<'a> {
        pub key: &'a str,
        pub title: &'a str,
        pub revision: u64,
        /// Trusted renderer output, inserted as is.
        pub body: &'a str,
    }

    impl TemplateVars for PageVars<'_> {
        fn apply(&self, content: &str) -> String {
            substitute(content, |name| match name {
                "TITLE" => Some(escape(self.title).into_owned()),
                "KEY" => Some(escape_attr(self.key).into_owned()),
                "REVISION" => Some(self.revision.to_string()),
                "BODY" => Some(self.body.to_string()),
                _ => None,
            })
        }
    }

    pub const PAGE_HTML: Template<PageVars<'static>> =
        Template::new(include_str!("serve/page.html"));

    /// Variables for index.html.
    pub struct IndexVars<'a> {
        pub entries: &'a [IndexEntry],
        pub version: &'a str,
    }

    impl IndexVars<'_> {
        fn list(&self) -> String {
            if self.entries.is_empty() {
                return r#"<p class="empty">No pages found.</p>"#.to_string();
            }
            let mut html = String::from("<ul>\n");
            for entry in self.entries {
                html.push_str(&format!(
                    "  <li><a href=\"/files/{}\">{}</a> <span class=\"path\">{}</span></li>\n",
                    escape_attr(&encode_key(&entry.path)),
                    escape(&entry.title),
                    escape(&entry.path),
                ));
            }
            html.push_str("</ul>");
            html
        }
    }

    impl TemplateVars for IndexVars<'_> {
        fn apply(&self, content: &str) -> String {
            substitute(content, |name| match name {
                "VERSION" => Some(escape(self.version).into_owned()),
                "COUNT" => Some(self.entries.len().to_string()),
                "ENTRIES" => Some(self.list()),
                _ => None,
            })
        }
    }

    pub const INDEX_HTML: Template<IndexVars<'static>> =
        Template::new(include_str!("serve/index.html"));

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_main_js_port() {
            let js = MAIN_JS.render(&MainJsVars { ws_port: 4242 });
            assert!(js.contains("4242"));
            assert!(!js.contains("__WS_PORT__"));
        }

        #[test]
        fn test_page_shell() {
            let html = PAGE_HTML.render(&PageVars {
                key: "docs/a \"b\".md",
                title: "<T>",
                revision: 7,
                body: "<h1>__TITLE__</h1>",
            });
            assert!(html.contains("<h1>__TITLE__</h1>"));
            assert!(html.contains("&lt;T&gt;"));
            assert!(html.contains("data-path=\"docs/a &quot;b&quot;.md\""));
            assert!(html.contains("data-revision=\"7\""));
            assert!(html.contains("/js/main.js"));
        }

        #[test]
        fn test_markers_in_values_stay_literal() {
            let html = PAGE_HTML.render(&PageVars {
                key: "__REVISION__.md",
                title: "__BODY__",
                revision: 3,
                body: "<p>BODYTEXT</p>",
            });
            assert!(html.contains("<title>__BODY__</title>"));
            assert!(html.contains("data-path=\"__REVISION__.md\""));
            assert!(html.contains("data-revision=\"3\""));
            assert_eq!(html.matches("BODYTEXT").count(), 1);
        }

        #[test]
        fn test_index_links() {
            let entries = vec![IndexEntry {
                path: "docs/with space.md".into(),
                title: "A & B".into(),
                revision: 1,
            }];
            let html = INDEX_HTML.render(&IndexVars {
                entries: &entries,
                version: "0.0.0",
            });
            assert!(html.contains("href=\"/files/docs/with%20space.md\""));
            assert!(html.contains("A &amp; B"));
        }

        #[test]
        fn test_empty_index() {
            let html = INDEX_HTML.render(&IndexVars {
                entries: &[],
                version: "0.0.0",
            });
            assert!(html.contains("No pages found."));
        }
    }
}
