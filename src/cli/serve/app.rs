//! Routing for the preview server.
//!
//! | Route                      | Method | Behavior                                   |
//! |----------------------------|--------|--------------------------------------------|
//! | `/`                        | GET    | index when signed in, login form otherwise |
//! | `/auth`                    | POST   | sign in, rescan everything, redirect to `/`|
//! | `/files/{path}`            | GET    | cached page wrapped in the live shell      |
//! | `/css/github-markdown.css` | GET    | embedded stylesheet                        |
//! | `/js/main.js`              | GET    | live reload client                         |
//!
//! `HEAD` is accepted wherever `GET` is. Websockets are served on the live
//! reload port, not here.

use std::sync::Arc;

use tiny_http::Method;
use url::form_urlencoded;

use super::response::Reply;
use crate::auth::{AuthError, Authenticator, Credentials, SessionStore};
use crate::cache::{PageCache, normalize_key};
use crate::embed::serve::{
    BEFORE_AUTH_HTML, GITHUB_MARKDOWN_CSS, INDEX_HTML, IndexVars, MAIN_JS, MainJsVars, PAGE_HTML,
    PageVars,
};
use crate::reload::WS_ROUTE;
use crate::utils::mime::types::{CSS, JAVASCRIPT};
use crate::utils::url::{decode_path, split_target};

const FILES_ROUTE: &str = "/files/";
const CSS_ROUTE: &str = "/css/github-markdown.css";
const JS_ROUTE: &str = "/js/main.js";

/// The parts of a request the handlers look at.
#[derive(Debug, Clone, Copy)]
pub struct Incoming<'a> {
    pub method: &'a Method,
    /// Raw request target, still percent-encoded.
    pub target: &'a str,
    pub if_none_match: Option<&'a str>,
    pub body: &'a [u8],
}

/// Shared server state. One per process, shared across request workers.
pub struct App {
    pub cache: Arc<PageCache>,
    authenticator: Arc<dyn Authenticator>,
    sessions: SessionStore,
    /// Port the browser script connects to; `None` without live reload.
    ws_port: Option<u16>,
}

impl App {
    pub fn new(
        cache: Arc<PageCache>,
        authenticator: Arc<dyn Authenticator>,
        sessions: SessionStore,
        ws_port: Option<u16>,
    ) -> Self {
        Self {
            cache,
            authenticator,
            sessions,
            ws_port,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn respond(&self, req: Incoming<'_>) -> Reply {
        let (path, _query) = split_target(req.target);
        let readable = matches!(req.method, Method::Get | Method::Head);

        if path == "/" {
            return if readable {
                self.index()
            } else {
                Reply::method_not_allowed("GET, HEAD")
            };
        }
        if path == "/auth" {
            return if *req.method == Method::Post {
                self.authenticate(req.body)
            } else {
                Reply::method_not_allowed("POST")
            };
        }

        let known = path == CSS_ROUTE
            || path == JS_ROUTE
            || path.starts_with(FILES_ROUTE)
            || path.starts_with(WS_ROUTE);
        if !known {
            return Reply::not_found(&decode_path(path.trim_start_matches('/')));
        }
        if !readable {
            return Reply::method_not_allowed("GET, HEAD");
        }

        match path {
            CSS_ROUTE => Reply::new(200, CSS, GITHUB_MARKDOWN_CSS),
            JS_ROUTE => self.main_js(),
            _ => match path.strip_prefix(FILES_ROUTE) {
                Some(key) => self.file(&decode_path(key), req.if_none_match),
                None => self.ws_elsewhere(),
            },
        }
    }

    fn index(&self) -> Reply {
        if !self.sessions.is_authenticated() {
            return Reply::html(BEFORE_AUTH_HTML.to_string());
        }
        let entries = self.cache.index();
        Reply::html(INDEX_HTML.render(&IndexVars {
            entries: &entries,
            version: env!("CARGO_PKG_VERSION"),
        }))
    }

    fn authenticate(&self, body: &[u8]) -> Reply {
        let mut creds = Credentials::default();
        for (name, value) in form_urlencoded::parse(body) {
            match name.as_ref() {
                "username" => creds.username = value.into_owned(),
                "password" => creds.password = value.into_owned(),
                _ => {}
            }
        }

        match self.sessions.login(self.authenticator.as_ref(), &creds) {
            Ok(session) => {
                crate::log!("auth"; "signed in as {}", session.user);
                super::scan::rescan_all(&self.cache);
                Reply::redirect("/")
            }
            Err(AuthError::InvalidCredentials) => {
                crate::log!("auth"; "rejected sign-in for {:?}", creds.username);
                Reply::text(401, AuthError::InvalidCredentials.to_string())
            }
            Err(e @ AuthError::Unavailable(_)) => {
                crate::log!("error"; "{}", e);
                Reply::text(503, e.to_string())
            }
        }
    }

    fn file(&self, raw_key: &str, if_none_match: Option<&str>) -> Reply {
        let Some(page) = normalize_key(raw_key).and_then(|key| self.cache.get(&key)) else {
            return Reply::not_found(raw_key);
        };

        let etag = format!("\"{}-{}\"", page.etag(), page.revision);
        if if_none_match.is_some_and(|tags| tags.split(',').any(|t| t.trim() == etag)) {
            return Reply::new(304, crate::utils::mime::types::HTML, Vec::new())
                .with_header("ETag", etag);
        }

        let html = PAGE_HTML.render(&PageVars {
            key: &page.path,
            title: page.display_title(),
            revision: page.revision,
            body: &page.html,
        });
        Reply::html(html)
            .with_header("ETag", etag)
            .with_header("Cache-Control", "no-cache")
    }

    fn main_js(&self) -> Reply {
        match self.ws_port {
            Some(ws_port) => Reply::new(200, JAVASCRIPT, MAIN_JS.render(&MainJsVars { ws_port })),
            // Without a live reload listener the script has nothing to connect to.
            None => Reply::new(200, JAVASCRIPT, "/* live reload disabled */"),
        }
    }

    fn ws_elsewhere(&self) -> Reply {
        match self.ws_port {
            Some(port) => Reply::text(
                426,
                format!("live reload is served on port {port}: ws://<host>:{port}{WS_ROUTE}<path>"),
            )
            .with_header("Upgrade", "websocket"),
            None => Reply::text(404, "live reload is disabled"),
        }
    }
}
