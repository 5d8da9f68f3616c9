//! HTTP responses.
//!
//! Handlers build a [`Reply`]; only [`send`] touches tiny_http, so routing
//! can be tested without a socket.

use anyhow::Result;
use tiny_http::{Header, Method, Request, Response, StatusCode};

use crate::utils::mime::types::{HTML, PLAIN};

/// A response before it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn new(status: u16, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn html(body: String) -> Self {
        Self::new(200, HTML, body)
    }

    pub fn text(status: u16, message: impl Into<String>) -> Self {
        Self::new(status, PLAIN, message.into())
    }

    /// `302 Found` to `location`.
    pub fn redirect(location: &str) -> Self {
        Self::new(302, PLAIN, Vec::new()).with_header("Location", location)
    }

    pub fn not_found(what: &str) -> Self {
        Self::text(404, format!("{what} page not found"))
    }

    pub fn method_not_allowed(allow: &'static str) -> Self {
        Self::text(405, "405 Method Not Allowed").with_header("Allow", allow)
    }

    pub fn unavailable() -> Self {
        Self::text(503, "503 Service Unavailable")
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or_default()
    }
}

/// Write `reply` to the client. HEAD requests get headers only.
pub fn send(request: Request, reply: Reply) -> Result<()> {
    let head = request.method() == &Method::Head;
    let body = if head { Vec::new() } else { reply.body };

    let mut response = Response::from_data(body)
        .with_status_code(StatusCode(reply.status))
        .with_header(make_header("Content-Type", reply.content_type)?);
    for (name, value) in &reply.headers {
        response = response.with_header(make_header(name, value)?);
    }

    request.respond(response)?;
    Ok(())
}

fn make_header(name: &str, value: &str) -> Result<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes())
        .map_err(|()| anyhow::anyhow!("invalid header {name}: {value:?}"))
}
