//! Preview server with live reload support.
//!
//! ```text
//! tiny_http (port)     --> rayon pool --> App::respond --> PageCache::get
//! WsServer (ws_port)   --> ClientSession per client <-- SubscriptionHub
//! FsWatcher            --> PageCache::rescan_one / evict --> UpdateBus
//! ```
//!
//! The cache, hub and session store are owned here and passed down by
//! reference; nothing is global.

mod app;
mod lifecycle;
mod response;
mod scan;


pub use app::{App, Incoming};
pub use response::Reply;

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use tiny_http::{Method, Request, Server};

use crate::auth::{self, SessionStore};
use crate::cache::{PageCache, SourceTree};
use crate::compiler::MarkdownRenderer;
use crate::config::AppConfig;
use crate::core::Shutdown;
use crate::{debug, log};

/// Request worker threads.
const WORKERS: usize = 4;
/// Largest form body read from `POST /auth`.
const MAX_FORM_BYTES: u64 = 16 * 1024;

/// Run the server until `shutdown` triggers.
pub fn serve(config: &AppConfig, shutdown: &Shutdown) -> Result<()> {
    let (server, addr) = lifecycle::bind_http(config.serve.interface, config.serve.port)?;

    let tree = SourceTree::new(config.root(), &config.source.extensions);
    let cache = Arc::new(PageCache::new(
        tree,
        Arc::new(MarkdownRenderer::default()),
        config.serve.update_buffer,
    ));
    let services = lifecycle::start_services(&cache, &config.serve, shutdown)?;

    {
        let server = Arc::clone(&server);
        let cache = Arc::clone(&cache);
        shutdown.on_trigger(move || {
            server.unblock();
            cache.close();
        });
    }

    let sessions = if config.is_open_mode() {
        SessionStore::open()
    } else {
        SessionStore::new()
    };
    let app = App::new(
        cache,
        auth::from_config(config.auth.as_ref()),
        sessions,
        services.ws_port,
    );

    log!("serve"; "http://{} ({})", addr, config.root().display());
    if config.is_open_mode() {
        scan::rescan_all(&app.cache);
    } else {
        log!("auth"; "sign in at http://{}/ to load pages", addr);
    }

    run_request_loop(&server, Arc::new(app), shutdown)?;

    shutdown.trigger();
    lifecycle::wait_for_shutdown(services);
    Ok(())
}

fn run_request_loop(server: &Server, app: Arc<App>, shutdown: &Shutdown) -> Result<()> {
    // A pool keeps a slow render or sign-in rescan from blocking other requests.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(WORKERS)
        .thread_name(|i| format!("http-{i}"))
        .build()
        .context("failed to create request pool")?;

    for request in server.incoming_requests() {
        let app = Arc::clone(&app);
        let shutdown = shutdown.clone();
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &app, &shutdown) {
                log!("serve"; "request error: {e}");
            }
        });
    }
    Ok(())
}

fn handle_request(mut request: Request, app: &App, shutdown: &Shutdown) -> Result<()> {
    if shutdown.is_triggered() {
        return response::send(request, Reply::unavailable());
    }

    let mut body = Vec::new();
    if *request.method() == Method::Post {
        request
            .as_reader()
            .take(MAX_FORM_BYTES)
            .read_to_end(&mut body)?;
    }

    let method = request.method().clone();
    let target = request.url().to_string();
    let if_none_match = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("If-None-Match"))
        .map(|h| h.value.as_str().to_string());

    let reply = app.respond(Incoming {
        method: &method,
        target: &target,
        if_none_match: if_none_match.as_deref(),
        body: &body,
    });
    debug!("serve"; "{} {} -> {}", method, target, reply.status);
    response::send(request, reply)
}
