//! Server lifecycle management.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tiny_http::Server;

use crate::cache::PageCache;
use crate::config::ServeConfig;
use crate::core::Shutdown;
use crate::reload::{SubscriptionHub, WsServer};
use crate::watch::FsWatcher;
use crate::{debug, log};

/// How long shutdown waits for background threads before giving up.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Bind the HTTP listener. Failing here is fatal for the process.
pub fn bind_http(interface: IpAddr, port: u16) -> Result<(Arc<Server>, SocketAddr)> {
    let addr = SocketAddr::new(interface, port);
    let server = Server::http(addr)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("failed to bind http://{addr}"))?;
    // Port 0 binds an ephemeral port; report the real one.
    let addr = server.server_addr().to_ip().unwrap_or(addr);
    Ok((Arc::new(server), addr))
}

/// Background threads that live as long as the server.
#[derive(Default)]
pub struct Services {
    handles: Vec<(&'static str, JoinHandle<()>)>,
    /// Bound live reload port, if the listener came up.
    pub ws_port: Option<u16>,
}

/// Start the hub dispatch loop, the live reload listener and (optionally)
/// the filesystem watcher.
///
/// Only the dispatch loop is required. A live reload listener or watcher
/// that fails to start is logged and the server runs without it.
pub fn start_services(
    cache: &Arc<PageCache>,
    config: &ServeConfig,
    shutdown: &Shutdown,
) -> Result<Services> {
    let mut services = Services::default();

    let hub = SubscriptionHub::new();
    let source = cache
        .updates()
        .context("update stream already taken")?;
    services
        .handles
        .push(("dispatch", hub.spawn_dispatch(source)?));

    match WsServer::bind(config.interface, config.ws_port) {
        Ok(ws) => {
            let port = ws.addr().port();
            let handle = ws.spawn(hub, shutdown.clone())?;
            debug!("ws"; "ws://{}:{}/ws/", config.interface, port);
            services.ws_port = Some(port);
            services.handles.push(("ws", handle));
        }
        Err(e) => log!("ws"; "live reload disabled: {:#}", e),
    }

    if config.watch {
        match FsWatcher::new(Arc::clone(cache)) {
            Ok(watcher) => services
                .handles
                .push(("watch", watcher.spawn(shutdown.clone())?)),
            Err(e) => log!("watch"; "failed to watch {}: {}", cache.tree().root().display(), e),
        }
    }

    Ok(services)
}

/// Wait for background threads to finish, up to [`SHUTDOWN_GRACE`] overall.
pub fn wait_for_shutdown(services: Services) {
    let deadline = Instant::now() + SHUTDOWN_GRACE;

    for (name, handle) in services.handles {
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            debug!("serve"; "{} thread still running at exit", name);
        }
    }
}
