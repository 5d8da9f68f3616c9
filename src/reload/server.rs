//! WebSocket Server for Live Reload
//!
//! Accepts connections on the live reload port and runs one
//! [`ClientSession`] thread per client. The subscription pattern comes from
//! the upgrade request path: `ws://host:port/ws/{pattern}`.

use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use percent_encoding::percent_decode_str;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;

use super::{ClientSession, Lifecycle, PathPattern, SessionError, SubscriptionHub};
use super::session::{POLL_INTERVAL, WRITE_TIMEOUT};
use crate::core::Shutdown;

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;
/// Route prefix for subscriptions.
pub const WS_ROUTE: &str = "/ws/";
/// Budget for the opening handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
/// Sleep between accept attempts on the non-blocking listener.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Bound live reload listener.
pub struct WsServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl WsServer {
    /// Bind `interface:base_port`, trying the next ports if it is taken.
    pub fn bind(interface: IpAddr, base_port: u16) -> Result<Self> {
        let mut last_error = None;

        for offset in 0..MAX_PORT_RETRIES {
            let port = base_port.saturating_add(offset);
            match TcpListener::bind(SocketAddr::new(interface, port)) {
                Ok(listener) => {
                    let addr = listener.local_addr()?;
                    if offset > 0 {
                        crate::log!("ws"; "port {} in use, using {} instead", base_port, addr.port());
                    }
                    return Ok(Self { listener, addr });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(anyhow::anyhow!(
            "Failed to bind WebSocket server after {} attempts: {}",
            MAX_PORT_RETRIES,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Spawn the acceptor thread. It exits once `shutdown` triggers.
    pub fn spawn(self, hub: SubscriptionHub, shutdown: Shutdown) -> Result<JoinHandle<()>> {
        self.listener.set_nonblocking(true)?;
        let handle = thread::Builder::new()
            .name("reload-accept".into())
            .spawn(move || self.accept_loop(&hub, &shutdown))?;
        Ok(handle)
    }

    fn accept_loop(self, hub: &SubscriptionHub, shutdown: &Shutdown) {
        while !shutdown.is_triggered() {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    crate::debug!("ws"; "client connected: {}", addr);
                    let (hub, shutdown) = (hub.clone(), shutdown.clone());
                    let spawned = thread::Builder::new()
                        .name("reload-session".into())
                        .spawn(move || {
                            if let Err(e) = serve_ws(stream, &hub, &shutdown) {
                                crate::debug!("ws"; "{}", e);
                            }
                        });
                    if let Err(e) = spawned {
                        crate::log!("ws"; "failed to spawn session: {}", e);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_BACKOFF);
                }
                Err(e) => {
                    crate::log!("ws"; "accept error: {}", e);
                    thread::sleep(ACCEPT_BACKOFF);
                }
            }
        }
        crate::debug!("ws"; "acceptor stopped");
    }
}

/// Timeouts for an upgraded connection: short reads so the outbound queue
/// is polled, bounded writes so a peer that stops reading is dropped.
pub(super) fn configure_session_stream(stream: &TcpStream) -> std::io::Result<()> {
    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))
}

/// Upgrade `stream`, register it under the pattern from its request path,
/// and forward updates until the session closes.
pub fn serve_ws(
    stream: TcpStream,
    hub: &SubscriptionHub,
    shutdown: &Shutdown,
) -> Result<(), SessionError> {
    let mut lifecycle = Lifecycle::new();

    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    stream.set_write_timeout(Some(HANDSHAKE_TIMEOUT))?;

    let mut requested: Option<String> = None;
    let handshake = tungstenite::accept_hdr(stream, |req: &Request, resp: Response| {
        let path = req.uri().path();
        match path.strip_prefix(WS_ROUTE) {
            Some(rest) => {
                requested = Some(rest.to_string());
                Ok(resp)
            }
            None => {
                let mut err = ErrorResponse::new(Some(format!("no live reload route at {path}")));
                *err.status_mut() = StatusCode::NOT_FOUND;
                Err(err)
            }
        }
    })
    .map_err(|e| e.to_string());

    let ws = match handshake {
        Ok(ws) => ws,
        Err(e) => {
            lifecycle.close();
            return Err(match requested {
                None => SessionError::BadRoute(e),
                Some(_) => SessionError::Handshake(e),
            });
        }
    };
    configure_session_stream(ws.get_ref())?;

    let raw = requested.unwrap_or_default();
    let decoded = percent_decode_str(&raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.clone());
    let pattern = PathPattern::parse(&decoded);

    lifecycle.open(hub.register(pattern));
    let reason = ClientSession::new(ws, lifecycle).run(shutdown);
    crate::debug!("ws"; "session for {} ended: {:?}", decoded, reason);
    Ok(())
}
