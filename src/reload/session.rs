//! One upgraded websocket connection.
//!
//! ```text
//! Connecting --upgrade ok--> Open --first error / close intent--> Closing --> Closed
//!      |                                                                       ^
//!      +------------------------- handshake failed ----------------------------+
//! ```
//!
//! `Closed` is terminal and is where the hub registration is released, once.
//! There is no reconnect here; browsers open a fresh connection.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use thiserror::Error;
use tungstenite::protocol::Message;
use tungstenite::{Error as WsError, WebSocket};

use super::{Disconnected, ReloadMessage, Subscription};
use crate::core::Shutdown;

/// How long one read may block before the outbound queue is checked.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long one write may block on a peer that stopped reading. A timed-out
/// write closes the session with [`CloseReason::WriteFailed`].
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);
/// Protocol-level ping period.
pub const PING_INTERVAL: Duration = Duration::from_secs(20);
/// Reads allowed while waiting for the peer to acknowledge our close frame.
const CLOSE_DRAIN_READS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame.
    ClientClosed,
    ReadFailed,
    WriteFailed,
    /// The hub dropped our mailbox (shutdown or forced deregistration).
    HubClosed,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closing(CloseReason),
    Closed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("not a live reload route: {0}")]
    BadRoute(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Session state plus the registration it owns.
pub struct Lifecycle {
    state: SessionState,
    subscription: Option<Subscription>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: SessionState::Connecting,
            subscription: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    /// `Connecting -> Open`, taking ownership of the registration.
    ///
    /// Refused (and the registration dropped) from any other state.
    pub fn open(&mut self, subscription: Subscription) -> bool {
        if self.state != SessionState::Connecting {
            return false;
        }
        self.state = SessionState::Open;
        self.subscription = Some(subscription);
        true
    }

    /// Enter `Closing`. Only the first reason sticks.
    pub fn begin_closing(&mut self, reason: CloseReason) -> bool {
        match self.state {
            SessionState::Connecting | SessionState::Open => {
                self.state = SessionState::Closing(reason);
                true
            }
            SessionState::Closing(_) | SessionState::Closed => false,
        }
    }

    /// Enter `Closed` and release the registration. Idempotent; returns
    /// `true` only for the call that actually closed.
    pub fn close(&mut self) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.state = SessionState::Closed;
        self.subscription.take();
        true
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.state {
            SessionState::Closing(reason) => Some(reason),
            _ => None,
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Forwarding loop for one connection.
pub struct ClientSession<S: Read + Write> {
    ws: WebSocket<S>,
    lifecycle: Lifecycle,
    last_ping: Instant,
}

impl<S: Read + Write> ClientSession<S> {
    /// Wrap an upgraded socket. `lifecycle` must already be `Open`.
    ///
    /// The underlying stream should have a read timeout of about
    /// [`POLL_INTERVAL`] so reads do not starve the outbound queue, and a
    /// write timeout of [`WRITE_TIMEOUT`].
    pub fn new(ws: WebSocket<S>, lifecycle: Lifecycle) -> Self {
        Self {
            ws,
            lifecycle,
            last_ping: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// Run until the session is closed. Returns why it closed.
    pub fn run(mut self, shutdown: &Shutdown) -> CloseReason {
        if self.send(&ReloadMessage::connected()).is_err() {
            self.lifecycle.begin_closing(CloseReason::WriteFailed);
        }

        while self.lifecycle.state() == SessionState::Open {
            if shutdown.is_triggered() {
                self.lifecycle.begin_closing(CloseReason::Shutdown);
                break;
            }
            self.poll_read();
            if self.lifecycle.state() != SessionState::Open {
                break;
            }
            self.poll_outbound();
            self.maybe_ping();
        }

        let reason = self
            .lifecycle
            .close_reason()
            .unwrap_or(CloseReason::HubClosed);
        self.finish(reason);
        reason
    }

    fn poll_read(&mut self) {
        match self.ws.read() {
            Ok(Message::Close(_)) => {
                self.lifecycle.begin_closing(CloseReason::ClientClosed);
            }
            // Pings are answered by tungstenite; clients send no payloads.
            Ok(_) => {}
            Err(WsError::Io(ref e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                self.lifecycle.begin_closing(CloseReason::ClientClosed);
            }
            Err(e) => {
                crate::debug!("ws"; "read failed: {}", e);
                self.lifecycle.begin_closing(CloseReason::ReadFailed);
            }
        }
    }

    fn poll_outbound(&mut self) {
        let next = match self.lifecycle.subscription() {
            Some(subscription) => subscription.inbox().try_recv(),
            None => Err(Disconnected),
        };
        match next {
            Ok(Some(event)) => {
                if self.send(&ReloadMessage::from_event(&event)).is_err() {
                    self.lifecycle.begin_closing(CloseReason::WriteFailed);
                }
            }
            Ok(None) => {}
            Err(Disconnected) => {
                self.lifecycle.begin_closing(CloseReason::HubClosed);
            }
        }
    }

    fn maybe_ping(&mut self) {
        if self.last_ping.elapsed() < PING_INTERVAL {
            return;
        }
        self.last_ping = Instant::now();
        if let Err(e) = self.ws.send(Message::Ping(Default::default())) {
            crate::debug!("ws"; "ping failed: {}", e);
            self.lifecycle.begin_closing(CloseReason::WriteFailed);
        }
    }

    fn send(&mut self, msg: &ReloadMessage) -> Result<(), WsError> {
        self.ws.send(Message::Text(msg.to_json().into()))
    }

    /// `Closing -> Closed`: best-effort close handshake, then release.
    fn finish(&mut self, reason: CloseReason) {
        let graceful = !matches!(reason, CloseReason::ReadFailed | CloseReason::WriteFailed);
        if graceful && self.ws.close(None).is_ok() {
            for _ in 0..CLOSE_DRAIN_READS {
                match self.ws.read() {
                    Err(WsError::Io(ref e))
                        if matches!(
                            e.kind(),
                            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                        ) => {}
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
        if self.lifecycle.close() {
            crate::debug!("ws"; "session closed: {:?}", reason);
        }
    }
}
