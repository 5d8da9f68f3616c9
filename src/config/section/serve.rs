//! `[serve]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 1124                 # HTTP port number
//! ws_port = 35729             # Live reload websocket port
//! watch = true                # Re-render pages when sources change
//! update_buffer = 256         # Pending page updates before new ones are dropped
//! ```
//!
//! Use `interface = "0.0.0.0"` to make the server accessible from LAN.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 1124;
/// Default live reload port. Taken ports are retried upward.
pub const DEFAULT_WS_PORT: u16 = 35729;
pub const DEFAULT_UPDATE_BUFFER: usize = 256;

/// Preview server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub interface: IpAddr,

    /// HTTP port number.
    pub port: u16,

    /// Live reload websocket port.
    pub ws_port: u16,

    /// Enable file watcher for live reload.
    pub watch: bool,

    /// Capacity of the page update channel.
    pub update_buffer: usize,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: DEFAULT_PORT,
            ws_port: DEFAULT_WS_PORT,
            watch: true,
            update_buffer: DEFAULT_UPDATE_BUFFER,
        }
    }
}

impl ServeConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.port != 0 && self.port == self.ws_port {
            diag.error_with_hint(
                "serve.ws_port",
                format!("live reload port {} is also the HTTP port", self.ws_port),
                "pick a different `ws_port` or pass `--ws-port`",
            );
        }
        if self.update_buffer == 0 {
            diag.error("serve.update_buffer", "must be at least 1");
        }
    }
}
