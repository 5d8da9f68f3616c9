//! Live Reload Message Protocol
//!
//! JSON text frames, server to client only. Every message carries the
//! protocol `version` so the browser script can ignore what it does not
//! understand.
//!
//! # Message Types
//!
//! - `connected`: sent once right after the upgrade
//! - `reload`: a page matching the subscription changed

use serde::{Deserialize, Serialize};

use crate::cache::{UpdateEvent, UpdateKind};

/// Protocol version carried by every message.
pub const PROTOCOL_VERSION: u32 = 1;

/// Live reload message sent over WebSocket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadMessage {
    /// Connection established
    Connected { version: u32 },

    /// A matching page changed; the client reloads it.
    Reload {
        version: u32,
        /// Cache key of the changed page (e.g., "docs/guide.md")
        path: String,
        revision: u64,
        /// `updated` or `removed`
        kind: String,
        /// Commit time in milliseconds since the Unix epoch
        ts: u64,
    },
}

impl ReloadMessage {
    pub fn connected() -> Self {
        Self::Connected {
            version: PROTOCOL_VERSION,
        }
    }

    pub fn from_event(event: &UpdateEvent) -> Self {
        let kind = match event.kind {
            UpdateKind::Updated => "updated",
            UpdateKind::Removed => "removed",
        };
        Self::Reload {
            version: PROTOCOL_VERSION,
            path: event.path.clone(),
            revision: event.revision,
            kind: kind.to_string(),
            ts: event.timestamp,
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!(r#"{{"type":"reload","version":{PROTOCOL_VERSION}}}"#))
    }

    /// Parse from JSON string
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_serialization() {
        let json = ReloadMessage::connected().to_json();
        assert_eq!(json, r#"{"type":"connected","version":1}"#);
    }

    #[test]
    fn test_reload_from_event() {
        let mut event = UpdateEvent::new("docs/x.md", 4, UpdateKind::Removed);
        event.timestamp = 1_700_000_000_000;

        let json = ReloadMessage::from_event(&event).to_json();
        assert!(json.contains(r#""type":"reload""#));
        assert!(json.contains(r#""path":"docs/x.md""#));
        assert!(json.contains(r#""revision":4"#));
        assert!(json.contains(r#""kind":"removed""#));

        match ReloadMessage::from_json(&json).unwrap() {
            ReloadMessage::Reload { path, ts, .. } => {
                assert_eq!(path, "docs/x.md");
                assert_eq!(ts, 1_700_000_000_000);
            }
            other => panic!("expected reload, got {other:?}"),
        }
    }
}
