//! `[auth]` section configuration.
//!
//! ```toml
//! [auth]
//! username = "alice"
//! password = "correct horse battery staple"
//! ```
//!
//! Without this section the server runs in open mode: every visitor is
//! treated as authenticated and pages are scanned at startup.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl AuthConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.username.trim().is_empty() {
            diag.error_with_hint(
                "auth.username",
                "empty username",
                "remove the [auth] section to run without login",
            );
        }
        if self.password.is_empty() {
            diag.error("auth.password", "a username needs a password");
        }
    }
}

// Keep the password out of debug logs.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
