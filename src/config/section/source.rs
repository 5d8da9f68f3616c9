//! `[source]` section configuration.
//!
//! ```toml
//! [source]
//! root = "."                              # relative to markview.toml, `~` expanded
//! extensions = ["md", "markdown", "mkd"]  # files that become pages
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Tree to render. Absolute after loading.
    pub root: PathBuf,

    /// Accepted file extensions, without the dot.
    pub extensions: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            extensions: ["md", "markdown", "mkd"].map(String::from).to_vec(),
        }
    }
}

impl SourceConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.extensions.is_empty() {
            diag.error_with_hint(
                "source.extensions",
                "no extensions, nothing would be served",
                "e.g. extensions = [\"md\"]",
            );
        }
        for ext in &self.extensions {
            if ext.is_empty() || ext.starts_with('.') || ext.contains('/') {
                diag.error(
                    "source.extensions",
                    format!("`{ext}` is not a bare extension (write `md`, not `.md`)"),
                );
            }
        }
    }
}
