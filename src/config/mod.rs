//! Configuration management for `markview.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # [source], [serve], [auth]
//! ├── types/         # ConfigError, ConfigDiagnostics
//! ├── util.rs        # config discovery, path resolution
//! └── mod.rs         # AppConfig (this file)
//! ```
//!
//! Precedence is defaults, then the file, then CLI flags. A missing file is
//! not an error. Paths in the file resolve against the file's directory,
//! paths on the command line against the working directory.

pub mod section;
pub mod types;
mod util;

pub use section::{AuthConfig, ServeConfig, SourceConfig};
pub use types::{ConfigDiagnostic, ConfigDiagnostics, ConfigError};

use crate::cli::{Cli, Commands};
use crate::debug;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::IpAddr,
    path::{Path, PathBuf},
};
use util::{find_config_file, resolve_path};

/// Root configuration structure representing markview.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Absolute path to the config file, whether or not it exists
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub serve: ServeConfig,

    /// `None` runs the server in open mode.
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

/// `serve` flags that override file values.
#[derive(Debug, Clone, Default)]
pub struct ServeOverrides {
    pub root: Option<PathBuf>,
    pub interface: Option<IpAddr>,
    pub port: Option<u16>,
    pub ws_port: Option<u16>,
    pub watch: Option<bool>,
}

impl ServeOverrides {
    fn from_cli(cli: &Cli) -> Self {
        match &cli.command {
            Commands::Serve {
                root,
                interface,
                port,
                ws_port,
                watch,
            } => Self {
                root: root.clone(),
                interface: *interface,
                port: *port,
                ws_port: *ws_port,
                watch: *watch,
            },
            Commands::Render { .. } => Self::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration for this invocation.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;
        Self::load_from(&cwd, &cli.config, &ServeOverrides::from_cli(cli))
    }

    /// Load with an explicit working directory.
    pub fn load_from(cwd: &Path, config_name: &Path, overrides: &ServeOverrides) -> Result<Self> {
        let (mut config, config_path) = match find_config_file(cwd, config_name) {
            Some(path) => (Self::from_path(&path)?, path),
            None => {
                debug!("config"; "{} not found, using defaults", config_name.display());
                (Self::default(), cwd.join(config_name))
            }
        };

        config.config_path = config_path;
        let base = config
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());
        config.source.root = resolve_path(&config.source.root, &base);
        config.apply_overrides(cwd, overrides);
        config.normalize();
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let config = Self::from_str(&content)
            .with_context(|| format!("in {}", path.display()))?;
        debug!("config"; "loaded {}", path.display());
        Ok(config)
    }

    fn apply_overrides(&mut self, cwd: &Path, overrides: &ServeOverrides) {
        if let Some(root) = &overrides.root {
            self.source.root = resolve_path(root, cwd);
        }
        Self::update_option(&mut self.serve.interface, overrides.interface.as_ref());
        Self::update_option(&mut self.serve.port, overrides.port.as_ref());
        Self::update_option(&mut self.serve.ws_port, overrides.ws_port.as_ref());
        Self::update_option(&mut self.serve.watch, overrides.watch.as_ref());
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    fn normalize(&mut self) {
        // Prefer the canonical root so watcher paths and keys agree.
        if let Ok(canonical) = self.source.root.canonicalize() {
            self.source.root = canonical;
        }
        for ext in &mut self.source.extensions {
            *ext = ext.to_ascii_lowercase();
        }
    }

    /// Validate every section, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();
        self.source.validate(&mut diag);
        self.serve.validate(&mut diag);
        if let Some(auth) = &self.auth {
            auth.validate(&mut diag);
        }
        diag.into_result()
    }

    /// Source root (absolute after loading).
    pub fn root(&self) -> &Path {
        &self.source.root
    }

    pub const fn is_open_mode(&self) -> bool {
        self.auth.is_none()
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse a config body; panics on invalid TOML.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> AppConfig {
    AppConfig::from_str(content).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace(config: Option<&str>) -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("notes")).unwrap();
        if let Some(body) = config {
            fs::write(root.join("markview.toml"), body).unwrap();
        }
        (temp, root)
    }

    #[test]
    fn test_from_str_invalid_toml() {
        assert!(matches!(
            AppConfig::from_str("[serve\nport = 1"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let (_temp, root) = workspace(None);
        let config = AppConfig::load_from(
            &root,
            Path::new("markview.toml"),
            &ServeOverrides::default(),
        )
        .unwrap();

        assert_eq!(config.root(), root);
        assert_eq!(config.serve.port, 1124);
        assert!(config.is_open_mode());
        assert_eq!(config.config_path, root.join("markview.toml"));
    }

    #[test]
    fn test_root_relative_to_config_file() {
        let (_temp, root) = workspace(Some("[source]\nroot = \"notes\""));
        let nested = root.join("notes");

        let config =
            AppConfig::load_from(&nested, Path::new("markview.toml"), &ServeOverrides::default())
                .unwrap();
        assert_eq!(config.root(), root.join("notes"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let (_temp, root) = workspace(Some("[serve]\nport = 3000\nwatch = true"));
        let overrides = ServeOverrides {
            root: Some(PathBuf::from("notes")),
            port: Some(4000),
            watch: Some(false),
            ..Default::default()
        };

        let config = AppConfig::load_from(&root, Path::new("markview.toml"), &overrides).unwrap();
        assert_eq!(config.serve.port, 4000);
        assert!(!config.serve.watch);
        assert_eq!(config.root(), root.join("notes"));
    }

    #[test]
    fn test_invalid_config_reports_all_errors() {
        let (_temp, root) = workspace(Some(
            "[source]\nextensions = []\n[serve]\nport = 5000\nws_port = 5000\n[auth]\nusername = \"a\"",
        ));
        let err = AppConfig::load_from(&root, Path::new("markview.toml"), &ServeOverrides::default())
            .unwrap_err();

        match err.downcast_ref::<ConfigError>() {
            Some(ConfigError::Diagnostics(diag)) => assert_eq!(diag.errors().len(), 3),
            other => panic!("expected diagnostics, got {other:?}"),
        }
    }

    #[test]
    fn test_extensions_lowercased() {
        let (_temp, root) = workspace(Some("[source]\nextensions = [\"MD\"]"));
        let config =
            AppConfig::load_from(&root, Path::new("markview.toml"), &ServeOverrides::default())
                .unwrap();
        assert_eq!(config.source.extensions, ["md"]);
    }
}
