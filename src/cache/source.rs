//! Source tree access: key validation, file discovery, reads.
//!
//! A cache key is the file's path relative to the source root, with `/`
//! separators and the extension kept (`docs/guide.md`).

use std::fs;
use std::path::{Component, Path, PathBuf};

use jwalk::WalkDir;

use super::CacheError;

/// The directory tree pages are rendered from.
#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
    extensions: Vec<String>,
}

impl SourceTree {
    pub fn new(root: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            root: root.into(),
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` has one of the renderable extensions.
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            })
    }

    /// Cache key for an absolute path inside the tree.
    ///
    /// `None` for paths outside the root or with a foreign extension.
    pub fn key_for(&self, path: &Path) -> Option<String> {
        if !self.accepts(path) {
            return None;
        }
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?),
                _ => return None,
            }
        }
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    /// Absolute source path for a key.
    pub fn resolve(&self, key: &str) -> Result<PathBuf, CacheError> {
        let key = normalize_key(key).ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        Ok(self.root.join(key))
    }

    /// Read the source bytes for a key.
    ///
    /// Symlinks resolving outside the root are refused.
    pub fn read(&self, key: &str) -> Result<Vec<u8>, CacheError> {
        let path = self.resolve(key)?;
        let source_err = |e: std::io::Error| CacheError::Source {
            path: key.to_string(),
            message: e.to_string(),
        };

        let canonical = path.canonicalize().map_err(source_err)?;
        let root = self.root.canonicalize().map_err(source_err)?;
        if !canonical.starts_with(&root) {
            return Err(CacheError::NotFound(key.to_string()));
        }

        fs::read(&canonical).map_err(source_err)
    }

    /// Every renderable file under the root, as sorted keys.
    ///
    /// Fails only if the root itself cannot be listed. Unreadable
    /// subdirectories are skipped.
    pub fn walk(&self) -> Result<Vec<String>, CacheError> {
        fs::read_dir(&self.root).map_err(|e| CacheError::Scan {
            root: self.root.clone(),
            message: e.to_string(),
        })?;

        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root).skip_hidden(true).sort(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    crate::debug!("cache"; "skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(key) = self.key_for(&entry.path()) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Canonical key form: no leading slash, no empty, `.` or `..` segments.
///
/// Keys are case-sensitive and separators are taken literally.
pub fn normalize_key(key: &str) -> Option<String> {
    let mut parts = Vec::new();
    for part in key.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            part if part.contains('\\') => return None,
            part => parts.push(part),
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_tree() -> (TempDir, SourceTree) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("docs/deep")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("README.md"), "# Readme").unwrap();
        fs::write(root.join("docs/guide.markdown"), "# Guide").unwrap();
        fs::write(root.join("docs/deep/x.MD"), "# X").unwrap();
        fs::write(root.join("docs/notes.txt"), "plain").unwrap();
        fs::write(root.join(".git/HEAD.md"), "hidden").unwrap();

        let exts = ["md".to_string(), "markdown".to_string()];
        (temp, SourceTree::new(root, &exts))
    }

    #[test]
    fn test_walk_finds_renderable_files() {
        let (_temp, tree) = make_tree();
        let keys = tree.walk().unwrap();
        assert_eq!(keys, vec!["README.md", "docs/deep/x.MD", "docs/guide.markdown"]);
    }

    #[test]
    fn test_walk_missing_root_is_scan_error() {
        let tree = SourceTree::new("/definitely/not/here", &["md".to_string()]);
        assert!(matches!(tree.walk(), Err(CacheError::Scan { .. })));
    }

    #[test]
    fn test_key_for_roundtrips_with_resolve() {
        let (_temp, tree) = make_tree();
        let abs = tree.root().join("docs/guide.markdown");
        let key = tree.key_for(&abs).unwrap();
        assert_eq!(key, "docs/guide.markdown");
        assert_eq!(tree.resolve(&key).unwrap(), abs);
    }

    #[test]
    fn test_key_for_rejects_foreign_paths() {
        let (_temp, tree) = make_tree();
        assert!(tree.key_for(&tree.root().join("docs/notes.txt")).is_none());
        assert!(tree.key_for(Path::new("/elsewhere/a.md")).is_none());
    }

    #[test]
    fn test_read_rejects_traversal() {
        let (_temp, tree) = make_tree();
        assert!(matches!(
            tree.read("../etc/passwd.md"),
            Err(CacheError::NotFound(_))
        ));
        assert!(matches!(tree.read("nope.md"), Err(CacheError::Source { .. })));
        assert_eq!(tree.read("/README.md").unwrap(), b"# Readme");
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("/docs//a.md").as_deref(), Some("docs/a.md"));
        assert_eq!(normalize_key("./a.md").as_deref(), Some("a.md"));
        assert_eq!(normalize_key("Docs/A.md").as_deref(), Some("Docs/A.md"));
        assert!(normalize_key("a/../b.md").is_none());
        assert!(normalize_key("a\\b.md").is_none());
        assert!(normalize_key("/").is_none());
    }
}
