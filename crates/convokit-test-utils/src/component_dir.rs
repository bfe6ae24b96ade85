//! On-disk component trees for discovery tests.

use std::fs;
use std::path::{Path, PathBuf};

use convokit_core::{ComponentRegistry, ManifestLoader};
use serde_json::json;
use tempfile::TempDir;

/// A temporary directory populated with component manifests.
///
/// The directory is deleted when this value is dropped.
///
/// # Example
///
/// ```ignore
/// let dir = ComponentDir::new();
/// dir.greeting("hello.json", "hello", "Hi!");
/// dir.greeting("sales/quote.json", "quote", "Here you go");
/// let registry = dir.assemble();
/// ```
pub struct ComponentDir {
    temp_dir: TempDir,
}

impl ComponentDir {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write `contents` at `relative`, creating parent directories.
    pub fn file(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create manifest directory");
        }
        fs::write(&path, contents).expect("failed to write manifest");
        path
    }

    /// Create an empty subdirectory.
    pub fn dir(&self, relative: &str) -> PathBuf {
        let path = self.path().join(relative);
        fs::create_dir_all(&path).expect("failed to create directory");
        path
    }

    /// Write a JSON manifest for a component that replies `reply` and
    /// transitions.
    pub fn greeting(&self, relative: &str, name: &str, reply: &str) -> PathBuf {
        let manifest = json!({
            "metadata": {"name": name, "supportedActions": ["done"]},
            "reply": [reply],
            "transition": "done"
        });
        self.file(relative, &manifest.to_string())
    }

    /// Create a symlink at `link` (relative to the root) pointing to `target`.
    /// A relative `target` resolves from the link's own directory.
    #[cfg(unix)]
    pub fn symlink(&self, target: &str, link: &str) -> PathBuf {
        let link_path = self.path().join(link);
        std::os::unix::fs::symlink(target, &link_path).expect("failed to create symlink");
        link_path
    }

    /// Assemble a registry from this directory with the manifest loader.
    pub fn assemble(&self) -> ComponentRegistry {
        ComponentRegistry::assemble(&ManifestLoader::new(), None, self.path(), self.path())
    }
}

impl Default for ComponentDir {
    fn default() -> Self {
        Self::new()
    }
}
