//! Hierarchical component registry.
//!
//! A [`ComponentRegistry`] holds uniquely named units plus named
//! sub-registries ("collections"). It is built once at startup, from a
//! directory scan ([`ComponentRegistry::assemble`]), an explicit source list
//! ([`ComponentRegistry::create`]), or by hand, and is read-only afterwards.
//!
//! Discovery never fails as a whole: unreadable entries, parse failures,
//! symlink cycles and duplicate names are logged and skipped.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::component::{Component, ComponentMetadata};
use crate::loader::{ComponentLoader, ComponentModule, ComponentSource};

#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    components: Vec<Component>,
    index: HashMap<String, usize>,
    collections: BTreeMap<String, Arc<ComponentRegistry>>,
    valid: bool,
}

impl ComponentRegistry {
    /// Create an empty, valid registry.
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            index: HashMap::new(),
            collections: BTreeMap::new(),
            valid: true,
        }
    }

    fn invalid() -> Self {
        Self {
            valid: false,
            ..Self::new()
        }
    }

    /// Build a registry from the files under `base_dir`.
    ///
    /// Each immediate subdirectory becomes a collection, but only at the top
    /// level (`parent` is `None`); collections do not nest further. A
    /// missing or unreadable directory yields an invalid, empty registry.
    pub fn assemble(
        loader: &dyn ComponentLoader,
        parent: Option<&ComponentRegistry>,
        base_dir: &Path,
        cwd: &Path,
    ) -> Self {
        let dir = resolve(base_dir, cwd);
        let entries = match read_entries(&dir) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(path = %dir.display(), %error, "Component directory is not readable");
                return Self::invalid();
            }
        };

        let mut registry = Self::new();
        let mut subdirs = Vec::new();
        for entry in entries {
            match entry {
                Entry::File(path) => registry.load_file(loader, &path),
                Entry::Dir(name, path) if parent.is_none() => subdirs.push((name, path)),
                Entry::Dir(_, path) => {
                    debug!(path = %path.display(), "Ignoring nested directory in collection");
                }
            }
        }

        for (name, path) in subdirs {
            let collection = Self::assemble(loader, Some(&registry), &path, cwd);
            registry.add_collection(&name, collection);
        }

        info!(
            path = %dir.display(),
            components = registry.components.len(),
            collections = registry.collections.len(),
            "Assembled component registry"
        );
        registry
    }

    /// Build a flat registry from an explicit list of sources.
    ///
    /// Paths are resolved against `cwd`; a directory contributes its files
    /// (not its subdirectories). Entries that do not qualify are skipped.
    pub fn create(
        loader: &dyn ComponentLoader,
        sources: impl IntoIterator<Item = ComponentSource>,
        cwd: &Path,
    ) -> Self {
        let mut registry = Self::new();
        for source in sources {
            registry.add_source(loader, source, cwd);
        }
        registry
    }

    fn add_source(&mut self, loader: &dyn ComponentLoader, source: ComponentSource, cwd: &Path) {
        match source {
            ComponentSource::Path(path) => {
                let path = resolve(&path, cwd);
                if path.is_dir() {
                    match read_entries(&path) {
                        Ok(entries) => {
                            for entry in entries {
                                if let Entry::File(file) = entry {
                                    self.load_file(loader, &file);
                                }
                            }
                        }
                        Err(error) => {
                            warn!(path = %path.display(), %error, "Skipping unreadable directory");
                        }
                    }
                } else {
                    self.load_file(loader, &path);
                }
            }
            ComponentSource::Module(module) => self.add_module(module, "<module>"),
            source => match source.qualify() {
                Ok(component) => {
                    self.add(component);
                }
                Err(error) => warn!(%error, "Skipping component source"),
            },
        }
    }

    fn load_file(&mut self, loader: &dyn ComponentLoader, path: &Path) {
        if !loader.accepts(path) {
            debug!(path = %path.display(), "Loader does not accept file");
            return;
        }
        match loader.load(path) {
            Ok(module) => self.add_module(module, &path.display().to_string()),
            Err(error) => warn!(path = %path.display(), %error, "Failed to load component"),
        }
    }

    fn add_module(&mut self, module: ComponentModule, origin: &str) {
        for (export, source) in module.into_exports() {
            match source {
                ComponentSource::Path(_) | ComponentSource::Module(_) => {
                    warn!(%origin, %export, "Nested modules are not supported, skipping export");
                }
                source => match source.qualify() {
                    Ok(component) => {
                        self.add(component);
                    }
                    Err(error) => warn!(%origin, %export, %error, "Skipping export"),
                },
            }
        }
    }

    /// Register a unit. A duplicate name is rejected and the first
    /// registration kept; returns whether the unit was added.
    pub fn add(&mut self, component: Component) -> bool {
        let name = component.name().to_string();
        if self.index.contains_key(&name) {
            warn!(component = %name, "Duplicate component name, keeping the first registration");
            return false;
        }
        debug!(component = %name, "Registered component");
        self.index.insert(name, self.components.len());
        self.components.push(component);
        true
    }

    /// Qualify and register one source. Returns whether a unit was added.
    pub fn register(&mut self, source: impl Into<ComponentSource>) -> bool {
        match source.into().qualify() {
            Ok(component) => self.add(component),
            Err(error) => {
                warn!(%error, "Rejected component source");
                false
            }
        }
    }

    /// Attach a named sub-registry. A duplicate collection name is rejected
    /// and the existing collection kept.
    pub fn add_collection(&mut self, name: &str, collection: ComponentRegistry) -> bool {
        if self.collections.contains_key(name) {
            warn!(collection = %name, "Duplicate collection name, keeping the first");
            return false;
        }
        self.collections.insert(name.to_string(), Arc::new(collection));
        true
    }

    /// Mutable access to a collection, for building nested trees by hand.
    /// A collection still shared with a shell is copied first.
    pub fn collection_mut(&mut self, name: &str) -> Option<&mut ComponentRegistry> {
        self.collections.get_mut(name).map(Arc::make_mut)
    }

    /// Shared handle to a direct collection.
    pub fn collection(&self, name: &str) -> Option<&Arc<ComponentRegistry>> {
        self.collections.get(name)
    }

    pub fn get_component(&self, name: &str) -> Option<&Component> {
        self.index.get(name).map(|&i| &self.components[i])
    }

    pub fn is_component(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Direct units, in registration order.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// This registry for `None`, a direct collection for `Some(name)`.
    pub fn get_registry(&self, collection: Option<&str>) -> Option<&ComponentRegistry> {
        match collection {
            None => Some(self),
            Some(name) => self.collections.get(name).map(Arc::as_ref),
        }
    }

    pub fn is_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Metadata of the direct units of this registry or of a collection.
    /// Unknown collections yield an empty list.
    pub fn get_metadata(&self, collection: Option<&str>) -> Vec<ComponentMetadata> {
        self.get_registry(collection)
            .map(|registry| {
                registry
                    .components
                    .iter()
                    .map(|c| c.metadata().clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn collection_names(&self) -> Vec<&str> {
        self.collections.keys().map(String::as_str).collect()
    }

    /// Whether the registry was built from a readable directory.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Add `other`'s units without overwriting existing names.
    ///
    /// When `recursive`, `other`'s collections are merged into same-named
    /// collections (created when missing), and `other`'s top-level units are
    /// also merged into every collection of `self`.
    pub fn merge(&mut self, other: &ComponentRegistry, recursive: bool) -> &mut Self {
        self.merge_units(other);
        if recursive {
            for (name, theirs) in &other.collections {
                let ours = self
                    .collections
                    .entry(name.clone())
                    .or_insert_with(|| Arc::new(ComponentRegistry::new()));
                Arc::make_mut(ours).merge(theirs, true);
            }
            for collection in self.collections.values_mut() {
                Arc::make_mut(collection).merge_units(other);
            }
        }
        self
    }

    fn merge_units(&mut self, other: &ComponentRegistry) {
        for component in &other.components {
            if !self.is_component(component.name()) {
                self.index
                    .insert(component.name().to_string(), self.components.len());
                self.components.push(component.clone());
            }
        }
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

enum Entry {
    File(PathBuf),
    Dir(String, PathBuf),
}

/// Immediate entries of `dir`, sorted by name, dotfiles excluded.
///
/// Symlinks are followed one hop: a link to a link, a dangling link, or a
/// link to the directory itself or one of its ancestors is skipped.
fn read_entries(dir: &Path) -> std::io::Result<Vec<Entry>> {
    let canonical_dir = dir.canonicalize()?;
    let mut names: Vec<(String, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                warn!(path = %dir.display(), %error, "Skipping unreadable directory entry");
                None
            }
        })
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            (!name.starts_with('.')).then(|| (name, entry.path()))
        })
        .collect();
    names.sort();

    let mut entries = Vec::with_capacity(names.len());
    for (name, path) in names {
        let link = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(error) => {
                warn!(path = %path.display(), %error, "Skipping unreadable entry");
                continue;
            }
        };

        if link.file_type().is_symlink() && !symlink_target_ok(&path, &canonical_dir) {
            continue;
        }

        match fs::metadata(&path) {
            Ok(meta) if meta.is_dir() => entries.push(Entry::Dir(name, path)),
            Ok(meta) if meta.is_file() => entries.push(Entry::File(path)),
            Ok(_) => debug!(path = %path.display(), "Skipping special file"),
            Err(error) => warn!(path = %path.display(), %error, "Skipping unreadable entry"),
        }
    }
    Ok(entries)
}

fn symlink_target_ok(link: &Path, canonical_dir: &Path) -> bool {
    let target = match fs::read_link(link) {
        Ok(target) => target,
        Err(error) => {
            warn!(path = %link.display(), %error, "Skipping unreadable symlink");
            return false;
        }
    };
    let target = match link.parent() {
        Some(parent) if target.is_relative() => parent.join(target),
        _ => target,
    };
    match fs::symlink_metadata(&target) {
        Ok(meta) if meta.file_type().is_symlink() => {
            warn!(path = %link.display(), "Skipping symlink chain, only one hop is followed");
            return false;
        }
        Ok(_) => {}
        Err(error) => {
            warn!(path = %link.display(), %error, "Skipping dangling symlink");
            return false;
        }
    }
    match target.canonicalize() {
        Ok(resolved) if canonical_dir.starts_with(&resolved) => {
            warn!(path = %link.display(), "Skipping symlink cycle");
            false
        }
        Ok(_) => true,
        Err(error) => {
            warn!(path = %link.display(), %error, "Skipping unresolvable symlink");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentKind, LegacyComponent};
    use pretty_assertions::assert_eq;

    fn unit(name: &str) -> Component {
        LegacyComponent::new()
            .with_metadata(ComponentMetadata::new(name))
            .with_invoke(|_ctx| Box::pin(async { Ok(()) }))
            .qualify()
            .unwrap()
    }

    fn registry(names: &[&str]) -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        for name in names {
            registry.add(unit(name));
        }
        registry
    }

    fn names(registry: &ComponentRegistry) -> Vec<&str> {
        registry.components().iter().map(Component::name).collect()
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let mut registry = ComponentRegistry::new();
        let first = LegacyComponent::new()
            .with_metadata(ComponentMetadata::new("a").with_actions(["first"]))
            .with_invoke(|_ctx| Box::pin(async { Ok(()) }));
        assert!(registry.register(first));
        assert!(!registry.add(unit("a")));
        assert_eq!(names(&registry), vec!["a"]);
        assert_eq!(
            registry.get_component("a").unwrap().metadata().supported_actions,
            vec!["first"]
        );
    }

    #[test]
    fn test_lookup() {
        let mut root = registry(&["a", "b"]);
        root.add_collection("sub", registry(&["c"]));
        assert!(root.is_component("a"));
        assert!(!root.is_component("c"));
        assert!(root.is_collection("sub"));
        assert!(!root.add_collection("sub", registry(&["d"])));
        assert_eq!(root.collection_names(), vec!["sub"]);
        assert_eq!(root.get_metadata(Some("sub"))[0].name, "c");
        assert!(root.get_metadata(Some("missing")).is_empty());
        assert_eq!(root.get_metadata(None).len(), 2);
        assert!(root.get_registry(Some("missing")).is_none());
    }

    #[test]
    fn test_merge_non_recursive_leaves_collections() {
        let mut root = registry(&["a"]);
        root.add_collection("sub", registry(&["s"]));
        let other = registry(&["a", "b"]);

        root.merge(&other, false);
        assert_eq!(names(&root), vec!["a", "b"]);
        assert_eq!(names(root.get_registry(Some("sub")).unwrap()), vec!["s"]);
    }

    #[test]
    fn test_merge_recursive_reaches_collections() {
        let mut root = registry(&["a"]);
        root.add_collection("sub", registry(&["s"]));

        let mut other = registry(&["b"]);
        other.add_collection("sub", registry(&["t"]));
        other.add_collection("fresh", registry(&["f"]));

        root.merge(&other, true);
        assert_eq!(names(&root), vec!["a", "b"]);
        assert_eq!(names(root.get_registry(Some("sub")).unwrap()), vec!["s", "t", "b"]);
        assert_eq!(names(root.get_registry(Some("fresh")).unwrap()), vec!["f", "b"]);
    }

    #[test]
    fn test_create_skips_unqualified() {
        let incomplete = LegacyComponent::new().with_metadata(ComponentMetadata::new("x"));
        let complete = LegacyComponent::new()
            .with_metadata(ComponentMetadata::new("one"))
            .with_invoke(|_| Box::pin(async { Ok(()) }));
        let sources = vec![
            ComponentSource::from(incomplete),
            ComponentSource::Opaque(serde_json::json!({"name": "y"})),
            ComponentSource::Module(ComponentModule::Named(vec![
                ("one".into(), complete.into()),
                ("two".into(), ComponentSource::Opaque(serde_json::Value::Null)),
            ])),
        ];
        let loader = crate::loader::StaticLoader::new();
        let registry = ComponentRegistry::create(&loader, sources, Path::new("/"));
        assert_eq!(names(&registry), vec!["one"]);
        assert!(matches!(
            registry.get_component("one").unwrap().kind(),
            ComponentKind::Custom(_)
        ));
    }

    #[test]
    fn test_missing_directory_is_invalid() {
        let loader = crate::loader::StaticLoader::new();
        let registry = ComponentRegistry::assemble(
            &loader,
            None,
            Path::new("does-not-exist"),
            Path::new("/nonexistent"),
        );
        assert!(!registry.is_valid());
        assert!(registry.components().is_empty());
        assert!(ComponentRegistry::new().is_valid());
    }
}
