//! Pluggable component loading.
//!
//! The registry never interprets files itself: each file it discovers is
//! handed to a [`ComponentLoader`], which turns it into a [`ComponentModule`]
//! of one or more [`ComponentSource`]s. Sources are qualified into
//! [`Component`]s by [`ComponentSource::qualify`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::component::{
    Component, ComponentClass, ComponentKind, ComponentMetadata, CustomComponent,
    EventHandlerType, LegacyComponent,
};
use crate::dispatch::{EventHandlerSet, HandlerFamily};
use crate::handlers::{
    DataQueryContext, EntityResolutionContext, LlmComponentContext, TransformContext,
};

/// Errors raised while loading or qualifying a unit.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("no module registered for {0}")]
    NotFound(PathBuf),

    #[error("`{name}` does not qualify as a component: {reason}")]
    Unqualified { name: String, reason: String },
}

impl LoadError {
    fn unqualified(name: &str, reason: impl Into<String>) -> Self {
        LoadError::Unqualified {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// A component type known by its metadata and default constructor.
#[derive(Clone, Copy)]
pub struct ComponentClassRef {
    metadata: fn() -> ComponentMetadata,
    construct: fn() -> Arc<dyn CustomComponent>,
}

impl ComponentClassRef {
    pub fn of<T: ComponentClass>() -> Self {
        Self {
            metadata: T::metadata,
            construct: || Arc::new(T::default()),
        }
    }

    pub fn metadata(&self) -> ComponentMetadata {
        (self.metadata)()
    }
}

impl std::fmt::Debug for ComponentClassRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ComponentClassRef")
            .field(&self.metadata().name)
            .finish()
    }
}

/// Anything that may turn into one or more registered units.
#[derive(Debug, Clone)]
pub enum ComponentSource {
    Class(ComponentClassRef),
    Instance {
        metadata: ComponentMetadata,
        instance: Arc<dyn CustomComponent>,
    },
    Legacy(LegacyComponent),
    EntityHandlers(EventHandlerSet<EntityResolutionContext>),
    DataQueryHandlers(EventHandlerSet<DataQueryContext>),
    TransformHandlers(EventHandlerSet<TransformContext>),
    LlmComponentHandlers(EventHandlerSet<LlmComponentContext>),
    /// A file or directory, resolved through a loader.
    Path(PathBuf),
    /// An already loaded module with one or more exports.
    Module(ComponentModule),
    /// A value of unknown shape; never qualifies.
    Opaque(Value),
}

impl ComponentSource {
    pub fn class<T: ComponentClass>() -> Self {
        ComponentSource::Class(ComponentClassRef::of::<T>())
    }

    pub fn instance(metadata: ComponentMetadata, instance: impl CustomComponent + 'static) -> Self {
        ComponentSource::Instance {
            metadata,
            instance: Arc::new(instance),
        }
    }

    /// Turn a single-unit source into a [`Component`].
    ///
    /// `Path` and `Module` sources hold zero or more units and must be
    /// expanded by the registry first.
    pub fn qualify(self) -> Result<Component, LoadError> {
        match self {
            ComponentSource::Class(class) => Ok(Component::new(
                class.metadata(),
                ComponentKind::Custom((class.construct)()),
            )),
            ComponentSource::Instance { metadata, instance } => {
                Ok(Component::from_instance(metadata, instance))
            }
            ComponentSource::Legacy(legacy) => {
                let name = legacy
                    .metadata()
                    .map(|m| m.name)
                    .unwrap_or_else(|| "<anonymous>".to_string());
                legacy
                    .qualify()
                    .ok_or_else(|| LoadError::unqualified(&name, "needs both metadata and invoke"))
            }
            ComponentSource::EntityHandlers(set) => {
                qualify_handlers(set, |set, _| ComponentKind::EntityResolution(Arc::new(set)))
            }
            ComponentSource::DataQueryHandlers(set) => {
                qualify_handlers(set, |set, _| ComponentKind::DataQuery(Arc::new(set)))
            }
            ComponentSource::TransformHandlers(set) => qualify_handlers(set, |set, kind| {
                if kind == EventHandlerType::LlmTransformation {
                    ComponentKind::LlmTransformation(Arc::new(set))
                } else {
                    ComponentKind::RestService(Arc::new(set))
                }
            }),
            ComponentSource::LlmComponentHandlers(set) => {
                qualify_handlers(set, |set, _| ComponentKind::LlmComponent(Arc::new(set)))
            }
            ComponentSource::Path(path) => Err(LoadError::unqualified(
                &path.display().to_string(),
                "paths are resolved through a loader",
            )),
            ComponentSource::Module(_) => Err(LoadError::unqualified(
                "<module>",
                "modules are expanded export by export",
            )),
            ComponentSource::Opaque(value) => Err(LoadError::unqualified(
                value
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("<unknown>"),
                "exposes neither invoke nor a handler table",
            )),
        }
    }
}

/// A handler set qualifies when its declared `eventHandlerType` belongs to
/// the family its handlers were written for.
fn qualify_handlers<C: HandlerFamily>(
    set: EventHandlerSet<C>,
    build: impl FnOnce(EventHandlerSet<C>, EventHandlerType) -> ComponentKind,
) -> Result<Component, LoadError> {
    let metadata = set.metadata().clone();
    match metadata.event_handler_type {
        Some(kind) if C::TYPES.contains(&kind) => Ok(Component::new(metadata, build(set, kind))),
        Some(kind) => Err(LoadError::unqualified(
            &metadata.name,
            format!("handlers do not match eventHandlerType {kind}"),
        )),
        None => Err(LoadError::unqualified(
            &metadata.name,
            "handler set declares no eventHandlerType",
        )),
    }
}

impl From<LegacyComponent> for ComponentSource {
    fn from(legacy: LegacyComponent) -> Self {
        ComponentSource::Legacy(legacy)
    }
}

impl From<EventHandlerSet<EntityResolutionContext>> for ComponentSource {
    fn from(set: EventHandlerSet<EntityResolutionContext>) -> Self {
        ComponentSource::EntityHandlers(set)
    }
}

impl From<EventHandlerSet<DataQueryContext>> for ComponentSource {
    fn from(set: EventHandlerSet<DataQueryContext>) -> Self {
        ComponentSource::DataQueryHandlers(set)
    }
}

impl From<EventHandlerSet<TransformContext>> for ComponentSource {
    fn from(set: EventHandlerSet<TransformContext>) -> Self {
        ComponentSource::TransformHandlers(set)
    }
}

impl From<EventHandlerSet<LlmComponentContext>> for ComponentSource {
    fn from(set: EventHandlerSet<LlmComponentContext>) -> Self {
        ComponentSource::LlmComponentHandlers(set)
    }
}

impl From<PathBuf> for ComponentSource {
    fn from(path: PathBuf) -> Self {
        ComponentSource::Path(path)
    }
}

impl From<ComponentModule> for ComponentSource {
    fn from(module: ComponentModule) -> Self {
        ComponentSource::Module(module)
    }
}

/// What a loader produced for one file.
#[derive(Debug, Clone)]
pub enum ComponentModule {
    /// A single default export.
    Default(Box<ComponentSource>),
    /// Several named exports, each qualified on its own.
    Named(Vec<(String, ComponentSource)>),
}

impl ComponentModule {
    pub fn single(source: impl Into<ComponentSource>) -> Self {
        ComponentModule::Default(Box::new(source.into()))
    }

    /// Exports in declaration order, labelled for diagnostics.
    pub fn into_exports(self) -> Vec<(String, ComponentSource)> {
        match self {
            ComponentModule::Default(source) => vec![("default".to_string(), *source)],
            ComponentModule::Named(exports) => exports,
        }
    }
}

/// Turns discovered files into component modules.
pub trait ComponentLoader: Send + Sync {
    /// File extensions this loader reads, without the dot.
    fn extensions(&self) -> &[&str];

    /// Whether a discovered file should be loaded. Extension-less files are
    /// offered to the loader as well.
    fn accepts(&self, path: &Path) -> bool {
        match path.extension().and_then(|ext| ext.to_str()) {
            None => true,
            Some(ext) => self.extensions().contains(&ext),
        }
    }

    fn load(&self, path: &Path) -> Result<ComponentModule, LoadError>;
}

/// In-memory loader keyed by path, for hosts that link their components
/// statically.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    modules: HashMap<PathBuf, ComponentModule>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, path: impl Into<PathBuf>, module: ComponentModule) -> Self {
        self.insert(path, module);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, module: ComponentModule) {
        self.modules.insert(path.into(), module);
    }
}

impl ComponentLoader for StaticLoader {
    fn extensions(&self) -> &[&str] {
        &[]
    }

    fn accepts(&self, path: &Path) -> bool {
        self.modules.contains_key(path)
    }

    fn load(&self, path: &Path) -> Result<ComponentModule, LoadError> {
        self.modules
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use crate::component::HandlerError;
    use crate::context::ComponentContext;
    use crate::handlers::TransformHandlers;
    use serde_json::json;

    #[derive(Default)]
    struct Echo;

    impl CustomComponent for Echo {
        fn invoke<'a>(
            &'a self,
            ctx: &'a mut ComponentContext,
        ) -> BoxFuture<'a, Result<(), HandlerError>> {
            Box::pin(async move {
                let text = ctx.text().unwrap_or_default().to_string();
                ctx.reply(text);
                Ok(())
            })
        }
    }

    impl ComponentClass for Echo {
        fn metadata() -> ComponentMetadata {
            ComponentMetadata::new("echo")
        }
    }

    #[test]
    fn test_class_and_instance_qualify() {
        let class = ComponentSource::class::<Echo>().qualify().unwrap();
        assert_eq!(class.name(), "echo");

        let instance = ComponentSource::instance(ComponentMetadata::new("echo2"), Echo)
            .qualify()
            .unwrap();
        assert_eq!(instance.name(), "echo2");
    }

    #[test]
    fn test_handler_family_must_match_declared_type() {
        let rest = TransformHandlers::new(
            ComponentMetadata::new("rest").with_event_handler_type(EventHandlerType::RestService),
        );
        let component = ComponentSource::from(rest).qualify().unwrap();
        assert!(matches!(component.kind(), ComponentKind::RestService(_)));

        let llm = TransformHandlers::new(
            ComponentMetadata::new("llm")
                .with_event_handler_type(EventHandlerType::LlmTransformation),
        );
        let component = ComponentSource::from(llm).qualify().unwrap();
        assert!(matches!(component.kind(), ComponentKind::LlmTransformation(_)));

        let mismatched = TransformHandlers::new(
            ComponentMetadata::new("bad").with_event_handler_type(EventHandlerType::DataQuery),
        );
        assert!(matches!(
            ComponentSource::from(mismatched).qualify(),
            Err(LoadError::Unqualified { name, .. }) if name == "bad"
        ));

        let undeclared = TransformHandlers::new(ComponentMetadata::new("none"));
        assert!(ComponentSource::from(undeclared).qualify().is_err());
    }

    #[test]
    fn test_opaque_never_qualifies() {
        let err = ComponentSource::Opaque(json!({"name": "thing"}))
            .qualify()
            .unwrap_err();
        assert!(err.to_string().contains("thing"));
    }

    #[test]
    fn test_static_loader() {
        let loader = StaticLoader::new().with_module(
            "/components/echo",
            ComponentModule::single(ComponentSource::class::<Echo>()),
        );
        assert!(loader.accepts(Path::new("/components/echo")));
        assert!(!loader.accepts(Path::new("/components/other")));
        let exports = loader
            .load(Path::new("/components/echo"))
            .unwrap()
            .into_exports();
        assert_eq!(exports.len(), 1);
        assert!(matches!(
            loader.load(Path::new("/nope")),
            Err(LoadError::NotFound(_))
        ));
    }

    #[test]
    fn test_default_accepts_extensionless() {
        struct TomlOnly;
        impl ComponentLoader for TomlOnly {
            fn extensions(&self) -> &[&str] {
                &["toml"]
            }
            fn load(&self, path: &Path) -> Result<ComponentModule, LoadError> {
                Err(LoadError::NotFound(path.to_path_buf()))
            }
        }
        assert!(TomlOnly.accepts(Path::new("a.toml")));
        assert!(TomlOnly.accepts(Path::new("component")));
        assert!(!TomlOnly.accepts(Path::new("readme.md")));
    }
}
