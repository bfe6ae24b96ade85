//! Components and the uniform adapter the registry stores.
//!
//! A unit arrives in one of several shapes: a type implementing
//! [`ComponentClass`] (usually through `#[derive(Component)]`), a ready
//! instance of [`CustomComponent`], a [`LegacyComponent`] assembled from
//! closures, or an [`EventHandlerSet`] for one of the handler families.
//! Each is qualified once into a [`Component`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::context::{ComponentContext, ContextError};
use crate::dispatch::EventHandlerSet;
use crate::handlers::{
    DataQueryContext, EntityResolutionContext, LlmComponentContext, TransformContext,
};

/// Declared type of a component property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
}

/// Handler family an event handler set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventHandlerType {
    ResolveEntities,
    DataQuery,
    RestService,
    LlmTransformation,
    LlmComponent,
}

impl fmt::Display for EventHandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventHandlerType::ResolveEntities => "ResolveEntities",
            EventHandlerType::DataQuery => "DataQuery",
            EventHandlerType::RestService => "RestService",
            EventHandlerType::LlmTransformation => "LlmTransformation",
            EventHandlerType::LlmComponent => "LlmComponent",
        };
        f.write_str(name)
    }
}

/// What a unit tells the orchestrator about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMetadata {
    pub name: String,
    #[serde(default)]
    pub supported_actions: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_handler_type: Option<EventHandlerType>,
}

impl ComponentMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supported_actions: Vec::new(),
            properties: BTreeMap::new(),
            event_handler_type: None,
        }
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, kind: &str, required: bool) -> Self {
        self.properties.insert(
            name.into(),
            PropertyDefinition {
                kind: kind.to_string(),
                required,
            },
        );
        self
    }

    pub fn with_event_handler_type(mut self, kind: EventHandlerType) -> Self {
        self.event_handler_type = Some(kind);
        self
    }
}

/// Error returned (or panic caught) inside a component or event handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Turn a caught panic payload into an error, keeping the panic message.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string());
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError::new(message)
    }
}

impl From<ContextError> for HandlerError {
    fn from(error: ContextError) -> Self {
        HandlerError::new(error.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(error: serde_json::Error) -> Self {
        HandlerError::new(error.to_string())
    }
}

/// A custom component.
///
/// Implementations may finish synchronously by returning
/// `Box::pin(async { Ok(()) })` or await freely inside the future.
pub trait CustomComponent: Send + Sync {
    fn invoke<'a>(&'a self, ctx: &'a mut ComponentContext)
    -> BoxFuture<'a, Result<(), HandlerError>>;
}

impl fmt::Debug for dyn CustomComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomComponent")
    }
}

/// A component type whose metadata is known statically.
///
/// Usually implemented by `#[derive(Component)]`.
pub trait ComponentClass: CustomComponent + Default + 'static {
    fn metadata() -> ComponentMetadata;
}

type InvokeFn = Arc<
    dyn for<'a> Fn(&'a mut ComponentContext) -> BoxFuture<'a, Result<(), HandlerError>>
        + Send
        + Sync,
>;

/// Where a legacy component keeps its metadata.
#[derive(Clone)]
pub enum LegacyMetadata {
    Property(ComponentMetadata),
    Function(Arc<dyn Fn() -> ComponentMetadata + Send + Sync>),
}

/// A component assembled from loose parts, with metadata either stored or
/// computed on demand.
///
/// It only qualifies once both metadata and an invoke closure are present.
#[derive(Clone, Default)]
pub struct LegacyComponent {
    metadata: Option<LegacyMetadata>,
    invoke: Option<InvokeFn>,
}

impl LegacyComponent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, metadata: ComponentMetadata) -> Self {
        self.metadata = Some(LegacyMetadata::Property(metadata));
        self
    }

    pub fn with_metadata_fn<F>(mut self, metadata: F) -> Self
    where
        F: Fn() -> ComponentMetadata + Send + Sync + 'static,
    {
        self.metadata = Some(LegacyMetadata::Function(Arc::new(metadata)));
        self
    }

    pub fn with_invoke<F>(mut self, invoke: F) -> Self
    where
        F: for<'a> Fn(&'a mut ComponentContext) -> BoxFuture<'a, Result<(), HandlerError>>
            + Send
            + Sync
            + 'static,
    {
        self.invoke = Some(Arc::new(invoke));
        self
    }

    pub fn metadata(&self) -> Option<ComponentMetadata> {
        match self.metadata.as_ref()? {
            LegacyMetadata::Property(metadata) => Some(metadata.clone()),
            LegacyMetadata::Function(metadata) => Some(metadata()),
        }
    }

    /// The uniform adapter, or `None` when a part is missing.
    pub fn qualify(self) -> Option<Component> {
        let metadata = self.metadata()?;
        let invoke = self.invoke?;
        Some(Component::new(
            metadata,
            ComponentKind::Custom(Arc::new(LegacyInvoker(invoke))),
        ))
    }
}

impl fmt::Debug for LegacyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LegacyComponent")
            .field("metadata", &self.metadata())
            .field("invoke", &self.invoke.is_some())
            .finish()
    }
}

struct LegacyInvoker(InvokeFn);

impl CustomComponent for LegacyInvoker {
    fn invoke<'a>(
        &'a self,
        ctx: &'a mut ComponentContext,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        (self.0)(ctx)
    }
}

/// The callable part of a registered unit.
#[derive(Clone)]
pub enum ComponentKind {
    Custom(Arc<dyn CustomComponent>),
    EntityResolution(Arc<EventHandlerSet<EntityResolutionContext>>),
    DataQuery(Arc<EventHandlerSet<DataQueryContext>>),
    RestService(Arc<EventHandlerSet<TransformContext>>),
    LlmTransformation(Arc<EventHandlerSet<TransformContext>>),
    LlmComponent(Arc<EventHandlerSet<LlmComponentContext>>),
}

impl ComponentKind {
    /// The handler family, or `None` for custom components.
    pub fn event_handler_type(&self) -> Option<EventHandlerType> {
        match self {
            ComponentKind::Custom(_) => None,
            ComponentKind::EntityResolution(_) => Some(EventHandlerType::ResolveEntities),
            ComponentKind::DataQuery(_) => Some(EventHandlerType::DataQuery),
            ComponentKind::RestService(_) => Some(EventHandlerType::RestService),
            ComponentKind::LlmTransformation(_) => Some(EventHandlerType::LlmTransformation),
            ComponentKind::LlmComponent(_) => Some(EventHandlerType::LlmComponent),
        }
    }
}

impl fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.event_handler_type() {
            None => f.write_str("Custom"),
            Some(kind) => write!(f, "EventHandler({kind})"),
        }
    }
}

/// A registered unit: metadata plus whatever runs it.
#[derive(Debug, Clone)]
pub struct Component {
    metadata: ComponentMetadata,
    kind: ComponentKind,
}

impl Component {
    pub fn new(metadata: ComponentMetadata, kind: ComponentKind) -> Self {
        Self { metadata, kind }
    }

    pub fn from_class<T: ComponentClass>() -> Self {
        Self::new(T::metadata(), ComponentKind::Custom(Arc::new(T::default())))
    }

    pub fn from_instance(metadata: ComponentMetadata, instance: Arc<dyn CustomComponent>) -> Self {
        Self::new(metadata, ComponentKind::Custom(instance))
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn metadata(&self) -> &ComponentMetadata {
        &self.metadata
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.kind, ComponentKind::Custom(_))
    }
}
