//! Family-agnostic event dispatch.
//!
//! An [`EventHandlerSet`] maps event names to handlers in four scopes:
//! the entity scope (also used as the flat table by families without
//! sub-scopes), per-item, per-attribute, and custom. A family implements
//! [`HandlerFamily`] to say which events a request raises and what each
//! handler's return value does to its context; [`dispatch`] runs the loop.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::BoxFuture;
use crate::component::{ComponentMetadata, EventHandlerType, HandlerError};
use crate::context::ContextError;

/// What a handler produced: a value right away, or a future that will.
pub enum HandlerReturn<'a> {
    Ready(Result<Option<Value>, HandlerError>),
    Pending(BoxFuture<'a, Result<Option<Value>, HandlerError>>),
}

impl HandlerReturn<'_> {
    /// Await the handler's outcome, whichever way it was produced.
    pub async fn resolve(self) -> Result<Option<Value>, HandlerError> {
        match self {
            HandlerReturn::Ready(result) => result,
            HandlerReturn::Pending(future) => future.await,
        }
    }
}

type HandlerFn<C> = dyn for<'a> Fn(Value, &'a mut C) -> HandlerReturn<'a> + Send + Sync;

/// One event handler, erased to a single calling convention.
pub struct EventHandler<C> {
    call: Arc<HandlerFn<C>>,
}

impl<C: 'static> EventHandler<C> {
    fn erase<F>(f: F) -> Self
    where
        F: for<'a> Fn(Value, &'a mut C) -> HandlerReturn<'a> + Send + Sync + 'static,
    {
        Self { call: Arc::new(f) }
    }

    /// A handler that finishes without awaiting.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Value, &mut C) -> Result<Option<Value>, HandlerError> + Send + Sync + 'static,
    {
        Self::erase(move |props, ctx| HandlerReturn::Ready(f(props, ctx)))
    }

    /// A handler that returns a boxed future borrowing the context.
    pub fn from_async<F>(f: F) -> Self
    where
        F: for<'a> Fn(Value, &'a mut C) -> BoxFuture<'a, Result<Option<Value>, HandlerError>>
            + Send
            + Sync
            + 'static,
    {
        Self::erase(move |props, ctx| HandlerReturn::Pending(f(props, ctx)))
    }

    pub fn call<'a>(&self, properties: Value, ctx: &'a mut C) -> HandlerReturn<'a> {
        (self.call)(properties, ctx)
    }
}

impl<C> Clone for EventHandler<C> {
    fn clone(&self) -> Self {
        Self {
            call: Arc::clone(&self.call),
        }
    }
}

impl<C> fmt::Debug for EventHandler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventHandler")
    }
}

type ScopedHandlers<C> = BTreeMap<String, HashMap<String, EventHandler<C>>>;

/// Metadata plus handlers organised by scope.
pub struct EventHandlerSet<C> {
    metadata: ComponentMetadata,
    entity: HashMap<String, EventHandler<C>>,
    items: ScopedHandlers<C>,
    attributes: ScopedHandlers<C>,
    custom: HashMap<String, EventHandler<C>>,
}

impl<C: 'static> EventHandlerSet<C> {
    pub fn new(metadata: ComponentMetadata) -> Self {
        Self {
            metadata,
            entity: HashMap::new(),
            items: BTreeMap::new(),
            attributes: BTreeMap::new(),
            custom: HashMap::new(),
        }
    }

    pub fn metadata(&self) -> &ComponentMetadata {
        &self.metadata
    }

    /// Register an entity-level (or flat) handler.
    pub fn on(mut self, event: &str, handler: EventHandler<C>) -> Self {
        self.entity.insert(event.to_string(), handler);
        self
    }

    /// Register a synchronous entity-level handler.
    pub fn on_fn<F>(self, event: &str, f: F) -> Self
    where
        F: Fn(Value, &mut C) -> Result<Option<Value>, HandlerError> + Send + Sync + 'static,
    {
        self.on(event, EventHandler::from_fn(f))
    }

    /// Register an asynchronous entity-level handler.
    pub fn on_async<F>(self, event: &str, f: F) -> Self
    where
        F: for<'a> Fn(Value, &'a mut C) -> BoxFuture<'a, Result<Option<Value>, HandlerError>>
            + Send
            + Sync
            + 'static,
    {
        self.on(event, EventHandler::from_async(f))
    }

    pub fn on_item(mut self, item: &str, event: &str, handler: EventHandler<C>) -> Self {
        self.items
            .entry(item.to_string())
            .or_default()
            .insert(event.to_string(), handler);
        self
    }

    pub fn on_attribute(mut self, attribute: &str, event: &str, handler: EventHandler<C>) -> Self {
        self.attributes
            .entry(attribute.to_string())
            .or_default()
            .insert(event.to_string(), handler);
        self
    }

    pub fn on_custom(mut self, event: &str, handler: EventHandler<C>) -> Self {
        self.custom.insert(event.to_string(), handler);
        self
    }

    /// Find the handler for an event, following the scope rules.
    pub fn resolve(&self, event: &EventDescriptor) -> Option<&EventHandler<C>> {
        if event.custom {
            return self.custom.get(&event.name);
        }
        match &event.scope {
            Some(EventScope::Item(item)) => self.items.get(item)?.get(&event.name),
            Some(EventScope::Attribute(attribute)) => {
                self.attributes.get(attribute)?.get(&event.name)
            }
            None => self.entity.get(&event.name),
        }
    }

    /// Attributes with a handler for `event`, in name order.
    pub fn attributes_handling(&self, event: &str) -> Vec<&str> {
        self.attributes
            .iter()
            .filter(|(_, handlers)| handlers.contains_key(event))
            .map(|(attribute, _)| attribute.as_str())
            .collect()
    }
}

impl<C> Clone for EventHandlerSet<C> {
    fn clone(&self) -> Self {
        Self {
            metadata: self.metadata.clone(),
            entity: self.entity.clone(),
            items: self.items.clone(),
            attributes: self.attributes.clone(),
            custom: self.custom.clone(),
        }
    }
}

impl<C> fmt::Debug for EventHandlerSet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlerSet")
            .field("name", &self.metadata.name)
            .field("entity", &self.entity.keys().collect::<Vec<_>>())
            .field("items", &self.items.keys().collect::<Vec<_>>())
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Sub-scope an event is raised in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventScope {
    Item(String),
    Attribute(String),
}

/// Identifies which handler an event targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDescriptor {
    pub name: String,
    pub custom: bool,
    pub scope: Option<EventScope>,
}

impl EventDescriptor {
    pub fn entity(name: &str) -> Self {
        Self {
            name: name.to_string(),
            custom: false,
            scope: None,
        }
    }

    pub fn item(item: &str, name: &str) -> Self {
        Self {
            scope: Some(EventScope::Item(item.to_string())),
            ..Self::entity(name)
        }
    }

    pub fn attribute(attribute: &str, name: &str) -> Self {
        Self {
            scope: Some(EventScope::Attribute(attribute.to_string())),
            ..Self::entity(name)
        }
    }

    pub fn custom(name: &str) -> Self {
        Self {
            custom: true,
            ..Self::entity(name)
        }
    }

    pub fn item_name(&self) -> Option<&str> {
        match &self.scope {
            Some(EventScope::Item(item)) => Some(item),
            _ => None,
        }
    }

    pub fn attribute_name(&self) -> Option<&str> {
        match &self.scope {
            Some(EventScope::Attribute(attribute)) => Some(attribute),
            _ => None,
        }
    }
}

impl fmt::Display for EventDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            _ if self.custom => write!(f, "custom.{}", self.name),
            Some(EventScope::Item(item)) => write!(f, "items.{item}.{}", self.name),
            Some(EventScope::Attribute(attr)) => write!(f, "attributes.{attr}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// An event as it appears in a request's `events` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRequest {
    pub name: String,
    #[serde(default)]
    pub custom: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default)]
    pub properties: Value,
}

impl EventRequest {
    pub fn descriptor(&self) -> EventDescriptor {
        let scope = match (&self.item, &self.attribute) {
            (Some(item), _) => Some(EventScope::Item(item.clone())),
            (None, Some(attribute)) => Some(EventScope::Attribute(attribute.clone())),
            (None, None) => None,
        };
        EventDescriptor {
            name: self.name.clone(),
            custom: self.custom,
            scope,
        }
    }
}

/// An event queued for dispatch together with the properties passed to its
/// handler.
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub descriptor: EventDescriptor,
    pub properties: Value,
}

impl QueuedEvent {
    pub fn new(descriptor: EventDescriptor, properties: Value) -> Self {
        Self {
            descriptor,
            properties,
        }
    }
}

impl From<EventRequest> for QueuedEvent {
    fn from(event: EventRequest) -> Self {
        QueuedEvent::new(event.descriptor(), event.properties)
    }
}

/// What the engine does with a handler's return value.
pub enum Effect<C> {
    /// The value is ignored; the handler works through the context.
    Ignore,
    /// The value replaces a field of the context.
    Replace(fn(&mut C, &EventDescriptor, Value)),
    /// The value is coerced to a bool and stored.
    Flag(fn(&mut C, &EventDescriptor, bool)),
    /// The handler runs once per row; each value replaces that row's cell.
    PerRow {
        rows: fn(&C, &EventDescriptor) -> Vec<(usize, Value)>,
        write: fn(&mut C, &EventDescriptor, usize, Value),
    },
}

/// A request family served by event handler sets.
pub trait HandlerFamily: Send + Sized + 'static {
    type Response: Serialize + Send;

    const TYPES: &'static [EventHandlerType];

    /// Whether a missing handler stops the loop instead of being skipped.
    const HALT_ON_MISSING: bool = false;

    fn from_request(body: Value) -> Result<Self, ContextError>;

    /// Events this request raises, in dispatch order.
    fn events(&self, set: &EventHandlerSet<Self>) -> Vec<QueuedEvent>;

    fn effect(event: &EventDescriptor) -> Effect<Self>;

    fn into_response(self) -> Self::Response;
}

/// JSON truthiness: `null`, `false`, `0` and `""` are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Run every event the context raises through the set's handlers.
///
/// Handlers run one at a time. The first handler error ends the loop.
pub async fn dispatch<C: HandlerFamily>(
    set: &EventHandlerSet<C>,
    ctx: &mut C,
) -> Result<(), HandlerError> {
    let component = set.metadata().name.as_str();
    for event in ctx.events(set) {
        let descriptor = event.descriptor;
        let Some(handler) = set.resolve(&descriptor) else {
            if C::HALT_ON_MISSING {
                debug!(%component, event = %descriptor, "No handler, stopping dispatch");
                break;
            }
            debug!(%component, event = %descriptor, "No handler, skipping event");
            continue;
        };

        debug!(%component, event = %descriptor, "Dispatching event");
        match C::effect(&descriptor) {
            Effect::PerRow { rows, write } => {
                for (row, properties) in rows(ctx, &descriptor) {
                    if let Some(value) = handler.call(properties, ctx).resolve().await? {
                        write(ctx, &descriptor, row, value);
                    }
                }
            }
            effect => {
                let result = handler.call(event.properties, ctx).resolve().await?;
                let Some(value) = result else { continue };
                match effect {
                    Effect::Replace(apply) => apply(ctx, &descriptor, value),
                    Effect::Flag(apply) => apply(ctx, &descriptor, truthy(&value)),
                    Effect::Ignore | Effect::PerRow { .. } => {}
                }
            }
        }
    }
    Ok(())
}

/// Replace `target` when `value` is an array, otherwise leave it alone.
pub(crate) fn replace_messages(target: &mut Vec<Value>, value: Value, component: &str) {
    match value {
        Value::Array(messages) => *target = messages,
        other => warn!(
            %component,
            returned = %other,
            "changeBotMessages must return a list, keeping current messages"
        ),
    }
}
