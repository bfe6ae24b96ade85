//! Entity resolution: events raised while the dialog engine fills the items
//! of a composite bag entity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{candidate_message, deref_base};
use crate::component::EventHandlerType;
use crate::context::{BaseContext, ContextError, RequestContext, parse_request};
use crate::dispatch::{
    Effect, EventDescriptor, EventHandlerSet, EventRequest, HandlerFamily, QueuedEvent,
};

/// Resolution state the dialog engine hands over and reads back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityResolutionStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolving_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(default)]
    pub validation_results: BTreeMap<String, bool>,
    #[serde(default)]
    pub should_prompt_cache: BTreeMap<String, bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityResolutionRequest {
    bot_id: String,
    platform_version: String,
    context: RequestContext,
    variable_name: String,
    #[serde(default)]
    events: Vec<EventRequest>,
    #[serde(default)]
    entity_resolution_status: EntityResolutionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityResolutionResponse {
    pub platform_version: String,
    pub context: RequestContext,
    pub modify_context: bool,
    pub entity_resolution_status: EntityResolutionStatus,
    pub messages: Vec<Value>,
}

/// Context for entity resolution handlers.
///
/// The composite bag value lives in the variable named by `variableName`.
#[derive(Debug)]
pub struct EntityResolutionContext {
    base: BaseContext,
    variable_name: String,
    events: Vec<EventRequest>,
    status: EntityResolutionStatus,
    messages: Vec<Value>,
}

deref_base!(EntityResolutionContext);

impl EntityResolutionContext {
    pub fn variable_name(&self) -> &str {
        &self.variable_name
    }

    /// Current value of the composite bag entity.
    pub fn entity(&self) -> Option<&Value> {
        self.variable(&self.variable_name)
    }

    pub fn item_value(&self, item: &str) -> Option<&Value> {
        self.entity()?.get(item)
    }

    /// Set one item of the bag, creating the bag value if needed.
    pub fn set_item_value(&mut self, item: &str, value: impl Into<Value>) -> &mut Self {
        let mut entity = match self.entity() {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        entity.insert(item.to_string(), value.into());
        let name = self.variable_name.clone();
        self.base.set_variable(&name, entity);
        self
    }

    pub fn clear_item_value(&mut self, item: &str) -> &mut Self {
        if let Some(Value::Object(entity)) = self.entity() {
            let mut entity = entity.clone();
            entity.remove(item);
            let name = self.variable_name.clone();
            self.base.set_variable(&name, entity);
        }
        self
    }

    /// Item currently being resolved.
    pub fn current_item(&self) -> Option<&str> {
        self.status.resolving_field.as_deref()
    }

    pub fn user_input(&self) -> Option<&str> {
        self.status.user_input.as_deref()
    }

    pub fn status(&self) -> &EntityResolutionStatus {
        &self.status
    }

    /// Stored validation outcome for an item, or for the whole entity when
    /// `scope` is the variable name.
    pub fn validation_result(&self, scope: &str) -> Option<bool> {
        self.status.validation_results.get(scope).copied()
    }

    pub fn should_prompt(&self, item: &str) -> Option<bool> {
        self.status.should_prompt_cache.get(item).copied()
    }

    /// Queue a bot message; invalid payloads are sent as `raw`.
    pub fn add_message(&mut self, payload: impl Into<Value>) -> &mut Self {
        self.messages.push(candidate_message(payload));
        self
    }

    pub fn messages(&self) -> &[Value] {
        &self.messages
    }

    fn validation_scope(&self, event: &EventDescriptor) -> String {
        event
            .item_name()
            .unwrap_or(&self.variable_name)
            .to_string()
    }
}

impl HandlerFamily for EntityResolutionContext {
    type Response = EntityResolutionResponse;

    const TYPES: &'static [EventHandlerType] = &[EventHandlerType::ResolveEntities];
    const HALT_ON_MISSING: bool = true;

    fn from_request(body: Value) -> Result<Self, ContextError> {
        let request: EntityResolutionRequest = parse_request(body)?;
        Ok(Self {
            base: BaseContext::new(request.bot_id, request.platform_version, request.context),
            variable_name: request.variable_name,
            events: request.events,
            status: request.entity_resolution_status,
            messages: Vec::new(),
        })
    }

    fn events(&self, _set: &EventHandlerSet<Self>) -> Vec<QueuedEvent> {
        self.events.iter().cloned().map(QueuedEvent::from).collect()
    }

    fn effect(event: &EventDescriptor) -> Effect<Self> {
        if event.custom {
            return Effect::Ignore;
        }
        match (event.name.as_str(), event.item_name()) {
            ("validate", _) => Effect::Flag(|ctx, event, valid| {
                let scope = ctx.validation_scope(event);
                ctx.status.validation_results.insert(scope, valid);
            }),
            ("shouldPrompt", Some(_)) => Effect::Flag(|ctx, event, prompt| {
                if let Some(item) = event.item_name() {
                    ctx.status.should_prompt_cache.insert(item.to_string(), prompt);
                }
            }),
            _ => Effect::Ignore,
        }
    }

    fn into_response(self) -> EntityResolutionResponse {
        let (platform_version, context, modify_context) = self.base.into_parts();
        EntityResolutionResponse {
            platform_version,
            context,
            modify_context,
            entity_resolution_status: self.status,
            messages: self.messages,
        }
    }
}
