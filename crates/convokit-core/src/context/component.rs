use std::ops::{Deref, DerefMut};

use axum::http::Extensions;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::request::{InvocationRequest, RequestContext};
use super::{BaseContext, ContextError};
use crate::message::{MessageModel, MessagePayload};

/// Response returned to the orchestrator after a custom component ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentResponse {
    pub platform_version: String,
    pub context: RequestContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub keep_turn: bool,
    pub transition: bool,
    pub error: bool,
    pub modify_context: bool,
    pub messages: Vec<MessagePayload>,
}

/// Context handed to a custom component for one invocation.
///
/// Dereferences to [`BaseContext`] for variable access. Host-provided values
/// live in a typed extension map reached through [`ComponentContext::extension`].
#[derive(Debug)]
pub struct ComponentContext {
    base: BaseContext,
    request: InvocationRequest,
    action: Option<String>,
    keep_turn: bool,
    transition: bool,
    error: bool,
    messages: Vec<MessagePayload>,
    extensions: Extensions,
}

impl ComponentContext {
    pub fn new(request: InvocationRequest) -> Self {
        let base = BaseContext::new(
            request.bot_id.clone(),
            request.platform_version.clone(),
            request.context.clone(),
        );
        Self {
            base,
            request,
            action: None,
            keep_turn: true,
            transition: false,
            error: false,
            messages: Vec::new(),
            extensions: Extensions::new(),
        }
    }

    /// Build a context from a raw request body.
    pub fn from_value(body: Value) -> Result<Self, ContextError> {
        let request: InvocationRequest = super::parse_request(body)?;
        Ok(Self::new(request))
    }

    /// Attach host-provided values; existing entries of the same type are
    /// replaced, context methods are never shadowed.
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions.extend(extensions);
        self
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn request(&self) -> &InvocationRequest {
        &self.request
    }

    /// Invocation-time component properties.
    pub fn properties(&self) -> &Map<String, Value> {
        &self.request.properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.request.properties.get(name)
    }

    pub fn message_payload(&self) -> &Value {
        &self.request.message.message_payload
    }

    /// Text of the incoming user message, if it is a text message.
    pub fn text(&self) -> Option<&str> {
        self.message_payload().get("text").and_then(Value::as_str)
    }

    pub fn postback(&self) -> Option<&Value> {
        self.message_payload().get("postback")
    }

    pub fn location(&self) -> Option<&Value> {
        self.message_payload().get("location")
    }

    pub fn attachment(&self) -> Option<&Value> {
        self.message_payload().get("attachment")
    }

    pub fn channel_type(&self) -> &str {
        &self.request.message.channel_conversation.channel_type
    }

    pub fn user_id(&self) -> &str {
        &self.request.message.channel_conversation.user_id
    }

    pub fn session_id(&self) -> &str {
        &self.request.message.channel_conversation.session_id
    }

    /// Queue a message for the user and release the turn.
    ///
    /// Payloads that fail validation are sent as `raw` messages.
    pub fn reply(&mut self, payload: impl Into<Value>) -> &mut Self {
        let model = MessageModel::new(payload);
        if let Some(error) = model.validation_error() {
            warn!(%error, "Reply payload is invalid, sending it as a raw message");
        }
        if model.raw_payload().is_null() {
            return self;
        }
        self.messages.push(model.into_payload_or_raw());
        self.keep_turn = false;
        self
    }

    pub fn keep_turn(&mut self, keep_turn: bool) -> &mut Self {
        self.keep_turn = keep_turn;
        self
    }

    /// Ask the dialog engine to move on, optionally along a named action.
    pub fn transition(&mut self, action: Option<&str>) -> &mut Self {
        self.transition = true;
        if let Some(action) = action {
            self.action = Some(action.to_string());
        }
        self
    }

    #[deprecated(note = "use `transition(Some(action))`")]
    pub fn action(&mut self, action: &str) -> &mut Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn error(&mut self, error: bool) -> &mut Self {
        self.error = error;
        self
    }

    pub fn messages(&self) -> &[MessagePayload] {
        &self.messages
    }

    /// Snapshot of the response as it stands.
    pub fn response(&self) -> ComponentResponse {
        ComponentResponse {
            platform_version: self.base.platform_version().to_string(),
            context: self.base.context().clone(),
            action: self.action.clone(),
            keep_turn: self.keep_turn,
            transition: self.transition,
            error: self.error,
            modify_context: self.base.modify_context(),
            messages: self.messages.clone(),
        }
    }

    pub fn into_response(self) -> ComponentResponse {
        let (platform_version, context, modify_context) = self.base.into_parts();
        ComponentResponse {
            platform_version,
            context,
            action: self.action,
            keep_turn: self.keep_turn,
            transition: self.transition,
            error: self.error,
            modify_context,
            messages: self.messages,
        }
    }
}

impl Deref for ComponentContext {
    type Target = BaseContext;

    fn deref(&self) -> &BaseContext {
        &self.base
    }
}

impl DerefMut for ComponentContext {
    fn deref_mut(&mut self) -> &mut BaseContext {
        &mut self.base
    }
}
