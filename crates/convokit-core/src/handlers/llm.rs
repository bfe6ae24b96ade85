//! LLM component: events raised around a large language model turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{candidate_message, deref_base};
use crate::component::EventHandlerType;
use crate::context::{BaseContext, ContextError, RequestContext, parse_request};
use crate::dispatch::{
    Effect, EventDescriptor, EventHandlerSet, EventRequest, HandlerFamily, QueuedEvent,
    replace_messages,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmComponentRequest {
    bot_id: String,
    platform_version: String,
    context: RequestContext,
    #[serde(default)]
    message_history: Vec<Value>,
    #[serde(default)]
    events: Vec<EventRequest>,
    #[serde(default)]
    result_variable: Option<String>,
    #[serde(default)]
    messages: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmComponentResponse {
    pub platform_version: String,
    pub context: RequestContext,
    pub modify_context: bool,
    pub valid: bool,
    pub messages: Vec<Value>,
}

#[derive(Debug)]
pub struct LlmComponentContext {
    base: BaseContext,
    message_history: Vec<Value>,
    events: Vec<EventRequest>,
    result_variable: Option<String>,
    messages: Vec<Value>,
    valid: bool,
}

deref_base!(LlmComponentContext);

impl LlmComponentContext {
    /// Prior turns of the LLM conversation, oldest first.
    pub fn message_history(&self) -> &[Value] {
        &self.message_history
    }

    pub fn result_variable(&self) -> Option<&str> {
        self.result_variable.as_deref()
    }

    /// Store the structured LLM result in the result variable, if one is set.
    pub fn set_result(&mut self, value: impl Into<Value>) -> Result<&mut Self, ContextError> {
        let name = self
            .result_variable
            .clone()
            .ok_or_else(|| ContextError::UnknownVariable("resultVariable".to_string()))?;
        self.base.set_variable(&name, value);
        Ok(self)
    }

    pub fn messages(&self) -> &[Value] {
        &self.messages
    }

    pub fn add_message(&mut self, payload: impl Into<Value>) -> &mut Self {
        self.messages.push(candidate_message(payload));
        self
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl HandlerFamily for LlmComponentContext {
    type Response = LlmComponentResponse;

    const TYPES: &'static [EventHandlerType] = &[EventHandlerType::LlmComponent];

    fn from_request(body: Value) -> Result<Self, ContextError> {
        let request: LlmComponentRequest = parse_request(body)?;
        Ok(Self {
            base: BaseContext::new(request.bot_id, request.platform_version, request.context),
            message_history: request.message_history,
            events: request.events,
            result_variable: request.result_variable,
            messages: request.messages,
            valid: true,
        })
    }

    fn events(&self, _set: &EventHandlerSet<Self>) -> Vec<QueuedEvent> {
        self.events.iter().cloned().map(QueuedEvent::from).collect()
    }

    fn effect(event: &EventDescriptor) -> Effect<Self> {
        if event.custom {
            return Effect::Ignore;
        }
        match event.name.as_str() {
            "validateResponsePayload" => Effect::Flag(|ctx, _, valid| ctx.valid = valid),
            "changeBotMessages" => Effect::Replace(|ctx, _, value| {
                replace_messages(&mut ctx.messages, value, "llm component");
            }),
            _ => Effect::Ignore,
        }
    }

    fn into_response(self) -> LlmComponentResponse {
        let (platform_version, context, modify_context) = self.base.into_parts();
        LlmComponentResponse {
            platform_version,
            context,
            modify_context,
            valid: self.valid,
            messages: self.messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentMetadata;
    use crate::dispatch::{EventHandler, dispatch};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request(events: Value) -> Value {
        json!({
            "botId": "bot",
            "platformVersion": "1.1",
            "context": {"variables": {}},
            "messageHistory": [{"role": "user", "content": "Draft an email"}],
            "resultVariable": "draft",
            "messages": [{"type": "text", "text": "Dear team"}],
            "events": events
        })
    }

    #[tokio::test]
    async fn test_change_bot_messages_replaces_exactly() {
        let replacement = json!([
            {"type": "text", "text": "Dear team,"},
            {"type": "text", "text": "Regards"}
        ]);
        let expected = replacement.clone();
        let set = EventHandlerSet::new(ComponentMetadata::new("email.writer"))
            .on_fn("changeBotMessages", move |_, _: &mut LlmComponentContext| {
                Ok(Some(replacement.clone()))
            });
        let mut ctx =
            LlmComponentContext::from_request(request(json!([{"name": "changeBotMessages"}])))
                .unwrap();
        dispatch(&set, &mut ctx).await.unwrap();
        assert_eq!(Value::from(ctx.messages().to_vec()), expected);
    }

    #[tokio::test]
    async fn test_missing_handler_leaves_fields() {
        let set = EventHandlerSet::<LlmComponentContext>::new(ComponentMetadata::new("email"));
        let mut ctx = LlmComponentContext::from_request(request(json!([
            {"name": "validateResponsePayload"},
            {"name": "changeBotMessages"}
        ])))
        .unwrap();
        dispatch(&set, &mut ctx).await.unwrap();
        assert!(ctx.is_valid());
        assert_eq!(ctx.messages(), &[json!({"type": "text", "text": "Dear team"})]);
    }

    #[tokio::test]
    async fn test_validation_and_submit() {
        let set = EventHandlerSet::new(ComponentMetadata::new("email"))
            .on_fn("validateResponsePayload", |props, _: &mut LlmComponentContext| {
                Ok(Some(json!(props["payload"].is_object())))
            })
            .on_fn("submit", |_, ctx| {
                ctx.set_result(json!({"subject": "Hi"}))?;
                Ok(Some(json!("ignored")))
            })
            .on_custom(
                "regenerate",
                EventHandler::from_fn(|_, ctx: &mut LlmComponentContext| {
                    ctx.add_message("Regenerating");
                    Ok(None)
                }),
            );
        let mut ctx = LlmComponentContext::from_request(request(json!([
            {"name": "validateResponsePayload", "properties": {"payload": "plain text"}},
            {"name": "submit"},
            {"name": "regenerate", "custom": true}
        ])))
        .unwrap();
        assert_eq!(ctx.message_history().len(), 1);
        dispatch(&set, &mut ctx).await.unwrap();

        let response = ctx.into_response();
        assert!(!response.valid);
        assert!(response.modify_context);
        assert_eq!(response.context.variables["draft"].value["subject"], "Hi");
        assert_eq!(response.messages.len(), 2);
    }
}
