//! Payload transformation for REST services and LLM transformations.
//!
//! Both families share one envelope: each of the request, response and
//! error payloads is optional, and a transform event is raised only for the
//! payloads present.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::deref_base;
use crate::component::EventHandlerType;
use crate::context::{BaseContext, ContextError, RequestContext, parse_request};
use crate::dispatch::{Effect, EventDescriptor, EventHandlerSet, HandlerFamily, QueuedEvent};

const TRANSFORM_REQUEST: &str = "transformRequestPayload";
const TRANSFORM_RESPONSE: &str = "transformResponsePayload";
const TRANSFORM_ERROR_RESPONSE: &str = "transformErrorResponsePayload";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransformRequest {
    bot_id: String,
    platform_version: String,
    context: RequestContext,
    #[serde(default)]
    request_payload: Option<Value>,
    #[serde(default)]
    response_payload: Option<Value>,
    #[serde(default)]
    error_response_payload: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    pub platform_version: String,
    pub context: RequestContext,
    pub modify_context: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_response_payload: Option<Value>,
}

#[derive(Debug)]
pub struct TransformContext {
    base: BaseContext,
    request_payload: Option<Value>,
    response_payload: Option<Value>,
    error_response_payload: Option<Value>,
}

deref_base!(TransformContext);

impl TransformContext {
    pub fn request_payload(&self) -> Option<&Value> {
        self.request_payload.as_ref()
    }

    pub fn response_payload(&self) -> Option<&Value> {
        self.response_payload.as_ref()
    }

    pub fn error_response_payload(&self) -> Option<&Value> {
        self.error_response_payload.as_ref()
    }
}

impl HandlerFamily for TransformContext {
    type Response = TransformResponse;

    const TYPES: &'static [EventHandlerType] = &[
        EventHandlerType::RestService,
        EventHandlerType::LlmTransformation,
    ];

    fn from_request(body: Value) -> Result<Self, ContextError> {
        let request: TransformRequest = parse_request(body)?;
        Ok(Self {
            base: BaseContext::new(request.bot_id, request.platform_version, request.context),
            request_payload: request.request_payload,
            response_payload: request.response_payload,
            error_response_payload: request.error_response_payload,
        })
    }

    fn events(&self, _set: &EventHandlerSet<Self>) -> Vec<QueuedEvent> {
        [
            (TRANSFORM_REQUEST, &self.request_payload),
            (TRANSFORM_RESPONSE, &self.response_payload),
            (TRANSFORM_ERROR_RESPONSE, &self.error_response_payload),
        ]
        .into_iter()
        .filter_map(|(name, payload)| {
            let payload = payload.as_ref()?;
            Some(QueuedEvent::new(
                EventDescriptor::entity(name),
                json!({ "payload": payload }),
            ))
        })
        .collect()
    }

    fn effect(event: &EventDescriptor) -> Effect<Self> {
        if event.custom || event.scope.is_some() {
            return Effect::Ignore;
        }
        match event.name.as_str() {
            TRANSFORM_REQUEST => Effect::Replace(|ctx, _, value| ctx.request_payload = Some(value)),
            TRANSFORM_RESPONSE => {
                Effect::Replace(|ctx, _, value| ctx.response_payload = Some(value))
            }
            TRANSFORM_ERROR_RESPONSE => {
                Effect::Replace(|ctx, _, value| ctx.error_response_payload = Some(value))
            }
            _ => Effect::Ignore,
        }
    }

    fn into_response(self) -> TransformResponse {
        let (platform_version, context, modify_context) = self.base.into_parts();
        TransformResponse {
            platform_version,
            context,
            modify_context,
            request_payload: self.request_payload,
            response_payload: self.response_payload,
            error_response_payload: self.error_response_payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentMetadata;
    use crate::dispatch::dispatch;
    use pretty_assertions::assert_eq;

    fn handlers() -> EventHandlerSet<TransformContext> {
        EventHandlerSet::<TransformContext>::new(
            ComponentMetadata::new("weather.rest")
                .with_event_handler_type(EventHandlerType::RestService),
        )
        .on_fn(TRANSFORM_REQUEST, |props, _| {
            let mut payload = props["payload"].clone();
            payload["units"] = json!("metric");
            Ok(Some(payload))
        })
        .on_async(TRANSFORM_RESPONSE, |props, ctx| {
            Box::pin(async move {
                ctx.set_variable("lastCity", props["payload"]["city"].clone());
                Ok(Some(json!({"summary": "sunny"})))
            })
        })
        .on_fn(TRANSFORM_ERROR_RESPONSE, |_, _| Ok(None))
    }

    #[tokio::test]
    async fn test_only_present_payloads_transformed() {
        let mut ctx = TransformContext::from_request(json!({
            "botId": "bot",
            "platformVersion": "1.1",
            "context": {"variables": {}},
            "requestPayload": {"city": "Oslo"},
            "errorResponsePayload": {"status": 500}
        }))
        .unwrap();
        dispatch(&handlers(), &mut ctx).await.unwrap();

        let response = ctx.into_response();
        assert_eq!(
            response.request_payload,
            Some(json!({"city": "Oslo", "units": "metric"}))
        );
        assert_eq!(response.response_payload, None);
        assert_eq!(response.error_response_payload, Some(json!({"status": 500})));
        assert!(!response.modify_context);
    }

    #[tokio::test]
    async fn test_async_handler_can_write_variables() {
        let mut ctx = TransformContext::from_request(json!({
            "botId": "bot",
            "platformVersion": "1.1",
            "context": {"variables": {}},
            "responsePayload": {"city": "Oslo", "raw": "..."}
        }))
        .unwrap();
        dispatch(&handlers(), &mut ctx).await.unwrap();
        assert_eq!(ctx.response_payload(), Some(&json!({"summary": "sunny"})));
        assert_eq!(ctx.variable("lastCity"), Some(&json!("Oslo")));
        assert!(ctx.modify_context());
    }
}
