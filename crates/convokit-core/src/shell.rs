//! Invocation shell: validate, resolve, build the context, invoke, and
//! translate the outcome into a transport-agnostic result.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::http::Extensions;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::build_info;
use crate::component::{ComponentKind, ComponentMetadata, EventHandlerType, HandlerError};
use crate::context::{ComponentContext, ComponentResponse, ContextError, parse_envelope};
use crate::dispatch::{EventHandlerSet, HandlerFamily, dispatch};
use crate::handlers::{
    DataQueryResponse, EntityResolutionResponse, LlmComponentResponse, TransformResponse,
};
use crate::registry::ComponentRegistry;

/// Why an invocation did not produce a response.
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unknown component: {0}")]
    UnknownComponent(String),

    #[error("component failed: {0}")]
    Handler(#[from] HandlerError),
}

impl InvocationError {
    /// Stable machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            InvocationError::BadRequest(_) => "badRequest",
            InvocationError::UnknownComponent(_) => "unknownComponent",
            InvocationError::Handler(_) => "handlerError",
        }
    }
}

impl From<ContextError> for InvocationError {
    fn from(error: ContextError) -> Self {
        InvocationError::BadRequest(error.to_string())
    }
}

/// Response of `GET` on the component index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataIndex {
    pub version: String,
    pub components: Vec<ComponentMetadata>,
}

/// Resolves and invokes units from a shared registry.
#[derive(Debug, Clone)]
pub struct InvocationShell {
    registry: Arc<ComponentRegistry>,
}

impl InvocationShell {
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// A shell over one collection of this registry.
    pub fn for_collection(&self, name: &str) -> Option<InvocationShell> {
        let collection = self.registry.collection(name)?;
        Some(InvocationShell::new(Arc::clone(collection)))
    }

    /// Metadata of the direct units, tagged with the runtime version.
    pub fn get_all_component_metadata(&self) -> MetadataIndex {
        MetadataIndex {
            version: build_info::VERSION.to_string(),
            components: self.registry.get_metadata(None),
        }
    }

    /// Invoke a custom component.
    ///
    /// `mixin` values are reachable from the component through
    /// [`ComponentContext::extension`].
    pub async fn invoke_component_by_name(
        &self,
        name: &str,
        body: Value,
        mixin: Option<Extensions>,
    ) -> Result<ComponentResponse, InvocationError> {
        let ctx = ComponentContext::from_value(body)?;

        let component = match self.registry.get_component(name).map(|c| c.kind()) {
            Some(ComponentKind::Custom(component)) => Arc::clone(component),
            Some(_) | None => return Err(InvocationError::UnknownComponent(name.to_string())),
        };

        let mut ctx = match mixin {
            Some(extensions) => ctx.with_extensions(extensions),
            None => ctx,
        };

        debug!(component = %name, "Invoking component");
        let outcome = AssertUnwindSafe(async { component.invoke(&mut ctx).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::from_panic(panic)));

        match outcome {
            Ok(()) => {
                info!(component = %name, "Component invoked");
                Ok(ctx.into_response())
            }
            Err(err) => {
                error!(component = %name, error = %err, "Component failed");
                Err(err.into())
            }
        }
    }

    /// Invoke an event handler set, routed by its declared handler type.
    /// The family response is returned as JSON.
    ///
    /// The shared envelope is validated before `name` is resolved; the
    /// family-specific fields are checked once the family is known.
    pub async fn invoke_event_handler(
        &self,
        name: &str,
        body: Value,
    ) -> Result<Value, InvocationError> {
        parse_envelope(&body)?;

        let kind = self
            .registry
            .get_component(name)
            .and_then(|c| c.kind().event_handler_type())
            .ok_or_else(|| InvocationError::UnknownComponent(name.to_string()))?;

        match kind {
            EventHandlerType::ResolveEntities => {
                to_json(self.invoke_entity_event_handler(name, body).await?)
            }
            EventHandlerType::DataQuery => {
                to_json(self.invoke_data_query_handler(name, body).await?)
            }
            EventHandlerType::RestService => {
                to_json(self.invoke_rest_service_handler(name, body).await?)
            }
            EventHandlerType::LlmTransformation => {
                to_json(self.invoke_llm_transformation_handler(name, body).await?)
            }
            EventHandlerType::LlmComponent => {
                to_json(self.invoke_llm_component_handler(name, body).await?)
            }
        }
    }

    pub async fn invoke_entity_event_handler(
        &self,
        name: &str,
        body: Value,
    ) -> Result<EntityResolutionResponse, InvocationError> {
        self.run_family(name, body, |kind| match kind {
            ComponentKind::EntityResolution(set) => Some(Arc::clone(set)),
            _ => None,
        })
        .await
    }

    pub async fn invoke_data_query_handler(
        &self,
        name: &str,
        body: Value,
    ) -> Result<DataQueryResponse, InvocationError> {
        self.run_family(name, body, |kind| match kind {
            ComponentKind::DataQuery(set) => Some(Arc::clone(set)),
            _ => None,
        })
        .await
    }

    pub async fn invoke_rest_service_handler(
        &self,
        name: &str,
        body: Value,
    ) -> Result<TransformResponse, InvocationError> {
        self.run_family(name, body, |kind| match kind {
            ComponentKind::RestService(set) => Some(Arc::clone(set)),
            _ => None,
        })
        .await
    }

    pub async fn invoke_llm_transformation_handler(
        &self,
        name: &str,
        body: Value,
    ) -> Result<TransformResponse, InvocationError> {
        self.run_family(name, body, |kind| match kind {
            ComponentKind::LlmTransformation(set) => Some(Arc::clone(set)),
            _ => None,
        })
        .await
    }

    pub async fn invoke_llm_component_handler(
        &self,
        name: &str,
        body: Value,
    ) -> Result<LlmComponentResponse, InvocationError> {
        self.run_family(name, body, |kind| match kind {
            ComponentKind::LlmComponent(set) => Some(Arc::clone(set)),
            _ => None,
        })
        .await
    }

    async fn run_family<C: HandlerFamily>(
        &self,
        name: &str,
        body: Value,
        select: impl FnOnce(&ComponentKind) -> Option<Arc<EventHandlerSet<C>>>,
    ) -> Result<C::Response, InvocationError> {
        let mut ctx = C::from_request(body)?;

        let set = self
            .registry
            .get_component(name)
            .and_then(|c| select(c.kind()))
            .ok_or_else(|| InvocationError::UnknownComponent(name.to_string()))?;

        debug!(component = %name, "Dispatching events");
        let outcome = AssertUnwindSafe(dispatch(&set, &mut ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::from_panic(panic)));

        match outcome {
            Ok(()) => Ok(ctx.into_response()),
            Err(err) => {
                error!(component = %name, error = %err, "Event handler failed");
                Err(err.into())
            }
        }
    }
}

/// A response that cannot be serialized is reported as a handler failure,
/// since handlers put arbitrary values into it.
fn to_json(response: impl Serialize) -> Result<Value, InvocationError> {
    serde_json::to_value(response).map_err(|e| {
        error!(error = %e, "Failed to serialize family response");
        InvocationError::Handler(HandlerError::from(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::LegacyComponent;
    use crate::handlers::TransformHandlers;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn body() -> Value {
        json!({
            "botId": "bot",
            "platformVersion": "1.1",
            "context": {"variables": {}},
            "properties": {},
            "message": {
                "messagePayload": {"text": "hi"},
                "channelConversation": {
                    "botId": "bot", "sessionId": "s", "type": "test", "userId": "u", "channelId": "c"
                }
            }
        })
    }

    fn shell() -> InvocationShell {
        let mut registry = ComponentRegistry::new();
        registry.register(
            LegacyComponent::new()
                .with_metadata(ComponentMetadata::new("hello"))
                .with_invoke(|ctx| {
                    Box::pin(async move {
                        ctx.reply("hello").transition(None);
                        Ok(())
                    })
                }),
        );
        registry.register(
            LegacyComponent::new()
                .with_metadata(ComponentMetadata::new("panics"))
                .with_invoke(|_ctx| panic!("kaboom")),
        );
        registry.register(
            TransformHandlers::new(
                ComponentMetadata::new("rest")
                    .with_event_handler_type(EventHandlerType::RestService),
            )
            .on_fn("transformRequestPayload", |_, _| Ok(Some(json!({"ok": true})))),
        );
        InvocationShell::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_invoke_ok() {
        let response = shell()
            .invoke_component_by_name("hello", body(), None)
            .await
            .unwrap();
        assert!(response.transition);
        assert_eq!(response.messages[0].text(), Some("hello"));
    }

    #[tokio::test]
    async fn test_bad_request_before_resolution() {
        let err = shell()
            .invoke_component_by_name("missing", json!({"botId": "bot"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::BadRequest(_)));
        assert_eq!(err.kind(), "badRequest");
    }

    #[tokio::test]
    async fn test_panic_becomes_handler_error() {
        let err = shell()
            .invoke_component_by_name("panics", body(), None)
            .await
            .unwrap_err();
        match err {
            InvocationError::Handler(err) => assert_eq!(err.message(), "kaboom"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handler_set_is_not_a_custom_component() {
        let err = shell()
            .invoke_component_by_name("rest", body(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::UnknownComponent(name) if name == "rest"));
    }

    #[tokio::test]
    async fn test_event_handler_routing() {
        let shell = shell();
        let body = json!({
            "botId": "bot",
            "platformVersion": "1.1",
            "context": {"variables": {}},
            "requestPayload": {}
        });
        let response = shell.invoke_event_handler("rest", body.clone()).await.unwrap();
        assert_eq!(response["requestPayload"], json!({"ok": true}));

        let err = shell.invoke_event_handler("hello", body.clone()).await.unwrap_err();
        assert!(matches!(err, InvocationError::UnknownComponent(_)));

        let err = shell
            .invoke_llm_transformation_handler("rest", body)
            .await
            .unwrap_err();
        assert!(matches!(err, InvocationError::UnknownComponent(_)));
    }

    #[tokio::test]
    async fn test_event_handler_validates_before_resolution() {
        let shell = shell();
        let err = shell
            .invoke_event_handler("nope", json!({"botId": 1}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "badRequest");

        let err = shell
            .invoke_event_handler("nope", json!({"botId": "bot", "platformVersion": "1.1"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "bad request: request has no `context` object");

        let envelope = json!({"botId": "bot", "platformVersion": "1.1", "context": {}});
        let err = shell.invoke_event_handler("nope", envelope).await.unwrap_err();
        assert_eq!(err.kind(), "unknownComponent");
    }

    #[test]
    fn test_to_json_reports_unserializable_response() {
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], "non-string key");
        let err = to_json(map).unwrap_err();
        assert_eq!(err.kind(), "handlerError");
    }

    #[test]
    fn test_for_collection_shares_registry() {
        let mut registry = ComponentRegistry::new();
        let mut sales = ComponentRegistry::new();
        sales.register(
            LegacyComponent::new()
                .with_metadata(ComponentMetadata::new("quote"))
                .with_invoke(|_ctx| Box::pin(async { Ok(()) })),
        );
        registry.add_collection("sales", sales);
        let shell = InvocationShell::new(Arc::new(registry));

        let first = shell.for_collection("sales").unwrap();
        let second = shell.for_collection("sales").unwrap();
        assert!(std::ptr::eq(first.registry(), second.registry()));
        assert!(first.registry().is_component("quote"));
        assert!(shell.for_collection("missing").is_none());
    }

    #[test]
    fn test_metadata_index_lists_direct_units() {
        let index = shell().get_all_component_metadata();
        assert_eq!(index.version, build_info::VERSION);
        let names: Vec<_> = index.components.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["hello", "panics", "rest"]);
    }
}
