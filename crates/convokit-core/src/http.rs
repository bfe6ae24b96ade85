//! HTTP adapter: an axum router over an [`InvocationShell`].
//!
//! Routes, relative to the configured base path:
//!
//! | Method | Path                              | Result                        |
//! |--------|-----------------------------------|-------------------------------|
//! | GET    | `{base}`                          | metadata index                |
//! | POST   | `{base}/{name}`                   | invoke a unit                 |
//! | GET    | `{base}/collections/{collection}` | metadata index of a collection|
//! | POST   | `{base}/collections/{c}/{name}`   | invoke a unit in a collection |
//! | GET    | `/health`                         | build metadata                |
//!
//! Request extensions set by host middleware are passed to custom
//! components as their mixin.

use std::future::Future;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::{Extensions, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use http_body_util::LengthLimitError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::{info, warn};

use convokit_config::ServerConfig;

use crate::build_info;
use crate::shell::{InvocationError, InvocationShell, MetadataIndex};

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub git_hash: String,
    pub build_profile: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl InvocationError {
    pub fn status(&self) -> StatusCode {
        match self {
            InvocationError::BadRequest(_) => StatusCode::BAD_REQUEST,
            InvocationError::UnknownComponent(_) => StatusCode::NOT_FOUND,
            InvocationError::Handler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for InvocationError {
    fn into_response(self) -> Response {
        let message = match &self {
            InvocationError::Handler(err) => err.message().to_string(),
            other => other.to_string(),
        };
        let body = ErrorResponse {
            error: self.kind().to_string(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Failures raised by the adapter itself, ahead of the shell.
#[derive(Debug)]
enum RouteError {
    /// The body exceeded [`MAX_BODY_BYTES`].
    PayloadTooLarge,
    Invocation(InvocationError),
}

impl From<InvocationError> for RouteError {
    fn from(error: InvocationError) -> Self {
        RouteError::Invocation(error)
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        match self {
            RouteError::PayloadTooLarge => {
                let body = ErrorResponse {
                    error: "payloadTooLarge".to_string(),
                    message: format!("request body exceeds {MAX_BODY_BYTES} bytes"),
                };
                (StatusCode::PAYLOAD_TOO_LARGE, Json(body)).into_response()
            }
            RouteError::Invocation(error) => error.into_response(),
        }
    }
}

/// Normalize a configured base path to `/segment[/segment..]`, or `""` for
/// the root.
fn normalize_base(base_path: &str) -> String {
    let trimmed = base_path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Build the router with all component routes mounted under `base_path`.
pub fn router(shell: InvocationShell, base_path: &str) -> axum::Router {
    let base = normalize_base(base_path);
    let index = if base.is_empty() { "/" } else { base.as_str() };

    axum::Router::new()
        .route("/health", get(handle_health))
        .route(index, get(handle_index))
        .route(&format!("{base}/{{name}}"), post(handle_invoke))
        .route(
            &format!("{base}/collections/{{collection}}"),
            get(handle_collection_index),
        )
        .route(
            &format!("{base}/collections/{{collection}}/{{name}}"),
            post(handle_collection_invoke),
        )
        .with_state(shell)
}

/// Bind `listen_addr:listen_port` and serve until `shutdown` resolves.
pub async fn serve(
    config: &ServerConfig,
    shell: InvocationShell,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind((config.listen_addr.as_str(), config.listen_port)).await?;
    info!(
        addr = %listener.local_addr()?,
        version = %build_info::version_string(),
        base_path = %config.base_path,
        components = shell.registry().components().len(),
        "Component service listening"
    );

    axum::serve(listener, router(shell, &config.base_path))
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("Component service shutting down");
        })
        .await
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: build_info::VERSION.to_string(),
        git_hash: build_info::GIT_HASH.to_string(),
        build_profile: build_info::BUILD_PROFILE.to_string(),
    })
}

async fn handle_index(State(shell): State<InvocationShell>) -> Json<MetadataIndex> {
    Json(shell.get_all_component_metadata())
}

async fn handle_collection_index(
    State(shell): State<InvocationShell>,
    Path(collection): Path<String>,
) -> Result<Json<MetadataIndex>, InvocationError> {
    let shell = shell
        .for_collection(&collection)
        .ok_or(InvocationError::UnknownComponent(collection))?;
    Ok(Json(shell.get_all_component_metadata()))
}

async fn handle_invoke(
    State(shell): State<InvocationShell>,
    Path(name): Path<String>,
    request: Request,
) -> Result<Response, RouteError> {
    let (extensions, body) = split(request).await?;
    Ok(invoke(&shell, &name, extensions, &body).await?)
}

async fn handle_collection_invoke(
    State(shell): State<InvocationShell>,
    Path((collection, name)): Path<(String, String)>,
    request: Request,
) -> Result<Response, RouteError> {
    let shell = shell
        .for_collection(&collection)
        .ok_or(InvocationError::UnknownComponent(collection))?;
    let (extensions, body) = split(request).await?;
    Ok(invoke(&shell, &name, extensions, &body).await?)
}

async fn split(request: Request) -> Result<(Extensions, Bytes), RouteError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| {
            let source = e.into_inner();
            if source.is::<LengthLimitError>() {
                warn!(limit = MAX_BODY_BYTES, "Rejected oversized request body");
                RouteError::PayloadTooLarge
            } else {
                InvocationError::BadRequest(format!("unreadable body: {source}")).into()
            }
        })?;
    Ok((parts.extensions, bytes))
}

/// Route to the custom-component or event-handler path by registry kind.
/// Unknown names take the custom path so the body is still validated first.
async fn invoke(
    shell: &InvocationShell,
    name: &str,
    extensions: Extensions,
    body: &[u8],
) -> Result<Response, InvocationError> {
    let body: Value = serde_json::from_slice(body).map_err(|e| {
        warn!(component = %name, error = %e, "Rejected malformed request body");
        InvocationError::BadRequest(e.to_string())
    })?;

    let is_handler_set = shell
        .registry()
        .get_component(name)
        .is_some_and(|component| !component.is_custom());

    if is_handler_set {
        let response = shell.invoke_event_handler(name, body).await?;
        Ok(Json(response).into_response())
    } else {
        let response = shell
            .invoke_component_by_name(name, body, Some(extensions))
            .await?;
        Ok(Json(response).into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::component::{ComponentMetadata, LegacyComponent};
    use crate::registry::ComponentRegistry;

    fn shell() -> InvocationShell {
        let mut registry = ComponentRegistry::new();
        registry.register(
            LegacyComponent::new()
                .with_metadata(ComponentMetadata::new("hello"))
                .with_invoke(|ctx| {
                    Box::pin(async move {
                        ctx.reply("hi there");
                        Ok(())
                    })
                }),
        );
        InvocationShell::new(Arc::new(registry))
    }

    async fn json_body(resp: Response) -> Value {
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_normalize_base() {
        assert_eq!(normalize_base("/components/"), "/components");
        assert_eq!(normalize_base("components"), "/components");
        assert_eq!(normalize_base("/"), "");
        assert_eq!(normalize_base(""), "");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = router(shell(), "/components");
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let health: HealthResponse = serde_json::from_value(json_body(resp).await).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.version, build_info::VERSION);
    }

    #[tokio::test]
    async fn test_index_at_root_base() {
        let app = router(shell(), "/");
        let req = Request::get("/").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["components"][0]["name"], "hello");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let app = router(shell(), "/components");
        let req = Request::post("/components/hello")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await["error"], "badRequest");
    }

    #[tokio::test]
    async fn test_oversized_body_is_payload_too_large() {
        let app = router(shell(), "/components");
        let req = Request::post("/components/hello")
            .header("content-type", "application/json")
            .body(Body::from(vec![b' '; MAX_BODY_BYTES + 1]))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(resp).await["error"], "payloadTooLarge");
    }

    #[tokio::test]
    async fn test_unknown_collection_is_not_found() {
        let app = router(shell(), "/components");
        let req = Request::get("/components/collections/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = json_body(resp).await;
        assert_eq!(body, json!({"error": "unknownComponent", "message": "unknown component: nope"}));
    }
}
