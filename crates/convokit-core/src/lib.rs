#![deny(unsafe_code)]

//! Convokit core runtime.
//!
//! Hosts pluggable conversation components on behalf of an upstream
//! orchestrator: a hierarchical [`ComponentRegistry`] discovers and indexes
//! units, the [`InvocationShell`] resolves and invokes them, the dispatch engine
//! drives event handler sets, and the [`MessageModel`] validates every message
//! a component emits.

use std::future::Future;
use std::pin::Pin;

/// Boxed `Send` future returned by components and event handlers.
///
/// Handlers borrow their context for `'a`, so the future is tied to that
/// borrow rather than being `'static`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Component trait, metadata, and the uniform registration adapter.
pub mod component;
/// Invocation contexts: variables, response mutation, NLP results.
pub mod context;
/// Family-agnostic event dispatch engine.
pub mod dispatch;
/// Event handler families and their effect tables.
pub mod handlers;
/// axum adapter exposing the shell over HTTP.
pub mod http;
/// Pluggable component loaders.
pub mod loader;
/// Tracing layer that captures diagnostics in memory.
pub mod logging;
/// Declarative TOML/JSON component manifests.
pub mod manifest;
/// Conversation message model and validation.
pub mod message;
/// Hierarchical component registry.
pub mod registry;
/// Invocation shell: resolve, invoke, translate.
pub mod shell;

pub use component::{
    Component, ComponentClass, ComponentKind, ComponentMetadata, CustomComponent,
    EventHandlerType, HandlerError, LegacyComponent,
};
pub use context::{ComponentContext, ContextError, NlpResult};
pub use dispatch::{EventDescriptor, EventHandler, EventHandlerSet, HandlerReturn};
pub use loader::{ComponentLoader, ComponentModule, ComponentSource, StaticLoader};
pub use logging::{LogCollector, LogReader};
pub use manifest::ManifestLoader;
pub use message::{ConversationMessage, MessageModel, MessagePayload, ValidationError};
pub use registry::ComponentRegistry;
pub use shell::{InvocationError, InvocationShell, MetadataIndex};
