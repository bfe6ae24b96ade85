//! Event handler families.
//!
//! Each family pairs a request envelope with a context type and an effect
//! table; the loop itself lives in [`crate::dispatch`].

mod data_query;
mod entity;
mod llm;
mod transform;

use serde_json::Value;

use crate::message::MessageModel;

pub use data_query::{DataQueryContext, DataQueryResponse, DataQueryState};
pub use entity::{EntityResolutionContext, EntityResolutionResponse, EntityResolutionStatus};
pub use llm::{LlmComponentContext, LlmComponentResponse};
pub use transform::{TransformContext, TransformResponse};

/// Give a family context transparent access to its [`BaseContext`].
///
/// [`BaseContext`]: crate::context::BaseContext
macro_rules! deref_base {
    ($ty:ty) => {
        impl std::ops::Deref for $ty {
            type Target = $crate::context::BaseContext;

            fn deref(&self) -> &Self::Target {
                &self.base
            }
        }

        impl std::ops::DerefMut for $ty {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.base
            }
        }
    };
}

// Family modules import this by path.
pub(crate) use deref_base;

/// Handler set for entity resolution events.
pub type EntityEventHandlers = crate::EventHandlerSet<EntityResolutionContext>;
/// Handler set for data query events.
pub type DataQueryHandlers = crate::EventHandlerSet<DataQueryContext>;
/// Handler set for REST service and LLM transformation events.
pub type TransformHandlers = crate::EventHandlerSet<TransformContext>;
/// Handler set for LLM component events.
pub type LlmComponentHandlers = crate::EventHandlerSet<LlmComponentContext>;

/// Normalize a candidate bot message, falling back to a `raw` wrapper.
pub(crate) fn candidate_message(payload: impl Into<Value>) -> Value {
    Value::from(MessageModel::new(payload).into_payload_or_raw())
}
