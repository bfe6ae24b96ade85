//! Invocation contexts.
//!
//! [`BaseContext`] owns the variable store shared by every request family.
//! [`ComponentContext`] layers the custom component response on top of it;
//! the event handler families in [`crate::handlers`] do the same for their
//! own envelopes.

mod component;
mod nlp;
pub mod request;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

pub use component::{ComponentContext, ComponentResponse};
pub use nlp::NlpResult;
pub use request::{InvocationRequest, RequestContext, RequestEnvelope, Variable, VariableType};

/// Errors raised while building or querying a context.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("request has no `context` object")]
    MissingContext,

    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("no nlpresult variable found in the context")]
    NlpResultNotFound,

    #[error("context holds several nlpresult variables ({0}); name one explicitly")]
    AmbiguousNlpResult(String),

    #[error("variable `{0}` is not declared in the context")]
    UnknownVariable(String),
}

/// Parse a request body, reporting a missing `context` before any other
/// schema error.
pub(crate) fn parse_request<T: DeserializeOwned>(body: Value) -> Result<T, ContextError> {
    require_context(&body)?;
    Ok(serde_json::from_value(body)?)
}

/// Check the fields every request family shares without consuming the body.
pub(crate) fn parse_envelope(body: &Value) -> Result<RequestEnvelope, ContextError> {
    require_context(body)?;
    Ok(RequestEnvelope::deserialize(body)?)
}

fn require_context(body: &Value) -> Result<(), ContextError> {
    if body.get("context").is_none_or(Value::is_null) {
        return Err(ContextError::MissingContext);
    }
    Ok(())
}

/// Variable store and identity fields common to every request family.
#[derive(Debug, Clone)]
pub struct BaseContext {
    bot_id: String,
    platform_version: String,
    context: RequestContext,
    modify_context: bool,
}

impl BaseContext {
    pub fn new(
        bot_id: impl Into<String>,
        platform_version: impl Into<String>,
        context: RequestContext,
    ) -> Self {
        Self {
            bot_id: bot_id.into(),
            platform_version: platform_version.into(),
            context,
            modify_context: false,
        }
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn platform_version(&self) -> &str {
        &self.platform_version
    }

    /// The (possibly modified) conversation context.
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Read a variable value. Undeclared and null variables read as `None`.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.context
            .variables
            .get(name)
            .map(|var| &var.value)
            .filter(|value| !value.is_null())
    }

    /// Write a variable value and mark the context as modified.
    ///
    /// A declared variable keeps its type. An undeclared one is declared
    /// with a type inferred from `value`.
    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        match self.context.variables.get_mut(name) {
            Some(var) => var.value = value,
            None => {
                debug!(variable = %name, "Declaring variable on first write");
                self.context.variables.insert(
                    name.to_string(),
                    Variable {
                        kind: VariableType::infer(&value),
                        value,
                        entity: false,
                    },
                );
            }
        }
        self.modify_context = true;
        self
    }

    pub fn variable_type(&self, name: &str) -> Option<&VariableType> {
        self.context.variables.get(name).map(|var| &var.kind)
    }

    /// Names of all declared variables, sorted.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.context.variables.keys().map(String::as_str)
    }

    /// True once any variable has been written during this invocation.
    pub fn modify_context(&self) -> bool {
        self.modify_context
    }

    /// Read-only view over an NLP result variable.
    ///
    /// Without a name, the context must hold exactly one `nlpresult` variable.
    pub fn nlp_result(&self, name: Option<&str>) -> Result<NlpResult<'_>, ContextError> {
        let variables = &self.context.variables;
        let var = match name {
            Some(name) => variables
                .get(name)
                .ok_or_else(|| ContextError::UnknownVariable(name.to_string()))?,
            None => {
                let candidates: Vec<(&String, &Variable)> = variables
                    .iter()
                    .filter(|(_, var)| var.kind.is_nlp_result())
                    .collect();
                match candidates.as_slice() {
                    [] => return Err(ContextError::NlpResultNotFound),
                    [(_, var)] => *var,
                    several => {
                        let names: Vec<&str> =
                            several.iter().map(|(name, _)| name.as_str()).collect();
                        return Err(ContextError::AmbiguousNlpResult(names.join(", ")));
                    }
                }
            }
        };
        Ok(NlpResult::new(&var.value))
    }

    pub(crate) fn into_parts(self) -> (String, RequestContext, bool) {
        (self.platform_version, self.context, self.modify_context)
    }
}
