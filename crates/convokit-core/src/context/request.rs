//! Wire types for inbound invocation requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type name that marks a variable as holding an NLP result.
pub const NLP_RESULT_TYPE: &str = "nlpresult";

/// Declared type of a context variable.
///
/// Primitive variables carry a bare type name (`"string"`, `"int"`, ...);
/// entity-typed variables carry a descriptor object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableType {
    Primitive(String),
    Entity(EntityType),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VariableType {
    /// The type name, e.g. `"float"` or `"nlpresult"`.
    pub fn name(&self) -> &str {
        match self {
            VariableType::Primitive(name) => name,
            VariableType::Entity(entity) => &entity.kind,
        }
    }

    pub fn is_nlp_result(&self) -> bool {
        self.name() == NLP_RESULT_TYPE
    }

    /// Best-fit type for a variable declared implicitly by a write.
    pub fn infer(value: &Value) -> Self {
        let name = match value {
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_f64() => "float",
            Value::Number(_) => "int",
            Value::Object(_) => "map",
            Value::Array(_) => "list",
            Value::String(_) | Value::Null => "string",
        };
        VariableType::Primitive(name.to_string())
    }
}

/// A context variable: `{type, value, entity}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    #[serde(rename = "type")]
    pub kind: VariableType,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub entity: bool,
}

/// The conversation context carried by every request and echoed in every
/// response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default)]
    pub variables: BTreeMap<String, Variable>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConversation {
    pub bot_id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    pub user_id: String,
    pub channel_id: String,
}

/// The user message that triggered the invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    pub message_payload: Value,
    #[serde(default)]
    pub retry_count: u32,
    pub channel_conversation: ChannelConversation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// A custom component invocation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    pub bot_id: String,
    pub platform_version: String,
    pub context: RequestContext,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub message: RequestMessage,
}

/// Fields every request family shares; validated before a unit is resolved.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub bot_id: String,
    pub platform_version: String,
    pub context: RequestContext,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_variable_types_parse() {
        let vars: BTreeMap<String, Variable> = serde_json::from_value(json!({
            "age": {"type": "float", "value": 100, "entity": false},
            "iResult": {"type": {"type": "nlpresult", "name": "nlpresult"}, "value": {}, "entity": true}
        }))
        .unwrap();
        assert_eq!(vars["age"].kind.name(), "float");
        assert!(!vars["age"].kind.is_nlp_result());
        assert!(vars["iResult"].kind.is_nlp_result());
        assert!(vars["iResult"].entity);
    }

    #[test]
    fn test_infer_types() {
        assert_eq!(VariableType::infer(&json!(1)).name(), "int");
        assert_eq!(VariableType::infer(&json!(1.5)).name(), "float");
        assert_eq!(VariableType::infer(&json!(true)).name(), "boolean");
        assert_eq!(VariableType::infer(&json!("x")).name(), "string");
        assert_eq!(VariableType::infer(&json!({})).name(), "map");
    }

    #[test]
    fn test_context_keeps_unknown_fields() {
        let ctx: RequestContext =
            serde_json::from_value(json!({"variables": {}, "parent": {"variables": {}}})).unwrap();
        assert!(ctx.extra.contains_key("parent"));
    }
}
