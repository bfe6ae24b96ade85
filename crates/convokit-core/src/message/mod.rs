//! Message model: validates and normalizes outgoing message payloads.
//!
//! [`MessageModel::new`] accepts anything JSON-shaped:
//!
//! 1. a bare string becomes a `text` message;
//! 2. the legacy choice shape (`{"text": .., "choices": [..]}` without a
//!    `type`) becomes a `text` message with one postback action per choice;
//! 3. everything else is validated against the discriminated schema in
//!    [`types`].
//!
//! Validation never panics: failures are kept on the model and reported
//! through [`MessageModel::validation_error`].

pub mod types;

use serde_json::{Map, Value};
use tracing::debug;

pub use types::{
    Action, AgentMessage, Attachment, AttachmentType, Card, CardLayout, ConversationMessage,
    Field, Location, MessageCommon, MessagePayload, ReadOnlyForm, Row, TableHeading,
    CONVERSATION_MESSAGE_TYPES,
};

/// Why a candidate payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("message payload must be a string or an object, got {0}")]
    UnsupportedShape(&'static str),

    #[error("message payload is missing the `type` discriminator")]
    MissingType,

    #[error("unknown message type `{0}`")]
    UnknownType(String),

    #[error("invalid `{message_type}` message: {reason}")]
    Invalid {
        message_type: String,
        reason: String,
    },
}

impl ValidationError {
    fn invalid(message_type: &str, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            message_type: message_type.to_string(),
            reason: reason.into(),
        }
    }
}

/// A candidate message payload together with its validation outcome.
#[derive(Debug, Clone)]
pub struct MessageModel {
    raw: Value,
    payload: Option<MessagePayload>,
    error: Option<ValidationError>,
}

impl MessageModel {
    /// Parse and validate a candidate payload.
    ///
    /// A JSON `null` is treated as empty input: neither a payload nor an
    /// error is produced.
    pub fn new(payload: impl Into<Value>) -> Self {
        let raw = payload.into();
        if raw.is_null() {
            return Self {
                raw,
                payload: None,
                error: None,
            };
        }

        match normalize(&raw) {
            Ok(payload) => Self {
                raw,
                payload: Some(payload),
                error: None,
            },
            Err(error) => {
                debug!(%error, "Message payload failed validation");
                Self {
                    raw,
                    payload: None,
                    error: Some(error),
                }
            }
        }
    }

    /// Wrap an already well-formed payload built with the static constructors.
    pub fn from_payload(payload: impl Into<MessagePayload>) -> Self {
        let payload = payload.into();
        let raw = serde_json::to_value(&payload).unwrap_or(Value::Null);
        Self {
            raw,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.payload.is_some()
    }

    /// The normalized payload, or `None` when validation failed.
    pub fn message_payload(&self) -> Option<&MessagePayload> {
        self.payload.as_ref()
    }

    /// The input exactly as it was given.
    pub fn raw_payload(&self) -> &Value {
        &self.raw
    }

    pub fn validation_error(&self) -> Option<&ValidationError> {
        self.error.as_ref()
    }

    /// Consume the model, yielding the normalized payload or the raw input
    /// wrapped as an opaque `raw` message.
    pub fn into_payload_or_raw(self) -> MessagePayload {
        match self.payload {
            Some(payload) => payload,
            None => ConversationMessage::raw(self.raw).into(),
        }
    }
}

impl From<&str> for MessageModel {
    fn from(text: &str) -> Self {
        MessageModel::new(text)
    }
}

fn normalize(raw: &Value) -> Result<MessagePayload, ValidationError> {
    let object = match raw {
        Value::String(text) => {
            let message = ConversationMessage::text(text.clone());
            return checked(message);
        }
        Value::Object(object) => object,
        Value::Array(_) => return Err(ValidationError::UnsupportedShape("an array")),
        Value::Number(_) => return Err(ValidationError::UnsupportedShape("a number")),
        Value::Bool(_) => return Err(ValidationError::UnsupportedShape("a boolean")),
        Value::Null => return Err(ValidationError::UnsupportedShape("null")),
    };

    if !object.contains_key("type") && object.get("choices").is_some_and(Value::is_array) {
        return checked(rewrite_choices(object)?);
    }

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingType)?;

    if kind.starts_with("agent") {
        let message: AgentMessage = serde_json::from_value(raw.clone())
            .map_err(|e| ValidationError::invalid(kind, e.to_string()))?;
        return Ok(message.into());
    }

    if !CONVERSATION_MESSAGE_TYPES.contains(&kind) {
        return Err(ValidationError::UnknownType(kind.to_string()));
    }

    let message: ConversationMessage = serde_json::from_value(raw.clone())
        .map_err(|e| ValidationError::invalid(kind, e.to_string()))?;
    checked(message)
}

fn checked(message: ConversationMessage) -> Result<MessagePayload, ValidationError> {
    message
        .check()
        .map_err(|reason| ValidationError::invalid(message.message_type(), reason))?;
    Ok(message.into())
}

/// `{"text": "Pick one", "choices": ["a", "b"]}` → text with postback actions.
fn rewrite_choices(object: &Map<String, Value>) -> Result<ConversationMessage, ValidationError> {
    let text = object
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::invalid("text", "choice message requires a text"))?;

    let choices = object
        .get("choices")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let actions = choices
        .iter()
        .enumerate()
        .map(|(i, choice)| {
            choice
                .as_str()
                .map(|label| Action::postback(label, label))
                .ok_or_else(|| {
                    ValidationError::invalid("text", format!("choices[{i}] must be a string"))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ConversationMessage::text_with_actions(text, actions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_bare_string_becomes_text() {
        let model = MessageModel::new("hello");
        assert!(model.is_valid());
        let payload = model.message_payload().unwrap();
        assert_eq!(payload.message_type(), "text");
        assert_eq!(payload.text(), Some("hello"));
        assert!(model.validation_error().is_none());
    }

    #[test]
    fn test_unknown_attachment_type_is_invalid() {
        let model = MessageModel::new(json!({
            "type": "attachment",
            "attachment": {"type": "unknown", "url": "x"}
        }));
        assert!(!model.is_valid());
        assert!(model.message_payload().is_none());
        assert!(matches!(
            model.validation_error(),
            Some(ValidationError::Invalid { message_type, .. }) if message_type == "attachment"
        ));
        assert_eq!(model.raw_payload()["attachment"]["type"], "unknown");
    }

    #[test]
    fn test_choices_become_postback_actions_in_order() {
        let model = MessageModel::new(json!({
            "text": "Pick a size",
            "choices": ["small", "medium", "large"]
        }));
        let value = serde_json::to_value(model.message_payload().unwrap()).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["text"], "Pick a size");
        let labels: Vec<_> = value["actions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["label"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(labels, vec!["small", "medium", "large"]);
        assert_eq!(value["actions"][1]["postback"], "medium");
    }

    #[test]
    fn test_non_string_choice_rejected() {
        let model = MessageModel::new(json!({"text": "Pick", "choices": ["a", 2]}));
        assert!(!model.is_valid());
    }

    #[test]
    fn test_null_produces_neither_payload_nor_error() {
        let model = MessageModel::new(Value::Null);
        assert!(!model.is_valid());
        assert!(model.message_payload().is_none());
        assert!(model.validation_error().is_none());
    }

    #[test]
    fn test_missing_type() {
        let model = MessageModel::new(json!({"text": "no type"}));
        assert_eq!(model.validation_error(), Some(&ValidationError::MissingType));
    }

    #[test]
    fn test_unknown_type() {
        let model = MessageModel::new(json!({"type": "hologram"}));
        assert_eq!(
            model.validation_error(),
            Some(&ValidationError::UnknownType("hologram".to_string()))
        );
    }

    #[test]
    fn test_agent_message_keeps_unknown_fields() {
        let model = MessageModel::new(json!({
            "type": "agentThinking",
            "steps": ["search", "summarize"],
            "confidence": 0.8
        }));
        let value = serde_json::to_value(model.message_payload().unwrap()).unwrap();
        assert_eq!(value["steps"][1], "summarize");
        assert_eq!(value["confidence"], 0.8);
    }

    #[test]
    fn test_text_strips_unknown_fields() {
        let model = MessageModel::new(json!({"type": "text", "text": "hi", "colour": "red"}));
        let value = serde_json::to_value(model.message_payload().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "text", "text": "hi"}));
    }

    #[test]
    fn test_empty_text_rejected() {
        assert!(!MessageModel::new("").is_valid());
    }

    #[test]
    fn test_card_without_cards_rejected() {
        let model = MessageModel::new(json!({"type": "card", "layout": "horizontal", "cards": []}));
        assert!(!model.is_valid());
    }

    #[test]
    fn test_invalid_falls_back_to_raw() {
        let model = MessageModel::new(json!([1, 2, 3]));
        assert_eq!(
            model.validation_error(),
            Some(&ValidationError::UnsupportedShape("an array"))
        );
        let payload = model.into_payload_or_raw();
        assert_eq!(payload.message_type(), "raw");
    }

    #[test]
    fn test_from_payload_is_valid() {
        let model = MessageModel::from_payload(ConversationMessage::location(1.0, 2.0));
        assert!(model.is_valid());
        assert_eq!(model.raw_payload()["location"]["latitude"], 1.0);
    }
}
