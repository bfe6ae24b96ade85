//! Builders for invocation request bodies.

use serde_json::{Map, Value, json};

/// Fluent builder for the JSON body of an invocation request.
///
/// `build()` yields a custom-component request; `envelope()` yields the
/// common part of an event handler envelope with extra fields merged in.
///
/// # Example
///
/// ```ignore
/// let body = RequestBuilder::new()
///     .text("hello")
///     .variable("age", "int", json!(42))
///     .property("name", json!("Ada"))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    bot_id: String,
    platform_version: String,
    variables: Map<String, Value>,
    properties: Map<String, Value>,
    payload: Value,
    channel_type: String,
    user_id: String,
    session_id: String,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            bot_id: "test-bot".to_string(),
            platform_version: "1.1".to_string(),
            variables: Map::new(),
            properties: Map::new(),
            payload: json!({"type": "text", "text": ""}),
            channel_type: "test".to_string(),
            user_id: "user-1".to_string(),
            session_id: "session-1".to_string(),
        }
    }

    pub fn bot_id(mut self, bot_id: &str) -> Self {
        self.bot_id = bot_id.to_string();
        self
    }

    pub fn platform_version(mut self, version: &str) -> Self {
        self.platform_version = version.to_string();
        self
    }

    /// Declare a context variable of a primitive type.
    pub fn variable(mut self, name: &str, kind: &str, value: Value) -> Self {
        self.variables.insert(
            name.to_string(),
            json!({"type": kind, "value": value, "entity": false}),
        );
        self
    }

    /// Declare an entity-typed context variable.
    pub fn entity_variable(mut self, name: &str, entity: &str, value: Value) -> Self {
        self.variables.insert(
            name.to_string(),
            json!({
                "type": {"type": "ENTITY", "name": entity},
                "value": value,
                "entity": true
            }),
        );
        self
    }

    /// Declare an NLP result variable holding `value`.
    pub fn nlp_result(mut self, name: &str, value: Value) -> Self {
        self.variables.insert(
            name.to_string(),
            json!({"type": "nlpresult", "value": value, "entity": false}),
        );
        self
    }

    pub fn property(mut self, name: &str, value: Value) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.payload = json!({"type": "text", "text": text});
        self
    }

    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn channel_type(mut self, channel_type: &str) -> Self {
        self.channel_type = channel_type.to_string();
        self
    }

    pub fn user_id(mut self, user_id: &str) -> Self {
        self.user_id = user_id.to_string();
        self
    }

    pub fn session_id(mut self, session_id: &str) -> Self {
        self.session_id = session_id.to_string();
        self
    }

    /// A custom-component invocation request.
    pub fn build(self) -> Value {
        json!({
            "botId": self.bot_id,
            "platformVersion": self.platform_version,
            "context": {"variables": self.variables},
            "properties": self.properties,
            "message": {
                "messagePayload": self.payload,
                "retryCount": 0,
                "channelConversation": {
                    "botId": self.bot_id,
                    "sessionId": self.session_id,
                    "type": self.channel_type,
                    "userId": self.user_id,
                    "channelId": "channel-1"
                },
                "id": "message-1"
            }
        })
    }

    /// An event handler envelope: `botId`, `platformVersion` and `context`,
    /// plus every field of `fields` (which must be an object).
    pub fn envelope(self, fields: Value) -> Value {
        let mut body = json!({
            "botId": self.bot_id,
            "platformVersion": self.platform_version,
            "context": {"variables": self.variables},
        });
        if let (Some(body), Value::Object(fields)) = (body.as_object_mut(), fields) {
            body.extend(fields);
        }
        body
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
