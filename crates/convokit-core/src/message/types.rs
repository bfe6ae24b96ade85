//! Conversation message payload types.
//!
//! Every outgoing message is one variant of [`MessagePayload`]: either a
//! standard [`ConversationMessage`] discriminated by its `type` field, or an
//! [`AgentMessage`] (`agent*` types) that carries arbitrary extra fields.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Fields shared by every standard conversation message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCommon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_extensions: Option<Map<String, Value>>,
}

/// Visual style hint for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionStyle {
    Primary,
    Default,
    Danger,
}

/// How a channel should render an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionDisplayType {
    Button,
    Link,
    Icon,
}

/// Fields shared by every action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCommon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<ActionStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<ActionDisplayType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_extensions: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostbackAction {
    #[serde(flatten)]
    pub common: ActionCommon,
    pub postback: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlAction {
    #[serde(flatten)]
    pub common: ActionCommon,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAction {
    #[serde(flatten)]
    pub common: ActionCommon,
    pub phone_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlainAction {
    #[serde(flatten)]
    pub common: ActionCommon,
}

/// An action attached to a message, card, row, or form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Postback(PostbackAction),
    Url(UrlAction),
    Call(CallAction),
    Share(PlainAction),
    Location(PlainAction),
}

impl Action {
    /// A postback action; the postback is echoed back to the bot when chosen.
    pub fn postback(label: impl Into<String>, postback: impl Into<Value>) -> Self {
        Action::Postback(PostbackAction {
            common: ActionCommon::labelled(label),
            postback: postback.into(),
        })
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Action::Url(UrlAction {
            common: ActionCommon::labelled(label),
            url: url.into(),
        })
    }

    pub fn call(label: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Action::Call(CallAction {
            common: ActionCommon::labelled(label),
            phone_number: phone_number.into(),
        })
    }

    pub fn share() -> Self {
        Action::Share(PlainAction::default())
    }

    pub fn location(label: impl Into<String>) -> Self {
        Action::Location(PlainAction {
            common: ActionCommon::labelled(label),
        })
    }

    pub fn common(&self) -> &ActionCommon {
        match self {
            Action::Postback(a) => &a.common,
            Action::Url(a) => &a.common,
            Action::Call(a) => &a.common,
            Action::Share(a) | Action::Location(a) => &a.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut ActionCommon {
        match self {
            Action::Postback(a) => &mut a.common,
            Action::Url(a) => &mut a.common,
            Action::Call(a) => &mut a.common,
            Action::Share(a) | Action::Location(a) => &mut a.common,
        }
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.common_mut().image_url = Some(image_url.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.common_mut().keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn check(&self) -> Result<(), String> {
        match self {
            Action::Postback(a) if a.postback.is_null() => {
                Err("postback action requires a postback value".to_string())
            }
            Action::Url(a) if a.url.is_empty() => Err("url action requires a url".to_string()),
            Action::Call(a) if a.phone_number.is_empty() => {
                Err("call action requires a phoneNumber".to_string())
            }
            _ => Ok(()),
        }
    }
}

impl ActionCommon {
    fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMessage {
    #[serde(flatten)]
    pub common: MessageCommon,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardLayout {
    #[default]
    Horizontal,
    Vertical,
}

/// A single card inside a card message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_extensions: Option<Map<String, Value>>,
}

impl Card {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            image_url: None,
            url: None,
            actions: Vec::new(),
            channel_extensions: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardMessage {
    #[serde(flatten)]
    pub common: MessageCommon,
    #[serde(default)]
    pub layout: CardLayout,
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttachmentType {
    Image,
    Video,
    Audio,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentType,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentMessage {
    #[serde(flatten)]
    pub common: MessageCommon,
    pub attachment: Attachment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMessage {
    #[serde(flatten)]
    pub common: MessageCommon,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostbackMessage {
    #[serde(flatten)]
    pub common: MessageCommon,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub postback: Value,
}

/// Channel-specific payload passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(flatten)]
    pub common: MessageCommon,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Alignment {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldDisplayType {
    #[default]
    Text,
    Link,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableHeading {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
}

/// A labelled value inside a table row or a form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub display_type: FieldDisplayType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
}

impl Field {
    pub fn new(label: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            label: Some(label.into()),
            value: value.into(),
            display_type: FieldDisplayType::Text,
            link_label: None,
            alignment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_extensions: Option<Map<String, Value>>,
}

impl Row {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            select_action: None,
            channel_extensions: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOnlyForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_extensions: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub total_count: u32,
    pub range_size: u32,
    pub range_start: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMessage {
    #[serde(flatten)]
    pub common: MessageCommon,
    pub headings: Vec<TableHeading>,
    pub rows: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination_info: Option<PaginationInfo>,
}

fn default_form_columns() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormMessage {
    #[serde(flatten)]
    pub common: MessageCommon,
    pub forms: Vec<ReadOnlyForm>,
    #[serde(default = "default_form_columns")]
    pub form_columns: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination_info: Option<PaginationInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFormMessage {
    #[serde(flatten)]
    pub common: MessageCommon,
    pub headings: Vec<TableHeading>,
    pub rows: Vec<Row>,
    pub forms: Vec<ReadOnlyForm>,
    #[serde(default = "default_form_columns")]
    pub form_columns: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_form_button_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination_info: Option<PaginationInfo>,
}

/// A standard conversation message, discriminated by `type`.
///
/// Fields unknown to a variant are dropped during normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConversationMessage {
    Text(TextMessage),
    Card(CardMessage),
    Attachment(AttachmentMessage),
    Location(LocationMessage),
    Postback(PostbackMessage),
    Raw(RawMessage),
    Table(TableMessage),
    Form(FormMessage),
    TableForm(TableFormMessage),
}

/// Discriminators accepted by [`ConversationMessage`].
pub const CONVERSATION_MESSAGE_TYPES: &[&str] = &[
    "text",
    "card",
    "attachment",
    "location",
    "postback",
    "raw",
    "table",
    "form",
    "tableForm",
];

impl ConversationMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::text_with_actions(text, Vec::new())
    }

    pub fn text_with_actions(text: impl Into<String>, actions: Vec<Action>) -> Self {
        ConversationMessage::Text(TextMessage {
            common: MessageCommon {
                actions,
                ..MessageCommon::default()
            },
            text: text.into(),
        })
    }

    pub fn card(layout: CardLayout, cards: Vec<Card>) -> Self {
        ConversationMessage::Card(CardMessage {
            common: MessageCommon::default(),
            layout,
            cards,
        })
    }

    pub fn attachment(kind: AttachmentType, url: impl Into<String>) -> Self {
        ConversationMessage::Attachment(AttachmentMessage {
            common: MessageCommon::default(),
            attachment: Attachment {
                kind,
                url: url.into(),
                title: None,
            },
        })
    }

    pub fn location(latitude: f64, longitude: f64) -> Self {
        ConversationMessage::Location(LocationMessage {
            common: MessageCommon::default(),
            location: Location {
                latitude,
                longitude,
                title: None,
                url: None,
            },
        })
    }

    pub fn postback(postback: impl Into<Value>) -> Self {
        ConversationMessage::Postback(PostbackMessage {
            common: MessageCommon::default(),
            text: None,
            postback: postback.into(),
        })
    }

    pub fn raw(payload: impl Into<Value>) -> Self {
        ConversationMessage::Raw(RawMessage {
            common: MessageCommon::default(),
            payload: payload.into(),
        })
    }

    pub fn table(headings: Vec<TableHeading>, rows: Vec<Row>) -> Self {
        ConversationMessage::Table(TableMessage {
            common: MessageCommon::default(),
            headings,
            rows,
            pagination_info: None,
        })
    }

    pub fn form(forms: Vec<ReadOnlyForm>, form_columns: u8) -> Self {
        ConversationMessage::Form(FormMessage {
            common: MessageCommon::default(),
            forms,
            form_columns,
            pagination_info: None,
        })
    }

    /// The `type` discriminator of this message.
    pub fn message_type(&self) -> &'static str {
        match self {
            ConversationMessage::Text(_) => "text",
            ConversationMessage::Card(_) => "card",
            ConversationMessage::Attachment(_) => "attachment",
            ConversationMessage::Location(_) => "location",
            ConversationMessage::Postback(_) => "postback",
            ConversationMessage::Raw(_) => "raw",
            ConversationMessage::Table(_) => "table",
            ConversationMessage::Form(_) => "form",
            ConversationMessage::TableForm(_) => "tableForm",
        }
    }

    pub fn common(&self) -> &MessageCommon {
        match self {
            ConversationMessage::Text(m) => &m.common,
            ConversationMessage::Card(m) => &m.common,
            ConversationMessage::Attachment(m) => &m.common,
            ConversationMessage::Location(m) => &m.common,
            ConversationMessage::Postback(m) => &m.common,
            ConversationMessage::Raw(m) => &m.common,
            ConversationMessage::Table(m) => &m.common,
            ConversationMessage::Form(m) => &m.common,
            ConversationMessage::TableForm(m) => &m.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut MessageCommon {
        match self {
            ConversationMessage::Text(m) => &mut m.common,
            ConversationMessage::Card(m) => &mut m.common,
            ConversationMessage::Attachment(m) => &mut m.common,
            ConversationMessage::Location(m) => &mut m.common,
            ConversationMessage::Postback(m) => &mut m.common,
            ConversationMessage::Raw(m) => &mut m.common,
            ConversationMessage::Table(m) => &mut m.common,
            ConversationMessage::Form(m) => &mut m.common,
            ConversationMessage::TableForm(m) => &mut m.common,
        }
    }

    /// Append global actions. Not re-validated.
    pub fn add_global_actions(&mut self, actions: Vec<Action>) -> &mut Self {
        self.common_mut().global_actions.extend(actions);
        self
    }

    /// Merge channel extensions into the message. Not re-validated.
    pub fn add_channel_extensions(&mut self, extensions: Map<String, Value>) -> &mut Self {
        self.common_mut()
            .channel_extensions
            .get_or_insert_with(Map::new)
            .extend(extensions);
        self
    }

    /// Constraints the schema cannot express through types alone.
    pub(crate) fn check(&self) -> Result<(), String> {
        let common = self.common();
        for action in common.actions.iter().chain(&common.global_actions) {
            action.check()?;
        }
        match self {
            ConversationMessage::Text(m) if m.text.is_empty() => {
                Err("text must not be empty".to_string())
            }
            ConversationMessage::Card(m) => {
                if m.cards.is_empty() {
                    return Err("cards must contain at least one card".to_string());
                }
                for (i, card) in m.cards.iter().enumerate() {
                    if card.title.is_empty() {
                        return Err(format!("cards[{i}].title must not be empty"));
                    }
                    card.actions.iter().try_for_each(Action::check)?;
                }
                Ok(())
            }
            ConversationMessage::Attachment(m) if m.attachment.url.is_empty() => {
                Err("attachment.url must not be empty".to_string())
            }
            ConversationMessage::Location(m) => {
                let loc = &m.location;
                if !(-90.0..=90.0).contains(&loc.latitude) {
                    return Err(format!("location.latitude out of range: {}", loc.latitude));
                }
                if !(-180.0..=180.0).contains(&loc.longitude) {
                    return Err(format!(
                        "location.longitude out of range: {}",
                        loc.longitude
                    ));
                }
                Ok(())
            }
            ConversationMessage::Postback(m) if m.postback.is_null() => {
                Err("postback must not be null".to_string())
            }
            ConversationMessage::Table(m) if m.headings.is_empty() => {
                Err("headings must contain at least one column".to_string())
            }
            ConversationMessage::Form(m) => {
                if m.forms.is_empty() {
                    return Err("forms must contain at least one form".to_string());
                }
                check_form_columns(m.form_columns)
            }
            ConversationMessage::TableForm(m) => {
                if m.headings.is_empty() {
                    return Err("headings must contain at least one column".to_string());
                }
                check_form_columns(m.form_columns)
            }
            _ => Ok(()),
        }
    }
}

fn check_form_columns(columns: u8) -> Result<(), String> {
    if (1..=2).contains(&columns) {
        Ok(())
    } else {
        Err(format!("formColumns must be 1 or 2, got {columns}"))
    }
}

/// An agent-authored message (`agent*` types). Unknown fields are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    #[serde(rename = "type", deserialize_with = "agent_type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

fn agent_type<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let kind = String::deserialize(deserializer)?;
    if kind.starts_with("agent") {
        Ok(kind)
    } else {
        Err(serde::de::Error::custom(format!(
            "`{kind}` is not an agent message type"
        )))
    }
}

/// A validated, normalized message payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessagePayload {
    Conversation(ConversationMessage),
    Agent(AgentMessage),
}

impl MessagePayload {
    pub fn message_type(&self) -> &str {
        match self {
            MessagePayload::Conversation(m) => m.message_type(),
            MessagePayload::Agent(m) => &m.kind,
        }
    }

    pub fn as_conversation(&self) -> Option<&ConversationMessage> {
        match self {
            MessagePayload::Conversation(m) => Some(m),
            MessagePayload::Agent(_) => None,
        }
    }

    /// Text of a `text` message, if this is one.
    pub fn text(&self) -> Option<&str> {
        match self {
            MessagePayload::Conversation(ConversationMessage::Text(m)) => Some(&m.text),
            _ => None,
        }
    }
}

impl From<ConversationMessage> for MessagePayload {
    fn from(message: ConversationMessage) -> Self {
        MessagePayload::Conversation(message)
    }
}

impl From<AgentMessage> for MessagePayload {
    fn from(message: AgentMessage) -> Self {
        MessagePayload::Agent(message)
    }
}

impl From<MessagePayload> for Value {
    fn from(payload: MessagePayload) -> Self {
        serde_json::to_value(payload).unwrap_or(Value::Null)
    }
}

impl From<ConversationMessage> for Value {
    fn from(message: ConversationMessage) -> Self {
        serde_json::to_value(message).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_serializes_with_discriminator() {
        let msg = ConversationMessage::text("hi");
        assert_eq!(serde_json::to_value(&msg).unwrap(), json!({"type": "text", "text": "hi"}));
    }

    #[test]
    fn test_table_form_discriminator_is_camel_case() {
        let value = json!({
            "type": "tableForm",
            "headings": [{"label": "Name"}],
            "rows": [],
            "forms": []
        });
        let msg: ConversationMessage = serde_json::from_value(value).unwrap();
        assert_eq!(msg.message_type(), "tableForm");
    }

    #[test]
    fn test_postback_action_constructor() {
        let action = Action::postback("Yes", json!({"answer": "yes"}));
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "postback");
        assert_eq!(value["label"], "Yes");
        assert_eq!(value["postback"]["answer"], "yes");
    }

    #[test]
    fn test_add_channel_extensions_merges() {
        let mut msg = ConversationMessage::text("hi");
        let mut first = Map::new();
        first.insert("a".into(), json!(1));
        let mut second = Map::new();
        second.insert("b".into(), json!(2));
        msg.add_channel_extensions(first).add_channel_extensions(second);

        let ext = msg.common().channel_extensions.as_ref().unwrap();
        assert_eq!(ext.len(), 2);
    }

    #[test]
    fn test_add_global_actions_skips_validation() {
        let mut msg = ConversationMessage::text("hi");
        msg.add_global_actions(vec![Action::url("Docs", "")]);
        assert_eq!(msg.common().global_actions.len(), 1);
        assert!(msg.check().is_err());
    }

    #[test]
    fn test_agent_type_must_have_prefix() {
        let ok: Result<AgentMessage, _> =
            serde_json::from_value(json!({"type": "agentReasoning", "steps": [1, 2]}));
        assert_eq!(ok.unwrap().fields["steps"], json!([1, 2]));

        let err: Result<AgentMessage, _> = serde_json::from_value(json!({"type": "text"}));
        assert!(err.is_err());
    }

    #[test]
    fn test_card_builder() {
        let card = Card::new("Pizza")
            .with_description("Large")
            .with_action(Action::postback("Order", "order"));
        let msg = ConversationMessage::card(CardLayout::Vertical, vec![card]);
        assert!(msg.check().is_ok());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["layout"], "vertical");
        assert_eq!(value["cards"][0]["actions"][0]["label"], "Order");
    }

    #[test]
    fn test_location_range_checked() {
        assert!(ConversationMessage::location(91.0, 0.0).check().is_err());
        assert!(ConversationMessage::location(45.0, 7.5).check().is_ok());
    }
}
