//! Data query: events raised while rendering the result of a query over a
//! business entity.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

use super::{candidate_message, deref_base};
use crate::component::EventHandlerType;
use crate::context::{BaseContext, ContextError, RequestContext, parse_request};
use crate::dispatch::{
    Effect, EventDescriptor, EventHandlerSet, HandlerFamily, QueuedEvent, replace_messages,
};

const CHANGE_UI_SETTINGS: &str = "changeUISettings";
const CHANGE_RESPONSE_DATA: &str = "changeResponseData";
const CHANGE_BOT_MESSAGES: &str = "changeBotMessages";
const FORMAT: &str = "format";

/// The `dataQueryContext` object of a data query request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQueryState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub ui_settings: Value,
    #[serde(default)]
    pub attribute_ui_settings: Map<String, Value>,
    /// Result rows, each an object keyed by attribute name.
    #[serde(default)]
    pub query_result: Vec<Value>,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataQueryRequest {
    bot_id: String,
    platform_version: String,
    context: RequestContext,
    data_query_context: DataQueryState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQueryResponse {
    pub platform_version: String,
    pub context: RequestContext,
    pub modify_context: bool,
    pub data_query_context: DataQueryState,
}

#[derive(Debug)]
pub struct DataQueryContext {
    base: BaseContext,
    state: DataQueryState,
}

deref_base!(DataQueryContext);

impl DataQueryContext {
    pub fn entity_name(&self) -> Option<&str> {
        self.state.entity_name.as_deref()
    }

    pub fn ui_settings(&self) -> &Value {
        &self.state.ui_settings
    }

    pub fn attribute_ui_settings(&self, attribute: &str) -> Option<&Value> {
        self.state.attribute_ui_settings.get(attribute)
    }

    pub fn query_result(&self) -> &[Value] {
        &self.state.query_result
    }

    pub fn messages(&self) -> &[Value] {
        &self.state.messages
    }

    pub fn add_message(&mut self, payload: impl Into<Value>) -> &mut Self {
        self.state.messages.push(candidate_message(payload));
        self
    }

    pub fn state(&self) -> &DataQueryState {
        &self.state
    }

    /// Rows holding `attribute`, with the properties a `format` handler sees.
    fn rows_with(&self, attribute: &str) -> Vec<(usize, Value)> {
        self.state
            .query_result
            .iter()
            .enumerate()
            .filter_map(|(index, row)| {
                let value = row.get(attribute)?;
                Some((
                    index,
                    json!({
                        "attributeName": attribute,
                        "attributeValue": value,
                        "row": row,
                    }),
                ))
            })
            .collect()
    }
}

impl HandlerFamily for DataQueryContext {
    type Response = DataQueryResponse;

    const TYPES: &'static [EventHandlerType] = &[EventHandlerType::DataQuery];

    fn from_request(body: Value) -> Result<Self, ContextError> {
        let request: DataQueryRequest = parse_request(body)?;
        Ok(Self {
            base: BaseContext::new(request.bot_id, request.platform_version, request.context),
            state: request.data_query_context,
        })
    }

    /// Entity UI settings, then attribute UI settings, then the rows, then
    /// per-row formatting, then the bot messages.
    fn events(&self, set: &EventHandlerSet<Self>) -> Vec<QueuedEvent> {
        let state = &self.state;
        let mut events = vec![QueuedEvent::new(
            EventDescriptor::entity(CHANGE_UI_SETTINGS),
            json!({ "uiSettings": state.ui_settings }),
        )];
        for attribute in set.attributes_handling(CHANGE_UI_SETTINGS) {
            events.push(QueuedEvent::new(
                EventDescriptor::attribute(attribute, CHANGE_UI_SETTINGS),
                json!({
                    "attributeName": attribute,
                    "uiSettings": state.attribute_ui_settings.get(attribute),
                }),
            ));
        }
        events.push(QueuedEvent::new(
            EventDescriptor::entity(CHANGE_RESPONSE_DATA),
            json!({ "responseData": state.query_result }),
        ));
        for attribute in set.attributes_handling(FORMAT) {
            events.push(QueuedEvent::new(
                EventDescriptor::attribute(attribute, FORMAT),
                Value::Null,
            ));
        }
        events.push(QueuedEvent::new(
            EventDescriptor::entity(CHANGE_BOT_MESSAGES),
            json!({ "messages": state.messages }),
        ));
        events
    }

    fn effect(event: &EventDescriptor) -> Effect<Self> {
        if event.custom {
            return Effect::Ignore;
        }
        match (event.name.as_str(), event.attribute_name()) {
            (CHANGE_UI_SETTINGS, None) => {
                Effect::Replace(|ctx, _, value| ctx.state.ui_settings = value)
            }
            (CHANGE_UI_SETTINGS, Some(_)) => Effect::Replace(|ctx, event, value| {
                if let Some(attribute) = event.attribute_name() {
                    ctx.state
                        .attribute_ui_settings
                        .insert(attribute.to_string(), value);
                }
            }),
            (CHANGE_RESPONSE_DATA, None) => Effect::Replace(|ctx, _, value| match value {
                Value::Array(rows) => ctx.state.query_result = rows,
                other => warn!(
                    returned = %other,
                    "changeResponseData must return a list of rows, keeping current rows"
                ),
            }),
            (FORMAT, Some(_)) => Effect::PerRow {
                rows: |ctx, event| {
                    event
                        .attribute_name()
                        .map(|attribute| ctx.rows_with(attribute))
                        .unwrap_or_default()
                },
                write: |ctx, event, index, value| {
                    let (Some(attribute), Some(Value::Object(row))) =
                        (event.attribute_name(), ctx.state.query_result.get_mut(index))
                    else {
                        return;
                    };
                    row.insert(attribute.to_string(), value);
                },
            },
            (CHANGE_BOT_MESSAGES, None) => Effect::Replace(|ctx, _, value| {
                let component = ctx.state.entity_name.clone().unwrap_or_default();
                replace_messages(&mut ctx.state.messages, value, &component);
            }),
            _ => Effect::Ignore,
        }
    }

    fn into_response(self) -> DataQueryResponse {
        let (platform_version, context, modify_context) = self.base.into_parts();
        DataQueryResponse {
            platform_version,
            context,
            modify_context,
            data_query_context: self.state,
        }
    }
}
