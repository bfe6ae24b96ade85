use serde_json::{Value, json};

/// Read-only view over the value of an `nlpresult` variable.
#[derive(Debug, Clone, Copy)]
pub struct NlpResult<'a> {
    value: &'a Value,
}

impl<'a> NlpResult<'a> {
    pub(crate) fn new(value: &'a Value) -> Self {
        Self { value }
    }

    /// Entity matches for `entity`, or the whole `entityMatches` object when
    /// no entity is named. An entity without matches yields an empty array.
    pub fn entity_matches(&self, entity: Option<&str>) -> Value {
        let matches = self.value.get("entityMatches");
        match entity {
            None => matches.cloned().unwrap_or_else(|| json!({})),
            Some(name) => matches
                .and_then(|m| m.get(name))
                .cloned()
                .unwrap_or_else(|| json!([])),
        }
    }

    /// Highest-ranked intent, if the classifier produced one.
    pub fn top_intent_match(&self) -> Option<&'a Value> {
        self.value
            .get("intentMatches")
            .and_then(|m| m.get("summary"))
            .and_then(Value::as_array)
            .and_then(|summary| summary.first())
    }

    /// The user utterance the result was computed for.
    pub fn query(&self) -> Option<&'a str> {
        self.value.get("query").and_then(Value::as_str)
    }

    pub fn raw(&self) -> &'a Value {
        self.value
    }
}
