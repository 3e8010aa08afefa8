//! The structured record that traverses the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A scalar or string field value. `BTreeMap` keeps field order stable for
/// the round-trip tests in the rule store and makes snapshot assertions
/// deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    fields: BTreeMap<String, Value>,
}

impl Event {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Iterates all string-valued fields, for compliance keyword scanning.
    pub fn string_values(&self) -> impl Iterator<Item = &str> {
        self.fields.values().filter_map(Value::as_str)
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Pass,
    Flag,
    Drop,
    Enrich,
}

#[derive(Debug, Clone)]
pub enum FilterOutcome {
    Pass(Event),
    Flag(Event),
    Drop,
    Enrich(Event),
}

impl FilterOutcome {
    pub fn action(&self) -> Action {
        match self {
            FilterOutcome::Pass(_) => Action::Pass,
            FilterOutcome::Flag(_) => Action::Flag,
            FilterOutcome::Drop => Action::Drop,
            FilterOutcome::Enrich(_) => Action::Enrich,
        }
    }

    pub fn into_event(self) -> Option<Event> {
        match self {
            FilterOutcome::Pass(e) | FilterOutcome::Flag(e) | FilterOutcome::Enrich(e) => Some(e),
            FilterOutcome::Drop => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_event_has_no_fields() {
        let e = Event::new();
        assert!(e.is_empty());
        assert_eq!(e.get("anything"), None);
    }

    #[test]
    fn with_field_is_retrievable() {
        let e = Event::new().with_field("event_type", "login_failed");
        assert_eq!(e.get_str("event_type"), Some("login_failed"));
    }
}
