//! Accumulated run context threaded between reasoning steps
//!
//! The context visible to step N+1 is exactly the original input events
//! plus the N prior outputs keyed by `output_key`. Merging is
//! last-write-wins; the step assembler guarantees keys are unique, so in
//! practice no output is ever overwritten.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::Result;
use crate::events::EventRecord;

#[derive(Debug, Clone)]
pub struct RunContext {
    date: NaiveDate,
    events: Vec<EventRecord>,
    outputs: BTreeMap<String, Value>,
}

impl RunContext {
    pub fn new(date: NaiveDate, events: Vec<EventRecord>) -> Self {
        Self {
            date,
            events,
            outputs: BTreeMap::new(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn outputs(&self) -> &BTreeMap<String, Value> {
        &self.outputs
    }

    /// Merge a step output under its key. Last write wins.
    pub fn merge_output(&mut self, key: impl Into<String>, output: Value) {
        self.outputs.insert(key.into(), output);
    }

    /// The full context as a structured value: the input events plus every
    /// prior output, nothing else.
    pub fn to_value(&self) -> Result<Value> {
        let mut map = serde_json::Map::new();
        map.insert("events".to_string(), serde_json::to_value(&self.events)?);
        for (key, output) in &self.outputs {
            map.insert(key.clone(), output.clone());
        }
        Ok(Value::Object(map))
    }

    /// YAML rendering of the context, as it is embedded into prompts.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_value()?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RunContext {
        let events = vec![EventRecord {
            event_id: "e1".to_string(),
            source: "fed".to_string(),
            category: "policy".to_string(),
            timestamp: String::new(),
            description: "Rate decision".to_string(),
            tags: vec![],
            metadata: Default::default(),
        }];
        RunContext::new(NaiveDate::from_ymd_opt(2026, 8, 21).unwrap(), events)
    }

    #[test]
    fn context_is_exactly_events_plus_prior_outputs() {
        let mut c = ctx();
        c.merge_output("filter_events", json!({"kept": 1}));
        c.merge_output("macro_regime", json!({"regime": "neutral"}));

        let value = c.to_value().unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 3); // events + 2 outputs, no more, no less
        assert_eq!(map["events"].as_array().unwrap().len(), 1);
        assert_eq!(map["filter_events"]["kept"], 1);
        assert_eq!(map["macro_regime"]["regime"], "neutral");
    }

    #[test]
    fn merge_is_last_write_wins() {
        let mut c = ctx();
        c.merge_output("brief", json!("first"));
        c.merge_output("brief", json!("second"));
        assert_eq!(c.outputs()["brief"], json!("second"));
    }

    #[test]
    fn yaml_rendering_contains_events() {
        let yaml = ctx().to_yaml().unwrap();
        assert!(yaml.contains("Rate decision"));
    }
}
