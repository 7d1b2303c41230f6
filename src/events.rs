//! Event records and the YAML-backed event source
//!
//! Raw events for a date live in `data/events/YYYY-MM-DD.yaml`; normalized
//! events are written next to them as `YYYY-MM-DD-normalized.yaml`. A
//! missing raw file yields an empty day, not an error — days without
//! curated events are normal.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;

fn unknown() -> String {
    "unknown".to_string()
}

fn other() -> String {
    "other".to_string()
}

/// One normalized economic/market event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default = "unknown")]
    pub event_id: String,
    #[serde(default = "unknown")]
    pub source: String,
    #[serde(default = "other")]
    pub category: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

/// On-disk shape of a raw events file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayEvents {
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub event_count: usize,
    #[serde(default)]
    pub events: Vec<Value>,
}

/// Clean and structure raw event values: fill defaults for missing fields
/// and drop exact duplicates.
pub fn normalize_events(raw: &[Value]) -> Vec<EventRecord> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut normalized = Vec::with_capacity(raw.len());

    for event in raw {
        let get = |key: &str| -> Option<String> {
            event.get(key).and_then(Value::as_str).map(str::to_string)
        };
        let record = EventRecord {
            event_id: get("id").or_else(|| get("event_id")).unwrap_or_else(unknown),
            source: get("source").unwrap_or_else(unknown),
            category: get("category").unwrap_or_else(other),
            timestamp: get("timestamp").unwrap_or_else(|| Utc::now().to_rfc3339()),
            description: get("description").unwrap_or_default(),
            tags: event
                .get("tags")
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            metadata: event
                .get("metadata")
                .and_then(Value::as_object)
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
        };
        if seen.insert((record.event_id.clone(), record.description.clone())) {
            normalized.push(record);
        }
    }

    info!(raw = raw.len(), kept = normalized.len(), "normalized events");
    normalized
}

/// Source of a finite, ordered sequence of events for a date.
pub trait EventSource {
    fn events_for(&self, date: NaiveDate) -> Result<Vec<EventRecord>>;
}

/// Reads curated event files from a local directory.
#[derive(Debug, Clone)]
pub struct YamlEventSource {
    events_dir: PathBuf,
}

impl YamlEventSource {
    pub fn new(events_dir: impl Into<PathBuf>) -> Self {
        Self {
            events_dir: events_dir.into(),
        }
    }

    fn raw_path(&self, date: NaiveDate) -> PathBuf {
        self.events_dir.join(format!("{date}.yaml"))
    }

    /// Load the raw events file for a date. Missing file yields an empty day.
    pub fn load_raw(&self, date: NaiveDate) -> Result<DayEvents> {
        let path = self.raw_path(date);
        if !path.exists() {
            warn!(path = %path.display(), "raw events file not found");
            return Ok(DayEvents {
                date,
                timestamp: Utc::now(),
                event_count: 0,
                events: Vec::new(),
            });
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    pub fn save_raw(&self, date: NaiveDate, events: Vec<Value>) -> Result<PathBuf> {
        let day = DayEvents {
            date,
            timestamp: Utc::now(),
            event_count: events.len(),
            events,
        };
        let path = self.raw_path(date);
        write_yaml(&path, &day)?;
        info!(count = day.event_count, path = %path.display(), "saved raw events");
        Ok(path)
    }

    pub fn save_normalized(&self, date: NaiveDate, events: &[EventRecord]) -> Result<PathBuf> {
        #[derive(Serialize)]
        struct NormalizedDay<'a> {
            date: NaiveDate,
            timestamp: DateTime<Utc>,
            event_count: usize,
            events: &'a [EventRecord],
        }
        let path = self.events_dir.join(format!("{date}-normalized.yaml"));
        write_yaml(
            &path,
            &NormalizedDay {
                date,
                timestamp: Utc::now(),
                event_count: events.len(),
                events,
            },
        )?;
        info!(count = events.len(), path = %path.display(), "saved normalized events");
        Ok(path)
    }
}

impl EventSource for YamlEventSource {
    fn events_for(&self, date: NaiveDate) -> Result<Vec<EventRecord>> {
        let raw = self.load_raw(date)?;
        Ok(normalize_events(&raw.events))
    }
}

pub(crate) fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(value)?;
    std::fs::write(path, yaml)?;
    Ok(())
}
