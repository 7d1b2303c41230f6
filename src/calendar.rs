//! Market calendars: earnings, dividends, and economic events per market
//!
//! An explicit in-memory index: ticker to an ordered-by-date sequence of
//! events, with predicate-based filtering. Calendars round-trip through
//! `data/markets/<market>/calendar.yaml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Result;
use crate::events::write_yaml;

/// Supported stock markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Ftse,
    Nasdaq,
}

impl Market {
    pub const ALL: [Market; 2] = [Market::Ftse, Market::Nasdaq];

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Ftse => "ftse",
            Market::Nasdaq => "nasdaq",
        }
    }
}

/// Calendar event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Earnings,
    Dividend,
    StockSplit,
    Ipo,
    Conference,
    EconomicIndicator,
    MergerAcquisition,
}

/// A single calendar event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub ticker: String,
    pub market: Market,
    pub kind: EventKind,
    pub date: NaiveDate,
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

/// On-disk shape of one market's calendar file.
#[derive(Debug, Serialize, Deserialize)]
struct CalendarFile {
    market: Market,
    last_updated: DateTime<Utc>,
    event_count: usize,
    tickers: Vec<String>,
    #[serde(default)]
    events: BTreeMap<String, Vec<CalendarEvent>>,
}

/// Summary statistics for one market's calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSummary {
    pub market: Market,
    pub total_tickers: usize,
    pub total_events: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Calendar for a single market: ticker to date-ordered events.
#[derive(Debug, Clone)]
pub struct MarketCalendar {
    market: Market,
    events: BTreeMap<String, Vec<CalendarEvent>>,
    last_updated: Option<DateTime<Utc>>,
}

impl MarketCalendar {
    pub fn new(market: Market) -> Self {
        Self {
            market,
            events: BTreeMap::new(),
            last_updated: None,
        }
    }

    /// Load a calendar from its YAML file; a missing file yields an empty
    /// calendar.
    pub fn load(market: Market, path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(market = market.as_str(), "no calendar file, starting empty");
            return Ok(Self::new(market));
        }
        let contents = std::fs::read_to_string(path)?;
        let file: CalendarFile = serde_yaml::from_str(&contents)?;
        let total: usize = file.events.values().map(Vec::len).sum();
        info!(market = market.as_str(), events = total, "loaded calendar");
        Ok(Self {
            market,
            events: file.events,
            last_updated: Some(file.last_updated),
        })
    }

    pub fn market(&self) -> Market {
        self.market
    }

    /// Add an event, keeping the ticker's list ordered by date. Duplicate
    /// (date, kind) pairs for a ticker are dropped.
    pub fn add_event(&mut self, event: CalendarEvent) {
        let list = self.events.entry(event.ticker.clone()).or_default();
        if list
            .iter()
            .any(|e| e.date == event.date && e.kind == event.kind)
        {
            return;
        }
        let idx = list.partition_point(|e| e.date <= event.date);
        debug!(
            ticker = %event.ticker,
            kind = ?event.kind,
            date = %event.date,
            "added calendar event"
        );
        list.insert(idx, event);
    }

    pub fn add_events_bulk(&mut self, events: Vec<CalendarEvent>) {
        for event in events {
            self.add_event(event);
        }
    }

    pub fn events_by_ticker(&self, ticker: &str) -> &[CalendarEvent] {
        self.events.get(ticker).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Events within the inclusive date range, per ticker.
    pub fn events_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BTreeMap<String, Vec<CalendarEvent>> {
        self.filter(|e| e.date >= start && e.date <= end)
    }

    pub fn events_by_kind(&self, kind: EventKind) -> BTreeMap<String, Vec<CalendarEvent>> {
        self.filter(|e| e.kind == kind)
    }

    /// Events in the next `days_ahead` days from today.
    pub fn upcoming_events(&self, days_ahead: i64) -> BTreeMap<String, Vec<CalendarEvent>> {
        let today = Utc::now().date_naive();
        let until = today + Duration::days(days_ahead);
        self.events_by_date_range(today, until)
    }

    fn filter(
        &self,
        predicate: impl Fn(&CalendarEvent) -> bool,
    ) -> BTreeMap<String, Vec<CalendarEvent>> {
        let mut result = BTreeMap::new();
        for (ticker, events) in &self.events {
            let matched: Vec<CalendarEvent> =
                events.iter().filter(|e| predicate(e)).cloned().collect();
            if !matched.is_empty() {
                result.insert(ticker.clone(), matched);
            }
        }
        result
    }

    pub fn summary(&self) -> CalendarSummary {
        let all: Vec<&CalendarEvent> = self.events.values().flatten().collect();
        let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
        for event in &all {
            let name = serde_yaml::to_string(&event.kind)
                .unwrap_or_default()
                .trim()
                .to_string();
            *by_kind.entry(name).or_insert(0) += 1;
        }
        CalendarSummary {
            market: self.market,
            total_tickers: self.events.len(),
            total_events: all.len(),
            by_kind,
            first_date: all.iter().map(|e| e.date).min(),
            last_date: all.iter().map(|e| e.date).max(),
            last_updated: self.last_updated,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = CalendarFile {
            market: self.market,
            last_updated: Utc::now(),
            event_count: self.events.values().map(Vec::len).sum(),
            tickers: self.events.keys().cloned().collect(),
            events: self.events.clone(),
        };
        write_yaml(path, &file)?;
        info!(
            market = self.market.as_str(),
            events = file.event_count,
            path = %path.display(),
            "saved calendar"
        );
        Ok(())
    }
}

/// One calendar per market, backed by `data/markets/<market>/calendar.yaml`.
#[derive(Debug, Clone)]
pub struct CalendarSet {
    data_dir: PathBuf,
    calendars: BTreeMap<Market, MarketCalendar>,
}

impl CalendarSet {
    pub fn load(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let mut calendars = BTreeMap::new();
        for market in Market::ALL {
            let path = Self::calendar_path(&data_dir, market);
            calendars.insert(market, MarketCalendar::load(market, &path)?);
        }
        Ok(Self {
            data_dir,
            calendars,
        })
    }

    fn calendar_path(data_dir: &Path, market: Market) -> PathBuf {
        data_dir.join(market.as_str()).join("calendar.yaml")
    }

    pub fn calendar(&self, market: Market) -> &MarketCalendar {
        &self.calendars[&market]
    }

    pub fn calendar_mut(&mut self, market: Market) -> &mut MarketCalendar {
        self.calendars.get_mut(&market).expect("all markets present")
    }

    pub fn save_all(&self) -> Result<()> {
        for (market, calendar) in &self.calendars {
            calendar.save(&Self::calendar_path(&self.data_dir, *market))?;
        }
        Ok(())
    }

    pub fn summaries(&self) -> Vec<CalendarSummary> {
        self.calendars.values().map(MarketCalendar::summary).collect()
    }
}
