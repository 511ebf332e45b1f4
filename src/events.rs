//! Motion event history and daily statistics.
//!
//! Records are appended by the controller actor only. Timestamps are local
//! wall-clock time at whole-second precision.

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::occupancy::{Action, LogEntry};

pub const DEFAULT_EVENTS_PATH: &str = "motion_events.json";

/// One entry of the event history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub motion_detected: bool,
    #[serde(alias = "appliance_action")]
    pub action: Option<Action>,
}

impl EventRecord {
    pub fn new(timestamp: NaiveDateTime, motion_detected: bool, action: Option<Action>) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(0),
            motion_detected,
            action,
        }
    }

    /// Stamp a controller log entry with the current local time.
    pub fn now(entry: LogEntry) -> Self {
        Self::new(Local::now().naive_local(), entry.motion_detected, entry.action)
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

mod timestamp_format {
    use chrono::{NaiveDateTime, SubsecRound};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|ts| ts.trunc_subsecs(0))
            .map_err(serde::de::Error::custom)
    }
}

/// Event counts for one local calendar day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub total_events: usize,
    pub motion_detections: usize,
    pub energy_saves: usize,
}

impl std::fmt::Display for DailyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} events, {} motion detections, {} energy saves",
            self.date, self.total_events, self.motion_detections, self.energy_saves
        )
    }
}

/// Count records dated `date`. An energy save is a record whose action is OFF.
pub fn daily_stats(records: &[EventRecord], date: NaiveDate) -> DailyStats {
    let mut stats = DailyStats {
        date,
        total_events: 0,
        motion_detections: 0,
        energy_saves: 0,
    };
    for record in records.iter().filter(|r| r.date() == date) {
        stats.total_events += 1;
        if record.motion_detected {
            stats.motion_detections += 1;
        }
        if record.action == Some(Action::TurnOff) {
            stats.energy_saves += 1;
        }
    }
    stats
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Pretty JSON array of the records.
pub fn export_json(records: &[EventRecord]) -> Result<String> {
    serde_json::to_string_pretty(records).map_err(|e| anyhow!("failed to encode events: {}", e))
}

/// Append-only event history.
pub trait EventStore: Send {
    fn append(&mut self, record: EventRecord) -> Result<()>;
    fn records(&self) -> &[EventRecord];
    /// Persist buffered records. Stores without a backing medium do nothing.
    fn flush(&mut self) -> Result<()>;

    fn daily_stats(&self, date: NaiveDate) -> DailyStats {
        daily_stats(self.records(), date)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    records: Vec<EventRecord>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&mut self, record: EventRecord) -> Result<()> {
        self.records.push(record);
        Ok(())
    }

    fn records(&self) -> &[EventRecord] {
        &self.records
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// History kept in memory and written to a JSON file on `flush`.
#[derive(Debug)]
pub struct JsonFileEventStore {
    path: PathBuf,
    records: Vec<EventRecord>,
    dirty: bool,
}

impl JsonFileEventStore {
    /// Open `path`, loading any existing history. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            load_records(&path)?
        } else {
            Vec::new()
        };
        log::debug!("loaded {} events from {}", records.len(), path.display());
        Ok(Self {
            path,
            records,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventStore for JsonFileEventStore {
    fn append(&mut self, record: EventRecord) -> Result<()> {
        self.records.push(record);
        self.dirty = true;
        Ok(())
    }

    fn records(&self) -> &[EventRecord] {
        &self.records
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let encoded = export_json(&self.records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, encoded)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        self.dirty = false;
        log::info!("saved {} events to {}", self.records.len(), self.path.display());
        Ok(())
    }
}

/// Read an event history file.
pub fn load_records(path: &Path) -> Result<Vec<EventRecord>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read events file {}: {}", path.display(), e))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid events file {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn at(date: NaiveDate, h: u32, m: u32, s: u32) -> NaiveDateTime {
        date.and_time(NaiveTime::from_hms_opt(h, m, s).unwrap())
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
    }

    #[test]
    fn stats_count_motion_and_energy_saves() {
        let d = day();
        let records = vec![
            EventRecord::new(at(d, 9, 0, 0), true, Some(Action::TurnOn)),
            EventRecord::new(at(d, 9, 0, 2), true, None),
            EventRecord::new(at(d, 9, 0, 4), true, None),
            EventRecord::new(at(d, 9, 1, 4), false, Some(Action::TurnOff)),
        ];
        let stats = daily_stats(&records, d);
        assert_eq!(stats.total_events, 4);
        assert_eq!(stats.motion_detections, 3);
        assert_eq!(stats.energy_saves, 1);
    }

    #[test]
    fn stats_ignore_other_days() {
        let d = day();
        let yesterday = d.pred_opt().unwrap();
        let records = vec![
            EventRecord::new(at(yesterday, 23, 59, 59), false, Some(Action::TurnOff)),
            EventRecord::new(at(d, 0, 0, 0), true, Some(Action::TurnOn)),
        ];
        let stats = daily_stats(&records, d);
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.energy_saves, 0);
        assert_eq!(daily_stats(&[], d).total_events, 0);
    }

    #[test]
    fn export_uses_whole_seconds_and_on_off() -> Result<()> {
        let ts = at(day(), 14, 30, 5) + chrono::Duration::milliseconds(750);
        let json = export_json(&[
            EventRecord::new(ts, false, Some(Action::TurnOff)),
            EventRecord::new(ts, true, None),
        ])?;
        let value: serde_json::Value = serde_json::from_str(&json)?;
        assert_eq!(value[0]["timestamp"], "2024-03-11T14:30:05");
        assert_eq!(value[0]["action"], "OFF");
        assert_eq!(value[0]["motion_detected"], false);
        assert!(value[1]["action"].is_null());
        Ok(())
    }

    #[test]
    fn legacy_records_are_accepted() -> Result<()> {
        let raw = r#"[{"timestamp": "2024-03-11T08:15:00.123456",
                       "motion_detected": true,
                       "appliance_action": "ON"}]"#;
        let records: Vec<EventRecord> = serde_json::from_str(raw)?;
        assert_eq!(records[0].timestamp, at(day(), 8, 15, 0));
        assert_eq!(records[0].action, Some(Action::TurnOn));
        Ok(())
    }

    #[test]
    fn file_store_round_trips_history() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("events.json");

        let mut store = JsonFileEventStore::open(&path)?;
        assert!(store.records().is_empty());
        store.append(EventRecord::new(at(day(), 10, 0, 0), true, Some(Action::TurnOn)))?;
        store.append(EventRecord::new(at(day(), 10, 1, 0), false, Some(Action::TurnOff)))?;
        store.flush()?;

        let reopened = JsonFileEventStore::open(&path)?;
        assert_eq!(reopened.records(), store.records());
        assert_eq!(reopened.daily_stats(day()).energy_saves, 1);
        Ok(())
    }

    #[test]
    fn corrupt_history_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("events.json");
        std::fs::write(&path, "{not json")?;
        let err = JsonFileEventStore::open(&path).unwrap_err();
        assert!(err.to_string().contains("invalid events file"));
        Ok(())
    }
}
