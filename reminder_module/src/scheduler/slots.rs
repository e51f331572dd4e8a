//! Slot configuration: which local times each notification frequency fires
//! at, plus the weekly message slots.
//!
//! The defaults mirror the long-standing cadences; deployments can override
//! them with a TOML file so changing the schedule is a configuration edit.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{NaiveTime, Weekday};
use serde::Deserialize;

/// Frequencies with a slot mapping; everything else resolves to no slots.
pub const RECOGNIZED_FREQUENCIES: [i64; 4] = [1, 2, 4, 6];

#[derive(Debug, thiserror::Error)]
pub enum ScheduleConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid time (expected HH:MM): {0}")]
    InvalidTime(String),
    #[error("invalid weekday: {0}")]
    InvalidWeekday(String),
    #[error("unrecognized frequency: {0}")]
    UnrecognizedFrequency(String),
    #[error("frequency {frequency} configured with {count} slot(s)")]
    SlotCountMismatch { frequency: i64, count: usize },
}

#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: BTreeMap<i64, Vec<NaiveTime>>,
}

impl SlotTable {
    /// Ordered local times for a frequency; empty for 0 or anything
    /// unrecognized.
    pub fn slots_for(&self, frequency: i64) -> &[NaiveTime] {
        self.slots
            .get(&frequency)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for SlotTable {
    fn default() -> Self {
        let mut slots = BTreeMap::new();
        slots.insert(1, vec![hm(16, 0)]);
        slots.insert(2, vec![hm(12, 0), hm(17, 0)]);
        slots.insert(4, vec![hm(12, 0), hm(15, 0), hm(17, 0), hm(20, 0)]);
        slots.insert(
            6,
            vec![
                hm(11, 0),
                hm(13, 0),
                hm(15, 0),
                hm(17, 0),
                hm(19, 0),
                hm(21, 0),
            ],
        );
        Self { slots }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklySlot {
    pub weekday: Weekday,
    pub time: NaiveTime,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub slot_table: SlotTable,
    pub weekly_motivation: WeeklySlot,
    pub weekly_reflection: WeeklySlot,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            slot_table: SlotTable::default(),
            weekly_motivation: WeeklySlot {
                weekday: Weekday::Sun,
                time: hm(10, 0),
            },
            weekly_reflection: WeeklySlot {
                weekday: Weekday::Sun,
                time: hm(17, 0),
            },
        }
    }
}

impl ScheduleConfig {
    pub fn load(path: &Path) -> Result<Self, ScheduleConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parse an override file. Entries not present keep their defaults;
    /// a slot list must contain exactly as many distinct times as its
    /// frequency says.
    pub fn from_toml_str(raw: &str) -> Result<Self, ScheduleConfigError> {
        let parsed: RawScheduleConfig = toml::from_str(raw)?;
        let mut config = Self::default();

        for (frequency_raw, times_raw) in parsed.slots {
            let frequency: i64 = frequency_raw
                .parse()
                .map_err(|_| ScheduleConfigError::UnrecognizedFrequency(frequency_raw.clone()))?;
            if !RECOGNIZED_FREQUENCIES.contains(&frequency) {
                return Err(ScheduleConfigError::UnrecognizedFrequency(frequency_raw));
            }
            let mut times = times_raw
                .iter()
                .map(|value| parse_time(value))
                .collect::<Result<Vec<_>, _>>()?;
            times.sort();
            times.dedup();
            if times.len() != frequency as usize {
                return Err(ScheduleConfigError::SlotCountMismatch {
                    frequency,
                    count: times.len(),
                });
            }
            config.slot_table.slots.insert(frequency, times);
        }

        if let Some(slot) = parsed.weekly.motivation {
            config.weekly_motivation = slot.parse()?;
        }
        if let Some(slot) = parsed.weekly.reflection {
            config.weekly_reflection = slot.parse()?;
        }

        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct RawScheduleConfig {
    #[serde(default)]
    slots: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    weekly: RawWeekly,
}

#[derive(Debug, Default, Deserialize)]
struct RawWeekly {
    motivation: Option<RawWeeklySlot>,
    reflection: Option<RawWeeklySlot>,
}

#[derive(Debug, Deserialize)]
struct RawWeeklySlot {
    weekday: String,
    time: String,
}

impl RawWeeklySlot {
    fn parse(&self) -> Result<WeeklySlot, ScheduleConfigError> {
        let weekday = self
            .weekday
            .parse::<Weekday>()
            .map_err(|_| ScheduleConfigError::InvalidWeekday(self.weekday.clone()))?;
        Ok(WeeklySlot {
            weekday,
            time: parse_time(&self.time)?,
        })
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, ScheduleConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ScheduleConfigError::InvalidTime(value.to_string()))
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid wall-clock time")
}
