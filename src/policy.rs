use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::{merge_overlapping, subtract_intervals};
use crate::model::{DAY, MINUTE, Ms, Span};

const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    /// Weekday of a day number counted from the unix epoch (1970-01-01 was a Thursday).
    pub fn from_epoch_day(day: i64) -> Self {
        Self::ALL[(day + 3).rem_euclid(7) as usize]
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "monday" => Some(Weekday::Monday),
            "tuesday" => Some(Weekday::Tuesday),
            "wednesday" => Some(Weekday::Wednesday),
            "thursday" => Some(Weekday::Thursday),
            "friday" => Some(Weekday::Friday),
            "saturday" => Some(Weekday::Saturday),
            "sunday" => Some(Weekday::Sunday),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Window must satisfy `start < end <= 24:00`.
    InvalidWindow { start_minute: u32, end_minute: u32 },
    InvalidTime(String),
    UnknownWeekday(String),
    Json(String),
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::InvalidWindow {
                start_minute,
                end_minute,
            } => write!(f, "invalid working window: minute {start_minute} to {end_minute}"),
            PolicyError::InvalidTime(t) => write!(f, "invalid time of day: {t:?}"),
            PolicyError::UnknownWeekday(d) => write!(f, "unknown weekday: {d:?}"),
            PolicyError::Json(e) => write!(f, "invalid working hours json: {e}"),
        }
    }
}

impl std::error::Error for PolicyError {}

/// A recurring window on one weekday, in minutes since local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyWindow {
    pub weekday: Weekday,
    pub start_minute: u32,
    pub end_minute: u32,
}

impl WeeklyWindow {
    pub fn new(weekday: Weekday, start_minute: u32, end_minute: u32) -> Result<Self, PolicyError> {
        if start_minute >= end_minute || end_minute > MINUTES_PER_DAY {
            return Err(PolicyError::InvalidWindow {
                start_minute,
                end_minute,
            });
        }
        Ok(Self {
            weekday,
            start_minute,
            end_minute,
        })
    }

    /// Parse `"HH:MM"` bounds, e.g. `("09:00", "17:30")`.
    pub fn parse(weekday: Weekday, start: &str, end: &str) -> Result<Self, PolicyError> {
        Self::new(weekday, parse_hhmm(start)?, parse_hhmm(end)?)
    }
}

fn parse_hhmm(s: &str) -> Result<u32, PolicyError> {
    let bad = || PolicyError::InvalidTime(s.to_string());
    let (h, m) = s.trim().split_once(':').ok_or_else(bad)?;
    let h: u32 = h.parse().map_err(|_| bad())?;
    let m: u32 = m.parse().map_err(|_| bad())?;
    if m >= 60 || h > 24 || (h == 24 && m != 0) {
        return Err(bad());
    }
    Ok(h * 60 + m)
}

/// Day entry of the profile-service JSON: `{"start":"09:00","end":"17:00","available":true}`.
#[derive(Debug, Deserialize)]
struct DaySchedule {
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    available: bool,
}

/// Weekly working-hours policy of a doctor.
///
/// Windows are expressed in the doctor's local time; `utc_offset_minutes` maps them onto
/// the UTC timeline the engine works in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    windows: Vec<WeeklyWindow>,
    utc_offset_minutes: i32,
}

impl WorkingHours {
    pub fn new(windows: Vec<WeeklyWindow>) -> Self {
        let mut windows = windows;
        windows.sort_by_key(|w| (w.weekday, w.start_minute));
        Self {
            windows,
            utc_offset_minutes: 0,
        }
    }

    /// Same hours on every listed weekday.
    pub fn uniform(days: &[Weekday], start_minute: u32, end_minute: u32) -> Result<Self, PolicyError> {
        let windows = days
            .iter()
            .map(|&d| WeeklyWindow::new(d, start_minute, end_minute))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(windows))
    }

    pub fn with_utc_offset(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// Parse the weekly map stored on doctor profiles, keyed by lowercase weekday name.
    /// Days that are missing, unavailable or lack bounds contribute no window.
    pub fn from_weekly_json(json: &str) -> Result<Self, PolicyError> {
        let days: HashMap<String, DaySchedule> =
            serde_json::from_str(json).map_err(|e| PolicyError::Json(e.to_string()))?;
        let mut windows = Vec::new();
        for (name, day) in days {
            let weekday = Weekday::parse(&name).ok_or_else(|| PolicyError::UnknownWeekday(name.clone()))?;
            if !day.available {
                continue;
            }
            if let (Some(start), Some(end)) = (day.start.as_deref(), day.end.as_deref()) {
                windows.push(WeeklyWindow::parse(weekday, start, end)?);
            }
        }
        Ok(Self::new(windows))
    }

    pub fn windows(&self) -> &[WeeklyWindow] {
        &self.windows
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Concrete working spans clamped to `query`, sorted and merged.
    pub fn spans_within(&self, query: &Span) -> Vec<Span> {
        if self.windows.is_empty() || query.start >= query.end {
            return Vec::new();
        }
        let offset = self.utc_offset_minutes as Ms * MINUTE;
        let first_day = (query.start + offset).div_euclid(DAY);
        let last_day = (query.end - 1 + offset).div_euclid(DAY);

        let mut spans = Vec::new();
        for day in first_day..=last_day {
            let weekday = Weekday::from_epoch_day(day);
            let midnight = day * DAY - offset;
            for w in self.windows.iter().filter(|w| w.weekday == weekday) {
                let span = Span::new(
                    midnight + w.start_minute as Ms * MINUTE,
                    midnight + w.end_minute as Ms * MINUTE,
                );
                if let Some(clamped) = span.clamp_to(query) {
                    spans.push(clamped);
                }
            }
        }
        spans.sort_by_key(|s| s.start);
        merge_overlapping(&spans)
    }

    /// True if every instant of `span` falls inside working hours.
    pub fn covers(&self, span: &Span) -> bool {
        let working = self.spans_within(span);
        subtract_intervals(&[*span], &working).is_empty()
    }
}
