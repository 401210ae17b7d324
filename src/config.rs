//! Calendar configuration: working hours, slot pool, per-day cap.
//!
//! Supplied to the scheduler at construction time and treated as immutable
//! for its lifetime.

use crate::model::{TimeSlot, Weekday, WorkingHours};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Scheduling constraints shared by every component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Per-weekday availability. A weekday with no entry is a holiday.
    pub working_hours: Vec<WorkingHours>,
    /// Named daily time windows tasks can occupy.
    pub slot_pool: Vec<TimeSlot>,
    /// Maximum occurrences per calendar day.
    pub max_per_day: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        let slot_names = vec![
            "morning".to_owned(),
            "afternoon".to_owned(),
            "evening".to_owned(),
        ];
        let working_hours = [
            Weekday::Monday,
            Weekday::Tuesday,
            Weekday::Wednesday,
            Weekday::Thursday,
            Weekday::Friday,
            Weekday::Saturday,
            Weekday::Sunday,
        ]
        .into_iter()
        .map(|day| WorkingHours {
            day,
            start: hm(9, 0),
            end: hm(22, 0),
            allowed_slots: slot_names.clone(),
        })
        .collect();

        Self {
            working_hours,
            slot_pool: vec![
                TimeSlot::new("morning", hm(9, 0), hm(12, 0)),
                TimeSlot::new("afternoon", hm(14, 0), hm(17, 0)),
                TimeSlot::new("evening", hm(20, 0), hm(21, 0)),
            ],
            max_per_day: 5,
        }
    }
}

impl CalendarConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::ScheduleError::Config(e.to_string()))
    }

    /// Working-hours entry for a weekday, if the day is not a holiday.
    #[must_use]
    pub fn hours_for(&self, day: Weekday) -> Option<&WorkingHours> {
        self.working_hours.iter().find(|w| w.day == day)
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}
