//! Availability oracle: working hours, slot preferences, per-day caps.
//!
//! Pure logic with no I/O and no clock access. Callers supply the current
//! occurrence list and calendar constraints with every question.

use crate::model::{TaskOccurrence, TimeSlot, Weekday, WorkingHours};
use chrono::{Duration, NaiveDateTime};
use tracing::trace;

/// Days scanned forward when searching for a free slot. Beyond this the
/// planner reports "no slot" rather than looping indefinitely.
pub const SEARCH_WINDOW_DAYS: i64 = 14;

/// A concrete candidate produced by the forward search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSlot {
    /// Candidate datetime (the slot's start on the chosen day).
    pub at: NaiveDateTime,
    /// Name of the slot the candidate occupies.
    pub slot_name: String,
}

/// Pure availability oracle enforcing working hours, slot preferences, and
/// per-day limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalendarPlanner;

impl CalendarPlanner {
    /// Whether a new occurrence can be scheduled at `proposed_time`.
    ///
    /// Requires a working-hours entry for the weekday whose half-open window
    /// contains the time, a free per-day budget, no existing occurrence at
    /// exactly the same datetime, and, when `slot_pool` is given, an allowed
    /// slot whose window contains the time.
    #[must_use]
    pub fn is_slot_available(
        &self,
        proposed_time: NaiveDateTime,
        scheduled_occurrences: &[TaskOccurrence],
        working_hours: &[WorkingHours],
        max_per_day: u32,
        slot_pool: Option<&[TimeSlot]>,
    ) -> bool {
        let weekday = Weekday::from_date(proposed_time.date());
        let Some(hours) = working_hours.iter().find(|w| w.day == weekday) else {
            return false;
        };
        if !hours.contains(proposed_time.time()) {
            return false;
        }

        let day = proposed_time.date();
        let on_day = scheduled_occurrences
            .iter()
            .filter(|o| o.scheduled_for.date() == day)
            .count();
        if on_day >= max_per_day as usize {
            return false;
        }

        if scheduled_occurrences
            .iter()
            .any(|o| o.scheduled_for == proposed_time)
        {
            return false;
        }

        if let Some(pool) = slot_pool {
            let time = proposed_time.time();
            let allowed = pool.iter().any(|slot| {
                hours.allowed_slots.iter().any(|name| name == &slot.name)
                    && slot.contains(time)
            });
            if !allowed {
                return false;
            }
        }

        true
    }

    /// First available slot-start datetime strictly after `after`, searching
    /// forward up to [`SEARCH_WINDOW_DAYS`].
    ///
    /// Candidates on a day are the starts of pool slots named in that day's
    /// `allowed_slots`, earliest first (slot name as deterministic
    /// tie-break). `priority` is a stable ordering hint for callers
    /// competing over the same day; it does not reorder a single search.
    #[must_use]
    pub fn next_available_slot(
        &self,
        after: NaiveDateTime,
        slot_pool: &[TimeSlot],
        scheduled_occurrences: &[TaskOccurrence],
        working_hours: &[WorkingHours],
        max_per_day: u32,
        priority: Option<u8>,
    ) -> Option<PlannedSlot> {
        trace!(%after, ?priority, "searching for next available slot");
        for day_offset in 0..SEARCH_WINDOW_DAYS {
            let date = after.date() + Duration::days(day_offset);
            let weekday = Weekday::from_date(date);
            let Some(hours) = working_hours.iter().find(|w| w.day == weekday) else {
                continue;
            };

            let mut slots: Vec<&TimeSlot> = slot_pool
                .iter()
                .filter(|slot| hours.allowed_slots.iter().any(|name| name == &slot.name))
                .collect();
            slots.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.name.cmp(&b.name)));

            for slot in slots {
                let candidate = date.and_time(slot.start);
                if candidate <= after {
                    continue;
                }
                if self.is_slot_available(
                    candidate,
                    scheduled_occurrences,
                    working_hours,
                    max_per_day,
                    Some(slot_pool),
                ) {
                    return Some(PlannedSlot {
                        at: candidate,
                        slot_name: slot.name.clone(),
                    });
                }
            }
        }
        None
    }

    /// Whether a user-pinned datetime is valid: inside working hours, under
    /// the per-day cap, and collision-free. Pinned times bypass slot
    /// preferences.
    #[must_use]
    pub fn is_pinned_time_valid(
        &self,
        pinned_time: NaiveDateTime,
        scheduled_occurrences: &[TaskOccurrence],
        working_hours: &[WorkingHours],
        max_per_day: u32,
    ) -> bool {
        self.is_slot_available(
            pinned_time,
            scheduled_occurrences,
            working_hours,
            max_per_day,
            None,
        )
    }
}
