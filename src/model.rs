//! Domain records for the scheduling engine.
//!
//! All records are immutable value types: construct, never mutate. Times are
//! naive local datetimes, identifiers are opaque strings unique within their
//! kind, and every record is JSON-serializable for the repository layer.

use crate::interval;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task priority. Breaks ties between same-day conflicts, high first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Scheduled last among same-day conflicts.
    Low,
    /// Default priority.
    #[default]
    Medium,
    /// Scheduled first among same-day conflicts.
    High,
}

impl Priority {
    /// Ordering rank: lower rank schedules earlier.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// How many times a missed occurrence may be retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total retry attempts allowed. Zero disables retries.
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Policy allowing `max_retries` attempts.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

/// A user-defined task template. Occurrences are generated from this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Unique task identifier.
    pub id: String,
    /// Short task title, spoken on trigger.
    pub title: String,
    /// Optional longer description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional local file path or URL.
    #[serde(default)]
    pub link: Option<String>,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
    /// Recurrence interval. Absent means one-shot.
    #[serde(default, with = "interval::option_seconds")]
    pub recurrence: Option<Duration>,
    /// Tie-break priority for same-day conflicts.
    #[serde(default)]
    pub priority: Priority,
    /// Slot names this task prefers, in order.
    #[serde(default)]
    pub preferred_slots: Vec<String>,
    /// Retry policy for missed occurrences.
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// User-requested exact datetime for the next planned occurrence.
    /// Overrides slot selection but must still pass calendar validation.
    #[serde(default)]
    pub pinned_time: Option<NaiveDateTime>,
}

impl TaskDefinition {
    /// Create a one-shot, medium-priority task with a fresh UUID.
    pub fn new(title: impl Into<String>, created_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: None,
            link: None,
            created_at,
            recurrence: None,
            priority: Priority::Medium,
            preferred_slots: Vec::new(),
            retry_policy: RetryPolicy::default(),
            pinned_time: None,
        }
    }

    /// Set the recurrence interval.
    #[must_use]
    pub fn with_recurrence(mut self, every: Duration) -> Self {
        self.recurrence = Some(every);
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the preferred slot names.
    #[must_use]
    pub fn with_preferred_slots(mut self, slots: Vec<String>) -> Self {
        self.preferred_slots = slots;
        self
    }

    /// Pin the next planned occurrence to an exact datetime.
    #[must_use]
    pub fn with_pinned_time(mut self, at: NaiveDateTime) -> Self {
        self.pinned_time = Some(at);
        self
    }
}

/// A concrete scheduled firing of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOccurrence {
    /// Unique identifier for this occurrence.
    pub id: String,
    /// The parent task's id.
    pub task_id: String,
    /// When this occurrence fires.
    pub scheduled_for: NaiveDateTime,
    /// Name of the slot this occurrence occupies; absent for pinned times.
    #[serde(default)]
    pub slot_name: Option<String>,
    /// User-requested exact datetime. When present, `scheduled_for` equals
    /// it and the occurrence is excluded from automatic recovery.
    #[serde(default)]
    pub pinned_time: Option<NaiveDateTime>,
}

impl TaskOccurrence {
    /// Occurrence placed in a named slot.
    pub fn in_slot(
        id: impl Into<String>,
        task_id: impl Into<String>,
        scheduled_for: NaiveDateTime,
        slot_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            task_id: task_id.into(),
            scheduled_for,
            slot_name: Some(slot_name.into()),
            pinned_time: None,
        }
    }

    /// Occurrence fixed at a user-chosen datetime. `scheduled_for` always
    /// equals the pinned time.
    pub fn pinned(
        id: impl Into<String>,
        task_id: impl Into<String>,
        at: NaiveDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            task_id: task_id.into(),
            scheduled_for: at,
            slot_name: None,
            pinned_time: Some(at),
        }
    }

    /// Whether this occurrence carries a user-fixed datetime.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned_time.is_some()
    }

    /// Local calendar date this occurrence counts against.
    #[must_use]
    pub fn day(&self) -> NaiveDate {
        self.scheduled_for.date()
    }
}

/// Lifecycle event kinds recorded in an execution's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The occurrence fired.
    Triggered,
    /// The occurrence's scheduled time passed without a fire.
    Missed,
    /// A retry occurrence was generated for this execution.
    Rescheduled,
    /// The occurrence completed.
    Completed,
}

/// One entry in an execution's lifecycle history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEvent {
    /// What happened.
    pub event: EventKind,
    /// When it happened.
    pub timestamp: NaiveDateTime,
}

/// Execution lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Not yet fired.
    Pending,
    /// Completed; never fires again.
    Done,
    /// Scheduled time passed without completion.
    Missed,
    /// Abandoned by the user.
    Cancelled,
}

/// Runtime record of one occurrence's lifecycle. Append-only: state changes
/// are represented by new records or new history entries, never by mutating
/// prior state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskExecution {
    /// The occurrence this record tracks.
    pub occurrence_id: String,
    /// Current lifecycle state.
    pub state: ExecutionState,
    /// Retry attempts left.
    pub retries_remaining: u32,
    /// Append-only event log.
    #[serde(default)]
    pub history: Vec<TaskEvent>,
}

impl TaskExecution {
    /// A fresh pending execution with the given retry budget.
    pub fn pending(occurrence_id: impl Into<String>, retries_remaining: u32) -> Self {
        Self {
            occurrence_id: occurrence_id.into(),
            state: ExecutionState::Pending,
            retries_remaining,
            history: Vec::new(),
        }
    }

    /// Whether this execution may still be rescheduled: retries remain and
    /// the state is neither done nor cancelled.
    #[must_use]
    pub fn is_reschedulable(&self) -> bool {
        self.retries_remaining > 0
            && matches!(self.state, ExecutionState::Pending | ExecutionState::Missed)
    }

    /// Number of retries already attempted, counted from history.
    #[must_use]
    pub fn retry_count(&self) -> usize {
        self.history
            .iter()
            .filter(|e| e.event == EventKind::Rescheduled)
            .count()
    }

    /// Timestamp of the most recent event, if any.
    #[must_use]
    pub fn last_event_time(&self) -> Option<NaiveDateTime> {
        self.history.iter().map(|e| e.timestamp).max()
    }
}

/// A named recurring daily time window, e.g. "morning".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    /// Unique slot identifier.
    pub id: String,
    /// Slot name; referenced by working hours and task preferences. Need
    /// not be unique.
    pub name: String,
    /// Start of the window (inclusive).
    pub start: NaiveTime,
    /// End of the window (exclusive).
    pub end: NaiveTime,
}

impl TimeSlot {
    /// Slot with a fresh UUID.
    pub fn new(name: impl Into<String>, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            start,
            end,
        }
    }

    /// Whether `time` falls inside this slot's half-open window.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }
}

/// Day of the week, as persisted in working-hours records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
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
    /// Weekday of a calendar date.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        match date.weekday() {
            chrono::Weekday::Mon => Self::Monday,
            chrono::Weekday::Tue => Self::Tuesday,
            chrono::Weekday::Wed => Self::Wednesday,
            chrono::Weekday::Thu => Self::Thursday,
            chrono::Weekday::Fri => Self::Friday,
            chrono::Weekday::Sat => Self::Saturday,
            chrono::Weekday::Sun => Self::Sunday,
        }
    }
}

/// Per-weekday scheduling envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    /// Which weekday this entry covers. A weekday with no entry is a
    /// holiday.
    pub day: Weekday,
    /// Start of the allowed window (inclusive).
    pub start: NaiveTime,
    /// End of the allowed window (exclusive).
    pub end: NaiveTime,
    /// Slot names allowed on this day.
    #[serde(default)]
    pub allowed_slots: Vec<String>,
}

impl WorkingHours {
    /// Whether `time` falls inside this day's half-open window.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }
}
