//! Pure lifecycle decisions: due and missed checks, retry eligibility,
//! recurrence and retry placement.
//!
//! Produces new occurrences, never mutates existing records. Slot search is
//! delegated to the [`CalendarPlanner`].

use crate::model::{
    ExecutionState, RetryPolicy, TaskDefinition, TaskExecution, TaskOccurrence, TimeSlot,
    WorkingHours,
};
use crate::planner::CalendarPlanner;
use chrono::{Duration, NaiveDateTime};

/// Pure scheduling decisions for task lifecycles.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskScheduler;

impl TaskScheduler {
    /// Whether the occurrence's scheduled time has arrived.
    #[must_use]
    pub fn is_due(&self, occurrence: &TaskOccurrence, now: NaiveDateTime) -> bool {
        occurrence.scheduled_for <= now
    }

    /// Whether the scheduled time has passed without a completion record.
    #[must_use]
    pub fn is_missed(
        &self,
        occurrence: &TaskOccurrence,
        now: NaiveDateTime,
        executions: &[TaskExecution],
    ) -> bool {
        occurrence.scheduled_for < now
            && !executions
                .iter()
                .any(|e| e.occurrence_id == occurrence.id && e.state == ExecutionState::Done)
    }

    /// Whether the execution has retry budget left.
    #[must_use]
    pub fn should_retry(&self, execution: &TaskExecution) -> bool {
        execution.retries_remaining > 0
    }

    /// Next occurrence for a task, honoring a pinned time first and the
    /// recurrence interval otherwise.
    ///
    /// A pinned time that fails calendar validation yields `None`: it is
    /// explicit user intent and is never silently relocated. Without a
    /// recurrence there is nothing to generate. Otherwise the target is
    /// `from_time + recurrence`, snapped forward to the first available
    /// slot; the search admits a candidate exactly at the target.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn get_next_occurrence(
        &self,
        task: &TaskDefinition,
        from_time: NaiveDateTime,
        planner: &CalendarPlanner,
        scheduled_occurrences: &[TaskOccurrence],
        working_hours: &[WorkingHours],
        slot_pool: &[TimeSlot],
        max_per_day: u32,
    ) -> Option<TaskOccurrence> {
        if let Some(pinned) = task.pinned_time {
            if planner.is_pinned_time_valid(
                pinned,
                scheduled_occurrences,
                working_hours,
                max_per_day,
            ) {
                return Some(TaskOccurrence::pinned(
                    format!("{}:pinned:{}", task.id, pinned.and_utc().timestamp()),
                    task.id.clone(),
                    pinned,
                ));
            }
            return None;
        }

        let every = task.recurrence?;
        let target = from_time + every;
        let after = std::cmp::max(target - Duration::seconds(1), from_time);
        let planned = planner.next_available_slot(
            after,
            slot_pool,
            scheduled_occurrences,
            working_hours,
            max_per_day,
            Some(task.priority.rank()),
        )?;
        Some(TaskOccurrence::in_slot(
            format!("{}:{}", task.id, planned.at.and_utc().timestamp()),
            task.id.clone(),
            planned.at,
            planned.slot_name,
        ))
    }

    /// Retry occurrence for the same task at the first available slot after
    /// `now`, or `None` when the policy forbids retries or no slot exists
    /// within the search window.
    ///
    /// The input occurrence is never mutated; the caller tracks remaining
    /// retries in the execution record.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn reschedule_retry(
        &self,
        occurrence: &TaskOccurrence,
        policy: &RetryPolicy,
        now: NaiveDateTime,
        planner: &CalendarPlanner,
        scheduled_occurrences: &[TaskOccurrence],
        working_hours: &[WorkingHours],
        slot_pool: &[TimeSlot],
        max_per_day: u32,
    ) -> Option<TaskOccurrence> {
        if policy.max_retries == 0 {
            return None;
        }
        let planned = planner.next_available_slot(
            now,
            slot_pool,
            scheduled_occurrences,
            working_hours,
            max_per_day,
            None,
        )?;
        Some(TaskOccurrence::in_slot(
            format!(
                "{}:retry:{}",
                occurrence.task_id,
                planned.at.and_utc().timestamp()
            ),
            occurrence.task_id.clone(),
            planned.at,
            planned.slot_name,
        ))
    }
}
