//! Catch-up computation for occurrences missed while the process was not
//! running.
//!
//! Pure: inputs are never mutated, and the output is deterministic given
//! ordered inputs. For each missed occurrence at most one catch-up is
//! produced, retry preferred over recurrence. Pinned occurrences are
//! user-fixed intent and are never recovered automatically.

use crate::model::{ExecutionState, TaskDefinition, TaskExecution, TaskOccurrence, TimeSlot, WorkingHours};
use crate::planner::CalendarPlanner;
use crate::scheduler::TaskScheduler;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Analyses missed executions and produces catch-up occurrences.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryService;

impl RecoveryService {
    /// New retry or recurrence occurrences for every missed, unfinished,
    /// unpinned occurrence.
    ///
    /// An occurrence with no execution record is treated as pending with the
    /// task's full retry budget. Catch-ups emitted earlier in the sweep join
    /// the working occurrence set, so later catch-ups cannot collide with
    /// them or overrun the per-day cap.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn recover_missed_occurrences(
        &self,
        executions: &[TaskExecution],
        occurrences_by_id: &BTreeMap<String, TaskOccurrence>,
        tasks_by_id: &BTreeMap<String, TaskDefinition>,
        now: NaiveDateTime,
        planner: &CalendarPlanner,
        scheduled_occurrences: &[TaskOccurrence],
        working_hours: &[WorkingHours],
        slot_pool: &[TimeSlot],
        max_per_day: u32,
    ) -> Vec<TaskOccurrence> {
        let scheduler = TaskScheduler;
        let mut working: Vec<TaskOccurrence> = scheduled_occurrences.to_vec();
        let mut recovered = Vec::new();

        for occurrence in occurrences_by_id.values() {
            if occurrence.is_pinned() {
                continue;
            }
            if occurrence.scheduled_for >= now {
                continue;
            }
            let completed = executions
                .iter()
                .any(|e| e.occurrence_id == occurrence.id && e.state == ExecutionState::Done);
            if completed {
                continue;
            }
            let Some(task) = tasks_by_id.get(&occurrence.task_id) else {
                continue;
            };

            let execution = executions
                .iter()
                .find(|e| e.occurrence_id == occurrence.id)
                .cloned()
                .unwrap_or_else(|| {
                    TaskExecution::pending(occurrence.id.clone(), task.retry_policy.max_retries)
                });

            let mut catch_up = None;
            if scheduler.should_retry(&execution) {
                catch_up = scheduler.reschedule_retry(
                    occurrence,
                    &task.retry_policy,
                    now,
                    planner,
                    &working,
                    working_hours,
                    slot_pool,
                    max_per_day,
                );
            }
            if catch_up.is_none() && task.recurrence.is_some() {
                catch_up = scheduler
                    .get_next_occurrence(
                        task,
                        now,
                        planner,
                        &working,
                        working_hours,
                        slot_pool,
                        max_per_day,
                    )
                    .filter(|next| next.scheduled_for > now);
            }

            if let Some(new_occurrence) = catch_up {
                working.push(new_occurrence.clone());
                recovered.push(new_occurrence);
            }
        }

        recovered
    }
}
