//! Flat command surface over the smart scheduler.
//!
//! Validation only: commands referencing unknown records are rejected here,
//! and everything else is delegated. No scheduling logic lives at this
//! layer.

use crate::error::{Result, ScheduleError};
use crate::model::{ExecutionState, TaskOccurrence};
use crate::orchestrator::SmartScheduler;
use crate::planner::CalendarPlanner;
use crate::scheduler::TaskScheduler;
use tracing::debug;

/// High-level control for scheduling, retry, and recovery.
pub struct SchedulerController {
    smart: SmartScheduler,
    scheduler: TaskScheduler,
    planner: CalendarPlanner,
}

impl SchedulerController {
    /// Controller over an orchestrator.
    #[must_use]
    pub fn new(smart: SmartScheduler) -> Self {
        Self {
            smart,
            scheduler: TaskScheduler,
            planner: CalendarPlanner,
        }
    }

    /// Resume scheduling and run the missed-task sweep.
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub fn start(&self) -> Result<()> {
        self.smart.start()
    }

    /// Cancel all timers and freeze scheduling.
    pub fn pause(&self) {
        self.smart.pause();
    }

    /// Equivalent to [`SchedulerController::start`].
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub fn resume(&self) -> Result<()> {
        self.smart.start()
    }

    /// Mark an occurrence as completed now and chain its retry or
    /// recurrence.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::UnknownOccurrence`] if the id has no record,
    /// [`ScheduleError::AlreadyCompleted`] if a completion already exists.
    pub fn mark_done(&self, occurrence_id: &str) -> Result<()> {
        let occurrence = self.find_occurrence(occurrence_id)?;
        if self.already_done(occurrence_id)? {
            return Err(ScheduleError::AlreadyCompleted(occurrence_id.to_owned()));
        }
        debug!(occurrence = %occurrence_id, "marking occurrence done");
        self.smart.complete_now(&occurrence)
    }

    /// Force a retry attempt for an occurrence. Returns the new occurrence,
    /// or `None` when the occurrence is already completed, the retry budget
    /// is zero, or no slot is free within the search window.
    ///
    /// # Errors
    ///
    /// [`ScheduleError::UnknownOccurrence`] if the id has no record,
    /// [`ScheduleError::UnknownTask`] if the occurrence points at a deleted
    /// task.
    pub fn retry_occurrence(&self, occurrence_id: &str) -> Result<Option<TaskOccurrence>> {
        let occurrence = self.find_occurrence(occurrence_id)?;
        if self.already_done(occurrence_id)? {
            return Ok(None);
        }
        let repo = self.smart.repository();
        let task = repo
            .get_task(&occurrence.task_id)?
            .ok_or_else(|| ScheduleError::UnknownTask(occurrence.task_id.clone()))?;

        let config = self.smart.config();
        let scheduled = repo.list_occurrences()?;
        let retry = self.scheduler.reschedule_retry(
            &occurrence,
            &task.retry_policy,
            self.smart.clock().now(),
            &self.planner,
            &scheduled,
            &config.working_hours,
            &config.slot_pool,
            config.max_per_day,
        );

        match retry {
            Some(new_occurrence) => {
                repo.add_occurrence(new_occurrence.clone())?;
                self.smart.schedule_occurrence(&new_occurrence)?;
                Ok(Some(new_occurrence))
            }
            None => Ok(None),
        }
    }

    /// Snapshot of currently armed occurrences.
    #[must_use]
    pub fn scheduled_occurrences(&self) -> Vec<TaskOccurrence> {
        self.smart.scheduled_occurrences()
    }

    /// Run the recovery sweep on demand. Returns the catch-up occurrences
    /// it produced and armed.
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub fn recover_missed_tasks(&self) -> Result<Vec<TaskOccurrence>> {
        self.smart.recover_missed()
    }

    fn find_occurrence(&self, occurrence_id: &str) -> Result<TaskOccurrence> {
        self.smart
            .repository()
            .list_occurrences()?
            .into_iter()
            .find(|o| o.id == occurrence_id)
            .ok_or_else(|| ScheduleError::UnknownOccurrence(occurrence_id.to_owned()))
    }

    fn already_done(&self, occurrence_id: &str) -> Result<bool> {
        Ok(self
            .smart
            .repository()
            .list_executions()?
            .iter()
            .any(|e| e.occurrence_id == occurrence_id && e.state == ExecutionState::Done))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::clock::Clock;
    use crate::config::CalendarConfig;
    use crate::model::{
        RetryPolicy, TaskDefinition, TaskExecution, TimeSlot, Weekday, WorkingHours,
    };
    use crate::repository::{InMemoryRepository, TaskRepository};
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use std::sync::Arc;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 13)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn test_config() -> CalendarConfig {
        let slot_names = vec!["morning".to_owned(), "evening".to_owned()];
        CalendarConfig {
            working_hours: [
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
                start: time(9, 0),
                end: time(22, 0),
                allowed_slots: slot_names.clone(),
            })
            .collect(),
            slot_pool: vec![
                TimeSlot::new("morning", time(9, 0), time(12, 0)),
                TimeSlot::new("evening", time(20, 0), time(21, 0)),
            ],
            max_per_day: 5,
        }
    }

    fn controller_at(now: NaiveDateTime) -> (SchedulerController, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let smart = SmartScheduler::new(
            Arc::clone(&repo) as Arc<dyn TaskRepository>,
            test_config(),
            Clock::manual(now),
        );
        (SchedulerController::new(smart), repo)
    }

    fn task(id: &str, max_retries: u32) -> TaskDefinition {
        TaskDefinition {
            id: id.to_owned(),
            ..TaskDefinition::new("Task", monday(8, 0))
        }
        .with_retry_policy(RetryPolicy::new(max_retries))
    }

    #[tokio::test]
    async fn mark_done_rejects_unknown_occurrence() {
        let (controller, _repo) = controller_at(monday(9, 0));
        let err = controller.mark_done("missing").unwrap_err();
        assert!(matches!(err, ScheduleError::UnknownOccurrence(id) if id == "missing"));
    }

    #[tokio::test]
    async fn mark_done_completes_and_chains() {
        let (controller, repo) = controller_at(monday(10, 0));
        repo.add_task(task("t1", 1)).unwrap();
        repo.add_occurrence(TaskOccurrence::in_slot("o1", "t1", monday(9, 0), "morning"))
            .unwrap();

        controller.mark_done("o1").unwrap();

        let executions = repo.list_executions().unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].occurrence_id, "o1");
        assert_eq!(executions[0].state, ExecutionState::Done);
        // Retry budget remains, so a retry was armed.
        let armed = controller.scheduled_occurrences();
        assert_eq!(armed.len(), 1);
        assert!(armed[0].id.contains(":retry:"));
    }

    #[tokio::test]
    async fn mark_done_twice_is_rejected() {
        let (controller, repo) = controller_at(monday(10, 0));
        repo.add_task(task("t1", 0)).unwrap();
        repo.add_occurrence(TaskOccurrence::in_slot("o1", "t1", monday(9, 0), "morning"))
            .unwrap();

        controller.mark_done("o1").unwrap();
        let err = controller.mark_done("o1").unwrap_err();
        assert!(matches!(err, ScheduleError::AlreadyCompleted(id) if id == "o1"));
    }

    #[tokio::test]
    async fn retry_occurrence_returns_the_new_occurrence() {
        let (controller, repo) = controller_at(monday(10, 0));
        repo.add_task(task("t1", 2)).unwrap();
        repo.add_occurrence(TaskOccurrence::in_slot("o1", "t1", monday(9, 0), "morning"))
            .unwrap();

        let retry = controller.retry_occurrence("o1").unwrap().unwrap();
        assert_eq!(retry.task_id, "t1");
        assert_eq!(retry.scheduled_for, monday(20, 0));
        // Persisted and armed.
        assert_eq!(repo.list_occurrences().unwrap().len(), 2);
        assert_eq!(controller.scheduled_occurrences().len(), 1);
    }

    #[tokio::test]
    async fn retry_occurrence_is_null_when_exhausted() {
        let (controller, repo) = controller_at(monday(10, 0));
        repo.add_task(task("t1", 0)).unwrap();
        repo.add_occurrence(TaskOccurrence::in_slot("o1", "t1", monday(9, 0), "morning"))
            .unwrap();

        assert!(controller.retry_occurrence("o1").unwrap().is_none());
    }

    #[tokio::test]
    async fn retry_occurrence_is_null_when_already_done() {
        let (controller, repo) = controller_at(monday(10, 0));
        repo.add_task(task("t1", 2)).unwrap();
        repo.add_occurrence(TaskOccurrence::in_slot("o1", "t1", monday(9, 0), "morning"))
            .unwrap();
        repo.add_execution(TaskExecution {
            state: ExecutionState::Done,
            ..TaskExecution::pending("o1", 0)
        })
        .unwrap();

        assert!(controller.retry_occurrence("o1").unwrap().is_none());
    }

    #[tokio::test]
    async fn retry_occurrence_rejects_unknown_ids() {
        let (controller, repo) = controller_at(monday(10, 0));
        let err = controller.retry_occurrence("missing").unwrap_err();
        assert!(matches!(err, ScheduleError::UnknownOccurrence(_)));

        // An occurrence pointing at a deleted task is surfaced too.
        repo.add_occurrence(TaskOccurrence::in_slot("o1", "ghost", monday(9, 0), "morning"))
            .unwrap();
        let err = controller.retry_occurrence("o1").unwrap_err();
        assert!(matches!(err, ScheduleError::UnknownTask(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn pause_and_resume_round_trip() {
        let (controller, repo) = controller_at(monday(8, 0));
        repo.add_task(task("t1", 0)).unwrap();
        repo.add_occurrence(TaskOccurrence::in_slot("o1", "t1", monday(9, 0), "morning"))
            .unwrap();

        controller.start().unwrap();
        assert_eq!(controller.scheduled_occurrences().len(), 1);

        controller.pause();
        assert!(controller.scheduled_occurrences().is_empty());

        controller.resume().unwrap();
        assert_eq!(controller.scheduled_occurrences().len(), 1);
    }

    #[tokio::test]
    async fn recover_missed_tasks_runs_on_demand() {
        let (controller, repo) = controller_at(monday(12, 0));
        repo.add_task(task("t1", 1)).unwrap();
        repo.add_occurrence(TaskOccurrence::in_slot("o1", "t1", monday(9, 0), "morning"))
            .unwrap();

        let recovered = controller.recover_missed_tasks().unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].scheduled_for, monday(20, 0));
        assert_eq!(controller.scheduled_occurrences().len(), 1);
    }
}
