//! Real-time scheduling orchestrator.
//!
//! The only stateful, clock-coupled component. Owns one one-shot timer per
//! scheduled occurrence, the paused flag, the missed-task sweep run on
//! startup, and the trigger pipeline that records an execution and chains a
//! retry or recurrence after every fire.
//!
//! Timers are tokio tasks sleeping until their occurrence is due, so the
//! orchestrator must live inside a tokio runtime. All timer and pause
//! mutations serialize through one mutex: public operations lock once and
//! delegate to `*_locked` internals, and a timer callback re-enters through
//! the same lock. Each armed timer carries a generation token; a timer that
//! fires after being cancelled or replaced finds a stale token and becomes a
//! no-op.

use crate::clock::Clock;
use crate::config::CalendarConfig;
use crate::error::Result;
use crate::model::{EventKind, ExecutionState, TaskEvent, TaskExecution, TaskOccurrence};
use crate::notify::{NoticeSender, TriggerNotice};
use crate::planner::CalendarPlanner;
use crate::recovery::RecoveryService;
use crate::repository::TaskRepository;
use crate::scheduler::TaskScheduler;
use chrono::Duration;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Grace window after the scheduled time during which a missed occurrence
/// still fires immediately instead of being routed to recovery.
pub const RECOVERY_GRACE_SECONDS: i64 = 30;

struct ArmedTimer {
    occurrence: TaskOccurrence,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct TimerState {
    paused: bool,
    next_generation: u64,
    timers: HashMap<String, ArmedTimer>,
}

struct Inner {
    repo: Arc<dyn TaskRepository>,
    planner: CalendarPlanner,
    scheduler: TaskScheduler,
    recovery: RecoveryService,
    config: CalendarConfig,
    clock: Clock,
    notices: Option<NoticeSender>,
    state: Mutex<TimerState>,
}

/// Real-time scheduling orchestrator. Cheap to clone; all clones share the
/// same timers and paused flag.
#[derive(Clone)]
pub struct SmartScheduler {
    inner: Arc<Inner>,
}

impl SmartScheduler {
    /// Create an orchestrator over the given repository, calendar
    /// constraints, and clock. Starts unpaused with no timers armed.
    #[must_use]
    pub fn new(repo: Arc<dyn TaskRepository>, config: CalendarConfig, clock: Clock) -> Self {
        Self {
            inner: Arc::new(Inner {
                repo,
                planner: CalendarPlanner,
                scheduler: TaskScheduler,
                recovery: RecoveryService,
                config,
                clock,
                notices: None,
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    /// Attach the notification channel. Builder-style; call before
    /// [`SmartScheduler::start`].
    #[must_use]
    pub fn with_notices(self, notices: NoticeSender) -> Self {
        Self {
            inner: Arc::new(Inner {
                repo: Arc::clone(&self.inner.repo),
                planner: self.inner.planner,
                scheduler: self.inner.scheduler,
                recovery: self.inner.recovery,
                config: self.inner.config.clone(),
                clock: self.inner.clock.clone(),
                notices: Some(notices),
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    /// Resume scheduling: clear the paused flag, rebuild every timer from
    /// the repository, and sweep for occurrences missed in the meantime.
    ///
    /// # Errors
    ///
    /// Propagates repository failures; "nothing to schedule" is not an
    /// error.
    pub fn start(&self) -> Result<()> {
        let mut state = self.inner.lock_state();
        state.paused = false;
        Inner::cancel_all_locked(&mut state);
        Inner::schedule_all_locked(&self.inner, &mut state)?;
        Inner::check_for_missed_locked(&self.inner, &mut state)?;
        info!(armed = state.timers.len(), "scheduler started");
        Ok(())
    }

    /// Cancel every timer and refuse all scheduling until the next
    /// [`SmartScheduler::start`].
    pub fn pause(&self) {
        let mut state = self.inner.lock_state();
        state.paused = true;
        Inner::cancel_all_locked(&mut state);
        info!("scheduler paused");
    }

    /// Arm timers for every future, not-yet-executed occurrence. No-op while
    /// paused.
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub fn schedule_all(&self) -> Result<()> {
        let mut state = self.inner.lock_state();
        Inner::schedule_all_locked(&self.inner, &mut state)
    }

    /// Arm a timer for one occurrence, firing inline if it is already due.
    /// Silently drops stale occurrences (already executed, or no longer
    /// valid against the calendar) and is a no-op while paused.
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub fn schedule_occurrence(&self, occurrence: &TaskOccurrence) -> Result<()> {
        let mut state = self.inner.lock_state();
        Inner::schedule_occurrence_locked(&self.inner, &mut state, occurrence)
    }

    /// Sweep all unexecuted occurrences: a miss within the grace window
    /// fires inline, an older miss is routed to recovery. No-op while
    /// paused.
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub fn check_for_missed_tasks(&self) -> Result<()> {
        let mut state = self.inner.lock_state();
        Inner::check_for_missed_locked(&self.inner, &mut state)
    }

    /// Run the trigger pipeline for an occurrence right now: record the
    /// completion and chain a retry or recurrence.
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub fn complete_now(&self, occurrence: &TaskOccurrence) -> Result<()> {
        let mut state = self.inner.lock_state();
        Inner::on_trigger_locked(&self.inner, &mut state, occurrence)
    }

    /// Run the recovery sweep on demand and arm every catch-up it produces.
    /// Returns the catch-up occurrences.
    ///
    /// # Errors
    ///
    /// Propagates repository failures.
    pub fn recover_missed(&self) -> Result<Vec<TaskOccurrence>> {
        let mut state = self.inner.lock_state();
        Inner::recover_locked(&self.inner, &mut state)
    }

    /// Snapshot of the currently armed occurrences, ordered by scheduled
    /// time.
    #[must_use]
    pub fn scheduled_occurrences(&self) -> Vec<TaskOccurrence> {
        let state = self.inner.lock_state();
        let mut armed: Vec<TaskOccurrence> = state
            .timers
            .values()
            .map(|t| t.occurrence.clone())
            .collect();
        armed.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for).then_with(|| a.id.cmp(&b.id)));
        armed
    }

    /// Whether the scheduler is currently paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.inner.lock_state().paused
    }

    /// The repository this scheduler reads and writes.
    #[must_use]
    pub fn repository(&self) -> Arc<dyn TaskRepository> {
        Arc::clone(&self.inner.repo)
    }

    /// The calendar constraints this scheduler enforces.
    #[must_use]
    pub fn config(&self) -> &CalendarConfig {
        &self.inner.config
    }

    /// The clock this scheduler runs on.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.inner.clock
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_all_locked(state: &mut TimerState) {
        for (_, timer) in state.timers.drain() {
            if let Some(handle) = timer.handle {
                handle.abort();
            }
        }
    }

    fn cancel_timer_locked(state: &mut TimerState, occurrence_id: &str) {
        if let Some(timer) = state.timers.remove(occurrence_id) {
            if let Some(handle) = timer.handle {
                handle.abort();
            }
        }
    }

    /// Ids of occurrences that already have a completion record.
    fn executed_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .repo
            .list_executions()?
            .into_iter()
            .filter(|e| e.state == ExecutionState::Done)
            .map(|e| e.occurrence_id)
            .collect())
    }

    fn schedule_all_locked(this: &Arc<Inner>, state: &mut TimerState) -> Result<()> {
        if state.paused {
            return Ok(());
        }
        let executed = this.executed_ids()?;
        let now = this.clock.now();
        for occurrence in this.repo.list_occurrences()? {
            if occurrence.scheduled_for > now && !executed.contains(&occurrence.id) {
                Inner::schedule_occurrence_locked(this, state, &occurrence)?;
            }
        }
        Ok(())
    }

    fn schedule_occurrence_locked(
        this: &Arc<Inner>,
        state: &mut TimerState,
        occurrence: &TaskOccurrence,
    ) -> Result<()> {
        if state.paused {
            return Ok(());
        }
        let executed = this.executed_ids()?;
        if executed.contains(&occurrence.id) {
            debug!(occurrence = %occurrence.id, "already completed, not scheduling");
            return Ok(());
        }

        let others: Vec<TaskOccurrence> = this
            .repo
            .list_occurrences()?
            .into_iter()
            .filter(|o| o.id != occurrence.id)
            .collect();
        if !this.planner.is_slot_available(
            occurrence.scheduled_for,
            &others,
            &this.config.working_hours,
            this.config.max_per_day,
            Some(&this.config.slot_pool),
        ) {
            debug!(occurrence = %occurrence.id, "dropping stale occurrence");
            return Ok(());
        }

        Inner::cancel_timer_locked(state, &occurrence.id);

        let delay = occurrence.scheduled_for - this.clock.now();
        if delay <= Duration::zero() {
            return Inner::on_trigger_locked(this, state, occurrence);
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        state.timers.insert(
            occurrence.id.clone(),
            ArmedTimer {
                occurrence: occurrence.clone(),
                generation,
                handle: None,
            },
        );

        let sleep_for = delay.to_std().unwrap_or_default();
        let timer_inner = Arc::clone(this);
        let occurrence_id = occurrence.id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(sleep_for).await;
            Inner::on_timer_fire(&timer_inner, &occurrence_id, generation);
        });
        if let Some(armed) = state.timers.get_mut(&occurrence.id) {
            armed.handle = Some(handle);
        }
        debug!(
            occurrence = %occurrence.id,
            delay_secs = delay.num_seconds(),
            "armed timer"
        );
        Ok(())
    }

    fn check_for_missed_locked(this: &Arc<Inner>, state: &mut TimerState) -> Result<()> {
        if state.paused {
            return Ok(());
        }
        let executed = this.executed_ids()?;
        let now = this.clock.now();
        let grace = Duration::seconds(RECOVERY_GRACE_SECONDS);
        let mut needs_recovery = false;

        for occurrence in this.repo.list_occurrences()? {
            if executed.contains(&occurrence.id) {
                continue;
            }
            let delta = now - occurrence.scheduled_for;
            if delta > Duration::zero() && delta <= grace {
                Inner::on_trigger_locked(this, state, &occurrence)?;
            } else if delta > grace {
                needs_recovery = true;
            }
        }

        // One sweep covers every occurrence missed beyond the grace window.
        if needs_recovery {
            Inner::recover_locked(this, state)?;
        }
        Ok(())
    }

    /// Timer callback entry point. Re-enters the scheduler lock and runs
    /// the trigger pipeline unless the timer was cancelled or replaced in
    /// the meantime.
    fn on_timer_fire(this: &Arc<Inner>, occurrence_id: &str, generation: u64) {
        let mut state = this.lock_state();
        if state.paused {
            return;
        }
        let occurrence = match state.timers.get(occurrence_id) {
            Some(armed) if armed.generation == generation => armed.occurrence.clone(),
            _ => {
                debug!(occurrence = %occurrence_id, "stale timer fired, ignoring");
                return;
            }
        };
        if let Err(e) = Inner::on_trigger_locked(this, &mut state, &occurrence) {
            error!(occurrence = %occurrence_id, "trigger pipeline failed: {e}");
        }
    }

    /// The trigger pipeline: cancel the timer, record the completion,
    /// notify, then chain a retry or recurrence.
    fn on_trigger_locked(
        this: &Arc<Inner>,
        state: &mut TimerState,
        occurrence: &TaskOccurrence,
    ) -> Result<()> {
        Inner::cancel_timer_locked(state, &occurrence.id);

        let Some(task) = this.repo.get_task(&occurrence.task_id)? else {
            warn!(
                occurrence = %occurrence.id,
                task = %occurrence.task_id,
                "ignoring occurrence with no task definition"
            );
            return Ok(());
        };

        let now = this.clock.now();
        this.repo.add_execution(TaskExecution {
            occurrence_id: occurrence.id.clone(),
            state: ExecutionState::Done,
            retries_remaining: task.retry_policy.max_retries.saturating_sub(1),
            history: vec![TaskEvent {
                event: EventKind::Completed,
                timestamp: now,
            }],
        })?;
        info!(occurrence = %occurrence.id, task = %task.title, "occurrence fired");

        if let Some(notices) = &this.notices {
            let notice = TriggerNotice {
                title: task.title.clone(),
                occurrence: occurrence.clone(),
                fired_at: now,
            };
            if notices.send(notice).is_err() {
                debug!("notice channel closed, dropping trigger notice");
            }
        }

        let scheduled = this.repo.list_occurrences()?;
        if let Some(retry) = this.scheduler.reschedule_retry(
            occurrence,
            &task.retry_policy,
            now,
            &this.planner,
            &scheduled,
            &this.config.working_hours,
            &this.config.slot_pool,
            this.config.max_per_day,
        ) {
            this.repo.add_occurrence(retry.clone())?;
            return Inner::schedule_occurrence_locked(this, state, &retry);
        }

        if task.recurrence.is_some() {
            if let Some(next) = this.scheduler.get_next_occurrence(
                &task,
                now,
                &this.planner,
                &scheduled,
                &this.config.working_hours,
                &this.config.slot_pool,
                this.config.max_per_day,
            ) {
                this.repo.add_occurrence(next.clone())?;
                Inner::schedule_occurrence_locked(this, state, &next)?;
            }
        }
        Ok(())
    }

    /// Full recovery sweep: compute catch-ups for everything missed beyond
    /// the grace window, persist them, and arm their timers.
    fn recover_locked(this: &Arc<Inner>, state: &mut TimerState) -> Result<Vec<TaskOccurrence>> {
        let executions = this.repo.list_executions()?;
        let occurrences = this.repo.list_occurrences()?;
        let occurrences_by_id: BTreeMap<String, TaskOccurrence> = occurrences
            .iter()
            .map(|o| (o.id.clone(), o.clone()))
            .collect();
        let tasks_by_id: BTreeMap<String, _> = this
            .repo
            .list_tasks()?
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();

        let recovered = this.recovery.recover_missed_occurrences(
            &executions,
            &occurrences_by_id,
            &tasks_by_id,
            this.clock.now(),
            &this.planner,
            &occurrences,
            &this.config.working_hours,
            &this.config.slot_pool,
            this.config.max_per_day,
        );

        if !recovered.is_empty() {
            info!(count = recovered.len(), "recovery produced catch-up occurrences");
        }
        for occurrence in &recovered {
            this.repo.add_occurrence(occurrence.clone())?;
            Inner::schedule_occurrence_locked(this, state, occurrence)?;
        }
        Ok(recovered)
    }
}
