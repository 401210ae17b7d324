//! Chime: a local, deterministic task scheduler for recurring and one-off
//! user tasks.
//!
//! Occurrences fire at their scheduled wall-clock time inside user-defined
//! working hours and named time slots. A missed execution retries under a
//! bounded policy, a completed task chains into its next recurrence, and a
//! recovery sweep proposes catch-ups for anything missed while the host
//! process was not running.
//!
//! # Architecture
//!
//! Pure logic components composed by one stateful orchestrator:
//! - **Calendar planner**: availability oracle (working hours, slot pool, per-day cap)
//! - **Task scheduler**: due/missed/retry decisions and recurrence placement
//! - **Recovery service**: catch-up occurrences after downtime
//! - **Smart scheduler**: one-shot timers, pause/resume, missed-task sweep
//! - **Controller**: flat, validated command surface
//!
//! Persistence is a small upsert-by-id repository; the speech/notification
//! side effect is an unbounded channel of [`TriggerNotice`] values. Every
//! clock read goes through an injected [`Clock`], so the whole engine runs
//! deterministically under test.

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod interval;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod planner;
pub mod recovery;
pub mod repository;
pub mod scheduler;

pub use clock::Clock;
pub use config::CalendarConfig;
pub use controller::SchedulerController;
pub use error::{Result, ScheduleError};
pub use model::{
    EventKind, ExecutionState, Priority, RetryPolicy, TaskDefinition, TaskEvent, TaskExecution,
    TaskOccurrence, TimeSlot, Weekday, WorkingHours,
};
pub use notify::{notice_channel, NoticeReceiver, NoticeSender, TriggerNotice};
pub use orchestrator::{SmartScheduler, RECOVERY_GRACE_SECONDS};
pub use planner::{CalendarPlanner, PlannedSlot};
pub use recovery::RecoveryService;
pub use repository::{InMemoryRepository, JsonFileRepository, TaskRepository};
pub use scheduler::TaskScheduler;
