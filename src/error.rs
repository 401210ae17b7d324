//! Error types for the chime scheduling engine.

/// Top-level error type for the task scheduling system.
///
/// The pure components (planner, scheduler, recovery) never fail; they
/// return `None` or an empty list when scheduling is impossible. Errors
/// surface from the storage layer and from controller commands that
/// reference unknown records.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// Configuration load or parse error.
    #[error("config error: {0}")]
    Config(String),

    /// Task, occurrence, or execution storage error.
    #[error("store error: {0}")]
    Store(String),

    /// A command referenced a task id with no matching record.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// A command referenced an occurrence id with no matching record.
    #[error("unknown occurrence: {0}")]
    UnknownOccurrence(String),

    /// A command tried to complete an occurrence that already has a
    /// completion record.
    #[error("occurrence already completed: {0}")]
    AlreadyCompleted(String),

    /// An interval string could not be parsed.
    #[error("invalid interval: {0}")]
    Interval(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ScheduleError>;
