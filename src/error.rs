use std::time::Duration;

use thiserror::Error;

use crate::render::PaginateError;

/// Failure of a single console command.
///
/// Everything except [`ConsoleError::Cancelled`] is reported back to the
/// operator by the dispatcher; cancellation is left to the caller's own
/// shutdown handling.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("shell error: {0}")]
    Shell(#[from] std::io::Error),

    #[error(transparent)]
    Paginate(#[from] PaginateError),

    #[error("eval failed: {0}")]
    Eval(String),

    #[error("permission check failed: {0}")]
    Permission(String),

    #[error("delivery failed: {0}")]
    Transport(String),

    #[error("command cancelled")]
    Cancelled,

    /// The dispatcher gave up waiting; the invocation was dropped.
    #[error("command timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("unknown module '{0}'")]
    Unknown(String),

    #[error("module '{0}' is already loaded")]
    AlreadyLoaded(String),

    #[error("module '{0}' is not loaded")]
    NotLoaded(String),
}
