use thiserror::Error;

/// Errors surfaced by the public scheduler entry points.
///
/// Only synchronous configuration problems are returned as errors; runtime
/// integrity problems (dead units, vanished owners, stale callbacks) are
/// logged and cleaned up in place and never bubble out of the schedulers.
#[derive(Error, Debug)]
pub enum EnemyAiError {
    #[error("invalid formation request: {0}")]
    InvalidFormation(String),

    #[error("invalid wave request: {0}")]
    InvalidWave(String),

    #[error("invalid retreat request: {0}")]
    InvalidRetreat(String),
}

pub type Result<T> = std::result::Result<T, EnemyAiError>;
