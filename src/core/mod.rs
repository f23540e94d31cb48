//! Core types, configuration, errors and events shared by all schedulers

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::EnemyAiConfig;
pub use error::{EnemyAiError, Result};
pub use events::EnemyEvent;
pub use types::{
    Facing, FormationId, IdAllocator, NavQueryId, RetreatId, Seconds, SpawnRequestId, UnitId,
    WaveId,
};
