//! Wave spawning: timer-driven, supply-gated unit batches that launch as
//! formations once every spawn of an iteration has completed.

mod record;
mod scheduler;

pub use record::{WaveElement, WaveKind, WaveLaunch, WaveSpec};
pub use scheduler::WaveScheduler;
