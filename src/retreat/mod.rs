//! Retreats and the counterattacks that follow them.

mod record;
mod scheduler;

pub use record::{CounterattackGroup, CounterattackLaunch, PostRetreatStrategy, RetreatSpec};
pub use scheduler::RetreatScheduler;
