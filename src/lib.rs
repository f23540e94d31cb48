//! Iron Tide - Enemy Orchestration Scheduler

pub mod controller;
pub mod core;
pub mod formation;
pub mod nav;
pub mod retreat;
pub mod units;
pub mod waves;
