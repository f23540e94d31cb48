//! Formation movement: grouped waypoint travel with stuck recovery and
//! attack-move combat waits.

pub mod layout;
mod record;
mod scheduler;

pub use record::AttackMoveSettings;
pub use scheduler::{FormationMove, FormationScheduler};
