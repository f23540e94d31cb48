//! Retreat operation state

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::types::{RetreatId, Seconds, UnitId};
use crate::units::UnitHandle;

/// What happens once a retreat is effectively complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostRetreatStrategy {
    /// Unconfigured. Behaves as [`PostRetreatStrategy::RemoveUnits`] with an
    /// error logged, pending product clarification.
    None,
    /// Regroup and counterattack the configured target.
    Attack,
    /// Destroy each unit as it arrives at its retreat point.
    RemoveUnits,
}

/// One retreating unit and its individual destination.
#[derive(Debug)]
pub(crate) struct RetreatElement {
    pub handle: UnitHandle,
    pub id: UnitId,
    pub destination: Vec3,
    /// Reverse-moving units back away without turning around.
    pub reverse: bool,
}

/// Creation parameters for a retreat.
#[derive(Debug)]
pub struct RetreatSpec {
    /// Units retreating with a normal move order, each to its own point.
    pub retreating: Vec<(UnitHandle, Vec3)>,
    /// Units retreating with a reverse-move order.
    pub reverse_moving: Vec<(UnitHandle, Vec3)>,
    pub strategy: PostRetreatStrategy,
    pub counterattack_target: Vec3,
    /// Seconds after the last unit arrives before the counterattack fires.
    pub grace_delay: Seconds,
    /// Hard ceiling: the counterattack fires this long after the retreat
    /// starts even if units never arrive.
    pub max_wait: Seconds,
}

/// A tracked in-flight retreat.
#[derive(Debug)]
pub(crate) struct RetreatOperation {
    pub id: RetreatId,
    pub elements: Vec<RetreatElement>,
    pub strategy: PostRetreatStrategy,
    pub counterattack_target: Vec3,
    pub grace_delay: Seconds,
    /// Armed at creation for attack operations.
    pub max_wait_deadline: Option<Seconds>,
    /// Armed the first time every remaining unit has arrived.
    pub grace_deadline: Option<Seconds>,
    pub all_arrived: bool,
}

/// Survivors of an attack retreat, grouped by unit category, ready for the
/// formation scheduler.
#[derive(Debug)]
pub struct CounterattackLaunch {
    pub retreat: RetreatId,
    pub target: Vec3,
    pub groups: Vec<CounterattackGroup>,
}

#[derive(Debug)]
pub struct CounterattackGroup {
    pub units: Vec<UnitHandle>,
    /// Average location of the group, the effective origin of its formation.
    pub origin: Vec3,
}
