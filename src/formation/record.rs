//! Per-formation state

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::types::{Facing, FormationId, Seconds, UnitId};
use crate::units::UnitHandle;

/// Tuning for attack-move formations.
///
/// Help offsets place idle units on a ring around an in-combat ally; the
/// ring radius is the ally's footprint radius times a multiplier drawn
/// between `help_radius_min_mult` and `help_radius_max_mult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackMoveSettings {
    pub help_radius_min_mult: f32,
    pub help_radius_max_mult: f32,
    /// Seconds the formation lingers at a waypoint while any member fights
    /// before advancing anyway. Zero or below means it never advances while
    /// combat lasts.
    pub max_combat_linger: Seconds,
    /// Ring candidates tried per idle unit before leaving it as ordered.
    pub max_projection_tries: u32,
    /// Scales the ally radius into the projection extent for candidates.
    pub projection_scale: f32,
}

impl AttackMoveSettings {
    pub fn is_valid(&self) -> bool {
        self.help_radius_min_mult > 0.0
            && self.help_radius_max_mult >= self.help_radius_min_mult
            && self.max_projection_tries > 0
            && self.projection_scale > 0.0
    }
}

impl Default for AttackMoveSettings {
    fn default() -> Self {
        Self {
            help_radius_min_mult: 2.0,
            help_radius_max_mult: 4.0,
            max_combat_linger: 6.0,
            max_projection_tries: 5,
            projection_scale: 1.0,
        }
    }
}

/// One unit's slot in a formation.
#[derive(Debug)]
pub(crate) struct FormationUnit {
    pub handle: UnitHandle,
    pub id: UnitId,
    /// Slot offset in the formation frame, fixed at creation.
    pub offset: Vec2,
    pub reached: bool,
    /// When this unit entered its current stretch of combat. Attack-move only.
    pub combat_since: Option<Seconds>,
    /// Location at the previous periodic check, for progress measurement.
    pub last_location: Option<Vec3>,
    pub stuck_count: u32,
    /// Set when a full recovery round found no navigable placement. Blocks
    /// idle re-orders until a later teleport succeeds.
    pub recovery_failed: bool,
}

impl FormationUnit {
    pub fn new(handle: UnitHandle, id: UnitId, offset: Vec2) -> Self {
        Self {
            handle,
            id,
            offset,
            reached: false,
            combat_since: None,
            last_location: None,
            stuck_count: 0,
            recovery_failed: false,
        }
    }
}

/// A group of units walking an ordered waypoint list together.
#[derive(Debug)]
pub(crate) struct FormationRecord {
    pub id: FormationId,
    pub waypoints: Vec<Vec3>,
    /// Facing to assume at each waypoint, same length as `waypoints`.
    pub facings: Vec<Facing>,
    pub units: Vec<FormationUnit>,
    pub current_waypoint: usize,
    pub attack_move: Option<AttackMoveSettings>,
    /// Where the formation started, usually the average spawn location.
    /// Fallback teleport direction when a stuck unit sits on its target.
    pub origin: Vec3,
}

impl FormationRecord {
    pub fn current_target(&self) -> Option<(Vec3, Facing)> {
        let waypoint = self.waypoints.get(self.current_waypoint)?;
        let facing = self.facings.get(self.current_waypoint)?;
        Some((*waypoint, *facing))
    }

    pub fn all_reached(&self) -> bool {
        self.units.iter().all(|unit| unit.reached)
    }

    /// Facing per leg: each waypoint looks toward the next, the last uses
    /// the caller-supplied facing.
    pub fn leg_facings(waypoints: &[Vec3], final_facing: Facing) -> Vec<Facing> {
        let mut facings = Vec::with_capacity(waypoints.len());
        for (index, waypoint) in waypoints.iter().enumerate() {
            match waypoints.get(index + 1) {
                Some(next) => facings.push(Facing::looking_at(*waypoint, *next)),
                None => facings.push(final_facing),
            }
        }
        facings
    }
}
