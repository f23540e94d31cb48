//! Tuning constants for the enemy orchestration schedulers
//!
//! All magic numbers are collected here with explanations of their purpose
//! and how they interact with each other. Distances are in world units
//! (centimeters), times in seconds.

use serde::{Deserialize, Serialize};

/// Configuration for the enemy AI schedulers
///
/// The defaults have been tuned against large outdoor maps; shrinking the
/// distances on dense maps is usually safe, shrinking the intervals makes
/// the AI noticeably more reactive (and more expensive).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnemyAiConfig {
    // === FORMATION MOVEMENT ===
    /// Seconds between periodic formation checks.
    ///
    /// Each check prunes dead units, runs stuck detection and, for
    /// attack-move formations, the combat-wait logic. Units that get stuck
    /// wait at most this long before the first recovery attempt.
    pub formation_check_interval: f64,

    /// Half-extent used when projecting per-unit formation targets onto
    /// navigable space.
    pub formation_projection_extent: f32,

    /// Minimum distance a unit must have moved between two checks to count
    /// as making progress. Below this the unit's stuck counter increments.
    ///
    /// Units in combat are exempt; they are expected to hold position.
    pub stuck_progress_threshold: f32,

    /// How many consecutive no-progress checks a unit tolerates before a
    /// recovery attempt is made.
    pub stuck_checks_before_recovery: u32,

    /// Distance of a recovery teleport toward the current waypoint.
    pub teleport_forward_range: f32,

    /// Distance of a recovery teleport to the unit's side.
    pub teleport_side_range: f32,

    /// Random yaw applied to forward recovery teleports, in degrees either way.
    pub teleport_angle_range_deg: f32,

    /// Half-extent used when projecting teleport candidates onto navigable
    /// space.
    ///
    /// Kept small so units are only dropped on comfortably navigable ground;
    /// tripled after a round of failed attempts.
    pub teleport_projection_extent: f32,

    /// Candidate positions tried per recovery round before giving up.
    /// Even attempts aim toward the waypoint, odd attempts go sideways.
    pub teleport_projection_attempts: u32,

    /// Vertical nudge used to unstick squad units, which recover by a lift
    /// instead of a teleport.
    pub squad_lift_height: f32,

    /// Fallback row width when a formation request passes zero or less.
    pub fallback_formation_width: u32,

    // === RETREAT / COUNTERATTACK ===
    /// Seconds between periodic retreat re-checks.
    pub retreat_check_interval: f64,

    /// A retreating unit within this distance of its retreat point counts
    /// as arrived even if its movement order has not fully completed.
    pub retreat_arrival_tolerance: f32,

    /// Row width of the formation launched by a counterattack.
    pub counterattack_formation_width: u32,

    /// Offset scale of the counterattack formation.
    pub counterattack_offset_scale: f32,

    /// Locations with a magnitude at or below this are treated as unset,
    /// e.g. a counterattack target that was never filled in.
    pub zero_location_tolerance: f32,
}

impl Default for EnemyAiConfig {
    fn default() -> Self {
        Self {
            formation_check_interval: 3.25,
            formation_projection_extent: 200.0,
            stuck_progress_threshold: 300.0,
            stuck_checks_before_recovery: 1,
            teleport_forward_range: 225.0,
            teleport_side_range: 300.0,
            teleport_angle_range_deg: 20.0,
            teleport_projection_extent: 60.0,
            teleport_projection_attempts: 8,
            squad_lift_height: 100.0,
            fallback_formation_width: 2,
            retreat_check_interval: 2.0,
            retreat_arrival_tolerance: 450.0,
            counterattack_formation_width: 2,
            counterattack_offset_scale: 1.0,
            zero_location_tolerance: 1.0,
        }
    }
}
