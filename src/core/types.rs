//! Core type definitions used throughout the codebase

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Simulation wall-clock time in seconds, as supplied by the host each update.
pub type Seconds = f64;

/// Opaque identifier for an active formation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormationId(pub u32);

/// Opaque identifier for a registered attack wave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaveId(pub u32);

/// Opaque identifier for an in-flight retreat operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RetreatId(pub u32);

/// Stable identifier of a commandable unit, assigned by the host game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(pub u64);

/// Correlates an asynchronous spawn request with its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpawnRequestId(pub u32);

/// Correlates an asynchronous navigation query with its result delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NavQueryId(pub u32);

/// Hands out sequential IDs; zero is never issued so callers can treat it
/// as a sentinel.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IdAllocator {
    last: u32,
}

impl IdAllocator {
    pub fn next(&mut self) -> u32 {
        self.last += 1;
        self.last
    }
}

/// A facing in the ground plane, stored as a yaw angle in radians.
///
/// Formation offsets are expressed in a local frame (+x forward, +y right)
/// and rotated into world space through the facing of the current waypoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Facing(pub f32);

impl Facing {
    pub fn from_yaw(yaw: f32) -> Self {
        Self(yaw)
    }

    /// Facing that looks from `from` toward `to`, projected to the ground plane.
    /// Falls back to yaw zero when the points coincide.
    pub fn looking_at(from: Vec3, to: Vec3) -> Self {
        let delta = to - from;
        let flat = Vec2::new(delta.x, delta.y);
        if flat.length_squared() < 1e-6 {
            return Self(0.0);
        }
        Self(flat.y.atan2(flat.x))
    }

    /// Rotate a local-frame offset into the world ground plane.
    pub fn rotate(&self, offset: Vec2) -> Vec2 {
        Vec2::from_angle(self.0).rotate(offset)
    }

    /// World-space point reached by applying a local offset at `anchor`.
    pub fn offset_from(&self, anchor: Vec3, offset: Vec2) -> Vec3 {
        let rotated = self.rotate(offset);
        anchor + Vec3::new(rotated.x, rotated.y, 0.0)
    }
}

/// Squared distance in the ground plane, ignoring height differences.
pub fn dist_squared_2d(a: Vec3, b: Vec3) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Whether a world point is (numerically) the zero vector, which the public
/// entry points treat as "unset".
pub fn is_zero_location(point: Vec3, tolerance: f32) -> bool {
    point.length_squared() <= tolerance * tolerance
}
