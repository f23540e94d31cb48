//! Attack wave state

use ahash::AHashSet;
use glam::Vec3;
use rand::Rng;

use crate::core::types::{Facing, Seconds, SpawnRequestId, WaveId};
use crate::formation::AttackMoveSettings;
use crate::units::{StructureHandle, UnitHandle, UnitOption};

/// What a wave's lifecycle and timing are tied to.
#[derive(Debug, Clone)]
pub enum WaveKind {
    /// Free-standing; only an explicit cancel removes it.
    Independent,
    /// Cancelled when its owning structure dies.
    StructureOwned { owner: StructureHandle },
    /// Cancelled with its owner; each destroyed power generator stretches
    /// the spawn interval by `per_generator_fraction`.
    GeneratorThrottled {
        owner: StructureHandle,
        generators: Vec<StructureHandle>,
        per_generator_fraction: f64,
    },
}

impl WaveKind {
    /// False only when a required owning structure is gone.
    pub fn owner_is_valid(&self) -> bool {
        match self {
            WaveKind::Independent => true,
            WaveKind::StructureOwned { owner } => owner.is_valid(),
            WaveKind::GeneratorThrottled { owner, .. } => owner.is_valid(),
        }
    }

    pub fn generator_penalty(&self) -> f64 {
        match self {
            WaveKind::GeneratorThrottled {
                generators,
                per_generator_fraction,
                ..
            } => {
                let destroyed = generators.iter().filter(|g| !g.is_valid()).count();
                1.0 + per_generator_fraction * destroyed as f64
            }
            _ => 1.0,
        }
    }
}

/// One spawn slot of a wave: where to spawn and which unit options to pick
/// from, uniformly at random, each iteration.
#[derive(Debug, Clone)]
pub struct WaveElement {
    pub spawn_point: Vec3,
    pub options: Vec<UnitOption>,
}

/// Creation parameters for a wave.
#[derive(Debug, Clone)]
pub struct WaveSpec {
    pub kind: WaveKind,
    pub elements: Vec<WaveElement>,
    pub base_interval: Seconds,
    /// Fraction of `base_interval` the actual delay may deviate, in `[0,1)`.
    pub interval_variance: f64,
    pub waypoints: Vec<Vec3>,
    pub final_facing: Facing,
    pub max_row_width: u32,
    pub offset_scale: f32,
    /// When set, launched groups use attack-move semantics.
    pub attack_move: Option<AttackMoveSettings>,
    /// Fire the first iteration on the next update instead of waiting a
    /// full interval.
    pub instant_start: bool,
}

/// A completed wave iteration ready for the formation scheduler.
#[derive(Debug)]
pub struct WaveLaunch {
    pub wave: WaveId,
    pub units: Vec<UnitHandle>,
    /// Average spawn location of the collected units.
    pub origin: Vec3,
    pub waypoints: Vec<Vec3>,
    pub final_facing: Facing,
    pub max_row_width: u32,
    pub offset_scale: f32,
    pub attack_move: Option<AttackMoveSettings>,
}

/// A registered wave between iterations.
#[derive(Debug)]
pub(crate) struct AttackWave {
    pub id: WaveId,
    pub kind: WaveKind,
    pub elements: Vec<WaveElement>,
    pub base_interval: Seconds,
    pub interval_variance: f64,
    pub waypoints: Vec<Vec3>,
    pub final_facing: Facing,
    pub max_row_width: u32,
    pub offset_scale: f32,
    pub attack_move: Option<AttackMoveSettings>,
    pub recurring: bool,
    pub next_fire_at: Seconds,
    /// Spawn completions still owed for the current iteration.
    pub outstanding: u32,
    pub pending: AHashSet<SpawnRequestId>,
    pub collected: Vec<UnitHandle>,
    pub spawn_locations: Vec<Vec3>,
}

impl AttackWave {
    /// Delay until the next iteration: uniform around the base interval,
    /// stretched by the generator penalty.
    pub fn next_delay<R: Rng>(&self, rng: &mut R) -> Seconds {
        let spread = self.base_interval * self.interval_variance;
        let low = self.base_interval - spread;
        let high = self.base_interval + spread;
        let sample = if spread > 0.0 {
            rng.gen_range(low..=high)
        } else {
            self.base_interval
        };
        sample * self.kind.generator_penalty()
    }
}
