//! Events generated by the enemy schedulers
//!
//! These events are collected during every `EnemyController::update` and
//! public entry point, and drained by the host for UI, telemetry or
//! scripting triggers. They mirror what the schedulers log, but in a
//! machine-consumable form.

use glam::Vec3;

use crate::core::types::{FormationId, RetreatId, Seconds, UnitId, WaveId};

#[derive(Debug, Clone, PartialEq)]
pub enum EnemyEvent {
    /// A formation advanced to its next waypoint.
    FormationAdvanced {
        formation: FormationId,
        waypoint_index: usize,
    },
    /// A formation reached its final waypoint and was retired.
    FormationCompleted { formation: FormationId },
    /// A formation lost its last unit and was silently retired.
    FormationEmptied { formation: FormationId },
    /// A unit vanished from an active formation; one supply refunded.
    FormationUnitLost {
        formation: FormationId,
        unit: UnitId,
    },
    /// A stuck unit was teleported back onto navigable ground.
    UnitUnstuck {
        formation: FormationId,
        unit: UnitId,
        location: Vec3,
    },
    /// A unit that had completed its formation died later; one supply refunded.
    VeteranUnitLost { unit: UnitId },

    /// A wave iteration issued spawn requests.
    WaveIterationStarted {
        wave: WaveId,
        requested: usize,
        skipped_for_supply: usize,
    },
    /// A wave iteration could not afford a single element and was re-armed.
    WaveIterationSkipped { wave: WaveId, next_fire_at: Seconds },
    /// All of a wave iteration's spawns completed and the group was handed
    /// to the formation scheduler.
    WaveLaunched {
        wave: WaveId,
        formation: FormationId,
        units: usize,
    },
    /// A wave's owning structure died; the wave was cancelled.
    WaveCancelled { wave: WaveId },
    /// A single-shot wave finished its one iteration and was removed.
    WaveRetired { wave: WaveId },

    /// A retreat operation finished without survivors or counterattack.
    RetreatDissolved { retreat: RetreatId },
    /// A retreating unit arrived and was destroyed per strategy.
    RetreatUnitRemoved { retreat: RetreatId, unit: UnitId },
    /// A retreat operation's survivors were launched at the counterattack
    /// target.
    CounterattackLaunched {
        retreat: RetreatId,
        formation: FormationId,
        target: Vec3,
    },
}
