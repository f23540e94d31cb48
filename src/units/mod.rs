//! Boundary to the host game's units and spawner
//!
//! The schedulers never own units. They hold weak handles to entities that
//! implement [`Commandable`] and look them up by opaque [`UnitId`] when a
//! callback arrives. A handle whose entity has been dropped or destroyed is
//! simply pruned at the next periodic check.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::types::{Facing, SpawnRequestId, UnitId, WaveId};

/// Why a movement order was rejected by a unit's command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    QueueFull,
    QueueInactive,
    QueueHasPatrol,
    InvalidCommandData,
    AbilityNotAllowed,
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CommandError::QueueFull => "command queue full",
            CommandError::QueueInactive => "command queue inactive",
            CommandError::QueueHasPatrol => "command queue holds a patrol",
            CommandError::InvalidCommandData => "invalid command data",
            CommandError::AbilityNotAllowed => "ability not allowed",
        };
        f.write_str(text)
    }
}

/// Broad category of a commandable unit. Determines stuck-recovery style
/// (vehicles teleport, squads get lifted) and counterattack partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitCategory {
    Vehicle,
    Squad,
}

/// One spawnable unit choice inside a wave element.
///
/// `variant` selects the concrete loadout within the category; zero means
/// "unset" and fails wave validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOption {
    pub category: UnitCategory,
    pub variant: u16,
}

impl UnitOption {
    pub fn new(category: UnitCategory, variant: u16) -> Self {
        Self { category, variant }
    }

    pub fn is_valid(&self) -> bool {
        self.variant != 0
    }
}

/// Per-unit command interface implemented by the host game.
pub trait Commandable {
    fn id(&self) -> UnitId;
    fn name(&self) -> String;
    fn location(&self) -> Vec3;
    fn category(&self) -> UnitCategory;

    /// Physical footprint radius used for formation spacing.
    fn formation_radius(&self) -> f32;

    fn is_idle(&self) -> bool;
    fn is_in_combat(&self) -> bool;

    fn move_to(
        &mut self,
        point: Vec3,
        reset_queue: bool,
        final_facing: Facing,
    ) -> std::result::Result<(), CommandError>;

    fn reverse_move_to(
        &mut self,
        point: Vec3,
        reset_queue: bool,
    ) -> std::result::Result<(), CommandError>;

    /// Hard relocation used by stuck recovery. Returns false when the host
    /// refuses the placement (overlap, out of bounds).
    fn teleport_to(&mut self, point: Vec3) -> bool;

    /// Clear the active order so a fresh move can be issued.
    fn set_idle(&mut self);

    /// Squad-style unstuck: nudge the squad's members upward and let local
    /// avoidance resettle them.
    fn lift_unstuck(&mut self, height: f32);

    /// Remove the unit from the world. The entity stays allocated until the
    /// host drops it, but reads as destroyed from then on.
    fn destroy(&mut self);
    fn is_destroyed(&self) -> bool;
}

/// Weak, non-owning handle to a commandable unit.
#[derive(Clone)]
pub struct UnitHandle(Weak<RefCell<dyn Commandable>>);

impl UnitHandle {
    pub fn new(unit: &Rc<RefCell<dyn Commandable>>) -> Self {
        Self(Rc::downgrade(unit))
    }

    /// Upgrade to a live, not-yet-destroyed unit.
    pub fn get(&self) -> Option<Rc<RefCell<dyn Commandable>>> {
        let strong = self.0.upgrade()?;
        if strong.borrow().is_destroyed() {
            return None;
        }
        Some(strong)
    }

    pub fn is_valid(&self) -> bool {
        self.get().is_some()
    }

    /// Unit ID if the entity is still around, destroyed or not.
    pub fn id(&self) -> Option<UnitId> {
        self.0.upgrade().map(|unit| unit.borrow().id())
    }
}

impl std::fmt::Debug for UnitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.get() {
            Some(unit) => write!(f, "UnitHandle({:?})", unit.borrow().id()),
            None => f.write_str("UnitHandle(<dead>)"),
        }
    }
}

/// Minimal view of a building the schedulers only ever check for liveness:
/// wave-owning structures and interval-throttling power generators.
pub trait Structure {
    fn is_destroyed(&self) -> bool;
}

/// Weak handle to a structure.
#[derive(Clone)]
pub struct StructureHandle(Weak<RefCell<dyn Structure>>);

impl StructureHandle {
    pub fn new(structure: &Rc<RefCell<dyn Structure>>) -> Self {
        Self(Rc::downgrade(structure))
    }

    pub fn is_valid(&self) -> bool {
        match self.0.upgrade() {
            Some(structure) => !structure.borrow().is_destroyed(),
            None => false,
        }
    }
}

impl std::fmt::Debug for StructureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StructureHandle(valid: {})", self.is_valid())
    }
}

/// Asynchronous unit spawner boundary.
///
/// `spawn_at` must not block; the host completes the request later through
/// `EnemyController::on_unit_spawned` with the same wave and request IDs.
/// A false return means the request was rejected outright and no completion
/// will arrive.
pub trait UnitSpawner {
    fn spawn_at(
        &mut self,
        option: UnitOption,
        location: Vec3,
        wave: WaveId,
        request: SpawnRequestId,
    ) -> bool;
}
