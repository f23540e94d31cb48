//! Formation Movement Scheduler
//!
//! Drives every active [`FormationRecord`] toward its waypoints. A shared
//! periodic check prunes dead units, measures per-unit progress, recovers
//! stuck units and, for attack-move formations, holds the group at a
//! waypoint while any member is fighting. Waypoint arrival itself comes in
//! through `on_unit_reached_waypoint` callbacks from the host.

use ahash::{AHashMap, AHashSet};
use glam::{Vec2, Vec3};
use rand::Rng;

use crate::controller::WaveSupply;
use crate::core::types::{dist_squared_2d, Facing, FormationId, IdAllocator, Seconds, UnitId};
use crate::core::{EnemyAiConfig, EnemyAiError, EnemyEvent, Result};
use crate::formation::layout::grid_offsets;
use crate::formation::record::{AttackMoveSettings, FormationRecord, FormationUnit};
use crate::nav::NavQuery;
use crate::units::{UnitCategory, UnitHandle};

/// Parameters shared by plain and attack-move formation requests.
#[derive(Debug, Clone)]
pub struct FormationMove {
    pub units: Vec<UnitHandle>,
    /// Where the group is coming from. Defaults to the units' average
    /// location; waves pass the average spawn location.
    pub origin: Option<Vec3>,
    pub waypoints: Vec<Vec3>,
    /// Facing the formation assumes at the final waypoint.
    pub final_facing: Facing,
    pub max_row_width: u32,
    pub offset_scale: f32,
}

enum CheckOutcome {
    Keep,
    Advance,
}

pub struct FormationScheduler {
    records: AHashMap<FormationId, FormationRecord>,
    ids: IdAllocator,
    next_check_at: Option<Seconds>,
    /// Units that completed a formation. Their later deaths refund supply.
    veterans: AHashSet<UnitId>,
}

impl FormationScheduler {
    pub fn new() -> Self {
        Self {
            records: AHashMap::new(),
            ids: IdAllocator::default(),
            next_check_at: None,
            veterans: AHashSet::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_tracking(&self, formation: FormationId) -> bool {
        self.records.contains_key(&formation)
    }

    /// Start a plain formation move. Returns the new formation's ID.
    pub fn move_formation(
        &mut self,
        mv: FormationMove,
        now: Seconds,
        config: &EnemyAiConfig,
        nav: &dyn NavQuery,
        supply: &mut WaveSupply,
    ) -> Result<FormationId> {
        self.create(mv, None, now, config, nav, supply)
    }

    /// Start an attack-move formation: members pause to assist nearby combat
    /// before advancing past a waypoint.
    pub fn move_attack_move_formation(
        &mut self,
        mv: FormationMove,
        settings: AttackMoveSettings,
        now: Seconds,
        config: &EnemyAiConfig,
        nav: &dyn NavQuery,
        supply: &mut WaveSupply,
    ) -> Result<FormationId> {
        if !settings.is_valid() {
            return Err(EnemyAiError::InvalidFormation(
                "attack-move settings out of range".into(),
            ));
        }
        self.create(mv, Some(settings), now, config, nav, supply)
    }

    fn create(
        &mut self,
        mv: FormationMove,
        attack_move: Option<AttackMoveSettings>,
        now: Seconds,
        config: &EnemyAiConfig,
        nav: &dyn NavQuery,
        supply: &mut WaveSupply,
    ) -> Result<FormationId> {
        if mv.waypoints.is_empty() {
            return Err(EnemyAiError::InvalidFormation("no waypoints".into()));
        }

        // Units that died between the caller collecting them and this call
        // still carry spent supply; reconcile here.
        let mut members = Vec::with_capacity(mv.units.len());
        for handle in mv.units {
            match handle.get() {
                Some(entity) => {
                    let unit = entity.borrow();
                    members.push((handle.clone(), unit.id(), unit.formation_radius(), unit.location()));
                }
                None => {
                    supply.refund(1);
                    tracing::debug!("discarded an invalid unit at formation creation");
                }
            }
        }
        if members.is_empty() {
            return Err(EnemyAiError::InvalidFormation("no valid units".into()));
        }

        let width = if mv.max_row_width == 0 {
            tracing::debug!(
                fallback = config.fallback_formation_width,
                "formation requested with zero row width"
            );
            config.fallback_formation_width
        } else {
            mv.max_row_width
        };

        let radii: Vec<f32> = members.iter().map(|(_, _, radius, _)| *radius).collect();
        let offsets = grid_offsets(&radii, width, mv.offset_scale);

        let origin = mv.origin.unwrap_or_else(|| {
            let sum: Vec3 = members.iter().map(|(_, _, _, loc)| *loc).sum();
            sum / members.len() as f32
        });

        let id = FormationId(self.ids.next());
        let facings = FormationRecord::leg_facings(&mv.waypoints, mv.final_facing);
        let mut record = FormationRecord {
            id,
            waypoints: mv.waypoints,
            facings,
            units: members
                .into_iter()
                .zip(offsets)
                .map(|((handle, unit_id, _, _), offset)| FormationUnit::new(handle, unit_id, offset))
                .collect(),
            current_waypoint: 0,
            attack_move,
            origin,
        };

        if let Some((waypoint, facing)) = record.current_target() {
            for unit in &mut record.units {
                move_unit_to_waypoint(unit, waypoint, facing, config, nav);
            }
        }

        tracing::info!(
            formation = ?id,
            units = record.units.len(),
            waypoints = record.waypoints.len(),
            attack_move = record.attack_move.is_some(),
            "formation movement started"
        );
        self.records.insert(id, record);
        if self.next_check_at.is_none() {
            self.next_check_at = Some(now + config.formation_check_interval);
        }
        Ok(id)
    }

    /// Host callback: `unit` finished its current move order for `formation`.
    pub fn on_unit_reached_waypoint(
        &mut self,
        formation: FormationId,
        unit: UnitId,
        config: &EnemyAiConfig,
        nav: &dyn NavQuery,
        supply: &mut WaveSupply,
        events: &mut Vec<EnemyEvent>,
    ) {
        let Some(record) = self.records.get_mut(&formation) else {
            tracing::error!(?formation, ?unit, "arrival reported for an untracked formation");
            return;
        };
        let Some(member) = record.units.iter_mut().find(|member| member.id == unit) else {
            tracing::error!(?formation, ?unit, "arrival reported for a unit the formation does not track");
            return;
        };
        if member.reached {
            return;
        }
        member.reached = true;
        member.stuck_count = 0;
        member.recovery_failed = false;
        member.last_location = None;

        // Attack-move formations only advance from the periodic check, after
        // the combat-wait decision.
        if record.attack_move.is_some() {
            return;
        }
        if record.all_reached() {
            self.advance_formation(formation, config, nav, supply, events);
        }
    }

    /// Host callback: a unit died. Refunds supply for units that completed a
    /// formation; mid-formation deaths are reconciled by the periodic prune.
    /// Returns true when a refund happened.
    pub fn notify_unit_destroyed(
        &mut self,
        unit: UnitId,
        supply: &mut WaveSupply,
        events: &mut Vec<EnemyEvent>,
    ) -> bool {
        if self.veterans.remove(&unit) {
            supply.refund(1);
            events.push(EnemyEvent::VeteranUnitLost { unit });
            tracing::debug!(?unit, "veteran unit lost, supply refunded");
            return true;
        }
        false
    }

    /// Periodic check, fired at `formation_check_interval`.
    pub fn update<R: Rng>(
        &mut self,
        now: Seconds,
        config: &EnemyAiConfig,
        nav: &dyn NavQuery,
        rng: &mut R,
        supply: &mut WaveSupply,
        events: &mut Vec<EnemyEvent>,
    ) {
        match self.next_check_at {
            Some(due) if now >= due => {}
            _ => return,
        }
        self.next_check_at = Some(now + config.formation_check_interval);

        self.prune_invalid_units(supply, events);
        if self.records.is_empty() {
            self.next_check_at = None;
            return;
        }

        let ids: Vec<FormationId> = self.records.keys().copied().collect();
        for id in ids {
            let Some(mut record) = self.records.remove(&id) else {
                continue;
            };
            let outcome = run_record_check(&mut record, now, config, nav, rng, events);
            self.records.insert(id, record);
            if matches!(outcome, CheckOutcome::Advance) {
                self.advance_formation(id, config, nav, supply, events);
            }
        }
    }

    fn prune_invalid_units(&mut self, supply: &mut WaveSupply, events: &mut Vec<EnemyEvent>) {
        let mut emptied = Vec::new();
        for (id, record) in self.records.iter_mut() {
            record.units.retain(|unit| {
                if unit.handle.is_valid() {
                    return true;
                }
                supply.refund(1);
                events.push(EnemyEvent::FormationUnitLost {
                    formation: *id,
                    unit: unit.id,
                });
                tracing::debug!(formation = ?id, unit = ?unit.id, "dropped invalid formation unit");
                false
            });
            if record.units.is_empty() {
                emptied.push(*id);
            }
        }
        for id in emptied {
            self.records.remove(&id);
            events.push(EnemyEvent::FormationEmptied { formation: id });
            tracing::debug!(formation = ?id, "formation emptied, retired");
        }
    }

    fn advance_formation(
        &mut self,
        id: FormationId,
        config: &EnemyAiConfig,
        nav: &dyn NavQuery,
        supply: &mut WaveSupply,
        events: &mut Vec<EnemyEvent>,
    ) {
        let finished = match self.records.get_mut(&id) {
            Some(record) => {
                record.current_waypoint += 1;
                record.current_waypoint >= record.waypoints.len()
            }
            None => return,
        };

        if finished {
            if let Some(record) = self.records.remove(&id) {
                self.complete_formation(record, supply, events);
            }
            if self.records.is_empty() {
                self.next_check_at = None;
            }
            return;
        }

        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        events.push(EnemyEvent::FormationAdvanced {
            formation: id,
            waypoint_index: record.current_waypoint,
        });
        tracing::debug!(
            formation = ?id,
            waypoint = record.current_waypoint,
            "formation advanced"
        );
        if let Some((waypoint, facing)) = record.current_target() {
            for unit in &mut record.units {
                move_unit_to_waypoint(unit, waypoint, facing, config, nav);
            }
        }
    }

    fn complete_formation(
        &mut self,
        record: FormationRecord,
        supply: &mut WaveSupply,
        events: &mut Vec<EnemyEvent>,
    ) {
        for unit in &record.units {
            if unit.handle.is_valid() {
                self.veterans.insert(unit.id);
            } else {
                supply.refund(1);
                events.push(EnemyEvent::FormationUnitLost {
                    formation: record.id,
                    unit: unit.id,
                });
            }
        }
        events.push(EnemyEvent::FormationCompleted {
            formation: record.id,
        });
        tracing::info!(formation = ?record.id, "formation reached its final waypoint");
    }
}

impl Default for FormationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn run_record_check<R: Rng>(
    record: &mut FormationRecord,
    now: Seconds,
    config: &EnemyAiConfig,
    nav: &dyn NavQuery,
    rng: &mut R,
    events: &mut Vec<EnemyEvent>,
) -> CheckOutcome {
    let Some((waypoint, facing)) = record.current_target() else {
        tracing::error!(formation = ?record.id, "formation has no current waypoint");
        return CheckOutcome::Keep;
    };

    for unit in &mut record.units {
        update_unit_progress(record.id, unit, waypoint, record.origin, config, nav, rng, events);
    }
    handle_idle_units(record, waypoint, facing, config, nav);

    let Some(settings) = record.attack_move.clone() else {
        // Plain formations normally advance from arrival callbacks; this
        // covers legs completed only once stragglers were pruned.
        return if record.all_reached() {
            CheckOutcome::Advance
        } else {
            CheckOutcome::Keep
        };
    };

    if !record.all_reached() {
        return CheckOutcome::Keep;
    }

    // Combat wait: the group holds at the waypoint while anyone fights,
    // unless the linger window since the earliest combat start has passed.
    let mut earliest: Option<Seconds> = None;
    let mut fighters: Vec<(Vec3, f32)> = Vec::new();
    for unit in &mut record.units {
        let Some(entity) = unit.handle.get() else {
            continue;
        };
        let entity = entity.borrow();
        if entity.is_in_combat() {
            let since = *unit.combat_since.get_or_insert(now);
            earliest = Some(earliest.map_or(since, |e: Seconds| e.min(since)));
            fighters.push((entity.location(), entity.formation_radius()));
        } else {
            unit.combat_since = None;
        }
    }

    let Some(earliest) = earliest else {
        return CheckOutcome::Advance;
    };
    if settings.max_combat_linger > 0.0 && now - earliest >= settings.max_combat_linger {
        tracing::debug!(formation = ?record.id, "combat linger expired, advancing anyway");
        return CheckOutcome::Advance;
    }

    send_idle_units_to_help(record, &fighters, &settings, nav, rng);
    CheckOutcome::Keep
}

/// Progress measurement and stuck recovery for one unit.
#[allow(clippy::too_many_arguments)]
fn update_unit_progress<R: Rng>(
    formation: FormationId,
    unit: &mut FormationUnit,
    waypoint: Vec3,
    origin: Vec3,
    config: &EnemyAiConfig,
    nav: &dyn NavQuery,
    rng: &mut R,
    events: &mut Vec<EnemyEvent>,
) {
    if unit.reached {
        return;
    }
    let Some(entity) = unit.handle.get() else {
        return;
    };
    let (location, in_combat, category) = {
        let entity = entity.borrow();
        (entity.location(), entity.is_in_combat(), entity.category())
    };
    let Some(previous) = unit.last_location.replace(location) else {
        return;
    };
    // Units holding ground to fight are not stuck.
    if in_combat {
        return;
    }
    let threshold = config.stuck_progress_threshold;
    if dist_squared_2d(location, previous) >= threshold * threshold {
        return;
    }
    unit.stuck_count += 1;
    if unit.stuck_count <= config.stuck_checks_before_recovery {
        return;
    }

    match category {
        UnitCategory::Squad => {
            tracing::debug!(formation = ?formation, unit = ?unit.id, "lifting stuck squad");
            entity.borrow_mut().lift_unstuck(config.squad_lift_height);
        }
        UnitCategory::Vehicle => {
            recover_stuck_unit(formation, unit, waypoint, origin, config, nav, rng, events);
        }
    }
}

/// Teleport-based recovery: candidates alternate between "toward the
/// waypoint with a random yaw" and "to the side, alternating left/right",
/// growing longer with each attempt. Ranges and the projection extent
/// escalate once a whole round has failed.
#[allow(clippy::too_many_arguments)]
fn recover_stuck_unit<R: Rng>(
    formation: FormationId,
    unit: &mut FormationUnit,
    waypoint: Vec3,
    origin: Vec3,
    config: &EnemyAiConfig,
    nav: &dyn NavQuery,
    rng: &mut R,
    events: &mut Vec<EnemyEvent>,
) {
    let Some(entity) = unit.handle.get() else {
        return;
    };
    let location = entity.borrow().location();
    entity.borrow_mut().set_idle();

    let mut toward = Vec2::new(waypoint.x - location.x, waypoint.y - location.y);
    if toward.length_squared() < config.zero_location_tolerance * config.zero_location_tolerance {
        // Sitting on the target; aim along the formation's travel direction.
        toward = Vec2::new(waypoint.x - origin.x, waypoint.y - origin.y);
        tracing::debug!(formation = ?formation, unit = ?unit.id, "stuck on target, using travel direction");
    }
    let toward = toward.try_normalize().unwrap_or(Vec2::X);

    let escalation = if unit.recovery_failed {
        1.0 + 0.33 * unit.stuck_count as f32
    } else {
        1.0
    };
    let extent = if unit.recovery_failed {
        config.teleport_projection_extent * 3.0
    } else {
        config.teleport_projection_extent
    };

    let attempts = config.teleport_projection_attempts.max(1);
    for attempt in 0..attempts {
        let reach = 1.0 + attempt as f32 / attempts as f32;
        let (direction, range) = if attempt % 2 == 0 {
            let spread = config.teleport_angle_range_deg.to_radians();
            let yaw = rng.gen_range(-spread..=spread);
            (Vec2::from_angle(yaw).rotate(toward), config.teleport_forward_range)
        } else {
            let side = if (attempt / 2) % 2 == 0 {
                std::f32::consts::FRAC_PI_2
            } else {
                -std::f32::consts::FRAC_PI_2
            };
            (Vec2::from_angle(side).rotate(toward), config.teleport_side_range)
        };
        let step = direction * range * escalation * reach;
        let candidate = location + Vec3::new(step.x, step.y, 0.0);
        let Some(point) = nav.project_to_navigable(candidate, extent) else {
            continue;
        };
        if entity.borrow_mut().teleport_to(point) {
            unit.stuck_count = 0;
            unit.recovery_failed = false;
            unit.last_location = Some(point);
            events.push(EnemyEvent::UnitUnstuck {
                formation,
                unit: unit.id,
                location: point,
            });
            tracing::debug!(formation = ?formation, unit = ?unit.id, "teleported stuck unit");
            return;
        }
    }

    unit.recovery_failed = true;
    tracing::warn!(
        formation = ?formation,
        unit = ?unit.id,
        "stuck recovery found no navigable placement"
    );
}

/// Re-orders units that went idle without reporting arrival, nudging each a
/// half-offset toward its slot first so the fresh order does not jam again.
fn handle_idle_units(
    record: &mut FormationRecord,
    waypoint: Vec3,
    facing: Facing,
    config: &EnemyAiConfig,
    nav: &dyn NavQuery,
) {
    for unit in &mut record.units {
        if unit.reached || unit.recovery_failed {
            continue;
        }
        let Some(entity) = unit.handle.get() else {
            continue;
        };
        if !entity.borrow().is_idle() {
            continue;
        }
        let location = entity.borrow().location();
        let half = facing.rotate(unit.offset * 0.5);
        let nudged = location + Vec3::new(half.x, half.y, 0.0);
        let point = nav
            .project_to_navigable(nudged, config.formation_projection_extent)
            .unwrap_or(nudged);
        entity.borrow_mut().teleport_to(point);
        drop(entity);
        move_unit_to_waypoint(unit, waypoint, facing, config, nav);
    }
}

/// While an attack-move formation is blocked by combat, each idle member
/// picks a spot on a ring around its nearest fighting ally and moves there.
fn send_idle_units_to_help<R: Rng>(
    record: &mut FormationRecord,
    fighters: &[(Vec3, f32)],
    settings: &AttackMoveSettings,
    nav: &dyn NavQuery,
    rng: &mut R,
) {
    if fighters.is_empty() {
        return;
    }
    for unit in &record.units {
        let Some(entity) = unit.handle.get() else {
            continue;
        };
        {
            let entity = entity.borrow();
            if entity.is_in_combat() || !entity.is_idle() {
                continue;
            }
        }
        let location = entity.borrow().location();
        let Some((ally_location, ally_radius)) = fighters
            .iter()
            .copied()
            .min_by(|a, b| {
                dist_squared_2d(location, a.0)
                    .total_cmp(&dist_squared_2d(location, b.0))
            })
        else {
            continue;
        };

        for _ in 0..settings.max_projection_tries {
            let mult = rng.gen_range(settings.help_radius_min_mult..=settings.help_radius_max_mult);
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let distance = ally_radius * mult;
            let candidate =
                ally_location + Vec3::new(angle.cos() * distance, angle.sin() * distance, 0.0);
            let Some(point) =
                nav.project_to_navigable(candidate, ally_radius * settings.projection_scale)
            else {
                continue;
            };
            let facing = Facing::looking_at(location, point);
            if let Err(err) = entity.borrow_mut().move_to(point, true, facing) {
                tracing::warn!(unit = ?unit.id, %err, "help move rejected");
            }
            break;
        }
    }
}

/// Issues the move order for one unit toward its slot at `waypoint`.
fn move_unit_to_waypoint(
    unit: &mut FormationUnit,
    waypoint: Vec3,
    facing: Facing,
    config: &EnemyAiConfig,
    nav: &dyn NavQuery,
) {
    let Some(entity) = unit.handle.get() else {
        return;
    };
    let slot = facing.offset_from(waypoint, unit.offset);
    let target = nav
        .project_to_navigable(slot, config.formation_projection_extent)
        .unwrap_or(slot);
    unit.reached = false;
    unit.combat_since = None;
    unit.stuck_count = 0;
    unit.last_location = Some(entity.borrow().location());
    let result = entity.borrow_mut().move_to(target, true, facing);
    if let Err(err) = result {
        let name = entity.borrow().name();
        tracing::warn!(unit = %name, %err, "formation move order rejected");
    }
}
