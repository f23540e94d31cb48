//! Retreat / Counterattack Scheduler
//!
//! Tracks retreat operations until their units arrive at individual retreat
//! points. Depending on strategy, arrivals are destroyed on the spot or the
//! whole group regroups into a counterattack once everyone has arrived (or a
//! hard deadline passes, whichever comes first).

use ahash::AHashMap;
use glam::Vec3;

use crate::core::types::{dist_squared_2d, is_zero_location, Facing, IdAllocator, RetreatId, Seconds};
use crate::core::{EnemyAiConfig, EnemyAiError, EnemyEvent, Result};
use crate::retreat::record::{
    CounterattackGroup, CounterattackLaunch, PostRetreatStrategy, RetreatElement, RetreatOperation,
    RetreatSpec,
};
use crate::units::{UnitCategory, UnitHandle};

pub struct RetreatScheduler {
    operations: AHashMap<RetreatId, RetreatOperation>,
    ids: IdAllocator,
    next_check_at: Option<Seconds>,
}

impl RetreatScheduler {
    pub fn new() -> Self {
        Self {
            operations: AHashMap::new(),
            ids: IdAllocator::default(),
            next_check_at: None,
        }
    }

    pub fn active_count(&self) -> usize {
        self.operations.len()
    }

    pub fn is_tracking(&self, retreat: RetreatId) -> bool {
        self.operations.contains_key(&retreat)
    }

    /// Register a retreat and issue the initial retreat orders.
    ///
    /// An attack retreat toward an unset target is rejected, and the
    /// supplied units are destroyed rather than left orphaned with no one
    /// tracking them.
    pub fn start_retreat(
        &mut self,
        spec: RetreatSpec,
        now: Seconds,
        config: &EnemyAiConfig,
    ) -> Result<RetreatId> {
        if spec.retreating.is_empty() && spec.reverse_moving.is_empty() {
            return Err(EnemyAiError::InvalidRetreat("no units to retreat".into()));
        }
        if spec.strategy == PostRetreatStrategy::Attack
            && is_zero_location(spec.counterattack_target, config.zero_location_tolerance)
        {
            for (handle, _) in spec.retreating.iter().chain(&spec.reverse_moving) {
                if let Some(entity) = handle.get() {
                    entity.borrow_mut().destroy();
                }
            }
            return Err(EnemyAiError::InvalidRetreat(
                "attack retreat without a counterattack target".into(),
            ));
        }
        if spec.strategy == PostRetreatStrategy::None {
            tracing::error!("retreat strategy 'none' is unconfigured, treating as remove-units");
        }

        let mut elements = Vec::with_capacity(spec.retreating.len() + spec.reverse_moving.len());
        for (reverse, list) in [(false, spec.retreating), (true, spec.reverse_moving)] {
            for (handle, destination) in list {
                let Some(entity) = handle.get() else {
                    continue;
                };
                let id = entity.borrow().id();
                drop(entity);
                elements.push(RetreatElement {
                    handle,
                    id,
                    destination,
                    reverse,
                });
            }
        }
        if elements.is_empty() {
            return Err(EnemyAiError::InvalidRetreat("no valid units".into()));
        }

        for element in &elements {
            issue_retreat_order(element);
        }

        let id = RetreatId(self.ids.next());
        let max_wait_deadline = (spec.strategy == PostRetreatStrategy::Attack)
            .then_some(now + spec.max_wait);
        tracing::info!(
            retreat = ?id,
            units = elements.len(),
            strategy = ?spec.strategy,
            "retreat started"
        );
        self.operations.insert(
            id,
            RetreatOperation {
                id,
                elements,
                strategy: spec.strategy,
                counterattack_target: spec.counterattack_target,
                grace_delay: spec.grace_delay,
                max_wait_deadline,
                grace_deadline: None,
                all_arrived: false,
            },
        );
        if self.next_check_at.is_none() {
            self.next_check_at = Some(now + config.retreat_check_interval);
        }
        Ok(id)
    }

    /// Fires due grace/max-wait deadlines and runs the periodic re-check.
    /// Returns the counterattacks to launch, for routing into the formation
    /// scheduler.
    pub fn update(
        &mut self,
        now: Seconds,
        config: &EnemyAiConfig,
        events: &mut Vec<EnemyEvent>,
    ) -> Vec<CounterattackLaunch> {
        let mut launches = Vec::new();

        let due: Vec<RetreatId> = self
            .operations
            .values()
            .filter(|op| {
                op.grace_deadline.is_some_and(|d| now >= d)
                    || op.max_wait_deadline.is_some_and(|d| now >= d)
            })
            .map(|op| op.id)
            .collect();
        for id in due {
            if let Some(launch) = self.trigger_counterattack(id, config, events) {
                launches.push(launch);
            }
        }

        if let Some(check_due) = self.next_check_at {
            if now >= check_due {
                self.next_check_at = Some(now + config.retreat_check_interval);
                self.run_checks(now, config, events);
                if self.operations.is_empty() {
                    self.next_check_at = None;
                }
            }
        }

        launches
    }

    fn run_checks(&mut self, now: Seconds, config: &EnemyAiConfig, events: &mut Vec<EnemyEvent>) {
        let tolerance_sq = config.retreat_arrival_tolerance * config.retreat_arrival_tolerance;
        let mut dissolved = Vec::new();

        for op in self.operations.values_mut() {
            op.elements.retain(|element| element.handle.is_valid());

            let mut all_arrived = true;
            let mut removed = Vec::new();
            for (index, element) in op.elements.iter_mut().enumerate() {
                let Some(entity) = element.handle.get() else {
                    all_arrived = false;
                    continue;
                };
                let (location, idle) = {
                    let entity = entity.borrow();
                    (entity.location(), entity.is_idle())
                };
                let arrived =
                    idle || dist_squared_2d(location, element.destination) <= tolerance_sq;

                match op.strategy {
                    PostRetreatStrategy::RemoveUnits | PostRetreatStrategy::None => {
                        if arrived {
                            entity.borrow_mut().destroy();
                            events.push(EnemyEvent::RetreatUnitRemoved {
                                retreat: op.id,
                                unit: element.id,
                            });
                            tracing::debug!(retreat = ?op.id, unit = ?element.id, "retreated unit removed");
                            removed.push(index);
                        } else if !idle {
                            drop(entity);
                            issue_retreat_order(element);
                        }
                    }
                    PostRetreatStrategy::Attack => {
                        if !arrived {
                            all_arrived = false;
                            if !idle {
                                drop(entity);
                                issue_retreat_order(element);
                            }
                        }
                    }
                }
            }
            for index in removed.into_iter().rev() {
                op.elements.remove(index);
            }

            if op.elements.is_empty() {
                dissolved.push(op.id);
                continue;
            }
            if op.strategy == PostRetreatStrategy::Attack && all_arrived && !op.all_arrived {
                op.all_arrived = true;
                op.grace_deadline = Some(now + op.grace_delay);
                tracing::debug!(retreat = ?op.id, "all units arrived, grace period started");
            }
        }

        for id in dissolved {
            self.operations.remove(&id);
            events.push(EnemyEvent::RetreatDissolved { retreat: id });
            tracing::info!(retreat = ?id, "retreat dissolved");
        }
    }

    /// Tears down the operation and groups its survivors by category for
    /// the counterattack formations.
    fn trigger_counterattack(
        &mut self,
        id: RetreatId,
        config: &EnemyAiConfig,
        events: &mut Vec<EnemyEvent>,
    ) -> Option<CounterattackLaunch> {
        let op = self.operations.remove(&id)?;
        if self.operations.is_empty() {
            self.next_check_at = None;
        }

        let survivors: Vec<UnitHandle> = op
            .elements
            .into_iter()
            .map(|element| element.handle)
            .filter(|handle| handle.is_valid())
            .collect();
        if survivors.is_empty() {
            events.push(EnemyEvent::RetreatDissolved { retreat: id });
            tracing::info!(retreat = ?id, "retreat ended with no survivors");
            return None;
        }

        // The target may have become unset since the retreat started; the
        // stragglers cannot be left orphaned.
        if is_zero_location(op.counterattack_target, config.zero_location_tolerance) {
            tracing::warn!(retreat = ?id, "counterattack target unset, discarding survivors");
            for handle in &survivors {
                if let Some(entity) = handle.get() {
                    entity.borrow_mut().destroy();
                }
            }
            events.push(EnemyEvent::RetreatDissolved { retreat: id });
            return None;
        }

        let mut vehicles = Vec::new();
        let mut squads = Vec::new();
        for handle in survivors {
            let Some(entity) = handle.get() else {
                continue;
            };
            let (category, location) = {
                let entity = entity.borrow();
                (entity.category(), entity.location())
            };
            match category {
                UnitCategory::Vehicle => vehicles.push((handle, location)),
                UnitCategory::Squad => squads.push((handle, location)),
            }
        }

        let groups: Vec<CounterattackGroup> = [vehicles, squads]
            .into_iter()
            .filter(|group| !group.is_empty())
            .map(|group| {
                let origin =
                    group.iter().map(|(_, loc)| *loc).sum::<Vec3>() / group.len() as f32;
                CounterattackGroup {
                    units: group.into_iter().map(|(handle, _)| handle).collect(),
                    origin,
                }
            })
            .collect();

        tracing::info!(
            retreat = ?id,
            groups = groups.len(),
            target = ?op.counterattack_target,
            "counterattack triggered"
        );
        Some(CounterattackLaunch {
            retreat: id,
            target: op.counterattack_target,
            groups,
        })
    }
}

impl Default for RetreatScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn issue_retreat_order(element: &RetreatElement) {
    let Some(entity) = element.handle.get() else {
        return;
    };
    let location = entity.borrow().location();
    let result = if element.reverse {
        entity.borrow_mut().reverse_move_to(element.destination, true)
    } else {
        let facing = Facing::looking_at(location, element.destination);
        entity.borrow_mut().move_to(element.destination, true, facing)
    };
    if let Err(err) = result {
        tracing::warn!(unit = ?element.id, %err, "retreat order rejected");
    }
}
