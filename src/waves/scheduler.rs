//! Wave Spawn Scheduler
//!
//! Owns every registered [`AttackWave`] and turns its timer firings into
//! supply-gated spawn requests. Spawns complete asynchronously through
//! `on_unit_spawned`; once an iteration's last completion lands the group is
//! handed off as a [`WaveLaunch`] for the formation scheduler.

use ahash::{AHashMap, AHashSet};
use glam::Vec3;
use rand::Rng;

use crate::controller::WaveSupply;
use crate::core::types::{is_zero_location, IdAllocator, Seconds, SpawnRequestId, WaveId};
use crate::core::{EnemyAiConfig, EnemyAiError, EnemyEvent, Result};
use crate::units::{UnitHandle, UnitSpawner};
use crate::waves::record::{AttackWave, WaveKind, WaveLaunch, WaveSpec};

pub struct WaveScheduler {
    waves: AHashMap<WaveId, AttackWave>,
    ids: IdAllocator,
    request_ids: IdAllocator,
}

impl WaveScheduler {
    pub fn new() -> Self {
        Self {
            waves: AHashMap::new(),
            ids: IdAllocator::default(),
            request_ids: IdAllocator::default(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.waves.len()
    }

    pub fn is_tracking(&self, wave: WaveId) -> bool {
        self.waves.contains_key(&wave)
    }

    /// Register a recurring wave. The first iteration fires after one
    /// interval, or on the next update when `instant_start` is set.
    pub fn start_wave<R: Rng>(
        &mut self,
        spec: WaveSpec,
        now: Seconds,
        config: &EnemyAiConfig,
        rng: &mut R,
    ) -> Result<WaveId> {
        self.register(spec, true, now, config, rng)
    }

    /// Register a wave that runs exactly one iteration and removes itself.
    /// Generator-throttled waves make no sense as one-shots and are rejected.
    pub fn start_single_wave<R: Rng>(
        &mut self,
        spec: WaveSpec,
        now: Seconds,
        config: &EnemyAiConfig,
        rng: &mut R,
    ) -> Result<WaveId> {
        if matches!(spec.kind, WaveKind::GeneratorThrottled { .. }) {
            return Err(EnemyAiError::InvalidWave(
                "single waves cannot be generator throttled".into(),
            ));
        }
        self.register(spec, false, now, config, rng)
    }

    /// Remove a wave outright. Completions still in flight for it will be
    /// refunded as they arrive.
    pub fn cancel_wave(&mut self, wave: WaveId, events: &mut Vec<EnemyEvent>) -> bool {
        if self.waves.remove(&wave).is_some() {
            events.push(EnemyEvent::WaveCancelled { wave });
            tracing::info!(?wave, "wave cancelled");
            true
        } else {
            false
        }
    }

    fn register<R: Rng>(
        &mut self,
        spec: WaveSpec,
        recurring: bool,
        now: Seconds,
        config: &EnemyAiConfig,
        rng: &mut R,
    ) -> Result<WaveId> {
        validate_spec(&spec, config)?;
        let id = WaveId(self.ids.next());
        let instant_start = spec.instant_start;
        let mut wave = AttackWave {
            id,
            kind: spec.kind,
            elements: spec.elements,
            base_interval: spec.base_interval,
            interval_variance: spec.interval_variance,
            waypoints: spec.waypoints,
            final_facing: spec.final_facing,
            max_row_width: spec.max_row_width,
            offset_scale: spec.offset_scale,
            attack_move: spec.attack_move,
            recurring,
            next_fire_at: now,
            outstanding: 0,
            pending: AHashSet::new(),
            collected: Vec::new(),
            spawn_locations: Vec::new(),
        };
        if !instant_start {
            wave.next_fire_at = now + wave.next_delay(rng);
        }
        tracing::info!(
            wave = ?id,
            elements = wave.elements.len(),
            recurring,
            first_fire_at = wave.next_fire_at,
            "wave registered"
        );
        self.waves.insert(id, wave);
        Ok(id)
    }

    /// Fires every wave whose timer is due.
    pub fn update<R: Rng>(
        &mut self,
        now: Seconds,
        rng: &mut R,
        supply: &mut WaveSupply,
        spawner: &mut dyn UnitSpawner,
        events: &mut Vec<EnemyEvent>,
    ) {
        let due: Vec<WaveId> = self
            .waves
            .values()
            .filter(|wave| now >= wave.next_fire_at)
            .map(|wave| wave.id)
            .collect();

        for id in due {
            let Some(wave) = self.waves.get_mut(&id) else {
                continue;
            };

            if !wave.kind.owner_is_valid() {
                // No refund owed: nothing was spent for this iteration yet.
                // In-flight completions from earlier iterations reconcile as
                // they arrive and find the wave gone.
                self.waves.remove(&id);
                events.push(EnemyEvent::WaveCancelled { wave: id });
                tracing::info!(wave = ?id, "owning structure lost, wave cancelled");
                continue;
            }

            let mut requested = 0usize;
            let mut skipped = 0usize;
            for element in &wave.elements {
                let option = element.options[rng.gen_range(0..element.options.len())];
                if !supply.try_spend() {
                    skipped += 1;
                    continue;
                }
                let request = SpawnRequestId(self.request_ids.next());
                if spawner.spawn_at(option, element.spawn_point, id, request) {
                    wave.outstanding += 1;
                    wave.pending.insert(request);
                    requested += 1;
                } else {
                    // Rejected outright; no completion will arrive.
                    supply.refund(1);
                    tracing::warn!(wave = ?id, ?request, "spawn request rejected");
                }
            }

            // Re-arm immediately either way so an exhausted pool never
            // stalls the wave forever.
            wave.next_fire_at = now + wave.next_delay(rng);
            if requested == 0 {
                events.push(EnemyEvent::WaveIterationSkipped {
                    wave: id,
                    next_fire_at: wave.next_fire_at,
                });
                tracing::debug!(wave = ?id, skipped, "wave iteration spawned nothing");
            } else {
                events.push(EnemyEvent::WaveIterationStarted {
                    wave: id,
                    requested,
                    skipped_for_supply: skipped,
                });
                tracing::debug!(wave = ?id, requested, skipped, "wave iteration started");
            }
        }
    }

    /// Host callback: a spawn request completed. `unit` is empty when the
    /// spawn failed after being accepted.
    ///
    /// Returns the finished group once the iteration's last completion
    /// arrives; the caller routes it to the formation scheduler.
    pub fn on_unit_spawned(
        &mut self,
        wave: WaveId,
        request: SpawnRequestId,
        unit: Option<UnitHandle>,
        supply: &mut WaveSupply,
        events: &mut Vec<EnemyEvent>,
    ) -> Option<WaveLaunch> {
        let Some(record) = self.waves.get_mut(&wave) else {
            // The wave is gone (cancelled or retired); the supply spent for
            // this request has to flow back.
            supply.refund(1);
            tracing::debug!(?wave, ?request, "spawn completed for a removed wave, refunded");
            return None;
        };
        if !record.pending.remove(&request) {
            tracing::error!(?wave, ?request, "spawn completion for an unknown request");
            return None;
        }
        record.outstanding = record.outstanding.saturating_sub(1);

        match unit.and_then(|handle| handle.get().map(|entity| (handle, entity))) {
            Some((handle, entity)) => {
                record.spawn_locations.push(entity.borrow().location());
                record.collected.push(handle);
            }
            None => {
                supply.refund(1);
                tracing::warn!(?wave, ?request, "spawn failed, supply refunded");
            }
        }

        if record.outstanding > 0 {
            return None;
        }

        let units: Vec<UnitHandle> = record.collected.drain(..).collect();
        let locations: Vec<Vec3> = record.spawn_locations.drain(..).collect();
        let launch = if units.is_empty() {
            tracing::debug!(?wave, "wave iteration collected no units, nothing to launch");
            None
        } else {
            let origin = locations.iter().copied().sum::<Vec3>() / locations.len() as f32;
            Some(WaveLaunch {
                wave,
                units,
                origin,
                waypoints: record.waypoints.clone(),
                final_facing: record.final_facing,
                max_row_width: record.max_row_width,
                offset_scale: record.offset_scale,
                attack_move: record.attack_move.clone(),
            })
        };

        if !record.recurring {
            self.waves.remove(&wave);
            events.push(EnemyEvent::WaveRetired { wave });
            tracing::info!(?wave, "single wave retired");
        }
        launch
    }
}

impl Default for WaveScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_spec(spec: &WaveSpec, config: &EnemyAiConfig) -> Result<()> {
    let fail = |reason: &str| Err(EnemyAiError::InvalidWave(reason.into()));

    if spec.elements.is_empty() {
        return fail("wave has no elements");
    }
    for element in &spec.elements {
        if is_zero_location(element.spawn_point, config.zero_location_tolerance) {
            return fail("element spawn point is unset");
        }
        if element.options.is_empty() {
            return fail("element has no unit options");
        }
        if element.options.iter().any(|option| !option.is_valid()) {
            return fail("element has an invalid unit option");
        }
    }
    if spec.base_interval <= 0.0 {
        return fail("interval must be positive");
    }
    if !(0.0..1.0).contains(&spec.interval_variance) {
        return fail("interval variance must be in [0,1)");
    }
    if spec.waypoints.is_empty() {
        return fail("wave has no waypoints");
    }
    if spec
        .waypoints
        .iter()
        .any(|waypoint| is_zero_location(*waypoint, config.zero_location_tolerance))
    {
        return fail("wave waypoint is unset");
    }
    match &spec.kind {
        WaveKind::Independent => {}
        WaveKind::StructureOwned { owner } => {
            if !owner.is_valid() {
                return fail("owning structure is invalid");
            }
        }
        WaveKind::GeneratorThrottled {
            owner,
            generators,
            per_generator_fraction,
        } => {
            if !owner.is_valid() {
                return fail("owning structure is invalid");
            }
            if *per_generator_fraction <= 0.0 {
                return fail("generator penalty fraction must be positive");
            }
            if generators.is_empty() || generators.iter().any(|g| !g.is_valid()) {
                return fail("generator references must all be valid");
            }
        }
    }
    if let Some(settings) = &spec.attack_move {
        if !settings.is_valid() {
            return fail("attack-move settings out of range");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::Vec3;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::core::types::{Facing, UnitId};
    use crate::units::{
        CommandError, Commandable, Structure, StructureHandle, UnitCategory, UnitOption,
    };
    use crate::waves::record::WaveElement;

    struct MockStructure {
        destroyed: bool,
    }

    impl Structure for MockStructure {
        fn is_destroyed(&self) -> bool {
            self.destroyed
        }
    }

    fn structure(destroyed: bool) -> (Rc<RefCell<MockStructure>>, StructureHandle) {
        let strong = Rc::new(RefCell::new(MockStructure { destroyed }));
        let dynamic: Rc<RefCell<dyn Structure>> = strong.clone();
        let handle = StructureHandle::new(&dynamic);
        (strong, handle)
    }

    struct MockSpawned {
        id: UnitId,
        location: Vec3,
    }

    impl Commandable for MockSpawned {
        fn id(&self) -> UnitId {
            self.id
        }
        fn name(&self) -> String {
            format!("spawned-{}", self.id.0)
        }
        fn location(&self) -> Vec3 {
            self.location
        }
        fn category(&self) -> UnitCategory {
            UnitCategory::Vehicle
        }
        fn formation_radius(&self) -> f32 {
            50.0
        }
        fn is_idle(&self) -> bool {
            true
        }
        fn is_in_combat(&self) -> bool {
            false
        }
        fn move_to(
            &mut self,
            _point: Vec3,
            _reset_queue: bool,
            _final_facing: Facing,
        ) -> std::result::Result<(), CommandError> {
            Ok(())
        }
        fn reverse_move_to(
            &mut self,
            _point: Vec3,
            _reset_queue: bool,
        ) -> std::result::Result<(), CommandError> {
            Ok(())
        }
        fn teleport_to(&mut self, _point: Vec3) -> bool {
            true
        }
        fn set_idle(&mut self) {}
        fn lift_unstuck(&mut self, _height: f32) {}
        fn destroy(&mut self) {}
        fn is_destroyed(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct MockSpawner {
        requests: Vec<(UnitOption, Vec3, WaveId, SpawnRequestId)>,
        reject_all: bool,
    }

    impl UnitSpawner for MockSpawner {
        fn spawn_at(
            &mut self,
            option: UnitOption,
            location: Vec3,
            wave: WaveId,
            request: SpawnRequestId,
        ) -> bool {
            if self.reject_all {
                return false;
            }
            self.requests.push((option, location, wave, request));
            true
        }
    }

    fn spec(elements: usize) -> WaveSpec {
        WaveSpec {
            kind: WaveKind::Independent,
            elements: (0..elements)
                .map(|i| WaveElement {
                    spawn_point: Vec3::new(100.0 + i as f32 * 50.0, 100.0, 0.0),
                    options: vec![UnitOption::new(UnitCategory::Vehicle, 1)],
                })
                .collect(),
            base_interval: 10.0,
            interval_variance: 0.2,
            waypoints: vec![Vec3::new(1000.0, 0.0, 0.0)],
            final_facing: Facing::from_yaw(0.0),
            max_row_width: 2,
            offset_scale: 1.0,
            attack_move: None,
            instant_start: true,
        }
    }

    struct Fixture {
        scheduler: WaveScheduler,
        config: EnemyAiConfig,
        supply: WaveSupply,
        spawner: MockSpawner,
        events: Vec<EnemyEvent>,
        rng: ChaCha8Rng,
        spawned: Vec<Rc<RefCell<dyn Commandable>>>,
    }

    impl Fixture {
        fn new(supply: i32) -> Self {
            Self {
                scheduler: WaveScheduler::new(),
                config: EnemyAiConfig::default(),
                supply: WaveSupply::new(supply),
                spawner: MockSpawner::default(),
                events: Vec::new(),
                rng: ChaCha8Rng::seed_from_u64(11),
                spawned: Vec::new(),
            }
        }

        fn start(&mut self, spec: WaveSpec) -> WaveId {
            self.scheduler
                .start_wave(spec, 0.0, &self.config, &mut self.rng)
                .unwrap()
        }

        fn fire_at(&mut self, now: Seconds) {
            self.scheduler.update(
                now,
                &mut self.rng,
                &mut self.supply,
                &mut self.spawner,
                &mut self.events,
            );
        }

        /// Completes one outstanding request with a freshly built unit.
        fn complete(&mut self, index: usize, unit_id: u64) -> Option<WaveLaunch> {
            let (_, location, wave, request) = self.spawner.requests[index];
            let unit: Rc<RefCell<dyn Commandable>> = Rc::new(RefCell::new(MockSpawned {
                id: UnitId(unit_id),
                location,
            }));
            let handle = UnitHandle::new(&unit);
            self.spawned.push(unit);
            self.scheduler
                .on_unit_spawned(wave, request, Some(handle), &mut self.supply, &mut self.events)
        }

        fn fail(&mut self, index: usize) -> Option<WaveLaunch> {
            let (_, _, wave, request) = self.spawner.requests[index];
            self.scheduler
                .on_unit_spawned(wave, request, None, &mut self.supply, &mut self.events)
        }
    }

    #[test]
    fn validation_rejects_broken_specs() {
        let mut fx = Fixture::new(10);
        let mut no_elements = spec(1);
        no_elements.elements.clear();
        assert!(fx
            .scheduler
            .start_wave(no_elements, 0.0, &fx.config, &mut fx.rng)
            .is_err());

        let mut zero_point = spec(1);
        zero_point.elements[0].spawn_point = Vec3::ZERO;
        assert!(fx
            .scheduler
            .start_wave(zero_point, 0.0, &fx.config, &mut fx.rng)
            .is_err());

        let mut bad_option = spec(1);
        bad_option.elements[0].options = vec![UnitOption::new(UnitCategory::Vehicle, 0)];
        assert!(fx
            .scheduler
            .start_wave(bad_option, 0.0, &fx.config, &mut fx.rng)
            .is_err());

        let mut bad_variance = spec(1);
        bad_variance.interval_variance = 1.0;
        assert!(fx
            .scheduler
            .start_wave(bad_variance, 0.0, &fx.config, &mut fx.rng)
            .is_err());

        let mut no_waypoints = spec(1);
        no_waypoints.waypoints.clear();
        assert!(fx
            .scheduler
            .start_wave(no_waypoints, 0.0, &fx.config, &mut fx.rng)
            .is_err());

        let (_keep, owner) = structure(true);
        let mut dead_owner = spec(1);
        dead_owner.kind = WaveKind::StructureOwned { owner };
        assert!(fx
            .scheduler
            .start_wave(dead_owner, 0.0, &fx.config, &mut fx.rng)
            .is_err());

        assert_eq!(fx.scheduler.active_count(), 0);
    }

    #[test]
    fn single_waves_reject_generator_throttling() {
        let mut fx = Fixture::new(10);
        let (_keep_owner, owner) = structure(false);
        let (_keep_gen, generator) = structure(false);
        let mut throttled = spec(1);
        throttled.kind = WaveKind::GeneratorThrottled {
            owner,
            generators: vec![generator],
            per_generator_fraction: 0.5,
        };
        assert!(fx
            .scheduler
            .start_single_wave(throttled, 0.0, &fx.config, &mut fx.rng)
            .is_err());
    }

    #[test]
    fn supply_gates_spawning_and_rearms_without_waiting() {
        let mut fx = Fixture::new(2);
        let id = fx.start(spec(3));
        fx.fire_at(0.0);

        // Two spawned, one skipped for supply; timer re-armed within bounds.
        assert_eq!(fx.spawner.requests.len(), 2);
        assert_eq!(fx.supply.remaining(), 0);
        assert!(fx.events.iter().any(|e| matches!(
            e,
            EnemyEvent::WaveIterationStarted {
                requested: 2,
                skipped_for_supply: 1,
                ..
            }
        )));
        let next = fx.scheduler.waves[&id].next_fire_at;
        assert!((8.0..=12.0).contains(&next));
    }

    #[test]
    fn exhausted_supply_skips_the_whole_iteration() {
        let mut fx = Fixture::new(0);
        let _id = fx.start(spec(3));
        fx.fire_at(0.0);

        assert!(fx.spawner.requests.is_empty());
        assert_eq!(fx.supply.remaining(), 0);
        assert!(fx
            .events
            .iter()
            .any(|e| matches!(e, EnemyEvent::WaveIterationSkipped { .. })));
    }

    #[test]
    fn last_completion_hands_off_the_group() {
        let mut fx = Fixture::new(10);
        let id = fx.start(spec(2));
        fx.fire_at(0.0);
        assert_eq!(fx.spawner.requests.len(), 2);

        assert!(fx.complete(0, 1).is_none());
        let launch = fx.complete(1, 2).expect("second completion finishes the iteration");
        assert_eq!(launch.wave, id);
        assert_eq!(launch.units.len(), 2);
        // Origin is the average spawn location.
        let expected = (fx.spawner.requests[0].1 + fx.spawner.requests[1].1) / 2.0;
        assert!((launch.origin - expected).length() < 1e-3);
        // Recurring wave stays registered.
        assert!(fx.scheduler.is_tracking(id));
    }

    #[test]
    fn failed_completion_refunds_supply() {
        let mut fx = Fixture::new(10);
        let _id = fx.start(spec(2));
        fx.fire_at(0.0);
        assert_eq!(fx.supply.remaining(), 8);

        assert!(fx.fail(0).is_none());
        assert_eq!(fx.supply.remaining(), 9);

        // The surviving unit still launches alone.
        let launch = fx.complete(1, 1).expect("one unit is enough to launch");
        assert_eq!(launch.units.len(), 1);
    }

    #[test]
    fn rejected_requests_refund_immediately() {
        let mut fx = Fixture::new(5);
        fx.spawner.reject_all = true;
        let _id = fx.start(spec(2));
        fx.fire_at(0.0);

        assert_eq!(fx.supply.remaining(), 5);
        assert!(fx
            .events
            .iter()
            .any(|e| matches!(e, EnemyEvent::WaveIterationSkipped { .. })));
    }

    #[test]
    fn owner_death_cancels_the_wave() {
        let mut fx = Fixture::new(10);
        let (keep, owner) = structure(false);
        let mut owned = spec(1);
        owned.kind = WaveKind::StructureOwned { owner };
        let id = fx.start(owned);

        keep.borrow_mut().destroyed = true;
        fx.fire_at(0.0);

        assert!(!fx.scheduler.is_tracking(id));
        assert!(fx
            .events
            .iter()
            .any(|e| matches!(e, EnemyEvent::WaveCancelled { .. })));
        assert_eq!(fx.supply.remaining(), 10);
    }

    #[test]
    fn completion_for_a_removed_wave_refunds() {
        let mut fx = Fixture::new(10);
        let id = fx.start(spec(1));
        fx.fire_at(0.0);
        assert_eq!(fx.supply.remaining(), 9);

        fx.scheduler.cancel_wave(id, &mut fx.events);
        assert!(fx.complete(0, 1).is_none());
        assert_eq!(fx.supply.remaining(), 10);
    }

    #[test]
    fn single_wave_retires_after_its_iteration() {
        let mut fx = Fixture::new(10);
        let id = fx
            .scheduler
            .start_single_wave(spec(1), 0.0, &fx.config, &mut fx.rng)
            .unwrap();
        fx.fire_at(0.0);
        let launch = fx.complete(0, 1);
        assert!(launch.is_some());
        assert!(!fx.scheduler.is_tracking(id));
        assert!(fx
            .events
            .iter()
            .any(|e| matches!(e, EnemyEvent::WaveRetired { .. })));
    }

    #[test]
    fn interval_samples_respect_bounds_and_penalty() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (_keep_owner, owner) = structure(false);
        let (keep_gen, generator) = structure(false);
        let wave = AttackWave {
            id: WaveId(1),
            kind: WaveKind::GeneratorThrottled {
                owner,
                generators: vec![generator],
                per_generator_fraction: 0.5,
            },
            elements: Vec::new(),
            base_interval: 10.0,
            interval_variance: 0.2,
            waypoints: Vec::new(),
            final_facing: Facing::from_yaw(0.0),
            max_row_width: 2,
            offset_scale: 1.0,
            attack_move: None,
            recurring: true,
            next_fire_at: 0.0,
            outstanding: 0,
            pending: AHashSet::new(),
            collected: Vec::new(),
            spawn_locations: Vec::new(),
        };

        for _ in 0..1000 {
            let delay = wave.next_delay(&mut rng);
            assert!((8.0..=12.0).contains(&delay));
        }

        // One destroyed generator stretches the window by the fraction.
        keep_gen.borrow_mut().destroyed = true;
        for _ in 0..1000 {
            let delay = wave.next_delay(&mut rng);
            assert!((12.0..=18.0).contains(&delay));
        }
    }
}
