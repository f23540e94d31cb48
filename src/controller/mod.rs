//! Enemy Controller facade
//!
//! Single owner of the three schedulers (formation movement, wave spawning,
//! retreat/counterattack), the shared wave supply pool and the RNG. The host
//! game talks to this type only: it forwards commands in, drives everything
//! with `update`, and routes the hand-offs between schedulers so they never
//! call into each other directly.

mod supply;

use std::sync::mpsc::Sender;

use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::core::types::{Facing, FormationId, IdAllocator, NavQueryId, RetreatId, Seconds, SpawnRequestId, UnitId, WaveId};
use crate::core::{EnemyAiConfig, EnemyEvent, Result};
use crate::formation::{AttackMoveSettings, FormationMove, FormationScheduler};
use crate::nav::{project_with_fallback, NavQuery, NavQueryResult, NavResultChannel, ProjectionFallback};
use crate::retreat::{CounterattackLaunch, RetreatScheduler, RetreatSpec};
use crate::units::{UnitHandle, UnitSpawner};
use crate::waves::{WaveScheduler, WaveSpec};

pub use supply::WaveSupply;

pub struct EnemyController {
    config: EnemyAiConfig,
    supply: WaveSupply,
    rng: ChaCha8Rng,
    formation: FormationScheduler,
    waves: WaveScheduler,
    retreat: RetreatScheduler,
    nav: Box<dyn NavQuery>,
    spawner: Box<dyn UnitSpawner>,
    nav_results: NavResultChannel,
    nav_query_ids: IdAllocator,
    events: Vec<EnemyEvent>,
    /// Time of the most recent update; entry points called between updates
    /// schedule relative to it.
    now: Seconds,
}

impl EnemyController {
    pub fn new(
        config: EnemyAiConfig,
        seed: u64,
        initial_supply: i32,
        nav: Box<dyn NavQuery>,
        spawner: Box<dyn UnitSpawner>,
    ) -> Self {
        Self {
            config,
            supply: WaveSupply::new(initial_supply),
            rng: ChaCha8Rng::seed_from_u64(seed),
            formation: FormationScheduler::new(),
            waves: WaveScheduler::new(),
            retreat: RetreatScheduler::new(),
            nav,
            spawner,
            nav_results: NavResultChannel::new(),
            nav_query_ids: IdAllocator::default(),
            events: Vec::new(),
            now: 0.0,
        }
    }

    pub fn config(&self) -> &EnemyAiConfig {
        &self.config
    }

    /// Advance every scheduler to `now`. Call once per game tick.
    pub fn update(&mut self, now: Seconds) {
        self.now = now;
        self.waves.update(
            now,
            &mut self.rng,
            &mut self.supply,
            self.spawner.as_mut(),
            &mut self.events,
        );
        let launches = self.retreat.update(now, &self.config, &mut self.events);
        for launch in launches {
            self.launch_counterattack(launch);
        }
        self.formation.update(
            now,
            &self.config,
            self.nav.as_ref(),
            &mut self.rng,
            &mut self.supply,
            &mut self.events,
        );
    }

    /// Events accumulated since the last drain, in emission order.
    pub fn drain_events(&mut self) -> Vec<EnemyEvent> {
        std::mem::take(&mut self.events)
    }

    // === FORMATIONS ===

    pub fn move_formation(
        &mut self,
        units: Vec<UnitHandle>,
        waypoints: Vec<Vec3>,
        final_facing: Facing,
        max_row_width: u32,
        offset_scale: f32,
    ) -> Result<FormationId> {
        self.formation.move_formation(
            FormationMove {
                units,
                origin: None,
                waypoints,
                final_facing,
                max_row_width,
                offset_scale,
            },
            self.now,
            &self.config,
            self.nav.as_ref(),
            &mut self.supply,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn move_attack_move_formation(
        &mut self,
        units: Vec<UnitHandle>,
        waypoints: Vec<Vec3>,
        final_facing: Facing,
        max_row_width: u32,
        offset_scale: f32,
        settings: AttackMoveSettings,
    ) -> Result<FormationId> {
        self.formation.move_attack_move_formation(
            FormationMove {
                units,
                origin: None,
                waypoints,
                final_facing,
                max_row_width,
                offset_scale,
            },
            settings,
            self.now,
            &self.config,
            self.nav.as_ref(),
            &mut self.supply,
        )
    }

    /// Host callback: `unit` completed its current formation move order.
    pub fn on_unit_reached_waypoint(&mut self, formation: FormationId, unit: UnitId) {
        self.formation.on_unit_reached_waypoint(
            formation,
            unit,
            &self.config,
            self.nav.as_ref(),
            &mut self.supply,
            &mut self.events,
        );
    }

    /// Host callback: `unit` was destroyed. Returns true when supply was
    /// refunded for it.
    pub fn notify_unit_destroyed(&mut self, unit: UnitId) -> bool {
        self.formation
            .notify_unit_destroyed(unit, &mut self.supply, &mut self.events)
    }

    pub fn active_formations(&self) -> usize {
        self.formation.active_count()
    }

    // === WAVES ===

    pub fn start_wave(&mut self, spec: WaveSpec) -> Result<WaveId> {
        self.waves.start_wave(spec, self.now, &self.config, &mut self.rng)
    }

    pub fn start_single_wave(&mut self, spec: WaveSpec) -> Result<WaveId> {
        self.waves
            .start_single_wave(spec, self.now, &self.config, &mut self.rng)
    }

    pub fn cancel_wave(&mut self, wave: WaveId) -> bool {
        self.waves.cancel_wave(wave, &mut self.events)
    }

    /// Host callback: a spawn request completed. `unit` is empty on failure.
    /// Returns the formation the finished group was launched as, if this was
    /// the iteration's last completion.
    pub fn on_unit_spawned(
        &mut self,
        wave: WaveId,
        request: SpawnRequestId,
        unit: Option<UnitHandle>,
    ) -> Option<FormationId> {
        let launch =
            self.waves
                .on_unit_spawned(wave, request, unit, &mut self.supply, &mut self.events)?;
        let unit_count = launch.units.len();
        let mv = FormationMove {
            units: launch.units,
            origin: Some(launch.origin),
            waypoints: launch.waypoints,
            final_facing: launch.final_facing,
            max_row_width: launch.max_row_width,
            offset_scale: launch.offset_scale,
        };
        let result = match launch.attack_move {
            Some(settings) => self.formation.move_attack_move_formation(
                mv,
                settings,
                self.now,
                &self.config,
                self.nav.as_ref(),
                &mut self.supply,
            ),
            None => self.formation.move_formation(
                mv,
                self.now,
                &self.config,
                self.nav.as_ref(),
                &mut self.supply,
            ),
        };
        match result {
            Ok(formation) => {
                self.events.push(EnemyEvent::WaveLaunched {
                    wave,
                    formation,
                    units: unit_count,
                });
                Some(formation)
            }
            Err(err) => {
                tracing::warn!(?wave, %err, "wave group could not form up");
                None
            }
        }
    }

    pub fn active_waves(&self) -> usize {
        self.waves.active_count()
    }

    // === RETREATS ===

    pub fn start_retreat(&mut self, spec: RetreatSpec) -> Result<RetreatId> {
        self.retreat.start_retreat(spec, self.now, &self.config)
    }

    pub fn active_retreats(&self) -> usize {
        self.retreat.active_count()
    }

    fn launch_counterattack(&mut self, launch: CounterattackLaunch) {
        for group in launch.groups {
            let facing = Facing::looking_at(group.origin, launch.target);
            let result = self.formation.move_formation(
                FormationMove {
                    units: group.units,
                    origin: Some(group.origin),
                    waypoints: vec![launch.target],
                    final_facing: facing,
                    max_row_width: self.config.counterattack_formation_width,
                    offset_scale: self.config.counterattack_offset_scale,
                },
                self.now,
                &self.config,
                self.nav.as_ref(),
                &mut self.supply,
            );
            match result {
                Ok(formation) => {
                    self.events.push(EnemyEvent::CounterattackLaunched {
                        retreat: launch.retreat,
                        formation,
                        target: launch.target,
                    });
                }
                Err(err) => {
                    tracing::warn!(retreat = ?launch.retreat, %err, "counterattack group could not form up");
                }
            }
        }
    }

    // === WAVE SUPPLY ===

    pub fn wave_supply(&self) -> i32 {
        self.supply.remaining()
    }

    pub fn set_wave_supply(&mut self, value: i32) {
        self.supply.set(value);
    }

    pub fn add_wave_supply(&mut self, delta: i32) {
        self.supply.add(delta);
    }

    // === NAVIGATION ===

    /// Synchronous point projection with the requested fallback behavior.
    pub fn find_navigable_point(
        &self,
        point: Vec3,
        extent: f32,
        fallback: ProjectionFallback,
    ) -> Option<Vec3> {
        project_with_fallback(self.nav.as_ref(), point, extent, fallback)
    }

    /// Kick off an asynchronous area sampling query. The result arrives in
    /// `poll_nav_results` unless cancelled first.
    pub fn request_points_in_area(
        &mut self,
        start: Vec3,
        end: Vec3,
        extent: Vec3,
        density: f32,
        max_count: usize,
    ) -> NavQueryId {
        let query = NavQueryId(self.nav_query_ids.next());
        self.nav_results.register(query);
        self.nav
            .find_points_in_area(query, start, end, extent, density, max_count);
        query
    }

    /// Kick off an asynchronous road sampling query.
    pub fn request_points_along_road(&mut self, start: Vec3, density: f32) -> NavQueryId {
        let query = NavQueryId(self.nav_query_ids.next());
        self.nav_results.register(query);
        self.nav.find_points_along_nearest_road(query, start, density);
        query
    }

    /// Forget an in-flight query; its late result will be dropped.
    pub fn cancel_nav_query(&mut self, query: NavQueryId) {
        self.nav_results.cancel(query);
    }

    /// Sender the host's nav workers use to deliver completed queries.
    pub fn nav_result_sender(&self) -> Sender<NavQueryResult> {
        self.nav_results.sender()
    }

    /// Completed queries whose requester is still interested.
    pub fn poll_nav_results(&mut self) -> Vec<NavQueryResult> {
        self.nav_results.drain()
    }
}
