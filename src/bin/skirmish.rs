//! Headless skirmish demo
//!
//! Runs the enemy controller against a tiny simulated world: a recurring
//! wave spawns vehicles that form up and march through two waypoints while
//! the demo host completes spawns, steps unit movement and reports waypoint
//! arrivals back. Events are logged as they drain.
//!
//! Run with `RUST_LOG=debug` for the schedulers' internal chatter.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use glam::Vec3;

use iron_tide::controller::EnemyController;
use iron_tide::core::types::{Facing, FormationId, SpawnRequestId, UnitId, WaveId};
use iron_tide::core::{EnemyAiConfig, EnemyEvent};
use iron_tide::nav::NavQuery;
use iron_tide::units::{
    CommandError, Commandable, UnitCategory, UnitHandle, UnitOption, UnitSpawner,
};
use iron_tide::waves::{WaveElement, WaveKind, WaveSpec};

const TICK: f64 = 0.25;
const RUN_SECONDS: f64 = 90.0;
const UNIT_SPEED: f32 = 600.0;
const ARRIVAL_RANGE: f32 = 30.0;

struct DemoUnit {
    id: UnitId,
    location: Vec3,
    target: Option<Vec3>,
    destroyed: bool,
}

impl Commandable for DemoUnit {
    fn id(&self) -> UnitId {
        self.id
    }
    fn name(&self) -> String {
        format!("demo-{}", self.id.0)
    }
    fn location(&self) -> Vec3 {
        self.location
    }
    fn category(&self) -> UnitCategory {
        UnitCategory::Vehicle
    }
    fn formation_radius(&self) -> f32 {
        60.0
    }
    fn is_idle(&self) -> bool {
        self.target.is_none()
    }
    fn is_in_combat(&self) -> bool {
        false
    }
    fn move_to(
        &mut self,
        point: Vec3,
        _reset_queue: bool,
        _final_facing: Facing,
    ) -> Result<(), CommandError> {
        self.target = Some(point);
        Ok(())
    }
    fn reverse_move_to(&mut self, point: Vec3, _reset_queue: bool) -> Result<(), CommandError> {
        self.target = Some(point);
        Ok(())
    }
    fn teleport_to(&mut self, point: Vec3) -> bool {
        self.location = point;
        true
    }
    fn set_idle(&mut self) {
        self.target = None;
    }
    fn lift_unstuck(&mut self, _height: f32) {}
    fn destroy(&mut self) {
        self.destroyed = true;
    }
    fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

/// Flat, fully navigable terrain.
struct FlatNav;

impl NavQuery for FlatNav {
    fn project_to_navigable(&self, point: Vec3, _extent: f32) -> Option<Vec3> {
        Some(Vec3::new(point.x, point.y, 0.0))
    }
    fn find_points_in_area(
        &mut self,
        _query: iron_tide::core::types::NavQueryId,
        _start: Vec3,
        _end: Vec3,
        _extent: Vec3,
        _density: f32,
        _max_count: usize,
    ) {
    }
    fn find_points_along_nearest_road(
        &mut self,
        _query: iron_tide::core::types::NavQueryId,
        _start: Vec3,
        _density: f32,
    ) {
    }
}

type SpawnQueue = Rc<RefCell<Vec<(UnitOption, Vec3, WaveId, SpawnRequestId)>>>;

/// Queues requests; the demo loop completes them one tick later.
struct QueuedSpawner {
    queue: SpawnQueue,
}

impl UnitSpawner for QueuedSpawner {
    fn spawn_at(
        &mut self,
        option: UnitOption,
        location: Vec3,
        wave: WaveId,
        request: SpawnRequestId,
    ) -> bool {
        self.queue.borrow_mut().push((option, location, wave, request));
        true
    }
}

struct DemoWorld {
    units: Vec<Rc<RefCell<DemoUnit>>>,
    next_id: u64,
}

impl DemoWorld {
    fn spawn(&mut self, location: Vec3) -> (UnitId, UnitHandle) {
        self.next_id += 1;
        let id = UnitId(self.next_id);
        let unit = Rc::new(RefCell::new(DemoUnit {
            id,
            location,
            target: None,
            destroyed: false,
        }));
        let dynamic: Rc<RefCell<dyn Commandable>> = unit.clone();
        let handle = UnitHandle::new(&dynamic);
        self.units.push(unit);
        (id, handle)
    }

    /// Advance movement; returns the units that arrived this tick.
    fn step(&mut self, dt: f64) -> Vec<UnitId> {
        let mut arrivals = Vec::new();
        for unit in &self.units {
            let mut unit = unit.borrow_mut();
            if unit.destroyed {
                continue;
            }
            let Some(target) = unit.target else {
                continue;
            };
            let to_target = target - unit.location;
            let step = UNIT_SPEED * dt as f32;
            if to_target.length() <= step.max(ARRIVAL_RANGE) {
                unit.location = target;
                unit.target = None;
                arrivals.push(unit.id);
            } else {
                let dir = to_target.normalize();
                unit.location += dir * step;
            }
        }
        arrivals
    }
}

fn wave_spec() -> WaveSpec {
    WaveSpec {
        kind: WaveKind::Independent,
        elements: vec![
            WaveElement {
                spawn_point: Vec3::new(200.0, -200.0, 0.0),
                options: vec![UnitOption::new(UnitCategory::Vehicle, 1)],
            },
            WaveElement {
                spawn_point: Vec3::new(200.0, 200.0, 0.0),
                options: vec![UnitOption::new(UnitCategory::Vehicle, 2)],
            },
            WaveElement {
                spawn_point: Vec3::new(400.0, 0.0, 0.0),
                options: vec![UnitOption::new(UnitCategory::Vehicle, 1)],
            },
        ],
        base_interval: 20.0,
        interval_variance: 0.2,
        waypoints: vec![
            Vec3::new(4000.0, 0.0, 0.0),
            Vec3::new(4000.0, 4000.0, 0.0),
        ],
        final_facing: Facing::from_yaw(std::f32::consts::FRAC_PI_2),
        max_row_width: 2,
        offset_scale: 1.2,
        attack_move: None,
        instant_start: true,
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let queue: SpawnQueue = Rc::new(RefCell::new(Vec::new()));
    let mut controller = EnemyController::new(
        EnemyAiConfig::default(),
        42,
        8,
        Box::new(FlatNav),
        Box::new(QueuedSpawner { queue: queue.clone() }),
    );
    let mut world = DemoWorld {
        units: Vec::new(),
        next_id: 0,
    };

    controller.start_wave(wave_spec()).expect("wave spec is valid");
    tracing::info!(supply = controller.wave_supply(), "skirmish started");

    // Which formation each live unit belongs to, maintained from events.
    let mut unit_formations: HashMap<UnitId, FormationId> = HashMap::new();
    // Units completed per wave since its last launch.
    let mut wave_batches: HashMap<WaveId, Vec<UnitId>> = HashMap::new();

    let mut now = 0.0;
    while now <= RUN_SECONDS {
        controller.update(now);

        // Complete queued spawn requests.
        let requests: Vec<_> = queue.borrow_mut().drain(..).collect();
        for (_option, location, wave, request) in requests {
            let (id, handle) = world.spawn(location);
            wave_batches.entry(wave).or_default().push(id);
            if let Some(formation) = controller.on_unit_spawned(wave, request, Some(handle)) {
                for unit in wave_batches.remove(&wave).unwrap_or_default() {
                    unit_formations.insert(unit, formation);
                }
            }
        }

        // Report waypoint arrivals.
        for unit in world.step(TICK) {
            if let Some(formation) = unit_formations.get(&unit).copied() {
                controller.on_unit_reached_waypoint(formation, unit);
            }
        }

        for event in controller.drain_events() {
            tracing::info!(?event, "event");
            if let EnemyEvent::FormationCompleted { formation } = &event {
                unit_formations.retain(|_, f| f != formation);
            }
        }

        now += TICK;
    }

    tracing::info!(
        supply = controller.wave_supply(),
        formations = controller.active_formations(),
        waves = controller.active_waves(),
        units = world.units.len(),
        "skirmish finished"
    );
}
