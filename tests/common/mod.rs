//! Shared host-side mocks for the integration tests: a controllable unit,
//! flat terrain and a spawner that queues requests for manual completion.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;

use iron_tide::controller::EnemyController;
use iron_tide::core::types::{Facing, NavQueryId, SpawnRequestId, UnitId, WaveId};
use iron_tide::core::EnemyAiConfig;
use iron_tide::nav::NavQuery;
use iron_tide::units::{
    CommandError, Commandable, UnitCategory, UnitHandle, UnitOption, UnitSpawner,
};

pub struct TestUnit {
    pub id: UnitId,
    pub location: Vec3,
    pub category: UnitCategory,
    pub radius: f32,
    pub idle: bool,
    pub in_combat: bool,
    pub destroyed: bool,
    pub moves: Vec<Vec3>,
    pub reverse_moves: Vec<Vec3>,
    pub teleports: Vec<Vec3>,
}

impl Commandable for TestUnit {
    fn id(&self) -> UnitId {
        self.id
    }
    fn name(&self) -> String {
        format!("test-{}", self.id.0)
    }
    fn location(&self) -> Vec3 {
        self.location
    }
    fn category(&self) -> UnitCategory {
        self.category
    }
    fn formation_radius(&self) -> f32 {
        self.radius
    }
    fn is_idle(&self) -> bool {
        self.idle
    }
    fn is_in_combat(&self) -> bool {
        self.in_combat
    }
    fn move_to(
        &mut self,
        point: Vec3,
        _reset_queue: bool,
        _final_facing: Facing,
    ) -> Result<(), CommandError> {
        self.idle = false;
        self.moves.push(point);
        Ok(())
    }
    fn reverse_move_to(&mut self, point: Vec3, _reset_queue: bool) -> Result<(), CommandError> {
        self.idle = false;
        self.reverse_moves.push(point);
        Ok(())
    }
    fn teleport_to(&mut self, point: Vec3) -> bool {
        self.location = point;
        self.teleports.push(point);
        true
    }
    fn set_idle(&mut self) {
        self.idle = true;
    }
    fn lift_unstuck(&mut self, _height: f32) {}
    fn destroy(&mut self) {
        self.destroyed = true;
    }
    fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

/// Owns the strong references so controller-side weak handles stay alive.
#[derive(Default)]
pub struct TestWorld {
    pub units: Vec<Rc<RefCell<TestUnit>>>,
}

impl TestWorld {
    pub fn spawn(&mut self, id: u64, location: Vec3) -> (Rc<RefCell<TestUnit>>, UnitHandle) {
        let unit = Rc::new(RefCell::new(TestUnit {
            id: UnitId(id),
            location,
            category: UnitCategory::Vehicle,
            radius: 50.0,
            idle: false,
            in_combat: false,
            destroyed: false,
            moves: Vec::new(),
            reverse_moves: Vec::new(),
            teleports: Vec::new(),
        }));
        let dynamic: Rc<RefCell<dyn Commandable>> = unit.clone();
        let handle = UnitHandle::new(&dynamic);
        self.units.push(unit.clone());
        (unit, handle)
    }
}

/// Flat, fully navigable terrain.
pub struct FlatNav;

impl NavQuery for FlatNav {
    fn project_to_navigable(&self, point: Vec3, _extent: f32) -> Option<Vec3> {
        Some(point)
    }
    fn find_points_in_area(
        &mut self,
        _query: NavQueryId,
        _start: Vec3,
        _end: Vec3,
        _extent: Vec3,
        _density: f32,
        _max_count: usize,
    ) {
    }
    fn find_points_along_nearest_road(&mut self, _query: NavQueryId, _start: Vec3, _density: f32) {
    }
}

pub type SpawnQueue = Rc<RefCell<Vec<(UnitOption, Vec3, WaveId, SpawnRequestId)>>>;

/// Accepts every request and queues it for the test to complete by hand.
pub struct QueuedSpawner {
    pub queue: SpawnQueue,
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

/// Controller over flat terrain with a queued spawner, fixed seed.
pub fn controller_with_supply(supply: i32) -> (EnemyController, SpawnQueue) {
    let queue: SpawnQueue = Rc::new(RefCell::new(Vec::new()));
    let controller = EnemyController::new(
        EnemyAiConfig::default(),
        1234,
        supply,
        Box::new(FlatNav),
        Box::new(QueuedSpawner {
            queue: queue.clone(),
        }),
    );
    (controller, queue)
}
