//! Retreat and counterattack integration tests

mod common;

use common::{controller_with_supply, TestWorld};
use glam::Vec3;
use iron_tide::core::EnemyEvent;
use iron_tide::retreat::{PostRetreatStrategy, RetreatSpec};
use iron_tide::units::{Commandable, UnitCategory};

fn retreat_point() -> Vec3 {
    Vec3::new(-5000.0, 0.0, 0.0)
}

fn counterattack_target() -> Vec3 {
    Vec3::new(6000.0, 0.0, 0.0)
}

#[test]
fn remove_strategy_destroys_arrivals_without_counterattack() {
    let (mut controller, _queue) = controller_with_supply(0);
    let mut world = TestWorld::default();
    let (a, ha) = world.spawn(1, Vec3::ZERO);
    let (b, hb) = world.spawn(2, Vec3::new(200.0, 0.0, 0.0));

    controller
        .start_retreat(RetreatSpec {
            retreating: vec![(ha, retreat_point()), (hb, retreat_point())],
            reverse_moving: Vec::new(),
            strategy: PostRetreatStrategy::RemoveUnits,
            counterattack_target: counterattack_target(),
            grace_delay: 5.0,
            max_wait: 30.0,
        })
        .unwrap();
    assert_eq!(controller.active_retreats(), 1);

    // First arrives by position, second later by going idle.
    a.borrow_mut().location = retreat_point();
    controller.update(2.0);
    assert!(a.borrow().destroyed);
    assert!(!b.borrow().destroyed);

    b.borrow_mut().idle = true;
    controller.update(4.0);
    assert!(b.borrow().destroyed);
    assert_eq!(controller.active_retreats(), 0);

    let events = controller.drain_events();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, EnemyEvent::RetreatUnitRemoved { .. }))
            .count(),
        2
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, EnemyEvent::RetreatDissolved { .. })));
    assert!(events
        .iter()
        .all(|e| !matches!(e, EnemyEvent::CounterattackLaunched { .. })));
    assert_eq!(controller.active_formations(), 0);
}

#[test]
fn grace_period_beats_max_wait_when_units_arrive_early() {
    let (mut controller, _queue) = controller_with_supply(0);
    let mut world = TestWorld::default();
    let (a, ha) = world.spawn(1, Vec3::ZERO);

    controller
        .start_retreat(RetreatSpec {
            retreating: vec![(ha, retreat_point())],
            reverse_moving: Vec::new(),
            strategy: PostRetreatStrategy::Attack,
            counterattack_target: counterattack_target(),
            grace_delay: 5.0,
            max_wait: 30.0,
        })
        .unwrap();

    // Arrived by the t=2 re-check; the grace period runs until t=7.
    a.borrow_mut().location = retreat_point();
    controller.update(2.0);
    controller.update(6.5);
    assert!(controller
        .drain_events()
        .iter()
        .all(|e| !matches!(e, EnemyEvent::CounterattackLaunched { .. })));

    controller.update(7.0);
    let events = controller.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, EnemyEvent::CounterattackLaunched { .. })));
    assert_eq!(controller.active_retreats(), 0);
    assert_eq!(controller.active_formations(), 1);

    // The survivor was ordered toward the counterattack target.
    let last_move = *a.borrow().moves.last().unwrap();
    assert_eq!(last_move, counterattack_target());
}

#[test]
fn max_wait_fires_when_units_never_arrive() {
    let (mut controller, _queue) = controller_with_supply(0);
    let mut world = TestWorld::default();
    let (_a, ha) = world.spawn(1, Vec3::ZERO);

    controller
        .start_retreat(RetreatSpec {
            retreating: vec![(ha, retreat_point())],
            reverse_moving: Vec::new(),
            strategy: PostRetreatStrategy::Attack,
            counterattack_target: counterattack_target(),
            grace_delay: 5.0,
            max_wait: 30.0,
        })
        .unwrap();

    let mut t = 2.0;
    while t < 30.0 {
        controller.update(t);
        t += 2.0;
    }
    assert!(controller
        .drain_events()
        .iter()
        .all(|e| !matches!(e, EnemyEvent::CounterattackLaunched { .. })));

    controller.update(30.0);
    assert!(controller
        .drain_events()
        .iter()
        .any(|e| matches!(e, EnemyEvent::CounterattackLaunched { .. })));
}

#[test]
fn counterattack_launches_one_formation_per_category() {
    let (mut controller, _queue) = controller_with_supply(0);
    let mut world = TestWorld::default();
    let (a, ha) = world.spawn(1, Vec3::ZERO);
    let (b, hb) = world.spawn(2, Vec3::new(300.0, 0.0, 0.0));
    b.borrow_mut().category = UnitCategory::Squad;

    controller
        .start_retreat(RetreatSpec {
            retreating: vec![(ha, retreat_point())],
            reverse_moving: vec![(hb, retreat_point())],
            strategy: PostRetreatStrategy::Attack,
            counterattack_target: counterattack_target(),
            grace_delay: 1.0,
            max_wait: 30.0,
        })
        .unwrap();
    // Reverse movers get reverse orders.
    assert_eq!(a.borrow().moves.len(), 1);
    assert_eq!(b.borrow().reverse_moves.len(), 1);

    a.borrow_mut().idle = true;
    b.borrow_mut().idle = true;
    controller.update(2.0);
    controller.update(3.1);

    let events = controller.drain_events();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, EnemyEvent::CounterattackLaunched { .. }))
            .count(),
        2
    );
    assert_eq!(controller.active_formations(), 2);
}

#[test]
fn dead_retreaters_dissolve_without_counterattack() {
    let (mut controller, _queue) = controller_with_supply(0);
    let mut world = TestWorld::default();
    let (a, ha) = world.spawn(1, Vec3::ZERO);

    controller
        .start_retreat(RetreatSpec {
            retreating: vec![(ha, retreat_point())],
            reverse_moving: Vec::new(),
            strategy: PostRetreatStrategy::Attack,
            counterattack_target: counterattack_target(),
            grace_delay: 5.0,
            max_wait: 30.0,
        })
        .unwrap();

    a.borrow_mut().destroy();
    controller.update(2.0);

    assert_eq!(controller.active_retreats(), 0);
    let events = controller.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, EnemyEvent::RetreatDissolved { .. })));
    assert!(events
        .iter()
        .all(|e| !matches!(e, EnemyEvent::CounterattackLaunched { .. })));
}
