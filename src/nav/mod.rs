//! Navigation Query Service boundary
//!
//! The navmesh itself lives in the host. The schedulers consume a
//! [`NavQuery`] implementation for synchronous point projection and can
//! issue asynchronous area/road sampling queries whose results the host may
//! compute on worker threads. Results come back through a channel drained on
//! the scheduling thread; anything addressed to a query that is no longer
//! registered is dropped, so a record destroyed mid-query never sees a stale
//! callback.

use std::sync::mpsc::{channel, Receiver, Sender};

use ahash::AHashSet;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::types::NavQueryId;

/// What to try when the initial point projection fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionFallback {
    /// Give up immediately.
    None,
    /// Retry from four points offset in the cardinal ground directions.
    LookAroundXy,
    /// Retry once with a doubled projection extent.
    DoubleExtent,
}

/// Navigation queries consumed by the schedulers.
pub trait NavQuery {
    /// Project a world point onto navigable space. `extent` is the half-size
    /// of the search box in world units; larger values accept points further
    /// from the input.
    fn project_to_navigable(&self, point: Vec3, extent: f32) -> Option<Vec3>;

    /// Sample navigable points in the box spanned by `start` and `end`.
    /// Asynchronous; results arrive tagged with `query` on the result channel.
    fn find_points_in_area(
        &mut self,
        query: NavQueryId,
        start: Vec3,
        end: Vec3,
        extent: Vec3,
        density: f32,
        max_count: usize,
    );

    /// Sample navigable points along the road nearest to `start`.
    /// Asynchronous; results arrive tagged with `query` on the result channel.
    fn find_points_along_nearest_road(&mut self, query: NavQueryId, start: Vec3, density: f32);
}

/// Projection with a configurable fallback, for callers that would rather
/// move somewhere nearby than not at all.
pub fn project_with_fallback(
    nav: &dyn NavQuery,
    point: Vec3,
    extent: f32,
    fallback: ProjectionFallback,
) -> Option<Vec3> {
    if let Some(projected) = nav.project_to_navigable(point, extent) {
        return Some(projected);
    }
    match fallback {
        ProjectionFallback::None => None,
        ProjectionFallback::LookAroundXy => {
            let step = extent.max(1.0);
            let offsets = [
                Vec3::new(step, 0.0, 0.0),
                Vec3::new(-step, 0.0, 0.0),
                Vec3::new(0.0, step, 0.0),
                Vec3::new(0.0, -step, 0.0),
            ];
            offsets
                .iter()
                .find_map(|offset| nav.project_to_navigable(point + *offset, extent))
        }
        ProjectionFallback::DoubleExtent => nav.project_to_navigable(point, extent * 2.0),
    }
}

/// One completed asynchronous query.
#[derive(Debug, Clone)]
pub struct NavQueryResult {
    pub query: NavQueryId,
    pub points: Vec<Vec3>,
}

/// Main-thread side of the nav completion channel.
///
/// The host keeps the [`Sender`] (clone it into worker threads as needed);
/// the controller drains the receiver once per update and routes only the
/// results whose query is still registered.
pub struct NavResultChannel {
    sender: Sender<NavQueryResult>,
    receiver: Receiver<NavQueryResult>,
    pending: AHashSet<NavQueryId>,
}

impl NavResultChannel {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self {
            sender,
            receiver,
            pending: AHashSet::new(),
        }
    }

    /// Sender for the host's nav workers.
    pub fn sender(&self) -> Sender<NavQueryResult> {
        self.sender.clone()
    }

    /// Register a query so its eventual result is accepted.
    pub fn register(&mut self, query: NavQueryId) {
        self.pending.insert(query);
    }

    /// Forget a query; a result that still arrives for it is dropped.
    pub fn cancel(&mut self, query: NavQueryId) {
        self.pending.remove(&query);
    }

    /// Drain everything that has arrived, keeping only results for
    /// still-registered queries. Each query delivers at most once.
    pub fn drain(&mut self) -> Vec<NavQueryResult> {
        let mut fresh = Vec::new();
        while let Ok(result) = self.receiver.try_recv() {
            if self.pending.remove(&result.query) {
                fresh.push(result);
            } else {
                tracing::debug!(query = ?result.query, "dropping stale nav query result");
            }
        }
        fresh
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for NavResultChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct WallAtOrigin;

    impl NavQuery for WallAtOrigin {
        fn project_to_navigable(&self, point: Vec3, _extent: f32) -> Option<Vec3> {
            // Everything with positive x is navigable.
            (point.x > 0.0).then_some(point)
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

        fn find_points_along_nearest_road(
            &mut self,
            _query: NavQueryId,
            _start: Vec3,
            _density: f32,
        ) {
        }
    }

    #[test]
    fn fallback_none_gives_up() {
        let nav = WallAtOrigin;
        let blocked = Vec3::new(-5.0, 0.0, 0.0);
        assert!(project_with_fallback(&nav, blocked, 10.0, ProjectionFallback::None).is_none());
    }

    #[test]
    fn fallback_look_around_finds_offset_point() {
        let nav = WallAtOrigin;
        let blocked = Vec3::new(-5.0, 0.0, 0.0);
        let found =
            project_with_fallback(&nav, blocked, 10.0, ProjectionFallback::LookAroundXy).unwrap();
        assert!(found.x > 0.0);
    }

    #[test]
    fn stale_results_are_dropped() {
        let mut channel = NavResultChannel::new();
        let live = NavQueryId(1);
        let stale = NavQueryId(2);
        channel.register(live);
        channel.register(stale);
        channel.cancel(stale);

        let sender = channel.sender();
        sender
            .send(NavQueryResult {
                query: stale,
                points: vec![Vec3::ZERO],
            })
            .unwrap();
        sender
            .send(NavQueryResult {
                query: live,
                points: vec![Vec3::ONE],
            })
            .unwrap();

        let results = channel.drain();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].query, live);
        assert_eq!(channel.pending_count(), 0);
    }

    #[test]
    fn each_query_delivers_once() {
        let mut channel = NavResultChannel::new();
        let query = NavQueryId(7);
        channel.register(query);
        let sender = channel.sender();
        for _ in 0..2 {
            sender
                .send(NavQueryResult {
                    query,
                    points: Vec::new(),
                })
                .unwrap();
        }
        assert_eq!(channel.drain().len(), 1);
    }
}
