//! Overlap dispatcher - the broad phase that feeds the contact phase.
//!
//! Tests every proxy capsule against every obstacle (never proxy against
//! proxy) and delivers one event per overlapping pair. Pairs are tracked
//! across ticks so each event carries its [`OverlapPhase`].

use crate::obstacles::SceneObstacle;
use nalgebra::Point3;
use std::collections::HashSet;
use tracing::trace;
use whisker_core::whisker_proxy::CollisionProxy;
use whisker_core::{ContactPhase, ProxyKey};
use whisker_env::{Obstacle, OverlapPhase};

/// Alternating-projection rounds for segment/convex distance.
const CLOSEST_ITERATIONS: usize = 4;

/// Closest pair between a segment and a convex obstacle.
///
/// Alternates projecting onto the segment and onto the obstacle, starting
/// from the segment midpoint. Exact for spheres, converges quickly for
/// boxes and poles.
pub fn closest_points_segment_obstacle(
    a: &Point3<f64>,
    b: &Point3<f64>,
    obstacle: &dyn Obstacle,
) -> (Point3<f64>, Point3<f64>) {
    let mut ps = nalgebra::center(a, b);
    let mut qs = obstacle.closest_point(&ps);
    for _ in 0..CLOSEST_ITERATIONS {
        ps = closest_point_on_segment(a, b, &qs);
        qs = obstacle.closest_point(&ps);
    }
    (ps, qs)
}

/// Closest point to `p` on segment `[a, b]`.
pub fn closest_point_on_segment(a: &Point3<f64>, b: &Point3<f64>, p: &Point3<f64>) -> Point3<f64> {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < 1e-12 {
        return *a;
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    a + ab * t
}

/// Whether a proxy capsule touches an obstacle.
pub fn capsule_overlaps(proxy: &CollisionProxy, obstacle: &dyn Obstacle) -> bool {
    let (p0, p1) = proxy.endpoints();
    let (ps, qs) = closest_points_segment_obstacle(&p0, &p1, obstacle);
    nalgebra::distance(&ps, &qs) <= proxy.radius()
}

/// Counters for one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub entered: usize,
    pub stayed: usize,
    pub exited: usize,
    pub accepted: usize,
}

/// Stateful broad phase.
#[derive(Debug, Default)]
pub struct OverlapDispatcher {
    /// Pairs overlapping on the previous tick: (proxy, obstacle index)
    active: HashSet<(ProxyKey, usize)>,
}

impl OverlapDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs currently overlapping.
    pub fn active_pairs(&self) -> usize {
        self.active.len()
    }

    /// Forgets all tracked pairs (next overlaps are all `Enter`).
    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Finds every overlapping proxy/obstacle pair and delivers it, tagged
    /// `Enter` or `Stay`, to the contact phase.
    pub fn dispatch(&mut self, phase: &mut ContactPhase<'_>, obstacles: &[SceneObstacle]) -> DispatchStats {
        let mut overlaps = Vec::new();
        for (key, proxy) in phase.proxies() {
            let (p0, p1) = proxy.endpoints();
            let mid = nalgebra::center(&p0, &p1);
            let reach = nalgebra::distance(&p0, &p1) * 0.5 + proxy.radius();

            for (index, obstacle) in obstacles.iter().enumerate() {
                if nalgebra::distance(&mid, &obstacle.center()) > reach + obstacle.bounding_radius() {
                    continue;
                }
                if capsule_overlaps(proxy, obstacle) {
                    overlaps.push((key, index));
                }
            }
        }

        let mut stats = DispatchStats::default();
        let mut current = HashSet::with_capacity(overlaps.len());

        for (key, index) in overlaps {
            let overlap_phase = if self.active.contains(&(key, index)) {
                stats.stayed += 1;
                OverlapPhase::Stay
            } else {
                stats.entered += 1;
                OverlapPhase::Enter
            };
            trace!("{:?} proxy {:?} / {}", overlap_phase, key, obstacles[index].name);

            if phase.on_overlap(key, &obstacles[index], overlap_phase).is_some() {
                stats.accepted += 1;
            }
            current.insert((key, index));
        }

        stats.exited = self.active.difference(&current).count();
        self.active = current;
        stats
    }
}
