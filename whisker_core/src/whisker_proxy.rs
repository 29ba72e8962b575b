//! The Collision Proxy Manager - capsule approximation of a whisker
//!
//! The full P-point curve is never tested against obstacles. Instead each
//! whisker owns S capsules, one per arc-length interval, repositioned every
//! tick from the current world-space shape. Collision cost is therefore
//! O(S) per whisker regardless of P.
//!
//! Intervals overlap their neighbours and stay clear of the true base and
//! tip, so no contact is ever reported exactly at an endpoint:
//!
//! ```text
//! s:  0 ─┬──────────────────────────────────────────────┬─ 1
//!        │[ proxy 0 ]                                   │
//!        │       [ proxy 1 ]                            │
//!        │               [ proxy 2 ] ...                │
//!        │                              [ proxy S-1 ]   │
//!      margin                                        margin
//! ```

use crate::whisker_curve::sample_polyline;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Segments shorter than this are treated as this long.
const MIN_SEGMENT_LENGTH: f64 = 1e-6;

/// Proxy layout and size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Number of proxies per whisker (S)
    pub count: usize,

    /// Capsule radius in world units
    pub radius: f64,

    /// Inset from both curve ends, in interval units
    pub end_margin: f64,

    /// Overlap between neighbouring intervals, in interval units
    pub overlap: f64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            count: 5,
            radius: 0.1,
            end_margin: 0.1,
            overlap: 0.2,
        }
    }
}

/// Arc-length interval `[s0, s1]` of the parent curve covered by one proxy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProxyInterval {
    pub s0: f64,
    pub s1: f64,
}

impl ProxyInterval {
    /// Maps a local segment parameter `t ∈ [0, 1]` to the curve parameter.
    pub fn lerp(&self, t: f64) -> f64 {
        self.s0 + (self.s1 - self.s0) * t.clamp(0.0, 1.0)
    }

    pub fn width(&self) -> f64 {
        self.s1 - self.s0
    }
}

/// Lays out `count` overlapping intervals over `[0, 1]`.
///
/// Interval `i` is `[(i + m) / d, (i + 1 + m + o) / d]` with
/// `d = count + 2m + o`, so the first starts at `m / d` and the last ends
/// at `1 - m / d`.
pub fn proxy_intervals(count: usize, end_margin: f64, overlap: f64) -> Vec<ProxyInterval> {
    let m = end_margin.max(0.0);
    let o = overlap.max(0.0);
    let denom = count as f64 + 2.0 * m + o;

    (0..count)
        .map(|i| {
            let i = i as f64;
            ProxyInterval {
                s0: (i + m) / denom,
                s1: (i + 1.0 + m + o) / denom,
            }
        })
        .collect()
}

/// One capsule proxy: a world-space reference segment plus a radius.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionProxy {
    interval: ProxyInterval,
    p0: Point3<f64>,
    p1: Point3<f64>,
    radius: f64,
}

impl CollisionProxy {
    /// Creates a collapsed proxy at the origin.
    pub fn new(interval: ProxyInterval, radius: f64) -> Self {
        Self {
            interval,
            p0: Point3::origin(),
            p1: Point3::origin(),
            radius,
        }
    }

    /// Places the proxy on a new segment.
    pub fn set_from_endpoints(&mut self, p0: Point3<f64>, p1: Point3<f64>) {
        self.p0 = p0;
        self.p1 = p1;
    }

    pub fn interval(&self) -> ProxyInterval {
        self.interval
    }

    pub fn endpoints(&self) -> (Point3<f64>, Point3<f64>) {
        (self.p0, self.p1)
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn midpoint(&self) -> Point3<f64> {
        nalgebra::center(&self.p0, &self.p1)
    }

    /// Reference segment length, floored at 1e-6.
    pub fn length(&self) -> f64 {
        (self.p1 - self.p0).norm().max(MIN_SEGMENT_LENGTH)
    }

    /// Unit segment direction; +Y for a collapsed segment.
    pub fn axis(&self) -> Vector3<f64> {
        let dir = self.p1 - self.p0;
        let len = dir.norm();
        if len < MIN_SEGMENT_LENGTH {
            Vector3::y()
        } else {
            dir / len
        }
    }

    /// Full capsule extent: the segment plus one radius past each end.
    pub fn capsule_height(&self) -> f64 {
        self.length() + 2.0 * self.radius
    }

    /// Rotation taking the capsule's local +Y onto the segment axis.
    pub fn orientation(&self) -> UnitQuaternion<f64> {
        let axis = self.axis();
        UnitQuaternion::rotation_between(&Vector3::y(), &axis).unwrap_or_else(|| {
            // Exactly antiparallel
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI)
        })
    }

    /// Capsule pose (centre + orientation) in world space.
    pub fn pose(&self) -> Isometry3<f64> {
        let mid = self.midpoint();
        Isometry3::from_parts(Translation3::new(mid.x, mid.y, mid.z), self.orientation())
    }

    /// Projects `point` onto the reference segment.
    ///
    /// Returns `None` for a degenerate segment, else the local parameter
    /// `t ∈ [0, 1]` and the projected point.
    pub fn project(&self, point: &Point3<f64>) -> Option<(f64, Point3<f64>)> {
        let ab = self.p1 - self.p0;
        let ab2 = ab.norm_squared();
        if ab2 < 1e-10 {
            return None;
        }
        let t = ((point - self.p0).dot(&ab) / ab2).clamp(0.0, 1.0);
        Some((t, self.p0 + ab * t))
    }

    /// Distance from `point` to the capsule's core segment.
    pub fn segment_distance(&self, point: &Point3<f64>) -> f64 {
        match self.project(point) {
            Some((_, proj)) => nalgebra::distance(point, &proj),
            None => nalgebra::distance(point, &self.p0),
        }
    }
}

/// The S proxies of one whisker.
#[derive(Debug, Clone)]
pub struct ProxySet {
    proxies: Vec<CollisionProxy>,
}

impl ProxySet {
    /// Creates the proxies with their fixed intervals.
    pub fn new(config: &ProxyConfig) -> Self {
        let proxies = proxy_intervals(config.count, config.end_margin, config.overlap)
            .into_iter()
            .map(|interval| CollisionProxy::new(interval, config.radius))
            .collect();
        Self { proxies }
    }

    /// Repositions every proxy onto the given world-space shape.
    pub fn reposition_all(&mut self, world_shape: &[Point3<f64>]) {
        for proxy in &mut self.proxies {
            let p0 = sample_polyline(world_shape, proxy.interval.s0);
            let p1 = sample_polyline(world_shape, proxy.interval.s1);
            proxy.set_from_endpoints(p0, p1);
        }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CollisionProxy> {
        self.proxies.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollisionProxy> {
        self.proxies.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_default_intervals_cover_inset_range() {
        let intervals = proxy_intervals(5, 0.1, 0.2);

        assert_eq!(intervals.len(), 5);
        assert_relative_eq!(intervals[0].s0, 0.1 / 5.4, epsilon = 1e-12);
        assert_relative_eq!(intervals[4].s1, 5.3 / 5.4, epsilon = 1e-12);
        assert!((intervals[0].s0 - 0.018).abs() < 0.001);
        assert!((intervals[4].s1 - 0.981).abs() < 0.001);

        for pair in intervals.windows(2) {
            assert!(pair[1].s0 > pair[0].s0);
            assert!(pair[1].s1 > pair[0].s1);
            // Neighbours overlap
            assert!(pair[1].s0 < pair[0].s1);
        }
    }

    #[test]
    fn test_reposition_follows_shape() {
        let shape: Vec<Point3<f64>> = (0..100).map(|i| Point3::new(0.0, i as f64, 0.0)).collect();
        let mut set = ProxySet::new(&ProxyConfig::default());
        set.reposition_all(&shape);

        let first = set.get(0).unwrap();
        let (p0, p1) = first.endpoints();
        assert_relative_eq!(p0.y, 99.0 * first.interval().s0, epsilon = 1e-9);
        assert_relative_eq!(p1.y, 99.0 * first.interval().s1, epsilon = 1e-9);

        // Already along +Y: identity orientation
        assert_relative_eq!(first.orientation().angle(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(first.capsule_height(), first.length() + 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_orientation_maps_y_to_axis() {
        let mut proxy = CollisionProxy::new(ProxyInterval { s0: 0.0, s1: 1.0 }, 0.1);
        proxy.set_from_endpoints(Point3::new(1.0, 1.0, 1.0), Point3::new(1.0, 1.0, 3.0));
        let rotated = proxy.orientation() * Vector3::y();
        assert_relative_eq!(rotated, Vector3::z(), epsilon = 1e-9);

        proxy.set_from_endpoints(Point3::new(0.0, 1.0, 0.0), Point3::new(0.0, -1.0, 0.0));
        let rotated = proxy.orientation() * Vector3::y();
        assert_relative_eq!(rotated, -Vector3::y(), epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_proxy() {
        let proxy = CollisionProxy::new(ProxyInterval { s0: 0.2, s1: 0.4 }, 0.1);
        assert!(proxy.project(&Point3::new(1.0, 0.0, 0.0)).is_none());
        assert_relative_eq!(proxy.length(), MIN_SEGMENT_LENGTH);
        assert_relative_eq!(proxy.segment_distance(&Point3::new(1.0, 0.0, 0.0)), 1.0);
    }

    proptest! {
        #[test]
        fn intervals_increase_and_never_degenerate(
            count in 1usize..20,
            margin in 0.0f64..0.5,
            overlap in 0.0f64..0.9,
        ) {
            let intervals = proxy_intervals(count, margin, overlap);
            prop_assert_eq!(intervals.len(), count);
            for iv in &intervals {
                prop_assert!(iv.s1 > iv.s0);
                prop_assert!(iv.s0 >= 0.0 && iv.s1 <= 1.0);
            }
            for pair in intervals.windows(2) {
                prop_assert!(pair[1].s0 > pair[0].s0);
                prop_assert!(pair[1].s1 > pair[0].s1);
                prop_assert!(pair[1].s0 <= pair[0].s1);
            }
        }
    }
}
