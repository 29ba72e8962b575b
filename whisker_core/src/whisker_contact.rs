//! The Contact Mapper - from a proxy overlap to an arc-length reading
//!
//! Pipeline for one overlap event:
//! 1. **Proximity gate**: query the obstacle's closest point to the proxy
//!    midpoint, project it onto the proxy segment and reject it if it lies
//!    farther than `radius × proximity_multiplier` (glancing broad-phase hits).
//! 2. **Re-projection**: move that contact point into head space and find the
//!    nearest point on the full-resolution head-space shape (exhaustive,
//!    O(P)).
//! 3. **Normalization**: arc length up to the nearest point over total
//!    length, oriented so the base (the end nearer the head origin) is
//!    `s = 1` and the tip `s = 0`.
//!
//! Degenerate geometry (collapsed proxy, curve shorter than 1e-8)
//! short-circuits with a rejection and leaves the reading untouched.

use crate::whisker_curve::CurveAnimator;
use crate::whisker_proxy::CollisionProxy;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use whisker_env::Obstacle;

/// Curves shorter than this cannot be parametrized.
pub const MIN_CURVE_LENGTH: f64 = 1e-8;

/// Nearest point on a curve, expressed along its arc length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcProjection {
    /// Index of the nearest segment `[i, i + 1]`
    pub segment: usize,

    /// Local parameter within that segment
    pub t: f64,

    /// Arc length from sample 0 to the nearest point
    pub arc_length: f64,

    /// Total curve length
    pub total_length: f64,

    /// Oriented parameter: 1 = base, 0 = tip
    pub s: f64,

    /// Distance from the query point to the curve
    pub distance: f64,
}

/// Projects `point` onto the polyline `shape` and returns its oriented
/// arc-length parameter.
///
/// Returns `None` when the shape has fewer than two points or its total
/// length is below [`MIN_CURVE_LENGTH`].
pub fn project_onto_curve(shape: &[Point3<f64>], point: &Point3<f64>) -> Option<ArcProjection> {
    if shape.len() < 2 {
        return None;
    }

    let total_length: f64 = shape.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
    if !(total_length >= MIN_CURVE_LENGTH) {
        return None;
    }

    let mut best_segment = 0;
    let mut best_t = 0.0;
    let mut best_d2 = f64::INFINITY;
    let mut best_arc = 0.0;
    let mut arc_before = 0.0;

    for (i, w) in shape.windows(2).enumerate() {
        let (a, b) = (w[0], w[1]);
        let ab = b - a;
        let len2 = ab.norm_squared();
        let len = len2.sqrt();

        let t = if len2 > 1e-12 {
            ((point - a).dot(&ab) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let d2 = (point - (a + ab * t)).norm_squared();

        if d2 < best_d2 {
            best_d2 = d2;
            best_segment = i;
            best_t = t;
            best_arc = arc_before + t * len;
        }
        arc_before += len;
    }

    let u = (best_arc / total_length).clamp(0.0, 1.0);
    let s = if base_is_first(shape) { 1.0 - u } else { u };

    Some(ArcProjection {
        segment: best_segment,
        t: best_t,
        arc_length: best_arc,
        total_length,
        s,
        distance: best_d2.sqrt(),
    })
}

/// True when sample 0 is the base, i.e. nearer the head origin than the
/// last sample.
pub fn base_is_first(shape: &[Point3<f64>]) -> bool {
    match (shape.first(), shape.last()) {
        (Some(first), Some(last)) => first.coords.norm() <= last.coords.norm(),
        _ => true,
    }
}

/// Why an overlap produced no reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactRejection {
    /// Proxy segment has (near) zero length
    DegenerateProxy,

    /// Obstacle point is beyond the proximity gate
    OutOfRange { distance: f64, limit: f64 },

    /// Whisker curve is too short to parametrize
    DegenerateCurve,
}

/// An accepted contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactSample {
    /// Oriented arc-length parameter (1 = base, 0 = tip)
    pub s: f64,

    /// Contact strength, equal to `s`: proximal contacts are stronger
    pub intensity: f64,

    /// Obstacle's closest point, world space
    pub world_point: Point3<f64>,

    /// Same point in head space
    pub head_point: Point3<f64>,

    /// Distance from the contact point to the whisker curve
    pub curve_distance: f64,

    /// Obstacle name
    pub object: String,
}

/// Maps proxy/obstacle overlaps to contact samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactMapper {
    /// Gate radius as a multiple of the proxy radius
    proximity_multiplier: f64,
}

impl Default for ContactMapper {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl ContactMapper {
    pub fn new(proximity_multiplier: f64) -> Self {
        Self {
            proximity_multiplier,
        }
    }

    pub fn proximity_multiplier(&self) -> f64 {
        self.proximity_multiplier
    }

    /// Evaluates one overlap of `proxy` with `obstacle` for the whisker
    /// animated by `animator`.
    pub fn map(
        &self,
        proxy: &CollisionProxy,
        obstacle: &dyn Obstacle,
        animator: &CurveAnimator,
    ) -> Result<ContactSample, ContactRejection> {
        let world_point = obstacle.closest_point(&proxy.midpoint());

        let (_, projected) = proxy
            .project(&world_point)
            .ok_or(ContactRejection::DegenerateProxy)?;

        let distance = nalgebra::distance(&world_point, &projected);
        let limit = proxy.radius() * self.proximity_multiplier;
        if distance > limit {
            return Err(ContactRejection::OutOfRange { distance, limit });
        }

        let head_point = animator.world_to_head(&world_point);
        let projection = project_onto_curve(animator.head_shape(), &head_point)
            .ok_or(ContactRejection::DegenerateCurve)?;

        Ok(ContactSample {
            s: projection.s,
            intensity: projection.s,
            world_point,
            head_point,
            curve_distance: projection.distance,
            object: obstacle.name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    /// P points evenly spaced along +X starting at `start`.
    fn straight(start: f64, length: f64) -> Vec<Point3<f64>> {
        let n = 100;
        (0..n)
            .map(|i| Point3::new(start + length * i as f64 / (n - 1) as f64, 0.0, 0.0))
            .collect()
    }

    #[test]
    fn test_sample_points_map_to_index_fraction() {
        // Base at sample 0 (nearest the origin)
        let shape = straight(1.0, 9.9);
        for k in [0usize, 1, 17, 50, 98, 99] {
            let p = project_onto_curve(&shape, &shape[k]).unwrap();
            assert_relative_eq!(p.s, 1.0 - k as f64 / 99.0, epsilon = 1e-9);
            assert_relative_eq!(p.total_length, 9.9, epsilon = 1e-9);
            assert!(p.distance < 1e-9);
        }
    }

    #[test]
    fn test_orientation_follows_base_not_index() {
        // Same curve stored tip-first
        let mut shape = straight(1.0, 9.9);
        shape.reverse();
        assert!(!base_is_first(&shape));

        let p = project_onto_curve(&shape, &shape[0]).unwrap();
        assert_relative_eq!(p.s, 0.0, epsilon = 1e-9);
        let p = project_onto_curve(&shape, &shape[99]).unwrap();
        assert_relative_eq!(p.s, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_off_curve_point_projects_perpendicular() {
        let shape = straight(0.0, 99.0);
        let p = project_onto_curve(&shape, &Point3::new(30.5, 2.0, 0.0)).unwrap();
        assert_eq!(p.segment, 30);
        assert_relative_eq!(p.t, 0.5, epsilon = 1e-9);
        assert_relative_eq!(p.arc_length, 30.5, epsilon = 1e-9);
        assert_relative_eq!(p.distance, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_curve_rejected() {
        let zeros = vec![Point3::origin(); 100];
        assert!(project_onto_curve(&zeros, &Point3::new(1.0, 0.0, 0.0)).is_none());
        assert!(project_onto_curve(&zeros[..1], &Point3::origin()).is_none());
    }

    proptest! {
        #[test]
        fn arc_parameter_is_monotonic(start in 0.5f64..5.0, length in 0.1f64..50.0) {
            let shape = straight(start, length);
            let mut last = f64::INFINITY;
            for k in 0..shape.len() {
                let p = project_onto_curve(&shape, &shape[k]).unwrap();
                prop_assert!(p.s <= last + 1e-12);
                prop_assert!((p.s - (1.0 - k as f64 / 99.0)).abs() < 1e-9);
                last = p.s;
            }
        }
    }
}
