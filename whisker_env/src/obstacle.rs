//! Obstacle abstraction consumed from the physics collaborator.

use nalgebra::Point3;

/// An obstacle the whiskers can touch.
///
/// The physics collaborator only needs to answer one geometric question:
/// the closest point on the obstacle's surface to an arbitrary world point.
///
/// # Implementations
///
/// - **Simulation**: analytic shapes (sphere, cuboid, pole) in `whisker_sim`
/// - **Engine**: a wrapper around the engine's collider closest-point query
///
/// # Contract
///
/// For a query point inside the obstacle the returned point is the query
/// point itself, so the distance to it is zero.
pub trait Obstacle: Send + Sync {
    /// Name reported with contacts (e.g. "pole_0").
    fn name(&self) -> &str;

    /// Closest point on (or in) the obstacle to `point`, in world space.
    fn closest_point(&self, point: &Point3<f64>) -> Point3<f64>;

    /// Distance from `point` to the obstacle (zero inside).
    fn distance(&self, point: &Point3<f64>) -> f64 {
        nalgebra::distance(point, &self.closest_point(point))
    }
}

/// Whether an overlap event is the first tick of contact or a continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapPhase {
    /// Proxy began overlapping the obstacle this tick
    Enter,

    /// Proxy was already overlapping last tick
    Stay,
}
