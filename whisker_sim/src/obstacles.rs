//! Analytic obstacle shapes placed around the head.
//!
//! Every shape answers the single question the contact pipeline asks: the
//! closest point on (or in) the shape to a world point. Points inside a
//! shape map to themselves.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use whisker_env::Obstacle;

/// Obstacle geometry. World +Y is up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    /// Solid ball
    Sphere { center: Point3<f64>, radius: f64 },

    /// Axis-aligned box given by its two corners
    Cuboid { min: Point3<f64>, max: Point3<f64> },

    /// Vertical cylinder standing on `base`
    Pole {
        base: Point3<f64>,
        radius: f64,
        height: f64,
    },
}

/// A named obstacle in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObstacle {
    pub name: String,
    pub shape: Shape,
}

impl SceneObstacle {
    pub fn sphere(name: impl Into<String>, center: Point3<f64>, radius: f64) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Sphere {
                center,
                radius: radius.max(0.0),
            },
        }
    }

    /// Box from two opposite corners in any order.
    pub fn cuboid(name: impl Into<String>, a: Point3<f64>, b: Point3<f64>) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Cuboid {
                min: a.inf(&b),
                max: a.sup(&b),
            },
        }
    }

    pub fn pole(name: impl Into<String>, base: Point3<f64>, radius: f64, height: f64) -> Self {
        Self {
            name: name.into(),
            shape: Shape::Pole {
                base,
                radius: radius.max(0.0),
                height: height.max(0.0),
            },
        }
    }

    /// Rough bounding radius around [`Self::center`], for culling.
    pub fn bounding_radius(&self) -> f64 {
        match &self.shape {
            Shape::Sphere { radius, .. } => *radius,
            Shape::Cuboid { min, max } => (max - min).norm() * 0.5,
            Shape::Pole { radius, height, .. } => (radius * radius + height * height * 0.25).sqrt(),
        }
    }

    pub fn center(&self) -> Point3<f64> {
        match &self.shape {
            Shape::Sphere { center, .. } => *center,
            Shape::Cuboid { min, max } => nalgebra::center(min, max),
            Shape::Pole { base, height, .. } => base + Vector3::y() * (height * 0.5),
        }
    }

    /// True when `point` is inside or on the surface.
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        self.distance(point) <= 0.0
    }
}

impl Obstacle for SceneObstacle {
    fn name(&self) -> &str {
        &self.name
    }

    fn closest_point(&self, point: &Point3<f64>) -> Point3<f64> {
        match &self.shape {
            Shape::Sphere { center, radius } => {
                let offset = point - center;
                let dist = offset.norm();
                if dist <= *radius {
                    *point
                } else {
                    center + offset * (radius / dist)
                }
            }
            Shape::Cuboid { min, max } => clamp_point(point, min, max),
            Shape::Pole {
                base,
                radius,
                height,
            } => {
                let y = point.y.clamp(base.y, base.y + height);
                let radial = Vector3::new(point.x - base.x, 0.0, point.z - base.z);
                let r = radial.norm();
                let radial = if r > *radius { radial * (radius / r) } else { radial };
                Point3::new(base.x + radial.x, y, base.z + radial.z)
            }
        }
    }
}

/// Componentwise clamp of `p` into the box `[min, max]`.
pub fn clamp_point(p: &Point3<f64>, min: &Point3<f64>, max: &Point3<f64>) -> Point3<f64> {
    Point3::new(
        p.x.clamp(min.x, max.x),
        p.y.clamp(min.y, max.y),
        p.z.clamp(min.z, max.z),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_sphere_closest_point() {
        let s = SceneObstacle::sphere("ball", Point3::new(1.0, 0.0, 0.0), 0.5);
        let p = s.closest_point(&Point3::new(3.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(1.5, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(s.distance(&Point3::new(3.0, 0.0, 0.0)), 1.5, epsilon = 1e-12);

        let inside = Point3::new(1.2, 0.1, 0.0);
        assert_eq!(s.closest_point(&inside), inside);
        assert!(s.contains(&inside));
    }

    #[test]
    fn test_cuboid_corners_any_order() {
        let c = SceneObstacle::cuboid("wall", Point3::new(2.0, 1.0, 1.0), Point3::new(0.0, -1.0, -1.0));
        let p = c.closest_point(&Point3::new(5.0, 5.0, 0.0));
        assert_relative_eq!(p, Point3::new(2.0, 1.0, 0.0), epsilon = 1e-12);
        assert!(c.contains(&Point3::new(1.0, 0.0, 0.0)));
        assert_relative_eq!(c.center(), Point3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_pole_closest_point() {
        let pole = SceneObstacle::pole("pole", Point3::new(0.0, 0.0, 0.0), 1.0, 10.0);

        let p = pole.closest_point(&Point3::new(3.0, 4.0, 0.0));
        assert_relative_eq!(p, Point3::new(1.0, 4.0, 0.0), epsilon = 1e-12);

        // Above the top cap
        let p = pole.closest_point(&Point3::new(0.5, 12.0, 0.0));
        assert_relative_eq!(p, Point3::new(0.5, 10.0, 0.0), epsilon = 1e-12);

        let inside = Point3::new(0.2, 3.0, -0.3);
        assert_eq!(pole.closest_point(&inside), inside);
    }

    #[test]
    fn test_shape_serde_tagging() {
        let pole = SceneObstacle::pole("pole_0", Point3::new(1.0, 0.0, 2.0), 0.3, 5.0);
        let json = serde_json::to_string(&pole).unwrap();
        assert!(json.contains("\"kind\":\"pole\""));
        let back: SceneObstacle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pole);
    }

    proptest! {
        #[test]
        fn closest_point_is_on_shape_and_stable(
            x in -20.0f64..20.0,
            y in -20.0f64..20.0,
            z in -20.0f64..20.0,
        ) {
            let query = Point3::new(x, y, z);
            let shapes = [
                SceneObstacle::sphere("s", Point3::new(1.0, 2.0, 3.0), 2.5),
                SceneObstacle::cuboid("c", Point3::new(-3.0, -1.0, 0.0), Point3::new(2.0, 4.0, 1.0)),
                SceneObstacle::pole("p", Point3::new(0.0, -5.0, 0.0), 1.5, 10.0),
            ];
            for shape in &shapes {
                let p = shape.closest_point(&query);
                prop_assert!(shape.distance(&p) < 1e-9);
                prop_assert!(nalgebra::distance(&shape.closest_point(&p), &p) < 1e-9);
                prop_assert!(shape.distance(&query) <= nalgebra::distance(&query, &shape.center()) + 1e-9);
            }
        }
    }
}
