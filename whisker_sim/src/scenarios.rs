//! Obstacle layouts placed around the head.

use crate::obstacles::SceneObstacle;
use nalgebra::Point3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Standard deviation of the clutter anchor jitter.
const CLUTTER_JITTER_STD: f64 = 3.0;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// No obstacles; every reading stays empty
    Empty,

    /// One vertical pole inside the right whisker field
    Pole,

    /// A flat wall in front of the snout
    Wall,

    /// Seeded random poles and spheres on both sides
    Clutter,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Empty,
            ScenarioId::Pole,
            ScenarioId::Wall,
            ScenarioId::Clutter,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Empty => "empty",
            ScenarioId::Pole => "pole",
            ScenarioId::Wall => "wall",
            ScenarioId::Clutter => "clutter",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Empty => "Free whisking, no obstacles",
            ScenarioId::Pole => "Single vertical pole beside the right whisker pad",
            ScenarioId::Wall => "Wall ahead of the snout, reached at full protraction",
            ScenarioId::Clutter => "Random poles and spheres on both sides (seeded)",
        }
    }

    /// Builds the obstacles for this scenario, head at the origin facing +Z.
    ///
    /// Only `Clutter` consumes randomness; the others ignore the seed.
    pub fn build(&self, seed: u64) -> Vec<SceneObstacle> {
        match self {
            ScenarioId::Empty => Vec::new(),
            ScenarioId::Pole => vec![SceneObstacle::pole("pole_0", Point3::new(18.0, -20.0, 12.0), 1.0, 40.0)],
            ScenarioId::Wall => vec![SceneObstacle::cuboid(
                "wall",
                Point3::new(-40.0, -20.0, 22.0),
                Point3::new(40.0, 20.0, 24.0),
            )],
            ScenarioId::Clutter => clutter(seed),
        }
    }
}

/// Poles and spheres jittered around fixed anchor points on both sides.
fn clutter(seed: u64) -> Vec<SceneObstacle> {
    let Ok(jitter) = Normal::new(0.0, CLUTTER_JITTER_STD) else {
        return Vec::new();
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let anchors = [
        Point3::new(16.0, 0.0, 8.0),
        Point3::new(22.0, 0.0, 18.0),
        Point3::new(-16.0, 0.0, 8.0),
        Point3::new(-22.0, 0.0, 18.0),
        Point3::new(0.0, 0.0, 30.0),
    ];

    anchors
        .iter()
        .enumerate()
        .map(|(i, anchor)| {
            let center = Point3::new(
                anchor.x + jitter.sample(&mut rng),
                anchor.y + jitter.sample(&mut rng),
                anchor.z + jitter.sample(&mut rng),
            );
            if rng.gen_bool(0.5) {
                let radius = rng.gen_range(0.5..2.0);
                SceneObstacle::pole(format!("pole_{}", i), Point3::new(center.x, -20.0, center.z), radius, 40.0)
            } else {
                let radius = rng.gen_range(2.0..5.0);
                SceneObstacle::sphere(format!("sphere_{}", i), center, radius)
            }
        })
        .collect()
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "empty" | "none" => Ok(ScenarioId::Empty),
            "pole" => Ok(ScenarioId::Pole),
            "wall" => Ok(ScenarioId::Wall),
            "clutter" => Ok(ScenarioId::Clutter),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_from_str() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_clutter_is_seeded() {
        let a = ScenarioId::Clutter.build(7);
        let b = ScenarioId::Clutter.build(7);
        let c = ScenarioId::Clutter.build(8);
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fixed_scenarios() {
        assert!(ScenarioId::Empty.build(1).is_empty());
        assert_eq!(ScenarioId::Pole.build(1), ScenarioId::Pole.build(2));
        assert_eq!(ScenarioId::Wall.build(1)[0].name, "wall");
    }
}
