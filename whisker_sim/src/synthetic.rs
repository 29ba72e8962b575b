//! Procedural keyframe set for running without recorded data.
//!
//! Builds a 5 x 6 grid of arched whiskers per side. Each whisker sweeps from
//! retraction (pointing back along the cheek) to protraction (pointing
//! forward) over the F frames of the cycle. Head space: +Z forward, +Y up,
//! right side on +X.

use nalgebra::{Point3, Vector3};
use whisker_core::whisker_keyframes::{KeyframeStore, POINTS_PER_WHISKER};
use whisker_env::Side;

const ROWS: [char; 5] = ['A', 'B', 'C', 'D', 'E'];
const COLUMNS: usize = 6;

/// Sweep limits in degrees, measured from lateral toward forward.
const RETRACTED_DEG: f64 = -30.0;
const PROTRACTED_DEG: f64 = 50.0;

/// Whisker names in table order: all right whiskers, then all left ones.
pub fn synthetic_names() -> Vec<String> {
    let mut names = Vec::with_capacity(2 * ROWS.len() * COLUMNS);
    for prefix in ['R', 'L'] {
        for row in ROWS {
            for col in 0..COLUMNS {
                names.push(format!("{}{}{}", prefix, row, col));
            }
        }
    }
    names
}

/// Head-space shape of one whisker at sweep angle `angle_deg`.
pub fn whisker_shape(side: Side, row: usize, col: usize, angle_deg: f64) -> Vec<Point3<f64>> {
    let lateral = match side {
        Side::Right => 1.0,
        Side::Left => -1.0,
    };
    let base = Point3::new(lateral * 2.0, (2.0 - row as f64) * 1.5, 2.0 + col as f64);
    let length = 30.0 - 3.0 * col as f64;
    let angle = angle_deg.to_radians();
    let dir = Vector3::new(lateral * angle.cos(), 0.0, angle.sin());
    let droop = 0.15 * length;

    (0..POINTS_PER_WHISKER)
        .map(|i| {
            let u = i as f64 / (POINTS_PER_WHISKER - 1) as f64;
            base + dir * (length * u) - Vector3::y() * (droop * u * u)
        })
        .collect()
}

/// Builds a complete store with `frame_count` frames.
pub fn synthetic_store(frame_count: usize) -> KeyframeStore {
    let mut store = KeyframeStore::new(frame_count, synthetic_names());
    let span = frame_count.saturating_sub(1).max(1) as f64;

    for side in [Side::Right, Side::Left] {
        let table = store.table_mut(side);
        for row in 0..ROWS.len() {
            for col in 0..COLUMNS {
                let key = row * COLUMNS + col;
                for frame in 0..frame_count {
                    let angle = RETRACTED_DEG + (PROTRACTED_DEG - RETRACTED_DEG) * frame as f64 / span;
                    table.set_frame(key, frame, &whisker_shape(side, row, col, angle));
                }
            }
        }
    }

    store
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisker_core::whisker_curve::polyline_length;
    use whisker_core::whisker_keyframes::LEFT_INDEX_OFFSET;

    #[test]
    fn test_names_follow_offset_convention() {
        let names = synthetic_names();
        assert_eq!(names.len(), 60);
        assert_eq!(names[0], "RA0");
        assert_eq!(names[29], "RE5");
        assert_eq!(names[LEFT_INDEX_OFFSET], "LA0");
    }

    #[test]
    fn test_store_has_every_whisker() {
        let store = synthetic_store(11);
        let ids = store.whisker_ids(LEFT_INDEX_OFFSET);
        assert_eq!(ids.len(), 60);
        assert!(ids.iter().all(|id| id.side == Side::from_name(&id.name)));

        let shape = store.frame(Side::Left, 0, 10);
        assert!(shape[99].x < 0.0);
        assert!((polyline_length(shape) - 30.0).abs() < 1.0);
    }

    #[test]
    fn test_base_is_nearer_the_head() {
        let shape = whisker_shape(Side::Right, 2, 3, 10.0);
        assert!(shape[0].coords.norm() < shape[99].coords.norm());
    }
}
