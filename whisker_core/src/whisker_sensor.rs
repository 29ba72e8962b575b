//! Per-whisker tactile reading.
//!
//! A reading lives for exactly one tick: cleared at the start of the tick,
//! written 0..N times by contact events, sampled once, cleared again.
//! Repeated contacts within a tick reconcile by keeping the strongest one,
//! so the result does not depend on dispatch order.

use serde::{Deserialize, Serialize};

/// Current tactile state of one whisker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Whether any contact was registered this tick
    pub has_contact: bool,

    /// Arc-length position of the contact: 1 = base, 0 = tip
    pub s: f64,

    /// Contact strength in [0, 1]; proximal contacts are stronger
    pub intensity: f64,

    /// Whisking angle of the current animation frame
    pub theta: f64,

    /// Obstacle that produced the winning contact
    pub contact_object: Option<String>,

    /// Number of accepted contact events this tick
    pub contact_events: u32,
}

impl SensorReading {
    /// Registers one contact. The stronger contact wins; ties keep the
    /// earlier one. Returns true if this contact became the reading.
    pub fn register(&mut self, s: f64, intensity: f64, object: &str) -> bool {
        let s = s.clamp(0.0, 1.0);
        let intensity = intensity.clamp(0.0, 1.0);
        self.contact_events = self.contact_events.saturating_add(1);

        if self.has_contact && intensity <= self.intensity {
            return false;
        }

        self.has_contact = true;
        self.s = s;
        self.intensity = intensity;
        self.contact_object = Some(object.to_string());
        true
    }

    /// Clears contact state. The whisking angle is animation state and is kept.
    pub fn reset(&mut self) {
        self.has_contact = false;
        self.s = 0.0;
        self.intensity = 0.0;
        self.contact_object = None;
        self.contact_events = 0;
    }

    /// Contact position, or 0 when nothing was touched.
    pub fn s_or_zero(&self) -> f64 {
        if self.has_contact {
            self.s
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_intensity_wins_regardless_of_order() {
        let mut a = SensorReading::default();
        a.register(0.3, 0.3, "low");
        a.register(0.7, 0.7, "high");

        let mut b = SensorReading::default();
        b.register(0.7, 0.7, "high");
        b.register(0.3, 0.3, "low");

        assert_eq!(a.intensity, 0.7);
        assert_eq!(a, b);
        assert_eq!(a.contact_object.as_deref(), Some("high"));
        assert_eq!(a.contact_events, 2);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut r = SensorReading::default();
        r.theta = 4.0;
        r.register(0.5, 0.5, "pole");

        r.reset();
        assert!(!r.has_contact);
        assert_eq!(r.s, 0.0);

        r.reset();
        assert!(!r.has_contact);
        assert_eq!(r.s, 0.0);
        assert_eq!(r.theta, 4.0);
    }

    #[test]
    fn test_register_clamps() {
        let mut r = SensorReading::default();
        r.register(1.5, -0.2, "wall");
        assert_eq!(r.s, 1.0);
        assert_eq!(r.intensity, 0.0);
        assert!(r.has_contact);
        assert_eq!(r.s_or_zero(), 1.0);
    }
}
