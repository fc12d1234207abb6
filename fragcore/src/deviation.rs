use std::fmt::Display;

use serde::{
    Deserialize,
    Serialize,
};

/// Allowed mass deviation as the maximum of a relative (ppm) and an absolute
/// (Da) term.
///
/// Relative accuracy dominates for heavy ions while the absolute floor keeps
/// very light fragments from being matched too strictly. The acceptance
/// window is closed: a mass exactly at the boundary is inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassDeviation {
    pub ppm: f64,
    pub abs: f64,
}

impl MassDeviation {
    pub fn new(ppm: f64, abs: f64) -> Self {
        Self { ppm, abs }
    }

    /// Deviation with the absolute term implied by the relative term at
    /// m/z 100.
    pub fn from_ppm(ppm: f64) -> Self {
        Self {
            ppm,
            abs: ppm * 1e-6 * 100.0,
        }
    }

    /// Half-width of the acceptance window around `mass`.
    pub fn tolerance(&self, mass: f64) -> f64 {
        f64::max(self.abs, self.ppm * 1e-6 * mass)
    }

    /// Closed-interval membership: `|measured - reference| <= tolerance`.
    pub fn is_within(&self, measured: f64, reference: f64) -> bool {
        (measured - reference).abs() <= self.tolerance(reference)
    }

    /// The window `[mass - tolerance, mass + tolerance]`.
    pub fn window(&self, mass: f64) -> (f64, f64) {
        let tol = self.tolerance(mass);
        (mass - tol, mass + tol)
    }

    /// Both terms scaled by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            ppm: self.ppm * factor,
            abs: self.abs * factor,
        }
    }
}

impl Display for MassDeviation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ppm ({} m/z)", self.ppm, self.abs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_is_max_of_both_terms() {
        let dev = MassDeviation::new(10.0, 5e-4);
        // 10 ppm of 500 is 5e-3, well above the absolute floor.
        assert!((dev.tolerance(500.0) - 5e-3).abs() < 1e-12);
        // at m/z 20 the absolute floor wins.
        assert!((dev.tolerance(20.0) - 5e-4).abs() < 1e-12);
    }

    #[test]
    fn serde_round_trip() {
        let dev = MassDeviation::new(5.0, 2e-4);
        let json = serde_json::to_string(&dev).unwrap();
        let back: MassDeviation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dev);
    }

    #[test]
    fn window_boundary_is_inside() {
        let dev = MassDeviation::new(10.0, 5e-4);
        let tol = dev.tolerance(200.0);
        assert!(dev.is_within(200.0 + tol, 200.0));
        assert!(dev.is_within(200.0 - tol, 200.0));
        assert!(!dev.is_within(200.0 + tol * 1.01, 200.0));
    }
}
