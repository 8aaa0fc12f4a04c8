//! Settle-time and actuation-energy bookkeeping for the stabilizer.

use serde::{Deserialize, Serialize};

/// Time and energy the stabilizer spends pulling the pendulum into the
/// settle band around its setpoint.
///
/// Counters run while the stabilizer is active and the angle error is
/// outside the band, and hold their value on the first arrival inside it.
/// They restart from zero when the stabilizer hands over to another mode,
/// and whenever the pendulum comes back into the band after having left it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SettleAccounting {
    /// Seconds accumulated since the last restart.
    pub time: f64,
    /// Joules of `|wheel speed * motor torque|` since the last restart.
    pub energy: f64,
    in_band: bool,
    reached_band: bool,
}

impl SettleAccounting {
    /// Updates the counters after one step.
    ///
    /// `error_deg` is the setpoint error in degrees, `band_deg` the settle band.
    pub fn record(
        &mut self,
        stabilizing: bool,
        error_deg: f64,
        band_deg: f64,
        wheel_velocity: f64,
        motor_torque: f64,
        dt: f64,
    ) {
        if !stabilizing {
            *self = Self::default();
            return;
        }

        if error_deg.abs() < band_deg {
            if !self.in_band && self.reached_band {
                self.time = 0.0;
                self.energy = 0.0;
            }
            self.in_band = true;
            self.reached_band = true;
            return;
        }

        self.in_band = false;
        self.time += dt;
        self.energy += (wheel_velocity * motor_torque).abs() * dt;
    }

    /// True while the error is inside the settle band.
    pub fn is_settled(&self) -> bool {
        self.in_band
    }
}

#[cfg(test)]
mod tests {
    use super::SettleAccounting;

    #[test]
    fn accumulates_outside_band_and_freezes_inside() {
        let mut acc = SettleAccounting::default();
        for _ in 0..10 {
            acc.record(true, 2.0, 0.1, 3.0, -0.5, 0.01);
        }
        assert!((acc.time - 0.1).abs() < 1e-12);
        assert!((acc.energy - 0.15).abs() < 1e-12);
        assert!(!acc.is_settled());

        acc.record(true, 0.05, 0.1, 3.0, -0.5, 0.01);
        acc.record(true, -0.05, 0.1, 3.0, -0.5, 0.01);
        assert!(acc.is_settled());
        assert!((acc.time - 0.1).abs() < 1e-12);
        assert!((acc.energy - 0.15).abs() < 1e-12);
    }

    #[test]
    fn resets_when_mode_leaves_stabilizer() {
        let mut acc = SettleAccounting::default();
        acc.record(true, 2.0, 0.1, 1.0, 1.0, 0.01);
        acc.record(false, 2.0, 0.1, 1.0, 1.0, 0.01);
        assert_eq!(acc, SettleAccounting::default());
    }

    #[test]
    fn excursion_keeps_counting_until_the_band_is_re_entered() {
        let mut acc = SettleAccounting::default();
        for _ in 0..5 {
            acc.record(true, 2.0, 0.1, 1.0, 1.0, 0.01);
        }
        acc.record(true, 0.0, 0.1, 1.0, 1.0, 0.01);
        for _ in 0..3 {
            acc.record(true, -0.5, 0.1, 2.0, 1.0, 0.01);
        }
        assert!((acc.time - 0.08).abs() < 1e-12);
        assert!((acc.energy - 0.11).abs() < 1e-12);
        assert!(!acc.is_settled());

        acc.record(true, 0.02, 0.1, 2.0, 1.0, 0.01);
        assert_eq!(acc.time, 0.0);
        assert_eq!(acc.energy, 0.0);
        assert!(acc.is_settled());
    }
}
