//! Configuration surface of the simulator.
//!
//! Every struct deserializes with `#[serde(default)]`, so a config file only
//! needs to name the values it changes. Defaults reproduce the reference
//! classroom setup: a 3D-printed PLA wheel on a 0.5 m pendulum, a small
//! geared DC motor, LQR stabilization engaging within 25 degrees of upright.

use crate::error::{require_finite, require_non_negative, require_positive};
use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Which law holds the pendulum once it is inside the stabilization bound.
///
/// This is a static choice; the classifier never switches between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum StabilizerKind {
    #[default]
    Lqr,
    Pid,
}

/// Where the integrator takes its step size from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepTiming {
    /// Always integrate with `nominal_dt`.
    #[default]
    Fixed,
    /// Start at `nominal_dt`, then use `1 / fps` from the frontend's
    /// measured frame rate whenever one is reported.
    Measured,
}

/// Solid wheel printed from PLA with the motor mounted at its hub.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelGeometry {
    pub radius: f64,
    pub height: f64,
    /// kg/m^3; 100% infill PLA is about 1.25 g/cm^3.
    pub density: f64,
    pub motor_mass: f64,
}

impl Default for WheelGeometry {
    fn default() -> Self {
        Self {
            radius: 0.3,
            height: 0.01,
            density: 1250.0,
            motor_mass: 0.1,
        }
    }
}

impl WheelGeometry {
    /// Disc mass plus the motor carried with it.
    pub fn mass(&self) -> f64 {
        PI * self.radius * self.radius * self.height * self.density + self.motor_mass
    }
}

/// Physical parameters of the pendulum, wheel and DC motor (SI units).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantParams {
    pub gravity: f64,
    pub wheel_radius: f64,
    /// Wheel + motor mass, m2.
    pub wheel_mass: f64,
    /// Pendulum rod mass, m1.
    pub pendulum_mass: f64,
    /// Pivot to pendulum center of mass, L1.
    pub pendulum_length: f64,
    /// Pivot to wheel axis, L2.
    pub wheel_distance: f64,
    /// Pendulum inertia about the pivot, I1.
    pub pendulum_inertia: f64,
    /// Pivot damping, dp.
    pub pendulum_damping: f64,
    /// Rotor + wheel inertia seen by the motor, J.
    pub motor_inertia: f64,
    /// Transmission ratio, Ng.
    pub gear_ratio: f64,
    /// Back-EMF constant ke (V s/rad).
    pub back_emf_constant: f64,
    /// Torque constant kt (N m/A); `ke * Ng` for the reference motor.
    pub torque_constant: f64,
    /// Armature resistance R (ohm).
    pub resistance: f64,
    /// Armature inductance L (H).
    pub inductance: f64,
    /// Viscous motor damping B (N m s/rad).
    pub motor_damping: f64,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self::from_geometry(&WheelGeometry::default())
    }
}

impl PlantParams {
    /// Reference parameters with the wheel mass derived from `geometry`.
    ///
    /// The pendulum body is taken to weigh as much as the wheel assembly and
    /// its inertia is modelled as a point mass at `pendulum_length`.
    pub fn from_geometry(geometry: &WheelGeometry) -> Self {
        let wheel_mass = geometry.mass();
        let pendulum_length = 0.5;
        let back_emf_constant = 3.69e-2;
        let gear_ratio = 0.83;
        Self {
            gravity: 9.81,
            wheel_radius: geometry.radius,
            wheel_mass,
            pendulum_mass: wheel_mass,
            pendulum_length,
            wheel_distance: pendulum_length,
            pendulum_inertia: wheel_mass * pendulum_length * pendulum_length,
            pendulum_damping: 0.01,
            motor_inertia: 0.0027,
            gear_ratio,
            back_emf_constant,
            torque_constant: back_emf_constant * gear_ratio,
            resistance: 2.85,
            inductance: 3.73e-4,
            motor_damping: 3.85e-3,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        require_positive("gravity", self.gravity)?;
        require_positive("wheel_radius", self.wheel_radius)?;
        require_positive("wheel_mass", self.wheel_mass)?;
        require_positive("pendulum_mass", self.pendulum_mass)?;
        require_positive("pendulum_length", self.pendulum_length)?;
        require_positive("wheel_distance", self.wheel_distance)?;
        require_non_negative("pendulum_inertia", self.pendulum_inertia)?;
        require_non_negative("pendulum_damping", self.pendulum_damping)?;
        require_positive("motor_inertia", self.motor_inertia)?;
        require_positive("gear_ratio", self.gear_ratio)?;
        require_positive("back_emf_constant", self.back_emf_constant)?;
        require_positive("torque_constant", self.torque_constant)?;
        require_positive("resistance", self.resistance)?;
        require_non_negative("inductance", self.inductance)?;
        require_non_negative("motor_damping", self.motor_damping)?;
        Ok(())
    }
}

/// LQR cost weights for the state `[angle, velocity, wheel angle, wheel velocity]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LqrWeights {
    pub q: [[f64; 4]; 4],
    pub r: f64,
}

impl Default for LqrWeights {
    fn default() -> Self {
        Self {
            q: [
                [342.0, 0.0, 0.0, 0.0],
                [0.0, 541.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
            r: 100.0,
        }
    }
}

/// Symmetric actuator saturation, applied only when `enabled`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VoltageLimit {
    pub enabled: bool,
    pub max_volts: f64,
}

impl Default for VoltageLimit {
    fn default() -> Self {
        Self {
            enabled: true,
            max_volts: 24.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub stabilizer: StabilizerKind,
    /// Half-width of the band around upright where stabilization engages.
    pub stabilize_bound_deg: f64,
    /// P gain of the reduced PID law.
    pub proportional_gain: f64,
    pub lqr: LqrWeights,
    /// Explicit gain row; when set, the Riccati synthesis is skipped.
    pub lqr_gain: Option<[f64; 4]>,
    /// Magnitude of the bang-bang swing-up voltage.
    pub swing_voltage: f64,
    /// Magnitude of the brake voltage.
    pub brake_voltage: f64,
    /// Braking ends once |E| drops below this (J).
    pub brake_energy_threshold: f64,
    pub voltage_limit: VoltageLimit,
    /// Angle error under which the stabilizer counts as settled.
    pub settle_band_deg: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            stabilizer: StabilizerKind::Lqr,
            stabilize_bound_deg: 25.0,
            proportional_gain: 2143.0,
            lqr: LqrWeights::default(),
            lqr_gain: None,
            swing_voltage: 12.0,
            brake_voltage: 12.0,
            brake_energy_threshold: 0.05,
            voltage_limit: VoltageLimit::default(),
            settle_band_deg: 0.1,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.stabilize_bound_deg > 0.0 && self.stabilize_bound_deg < 180.0) {
            return Err(ConfigError::OutOfRange {
                name: "stabilize_bound_deg",
                range: "(0, 180)",
                value: self.stabilize_bound_deg,
            });
        }
        require_finite("proportional_gain", self.proportional_gain)?;
        for (i, row) in self.lqr.q.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                require_finite("lqr.q", value)?;
                if i == j {
                    require_non_negative("lqr.q diagonal", value)?;
                }
            }
        }
        require_positive("lqr.r", self.lqr.r)?;
        if let Some(gain) = self.lqr_gain {
            for value in gain {
                require_finite("lqr_gain", value)?;
            }
        }
        require_positive("swing_voltage", self.swing_voltage)?;
        require_positive("brake_voltage", self.brake_voltage)?;
        require_non_negative("brake_energy_threshold", self.brake_energy_threshold)?;
        require_positive("voltage_limit.max_volts", self.voltage_limit.max_volts)?;
        require_non_negative("settle_band_deg", self.settle_band_deg)?;
        Ok(())
    }

    pub fn stabilize_bound(&self) -> f64 {
        self.stabilize_bound_deg.to_radians()
    }
}

/// State the session starts from and returns to on reset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialConditions {
    /// Pendulum angle in degrees; 0 is upright, 180 hanging.
    pub angle_deg: f64,
    pub velocity: f64,
    pub wheel_angle: f64,
    pub wheel_velocity: f64,
}

impl Default for InitialConditions {
    fn default() -> Self {
        Self {
            angle_deg: 180.0,
            velocity: 0.0,
            wheel_angle: 0.0,
            wheel_velocity: 0.0,
        }
    }
}

impl InitialConditions {
    pub fn validate(&self) -> ConfigResult<()> {
        require_finite("initial.angle_deg", self.angle_deg)?;
        require_finite("initial.velocity", self.velocity)?;
        require_finite("initial.wheel_angle", self.wheel_angle)?;
        require_finite("initial.wheel_velocity", self.wheel_velocity)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Step size used when timing is fixed, and before the first measurement.
    pub nominal_dt: f64,
    pub timing: StepTiming,
    /// Number of samples kept per history channel; 0 disables recording.
    pub history_capacity: usize,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            nominal_dt: 1.0 / 100.0,
            timing: StepTiming::Fixed,
            history_capacity: 10_000,
        }
    }
}

/// Everything needed to build a [`crate::simulation::Simulation`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub plant: PlantParams,
    pub controller: ControllerConfig,
    pub initial: InitialConditions,
    pub step: StepConfig,
}

impl SimulationConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.plant.validate()?;
        self.controller.validate()?;
        self.initial.validate()?;
        require_positive("step.nominal_dt", self.step.nominal_dt)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_wheel_mass_matches_disc_plus_motor() {
        let params = PlantParams::default();
        let disc = PI * 0.09 * 0.01 * 1250.0;
        assert!((params.wheel_mass - (disc + 0.1)).abs() < 1e-12);
        assert_eq!(params.pendulum_mass, params.wheel_mass);
        assert!((params.torque_constant - 3.69e-2 * 0.83).abs() < 1e-15);
    }

    #[test]
    fn default_config_is_valid() {
        SimulationConfig::default()
            .validate()
            .expect("reference configuration should validate");
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let json = r#"{
            "controller": { "stabilizer": "PID", "stabilize_bound_deg": 30.0 },
            "step": { "timing": "measured" }
        }"#;
        let config: SimulationConfig = serde_json::from_str(json).expect("config should parse");
        assert_eq!(config.controller.stabilizer, StabilizerKind::Pid);
        assert_eq!(config.controller.stabilize_bound_deg, 30.0);
        assert_eq!(config.controller.proportional_gain, 2143.0);
        assert!(config.controller.voltage_limit.enabled);
        assert_eq!(config.step.timing, StepTiming::Measured);
        assert_eq!(config.step.nominal_dt, 0.01);
        assert_eq!(config.initial.angle_deg, 180.0);
    }

    #[test]
    fn rejects_out_of_range_bound() {
        let mut config = SimulationConfig::default();
        config.controller.stabilize_bound_deg = 190.0;
        let err = config.validate().expect_err("bound above 180 should fail");
        assert!(err.to_string().contains("stabilize_bound_deg"));
    }

    #[test]
    fn rejects_non_positive_step() {
        let mut config = SimulationConfig::default();
        config.step.nominal_dt = 0.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive {
                name: "step.nominal_dt",
                value: 0.0
            })
        );
    }

    #[test]
    fn rejects_negative_resistance() {
        let mut config = SimulationConfig::default();
        config.plant.resistance = -1.0;
        let err = config.validate().expect_err("negative resistance should fail");
        assert!(err.to_string().contains("resistance must be positive"));
    }
}
