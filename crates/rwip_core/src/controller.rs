//! Hybrid controller: a four-mode classifier plus one actuation law per mode.
//!
//! Classification runs in priority order every step:
//! 1. keep braking while |E| is at or above the brake threshold,
//! 2. stabilize (LQR or P) inside the bound around upright,
//! 3. brake right after falling out of the bound from a settled state,
//! 4. otherwise swing up with bang-bang.

use crate::config::{ControllerConfig, PlantParams, StabilizerKind};
use crate::lqr::LqrDesign;
use crate::plant::PendulumState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerMode {
    BangBang,
    Lqr,
    Pid,
    Brake,
}

impl ControllerMode {
    pub fn label(self) -> &'static str {
        match self {
            ControllerMode::BangBang => "Bang-bang",
            ControllerMode::Lqr => "LQR",
            ControllerMode::Pid => "PID",
            ControllerMode::Brake => "brake",
        }
    }

    pub fn is_stabilizing(self) -> bool {
        matches!(self, ControllerMode::Lqr | ControllerMode::Pid)
    }
}

impl From<StabilizerKind> for ControllerMode {
    fn from(kind: StabilizerKind) -> Self {
        match kind {
            StabilizerKind::Lqr => ControllerMode::Lqr,
            StabilizerKind::Pid => ControllerMode::Pid,
        }
    }
}

impl fmt::Display for ControllerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the classifier remembers between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModeMemory {
    /// Set while inside the stabilization bound.
    pub settled: bool,
    /// Set from the moment the pendulum falls out of the bound until the
    /// brake has drained its energy.
    pub braking: bool,
}

/// Voltage decided for one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Actuation {
    pub mode: ControllerMode,
    /// Output of the mode's law before saturation.
    pub requested: f64,
    /// Voltage sent to the motor.
    pub applied: f64,
}

/// True when `angle` lies within `bound` of some multiple of 2π.
pub fn within_bound(angle: f64, bound: f64) -> bool {
    let wrapped = angle.abs() % TAU;
    wrapped <= bound || wrapped >= TAU - bound
}

/// Upright angle (a multiple of 2π) nearest to `angle`.
///
/// Exactly halfway between two candidates (hanging straight down) the
/// previous setpoint is kept.
pub fn nearest_upright(angle: f64, previous: f64) -> f64 {
    let offset = (angle - PI) / TAU;
    if offset < 0.0 {
        (offset.floor() + 1.0) * TAU
    } else if offset > 0.0 {
        offset.ceil() * TAU
    } else {
        previous
    }
}

/// Immutable controller built once from the configuration.
#[derive(Debug, Clone)]
pub struct ControlLaw {
    config: ControllerConfig,
    stabilizer: ControllerMode,
    bound: f64,
    required_energy: f64,
    design: Option<LqrDesign>,
}

impl ControlLaw {
    /// Builds the law, synthesizing the LQR gain when the stabilizer needs
    /// it and no explicit gain was configured.
    pub fn new(config: &ControllerConfig, params: &PlantParams) -> Result<Self> {
        let design = match (config.stabilizer, config.lqr_gain) {
            (_, Some(gain)) => Some(LqrDesign::from_gain(params, gain)),
            (StabilizerKind::Lqr, None) => Some(LqrDesign::synthesize(params, &config.lqr)?),
            (StabilizerKind::Pid, None) => None,
        };
        Ok(Self {
            config: *config,
            stabilizer: config.stabilizer.into(),
            bound: config.stabilize_bound(),
            required_energy: params.required_swing_energy(),
            design,
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn stabilizer(&self) -> ControllerMode {
        self.stabilizer
    }

    pub fn design(&self) -> Option<&LqrDesign> {
        self.design.as_ref()
    }

    pub fn required_energy(&self) -> f64 {
        self.required_energy
    }

    /// Picks the mode for this step and updates `memory`.
    pub fn classify(&self, memory: &mut ModeMemory, angle: f64, energy: f64) -> ControllerMode {
        if memory.braking {
            if energy.abs() >= self.config.brake_energy_threshold {
                return ControllerMode::Brake;
            }
            memory.braking = false;
        }

        if within_bound(angle, self.bound) {
            memory.settled = true;
            return self.stabilizer;
        }

        if memory.settled {
            memory.settled = false;
            memory.braking = true;
            return ControllerMode::Brake;
        }

        ControllerMode::BangBang
    }

    /// Unclamped output of `mode`'s law.
    pub fn law_voltage(
        &self,
        mode: ControllerMode,
        pendulum: &PendulumState,
        setpoint: f64,
        energy: f64,
    ) -> f64 {
        let error = setpoint - pendulum.angle;
        match mode {
            ControllerMode::Lqr => {
                let gain = self.design.as_ref().map_or([0.0; 4], |d| d.gain);
                error * gain[0] - pendulum.velocity * gain[1]
            }
            ControllerMode::Pid => -error * self.config.proportional_gain,
            ControllerMode::BangBang => {
                let swing = self.config.swing_voltage;
                let short_of_upright = energy < self.required_energy;
                match (pendulum.velocity > 0.0, short_of_upright) {
                    (false, true) | (true, false) => swing,
                    (true, true) | (false, false) => -swing,
                }
            }
            ControllerMode::Brake => {
                if pendulum.velocity < 0.0 {
                    -self.config.brake_voltage
                } else {
                    self.config.brake_voltage
                }
            }
        }
    }

    /// Saturates at the configured limit when the limit is enabled.
    pub fn clamp(&self, voltage: f64) -> f64 {
        let limit = self.config.voltage_limit;
        if limit.enabled {
            voltage.clamp(-limit.max_volts, limit.max_volts)
        } else {
            voltage
        }
    }

    /// Classifies, evaluates the law and saturates in one go.
    pub fn actuate(
        &self,
        memory: &mut ModeMemory,
        pendulum: &PendulumState,
        setpoint: f64,
        energy: f64,
    ) -> Actuation {
        let mode = self.classify(memory, pendulum.angle, energy);
        let requested = self.law_voltage(mode, pendulum, setpoint, energy);
        Actuation {
            mode,
            requested,
            applied: self.clamp(requested),
        }
    }
}
