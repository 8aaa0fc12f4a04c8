//! Step-driven simulation session.
//!
//! A [`Simulation`] owns the immutable [`ControlLaw`], the [`Plant`] and an
//! explicit [`SimulationState`]. Each call to [`Simulation::step`] reads one
//! [`StepInput`], classifies and actuates, integrates the plant, updates the
//! settle accounting and history, and returns a [`Telemetry`] record.

use crate::accounting::SettleAccounting;
use crate::config::{SimulationConfig, StepTiming};
use crate::controller::{nearest_upright, ControlLaw, ControllerMode, ModeMemory};
use crate::lqr::LqrDesign;
use crate::plant::{PendulumState, Plant, WheelState};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f64::consts::PI;
use tracing::{debug, info, warn};

/// What a frontend hands the session for one step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    /// Raw disturbance text as typed by the user.
    pub disturbance: Option<String>,
    pub reset: bool,
    /// Measured frames per second, used by [`StepTiming::Measured`].
    pub frame_rate: Option<f64>,
}

impl StepInput {
    pub fn disturb(text: impl Into<String>) -> Self {
        Self {
            disturbance: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn reset() -> Self {
        Self {
            reset: true,
            ..Self::default()
        }
    }
}

/// Torque injected for one step from the disturbance text.
///
/// A finite number `v` yields `-v`. Anything else yields zero; blank input
/// silently, unparseable or non-finite input with a warning.
pub fn parse_disturbance(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => -value,
        _ => {
            warn!(input = trimmed, "ignoring malformed disturbance");
            0.0
        }
    }
}

/// Per-step record published to frontends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Elapsed simulated time at the end of the step (s).
    pub time: f64,
    /// Step size that was integrated.
    pub dt: f64,
    pub mode: ControllerMode,
    pub angle: f64,
    pub velocity: f64,
    pub setpoint: f64,
    /// Mechanical energy after the step.
    pub energy: f64,
    pub wheel_angle: f64,
    pub wheel_velocity: f64,
    pub motor_rpm: f64,
    pub motor_torque: f64,
    pub current: f64,
    /// Voltage after the clamp.
    pub voltage: f64,
    pub requested_voltage: f64,
    pub disturbance: f64,
    pub settle_time: f64,
    pub settle_energy: f64,
    pub settled: bool,
    pub bob_x: f64,
    pub bob_y: f64,
}

/// The plotted channels of one step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistorySample {
    pub time: f64,
    pub mode: ControllerMode,
    pub angle: f64,
    pub setpoint: f64,
    pub velocity: f64,
    pub motor_torque: f64,
    pub wheel_velocity: f64,
    pub voltage: f64,
    pub energy: f64,
}

impl From<&Telemetry> for HistorySample {
    fn from(t: &Telemetry) -> Self {
        Self {
            time: t.time,
            mode: t.mode,
            angle: t.angle,
            setpoint: t.setpoint,
            velocity: t.velocity,
            motor_torque: t.motor_torque,
            wheel_velocity: t.wheel_velocity,
            voltage: t.voltage,
            energy: t.energy,
        }
    }
}

/// Ring buffer of the most recent samples for plotting.
#[derive(Debug, Clone, Default)]
pub struct History {
    capacity: usize,
    samples: VecDeque<HistorySample>,
}

impl History {
    /// A capacity of zero disables recording.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity.min(4096)),
        }
    }

    pub fn push(&mut self, sample: HistorySample) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistorySample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<HistorySample> {
        self.samples.iter().copied().collect()
    }
}

/// Everything that changes from step to step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub pendulum: PendulumState,
    pub wheel: WheelState,
    pub memory: ModeMemory,
    pub accounting: SettleAccounting,
    /// Upright angle (multiple of 2π) the stabilizer aims for.
    pub setpoint: f64,
    pub time: f64,
    /// Step size for the next step.
    pub dt: f64,
    pub last_mode: Option<ControllerMode>,
}

impl SimulationState {
    pub fn initial(config: &SimulationConfig) -> Self {
        let initial = &config.initial;
        let angle = initial.angle_deg.to_radians();
        Self {
            pendulum: PendulumState {
                angle,
                velocity: initial.velocity,
            },
            wheel: WheelState {
                angle: initial.wheel_angle,
                velocity: initial.wheel_velocity,
                ..WheelState::default()
            },
            memory: ModeMemory::default(),
            accounting: SettleAccounting::default(),
            setpoint: nearest_upright(angle, 0.0),
            time: 0.0,
            dt: config.step.nominal_dt,
            last_mode: None,
        }
    }
}

/// Supplies one [`StepInput`] per step; `None` ends the session.
pub trait InputSource {
    fn next_input(&mut self) -> Option<StepInput>;
}

impl<I: Iterator<Item = StepInput>> InputSource for I {
    fn next_input(&mut self) -> Option<StepInput> {
        self.next()
    }
}

/// Receives every [`Telemetry`] record the session produces.
pub trait TelemetrySink {
    fn publish(&mut self, telemetry: &Telemetry);
}

impl TelemetrySink for Vec<Telemetry> {
    fn publish(&mut self, telemetry: &Telemetry) {
        self.push(telemetry.clone());
    }
}

/// Fixed-length input script with disturbances and resets at given steps.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    steps: usize,
    cursor: usize,
    disturbances: Vec<(usize, String)>,
    resets: Vec<usize>,
    frame_rate: Option<f64>,
}

impl ScriptedInput {
    pub fn new(steps: usize) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    /// Schedules disturbance text for `step`, replacing any text already
    /// scheduled there.
    pub fn disturb_at(mut self, step: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        match self.disturbances.iter_mut().find(|(at, _)| *at == step) {
            Some(entry) => entry.1 = text,
            None => self.disturbances.push((step, text)),
        }
        self
    }

    pub fn reset_at(mut self, step: usize) -> Self {
        self.resets.push(step);
        self
    }

    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.frame_rate = Some(fps);
        self
    }
}

impl Iterator for ScriptedInput {
    type Item = StepInput;

    fn next(&mut self) -> Option<StepInput> {
        if self.cursor >= self.steps {
            return None;
        }
        let step = self.cursor;
        self.cursor += 1;
        let disturbance = self
            .disturbances
            .iter()
            .find(|(at, _)| *at == step)
            .map(|(_, text)| text.clone());
        Some(StepInput {
            disturbance,
            reset: self.resets.contains(&step),
            frame_rate: self.frame_rate,
        })
    }
}

pub struct Simulation {
    config: SimulationConfig,
    law: ControlLaw,
    plant: Plant,
    state: SimulationState,
    history: History,
}

impl Simulation {
    /// Validates the configuration and designs the controller.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config
            .validate()
            .context("Invalid simulation configuration.")?;
        let law = ControlLaw::new(&config.controller, &config.plant)
            .context("Failed to build the control law.")?;
        info!(
            stabilizer = %law.stabilizer(),
            bound_deg = config.controller.stabilize_bound_deg,
            dt = config.step.nominal_dt,
            "simulation initialized"
        );
        Ok(Self {
            law,
            plant: Plant::new(config.plant),
            state: SimulationState::initial(&config),
            history: History::new(config.step.history_capacity),
            config,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn law(&self) -> &ControlLaw {
        &self.law
    }

    pub fn design(&self) -> Option<&LqrDesign> {
        self.law.design()
    }

    /// Returns to the initial conditions and clears history.
    pub fn reset(&mut self) {
        self.state = SimulationState::initial(&self.config);
        self.history.clear();
        info!(angle_deg = self.config.initial.angle_deg, "simulation reset");
    }

    pub fn step(&mut self, input: &StepInput) -> Telemetry {
        if input.reset {
            self.reset();
        }
        let disturbance = input
            .disturbance
            .as_deref()
            .map_or(0.0, parse_disturbance);
        let params = *self.plant.params();
        let state = &mut self.state;

        state.setpoint = nearest_upright(state.pendulum.angle, state.setpoint);
        let energy = params.mechanical_energy(&state.pendulum);
        let actuation = self
            .law
            .actuate(&mut state.memory, &state.pendulum, state.setpoint, energy);
        if state.last_mode != Some(actuation.mode) {
            debug!(
                from = ?state.last_mode,
                to = %actuation.mode,
                time = state.time,
                angle = state.pendulum.angle,
                energy,
                "mode transition"
            );
            state.last_mode = Some(actuation.mode);
        }

        let dt = state.dt;
        let torque = self.plant.step(
            &mut state.pendulum,
            &mut state.wheel,
            actuation.applied,
            disturbance,
            dt,
        );
        state.time += dt;

        let error_deg = state.pendulum.angle.to_degrees() - state.setpoint.to_degrees();
        state.accounting.record(
            actuation.mode.is_stabilizing(),
            error_deg,
            self.config.controller.settle_band_deg,
            state.wheel.velocity,
            torque,
            dt,
        );

        let (bob_x, bob_y) = params.forward_kinematics(state.pendulum.angle);
        let telemetry = Telemetry {
            time: state.time,
            dt,
            mode: actuation.mode,
            angle: state.pendulum.angle,
            velocity: state.pendulum.velocity,
            setpoint: state.setpoint,
            energy: params.mechanical_energy(&state.pendulum),
            wheel_angle: state.wheel.angle,
            wheel_velocity: state.wheel.velocity,
            motor_rpm: state.wheel.velocity * 60.0 / (2.0 * PI),
            motor_torque: torque,
            current: state.wheel.current,
            voltage: actuation.applied,
            requested_voltage: actuation.requested,
            disturbance,
            settle_time: state.accounting.time,
            settle_energy: state.accounting.energy,
            settled: state.accounting.is_settled(),
            bob_x,
            bob_y,
        };
        self.history.push(HistorySample::from(&telemetry));

        if self.config.step.timing == StepTiming::Measured {
            if let Some(fps) = input.frame_rate {
                let dt = 1.0 / fps;
                if fps.is_finite() && fps > 0.0 && dt.is_finite() {
                    self.state.dt = dt;
                } else {
                    warn!(fps, "ignoring invalid frame rate");
                }
            }
        }
        telemetry
    }

    /// Steps until `input` runs dry; returns the number of steps taken.
    pub fn run<I, S>(&mut self, input: &mut I, sink: &mut S) -> usize
    where
        I: InputSource + ?Sized,
        S: TelemetrySink + ?Sized,
    {
        let mut steps = 0;
        while let Some(next) = input.next_input() {
            let telemetry = self.step(&next);
            sink.publish(&telemetry);
            steps += 1;
        }
        steps
    }
}
