//! Plant model: geared DC motor driving the reaction wheel, and the
//! pendulum it is mounted on.
//!
//! Angles are measured from upright, so `0` (mod 2π) is the inverted
//! equilibrium and `π` is hanging down. A positive motor torque spins the
//! wheel forward and pushes the pendulum backward.

use crate::config::PlantParams;
use crate::solvers::SemiImplicitEuler;
use crate::traits::{DynamicalSystem, Steppable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PendulumState {
    /// rad, 0 = upright.
    pub angle: f64,
    /// rad/s.
    pub velocity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelState {
    pub angle: f64,
    pub velocity: f64,
    /// Armature current of the last motor sub-step (A); the "previous
    /// current" for the next one.
    pub current: f64,
    /// Finite-difference di/dt feeding the inductance drop (A/s).
    pub current_rate: f64,
}

impl PlantParams {
    /// `(m1 L1 + m2 L2) g`: gravity torque per unit `sin(angle)`.
    pub fn gravity_torque_coefficient(&self) -> f64 {
        (self.pendulum_mass * self.pendulum_length + self.wheel_mass * self.wheel_distance)
            * self.gravity
    }

    /// `m1 L1^2 + m2 L2^2 + I1`: inertia of the assembly about the pivot, as
    /// used by the linearized model behind the LQR gain.
    pub fn pivot_inertia(&self) -> f64 {
        self.pendulum_mass * self.pendulum_length * self.pendulum_length
            + self.wheel_mass * self.wheel_distance * self.wheel_distance
            + self.pendulum_inertia
    }

    /// `m1 L1^2 + m2 L2 + I1`: the divisor of the nonlinear pendulum
    /// equation. The wheel term is linear in `L2`, so this differs from
    /// [`PlantParams::pivot_inertia`] whenever `L2 != 1`; the reference
    /// rig behaves this way and the gain is designed against the other one.
    pub fn swing_inertia(&self) -> f64 {
        self.pendulum_mass * self.pendulum_length * self.pendulum_length
            + self.wheel_mass * self.wheel_distance
            + self.pendulum_inertia
    }

    /// Potential energy of the assembly resting upright; the swing-up target.
    pub fn required_swing_energy(&self) -> f64 {
        (self.pendulum_mass + self.wheel_mass) * self.gravity * self.wheel_distance
    }

    /// Kinetic plus potential energy of the pendulum.
    ///
    /// Potential energy is zero with the pendulum horizontal, positive above.
    pub fn mechanical_energy(&self, pendulum: &PendulumState) -> f64 {
        let w = pendulum.velocity;
        let kinetic = 0.5 * self.pendulum_mass * (w * self.pendulum_length).powi(2)
            + 0.5 * self.wheel_mass * (w * self.wheel_distance).powi(2)
            + 0.5 * self.motor_inertia * w * w
            + 0.5 * self.pendulum_inertia * w * w;
        kinetic + self.required_swing_energy() * pendulum.angle.cos()
    }

    /// Wheel axis position relative to the pivot, y pointing up.
    pub fn forward_kinematics(&self, angle: f64) -> (f64, f64) {
        (
            self.wheel_distance * angle.sin(),
            self.wheel_distance * angle.cos(),
        )
    }

    /// Angular acceleration of the pendulum under the given torques.
    pub fn pendulum_acceleration(
        &self,
        pendulum: &PendulumState,
        reaction_torque: f64,
        disturbance: f64,
    ) -> f64 {
        (self.gravity_torque_coefficient() * pendulum.angle.sin() - reaction_torque + disturbance
            - self.pendulum_damping * pendulum.velocity)
            / self.swing_inertia()
    }
}

/// Pendulum vector field with the motor and disturbance torques frozen for
/// one step. State layout is `[angle, velocity]`.
pub struct PendulumDynamics<'a> {
    pub params: &'a PlantParams,
    pub reaction_torque: f64,
    pub disturbance: f64,
}

impl DynamicalSystem<f64> for PendulumDynamics<'_> {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
        let pendulum = PendulumState {
            angle: x[0],
            velocity: x[1],
        };
        out[0] = x[1];
        out[1] = self
            .params
            .pendulum_acceleration(&pendulum, self.reaction_torque, self.disturbance);
    }
}

/// Integrates motor and pendulum one step at a time.
pub struct Plant {
    params: PlantParams,
    integrator: SemiImplicitEuler<f64>,
}

impl Plant {
    pub fn new(params: PlantParams) -> Self {
        Self {
            params,
            integrator: SemiImplicitEuler::new(2),
        }
    }

    pub fn params(&self) -> &PlantParams {
        &self.params
    }

    /// Advances the motor and wheel under terminal `voltage`; returns the
    /// motor torque produced during the step.
    ///
    /// The armature current is solved algebraically, with the inductance
    /// drop taken from the previous step's current rate.
    pub fn motor_step(&self, wheel: &mut WheelState, voltage: f64, dt: f64) -> f64 {
        let p = &self.params;
        let current = (voltage
            - wheel.velocity * p.back_emf_constant
            - p.inductance * wheel.current_rate)
            / p.resistance;
        wheel.current_rate = (current - wheel.current) / dt;
        wheel.current = current;

        let torque = current * p.torque_constant;
        let acceleration = (torque - p.motor_damping * wheel.velocity) / p.motor_inertia;
        wheel.velocity += acceleration * dt;
        wheel.angle += wheel.velocity * dt;
        torque
    }

    /// Advances the pendulum with semi-implicit Euler.
    pub fn pendulum_step(
        &mut self,
        pendulum: &mut PendulumState,
        reaction_torque: f64,
        disturbance: f64,
        dt: f64,
    ) {
        let system = PendulumDynamics {
            params: &self.params,
            reaction_torque,
            disturbance,
        };
        let mut state = [pendulum.angle, pendulum.velocity];
        let mut t = 0.0;
        self.integrator.step(&system, &mut t, &mut state, dt);
        pendulum.angle = state[0];
        pendulum.velocity = state[1];
    }

    /// Motor sub-step followed by the pendulum sub-step; returns the motor torque.
    pub fn step(
        &mut self,
        pendulum: &mut PendulumState,
        wheel: &mut WheelState,
        voltage: f64,
        disturbance: f64,
        dt: f64,
    ) -> f64 {
        let torque = self.motor_step(wheel, voltage, dt);
        self.pendulum_step(pendulum, torque, disturbance, dt);
        torque
    }
}

#[cfg(test)]
mod tests {
    use super::{Plant, PendulumState, WheelState};
    use crate::config::PlantParams;
    use std::f64::consts::PI;

    #[test]
    fn upright_equilibrium_is_an_exact_fixed_point() {
        let mut plant = Plant::new(PlantParams::default());
        let mut pendulum = PendulumState::default();
        let mut wheel = WheelState::default();
        for _ in 0..1_000 {
            let torque = plant.step(&mut pendulum, &mut wheel, 0.0, 0.0, 0.01);
            assert_eq!(torque, 0.0);
        }
        assert_eq!(pendulum, PendulumState::default());
        assert_eq!(wheel, WheelState::default());
    }

    #[test]
    fn hanging_pendulum_stays_put_without_input() {
        let mut plant = Plant::new(PlantParams::default());
        let mut pendulum = PendulumState {
            angle: PI,
            velocity: 0.0,
        };
        let mut wheel = WheelState::default();
        for _ in 0..1_000 {
            plant.step(&mut pendulum, &mut wheel, 0.0, 0.0, 0.01);
        }
        assert!((pendulum.angle - PI).abs() < 1e-9);
        assert!(pendulum.velocity.abs() < 1e-9);
    }

    #[test]
    fn energy_spans_hanging_to_upright() {
        let params = PlantParams::default();
        let required = params.required_swing_energy();
        let upright = params.mechanical_energy(&PendulumState::default());
        let hanging = params.mechanical_energy(&PendulumState {
            angle: PI,
            velocity: 0.0,
        });
        assert!((upright - required).abs() < 1e-12);
        assert!((hanging + required).abs() < 1e-9);

        let moving = params.mechanical_energy(&PendulumState {
            angle: PI,
            velocity: 1.0,
        });
        assert!(moving > hanging);
    }

    #[test]
    fn positive_voltage_spins_wheel_forward_and_pushes_pendulum_back() {
        let mut plant = Plant::new(PlantParams::default());
        let mut pendulum = PendulumState::default();
        let mut wheel = WheelState::default();
        let torque = plant.step(&mut pendulum, &mut wheel, 12.0, 0.0, 0.01);
        assert!(torque > 0.0);
        assert!(wheel.velocity > 0.0);
        assert!(pendulum.velocity < 0.0);
    }

    #[test]
    fn first_motor_step_draws_stall_current() {
        let params = PlantParams::default();
        let plant = Plant::new(params);
        let mut wheel = WheelState::default();
        let torque = plant.motor_step(&mut wheel, 12.0, 0.01);
        let stall = 12.0 / params.resistance;
        assert!((wheel.current - stall).abs() < 1e-12);
        assert!((wheel.current_rate - stall / 0.01).abs() < 1e-9);
        assert!((torque - stall * params.torque_constant).abs() < 1e-12);
    }

    #[test]
    fn disturbance_pushes_pendulum_in_its_direction() {
        let mut plant = Plant::new(PlantParams::default());
        let mut pendulum = PendulumState::default();
        plant.pendulum_step(&mut pendulum, 0.0, 5.0, 0.01);
        assert!(pendulum.velocity > 0.0);
        assert!(pendulum.angle > 0.0);
    }

    #[test]
    fn nonlinear_plant_divides_by_the_swing_inertia() {
        let params = PlantParams::default();
        assert!((params.swing_inertia() - 3.634_291_735).abs() < 1e-6);
        assert!((params.pivot_inertia() - 2.725_718_801).abs() < 1e-6);

        let tilted = PendulumState {
            angle: 0.3,
            velocity: 0.0,
        };
        let acceleration = params.pendulum_acceleration(&tilted, 0.0, 0.0);
        let expected = params.gravity_torque_coefficient() * 0.3_f64.sin() / params.swing_inertia();
        assert!((acceleration - expected).abs() < 1e-12);
        assert!((acceleration - 2.899).abs() < 1e-3);
    }

    #[test]
    fn forward_kinematics_points_up_at_zero() {
        let params = PlantParams::default();
        let (x, y) = params.forward_kinematics(0.0);
        assert!(x.abs() < 1e-15);
        assert!((y - params.wheel_distance).abs() < 1e-15);
    }
}
