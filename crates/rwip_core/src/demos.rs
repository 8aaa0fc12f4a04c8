//! Companion pendulums from the coursework: a damped pendulum released
//! from the inverted position, and the parametrically driven (Kapitza)
//! pendulum with its stroboscopic first-return map.
//!
//! Unlike [`crate::plant`], these measure the angle from the hanging
//! position: `0` is stable and `π` is inverted.

use crate::solvers::RK4;
use crate::traits::{DynamicalSystem, Scalar, Steppable};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// `θ'' = −(b/m)θ' − (g/L) sin θ`, state `[θ, θ']`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DampedPendulum {
    pub gravity: f64,
    pub length: f64,
    /// kg/s
    pub damping: f64,
    pub mass: f64,
}

impl Default for DampedPendulum {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            length: 1.0,
            damping: 0.5,
            mass: 1.0,
        }
    }
}

impl DampedPendulum {
    /// Kinetic plus potential energy, zero at rest hanging down.
    pub fn energy(&self, angle: f64, velocity: f64) -> f64 {
        0.5 * self.mass * (self.length * velocity).powi(2)
            + self.mass * self.gravity * self.length * (1.0 - angle.cos())
    }

    fn validate(&self) -> Result<()> {
        if self.mass <= 0.0 || self.length <= 0.0 {
            bail!("Pendulum mass and length must be positive.");
        }
        Ok(())
    }
}

impl<T: Scalar> DynamicalSystem<T> for DampedPendulum {
    fn dimension(&self) -> usize {
        2
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let friction = T::of(self.damping / self.mass);
        let stiffness = T::of(self.gravity / self.length);
        out[0] = x[1];
        out[1] = -friction * x[1] - stiffness * x[0].sin();
    }
}

/// Nondimensional pendulum with a vertically oscillating pivot:
/// `x'' = −(1 + F cos z) sin x − δ x'`, `z' = ω`.
///
/// State is `[x, x', z]`, with the forcing phase `z` carried explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivenPendulum {
    /// Forcing amplitude `F`.
    pub forcing: f64,
    /// Damping `δ`.
    pub damping: f64,
    /// Forcing frequency `ω` (rad per unit time).
    pub frequency: f64,
}

impl Default for DrivenPendulum {
    fn default() -> Self {
        Self {
            forcing: 133.5,
            damping: 0.0,
            frequency: 20.0,
        }
    }
}

impl DrivenPendulum {
    /// Forcing period `2π/ω`.
    pub fn period(&self) -> f64 {
        TAU / self.frequency
    }
}

impl<T: Scalar> DynamicalSystem<T> for DrivenPendulum {
    fn dimension(&self) -> usize {
        3
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let forcing = T::of(self.forcing);
        let damping = T::of(self.damping);
        out[0] = x[1];
        out[1] = -(T::one() + forcing * x[2].cos()) * x[0].sin() - damping * x[1];
        out[2] = T::of(self.frequency);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub t: f64,
    pub angle: f64,
    pub velocity: f64,
    /// Evaluated from the vector field at the sample.
    pub acceleration: f64,
}

/// One point of the stroboscopic map, taken mid-period of the forcing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPoint {
    pub t: f64,
    pub angle: f64,
    pub velocity: f64,
}

/// Longest run a demo accepts.
pub const MAX_STEPS: usize = 10_000_000;

/// Fixed-step integration settings shared by the demos.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemoRun {
    pub initial_angle: f64,
    pub initial_velocity: f64,
    pub dt: f64,
    pub steps: usize,
    /// Keep every `stride`-th trajectory sample.
    pub stride: usize,
}

impl DemoRun {
    /// Ten seconds from the inverted position in 1000 samples.
    pub fn damped_default() -> Self {
        Self {
            initial_angle: PI,
            initial_velocity: 0.0,
            dt: 0.01,
            steps: 1_000,
            stride: 1,
        }
    }

    /// 2000 time units from 0.3 rad past inverted, 100 samples per unit.
    pub fn driven_default() -> Self {
        Self {
            initial_angle: PI + 0.3,
            initial_velocity: 0.0,
            dt: 0.01,
            steps: 200_000,
            stride: 10,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            bail!("Step size dt must be positive.");
        }
        if self.steps == 0 {
            bail!("Demo run requires at least one integration step.");
        }
        if self.steps > MAX_STEPS {
            bail!("Demo run is limited to {} steps, got {}.", MAX_STEPS, self.steps);
        }
        if self.stride == 0 {
            bail!("stride must be at least 1.");
        }
        if !self.initial_angle.is_finite() || !self.initial_velocity.is_finite() {
            bail!("Initial state must be finite.");
        }
        Ok(())
    }
}

/// Partial run settings from a frontend; missing fields keep the demo's
/// defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoRunOverrides {
    pub initial_angle: Option<f64>,
    pub initial_velocity: Option<f64>,
    pub dt: Option<f64>,
    pub steps: Option<usize>,
    pub stride: Option<usize>,
}

impl DemoRunOverrides {
    pub fn apply(&self, base: DemoRun) -> DemoRun {
        DemoRun {
            initial_angle: self.initial_angle.unwrap_or(base.initial_angle),
            initial_velocity: self.initial_velocity.unwrap_or(base.initial_velocity),
            dt: self.dt.unwrap_or(base.dt),
            steps: self.steps.unwrap_or(base.steps),
            stride: self.stride.unwrap_or(base.stride),
        }
    }
}

fn sample<S: DynamicalSystem<f64>>(system: &S, t: f64, state: &[f64]) -> TrajectoryPoint {
    let deriv = system.derivative(t, state);
    TrajectoryPoint {
        t,
        angle: state[0],
        velocity: state[1],
        acceleration: deriv[1],
    }
}

/// Integrates `system` with RK4, calling `visit(step, t, state)` after the
/// initial state (step 0) and after each step.
fn integrate<S, F>(system: &S, mut state: Vec<f64>, run: &DemoRun, mut visit: F)
where
    S: DynamicalSystem<f64>,
    F: FnMut(usize, f64, &[f64]),
{
    let mut solver = RK4::new(state.len());
    let mut t = 0.0;
    visit(0, t, &state);
    for step in 1..=run.steps {
        solver.step(system, &mut t, &mut state, run.dt);
        // Recompute from the index so long runs do not accumulate drift.
        t = step as f64 * run.dt;
        visit(step, t, &state);
    }
}

pub fn simulate_damped(pendulum: &DampedPendulum, run: &DemoRun) -> Result<Vec<TrajectoryPoint>> {
    run.validate()?;
    pendulum.validate()?;
    let mut points = Vec::with_capacity(run.steps / run.stride + 1);
    let initial = vec![run.initial_angle, run.initial_velocity];
    integrate(pendulum, initial, run, |step, t, state| {
        if step % run.stride == 0 {
            points.push(sample(pendulum, t, state));
        }
    });
    Ok(points)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrivenRun {
    pub period: f64,
    pub trajectory: Vec<TrajectoryPoint>,
    pub return_map: Vec<ReturnPoint>,
}

/// Integrates the driven pendulum and collects the first-return map.
///
/// A return point is recorded each time `(t mod T) − T/2` changes sign from
/// negative to non-negative, linearly interpolated between the two samples
/// that bracket the crossing.
pub fn simulate_driven(pendulum: &DrivenPendulum, run: &DemoRun) -> Result<DrivenRun> {
    run.validate()?;
    if !(pendulum.frequency.is_finite() && pendulum.frequency > 0.0) {
        bail!("Forcing frequency must be positive.");
    }
    let period = pendulum.period();
    let mut trajectory = Vec::with_capacity(run.steps / run.stride + 1);
    let mut return_map = Vec::new();
    let mut previous: Option<(f64, ReturnPoint)> = None;

    let initial = vec![run.initial_angle, run.initial_velocity, 0.0];
    integrate(pendulum, initial, run, |step, t, state| {
        if step % run.stride == 0 {
            trajectory.push(sample(pendulum, t, state));
        }
        let phase = t.rem_euclid(period) - 0.5 * period;
        let current = ReturnPoint {
            t,
            angle: state[0],
            velocity: state[1],
        };
        if let Some((last_phase, last)) = previous {
            if last_phase < 0.0 && phase >= 0.0 {
                let w = -last_phase / (phase - last_phase);
                return_map.push(ReturnPoint {
                    t: last.t + (current.t - last.t) * w,
                    angle: last.angle + (current.angle - last.angle) * w,
                    velocity: last.velocity + (current.velocity - last.velocity) * w,
                });
            }
        }
        previous = Some((phase, current));
    });

    Ok(DrivenRun {
        period,
        trajectory,
        return_map,
    })
}

/// Wraps an angle into `(−π, π]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI {
        PI
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected an error");
        assert!(
            err.to_string().contains(needle),
            "error '{}' does not mention '{}'",
            err,
            needle
        );
    }

    #[test]
    fn damped_pendulum_falls_from_inverted_and_settles_hanging() {
        let pendulum = DampedPendulum::default();
        let run = DemoRun {
            initial_angle: PI + 0.01,
            steps: 4_000,
            ..DemoRun::damped_default()
        };
        let points = simulate_damped(&pendulum, &run).expect("damped run");
        assert_eq!(points.len(), 4_001);
        let last = points.last().expect("non-empty");
        assert!(wrap_angle(last.angle).abs() < 1e-3, "angle {}", last.angle);
        assert!(last.velocity.abs() < 1e-2);

        let energies: Vec<f64> = points
            .iter()
            .map(|p| pendulum.energy(p.angle, p.velocity))
            .collect();
        assert!(energies.windows(2).all(|w| w[1] <= w[0] + 1e-9));
    }

    #[test]
    fn damped_acceleration_matches_vector_field() {
        let pendulum = DampedPendulum::default();
        let run = DemoRun {
            initial_angle: 0.5,
            initial_velocity: 1.0,
            steps: 1,
            ..DemoRun::damped_default()
        };
        let points = simulate_damped(&pendulum, &run).expect("damped run");
        let expected = -0.5 * 1.0 - 9.81 * 0.5_f64.sin();
        assert!((points[0].acceleration - expected).abs() < 1e-12);
    }

    #[test]
    fn stride_thins_the_trajectory() {
        let run = DemoRun {
            steps: 100,
            stride: 10,
            ..DemoRun::damped_default()
        };
        let points = simulate_damped(&DampedPendulum::default(), &run).expect("damped run");
        assert_eq!(points.len(), 11);
        assert!((points[10].t - 1.0).abs() < 1e-12);
    }

    #[test]
    fn return_map_has_one_point_per_forcing_period() {
        let pendulum = DrivenPendulum::default();
        let period = pendulum.period();
        let run = DemoRun {
            dt: period / 50.3,
            steps: 503,
            stride: 1,
            ..DemoRun::driven_default()
        };
        let result = simulate_driven(&pendulum, &run).expect("driven run");
        assert_eq!(result.return_map.len(), 10);
        for (k, point) in result.return_map.iter().enumerate() {
            let expected = (k as f64 + 0.5) * period;
            assert!((point.t - expected).abs() < 1e-9, "crossing {k} at {}", point.t);
        }
    }

    #[test]
    fn fast_forcing_holds_the_pendulum_near_inverted() {
        let run = DemoRun {
            steps: 2_000,
            ..DemoRun::driven_default()
        };
        let result = simulate_driven(&DrivenPendulum::default(), &run).expect("driven run");
        assert!(result
            .trajectory
            .iter()
            .all(|p| (p.angle - PI).abs() < 0.6));
        assert!(result
            .return_map
            .iter()
            .all(|p| (p.angle - PI).abs() < 0.6));
    }

    #[test]
    fn invalid_runs_are_rejected() {
        let damped = DampedPendulum::default();
        assert_err_contains(
            simulate_damped(
                &damped,
                &DemoRun {
                    dt: 0.0,
                    ..DemoRun::damped_default()
                },
            ),
            "dt must be positive",
        );
        assert_err_contains(
            simulate_damped(
                &damped,
                &DemoRun {
                    steps: 0,
                    ..DemoRun::damped_default()
                },
            ),
            "at least one integration step",
        );
        assert_err_contains(
            simulate_driven(
                &DrivenPendulum {
                    frequency: 0.0,
                    ..DrivenPendulum::default()
                },
                &DemoRun::driven_default(),
            ),
            "frequency must be positive",
        );
    }

    #[test]
    fn oversized_runs_are_rejected_before_allocating() {
        assert_err_contains(
            simulate_damped(
                &DampedPendulum::default(),
                &DemoRun {
                    steps: usize::MAX,
                    ..DemoRun::damped_default()
                },
            ),
            "limited to",
        );
    }

    #[test]
    fn partial_run_settings_keep_demo_defaults() {
        let overrides: DemoRunOverrides =
            serde_json::from_str(r#"{ "steps": 500 }"#).expect("partial run parses");
        let damped = overrides.apply(DemoRun::damped_default());
        assert_eq!(damped.steps, 500);
        assert_eq!(damped.stride, 1);
        assert_eq!(damped.initial_angle, PI);

        let driven = overrides.apply(DemoRun::driven_default());
        assert_eq!(driven.steps, 500);
        assert_eq!(driven.stride, 10);
        assert_eq!(driven.initial_angle, PI + 0.3);
    }

    #[test]
    fn wrap_angle_lands_in_half_open_interval() {
        assert!((wrap_angle(TAU + 0.1) - 0.1).abs() < 1e-12);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-12);
    }
}
