//! The `rwip_core` crate holds the control and simulation engine for the
//! reaction-wheel inverted pendulum (RWIP) teaching demo.
//!
//! Key components:
//! - **Traits**: `Scalar`, `DynamicalSystem` (ODEs), `Steppable` (solvers).
//! - **Solvers**: fixed-step integrators (RK4, semi-implicit Euler).
//! - **Plant**: DC motor + pendulum dynamics and mechanical energy.
//! - **Controller**: mode classifier, per-mode actuation laws, voltage clamp.
//! - **LQR**: Riccati-based gain synthesis for the linearized plant.
//! - **Simulation**: the step-driven session with reset, telemetry and history.
//! - **Demos**: damped and parametrically driven pendulums.

pub mod accounting;
pub mod config;
pub mod controller;
pub mod demos;
pub mod error;
pub mod lqr;
pub mod plant;
pub mod simulation;
pub mod solvers;
pub mod traits;

pub use config::{SimulationConfig, StabilizerKind};
pub use controller::ControllerMode;
pub use simulation::{Simulation, StepInput, Telemetry};
