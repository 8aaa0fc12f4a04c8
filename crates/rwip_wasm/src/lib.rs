//! WASM bridge for the browser frontend.
//!
//! The page owns the render loop; it calls [`WasmSimulation::step`] once per
//! animation frame with the contents of the disturbance box, the reset
//! button state and the measured frame rate.

mod demos;
mod simulation;

pub use demos::{run_damped_pendulum, run_driven_pendulum};
pub use simulation::WasmSimulation;
