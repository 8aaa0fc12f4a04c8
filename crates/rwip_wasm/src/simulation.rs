use js_sys::Float64Array;
use rwip_core::config::SimulationConfig;
use rwip_core::lqr::ComplexNumber;
use rwip_core::simulation::{HistorySample, StepInput, Telemetry};
use rwip_core::Simulation;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmSimulation {
    sim: Simulation,
}

/// Controller summary shown next to the animation.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct DesignSummary {
    stabilizer: &'static str,
    bound_deg: f64,
    required_energy: f64,
    gain: Option<[f64; 4]>,
    proportional_gain: f64,
    riccati_residual: Option<f64>,
    open_loop_poles: Vec<ComplexNumber>,
    closed_loop_poles: Vec<ComplexNumber>,
    stabilizing: Option<bool>,
}

/// Values of one history channel, oldest first.
pub(crate) fn channel(samples: &[HistorySample], name: &str) -> Option<Vec<f64>> {
    let pick: fn(&HistorySample) -> f64 = match name {
        "time" => |s| s.time,
        "angle" => |s| s.angle,
        "setpoint" => |s| s.setpoint,
        "velocity" => |s| s.velocity,
        "motor_torque" => |s| s.motor_torque,
        "wheel_velocity" => |s| s.wheel_velocity,
        "voltage" => |s| s.voltage,
        "energy" => |s| s.energy,
        _ => return None,
    };
    Some(samples.iter().map(pick).collect())
}

pub(crate) fn parse_config(value: JsValue) -> Result<SimulationConfig, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(SimulationConfig::default());
    }
    from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid configuration: {}", e)))
}

impl WasmSimulation {
    pub(crate) fn from_config(config: SimulationConfig) -> anyhow::Result<Self> {
        Ok(Self {
            sim: Simulation::new(config)?,
        })
    }

    pub(crate) fn advance(
        &mut self,
        disturbance: Option<String>,
        reset: bool,
        frame_rate: Option<f64>,
    ) -> Telemetry {
        self.sim.step(&StepInput {
            disturbance,
            reset,
            frame_rate,
        })
    }

    pub(crate) fn design_summary(&self) -> DesignSummary {
        let law = self.sim.law();
        let design = law.design();
        DesignSummary {
            stabilizer: law.stabilizer().label(),
            bound_deg: law.config().stabilize_bound_deg,
            required_energy: law.required_energy(),
            gain: design.map(|d| d.gain),
            proportional_gain: law.config().proportional_gain,
            riccati_residual: design.and_then(|d| d.riccati_residual),
            open_loop_poles: design.map(|d| d.open_loop_poles.clone()).unwrap_or_default(),
            closed_loop_poles: design
                .map(|d| d.closed_loop_poles.clone())
                .unwrap_or_default(),
            stabilizing: design.map(|d| d.is_stabilizing()),
        }
    }
}

#[wasm_bindgen]
impl WasmSimulation {
    /// Builds a session from a (possibly partial) config object; `undefined`
    /// selects the reference setup.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<WasmSimulation, JsValue> {
        console_error_panic_hook::set_once();
        let config = parse_config(config)?;
        Self::from_config(config)
            .map_err(|e| JsValue::from_str(&format!("Simulation setup failed: {:#}", e)))
    }

    pub fn step(
        &mut self,
        disturbance: Option<String>,
        reset: bool,
        frame_rate: Option<f64>,
    ) -> Result<JsValue, JsValue> {
        let telemetry = self.advance(disturbance, reset, frame_rate);
        to_value(&telemetry).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn reset(&mut self) {
        self.sim.reset();
    }

    /// Label of the mode chosen on the last step, as displayed on the page.
    pub fn mode_label(&self) -> Option<String> {
        self.sim
            .state()
            .last_mode
            .map(|mode| mode.label().to_string())
    }

    pub fn time(&self) -> f64 {
        self.sim.state().time
    }

    pub fn history(&self) -> Result<JsValue, JsValue> {
        let samples: Vec<HistorySample> = self.sim.history().to_vec();
        to_value(&samples).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// One history channel as a typed array for the plots.
    pub fn history_channel(&self, name: &str) -> Result<Float64Array, JsValue> {
        let samples = self.sim.history().to_vec();
        let values = channel(&samples, name)
            .ok_or_else(|| JsValue::from_str(&format!("Unknown history channel: {}", name)))?;
        Ok(Float64Array::from(values.as_slice()))
    }

    pub fn design(&self) -> Result<JsValue, JsValue> {
        to_value(&self.design_summary())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn config(&self) -> Result<JsValue, JsValue> {
        to_value(self.sim.config())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}
