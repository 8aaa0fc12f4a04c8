//! Pendulum demo runners for the coursework pages.

use rwip_core::demos::{
    simulate_damped, simulate_driven, DampedPendulum, DemoRun, DemoRunOverrides, DrivenPendulum,
    DrivenRun, TrajectoryPoint,
};
use serde::de::DeserializeOwned;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

fn optional<T: DeserializeOwned>(value: JsValue, fallback: T, what: &str) -> Result<T, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(fallback);
    }
    from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid {}: {}", what, e)))
}

pub(crate) fn damped(pendulum: &DampedPendulum, run: &DemoRun) -> anyhow::Result<Vec<TrajectoryPoint>> {
    simulate_damped(pendulum, run)
}

pub(crate) fn driven(
    pendulum: &DrivenPendulum,
    run: &DemoRun,
    wrap: bool,
) -> anyhow::Result<DrivenRun> {
    let mut result = simulate_driven(pendulum, run)?;
    if wrap {
        for point in &mut result.return_map {
            point.angle = rwip_core::demos::wrap_angle(point.angle);
        }
    }
    Ok(result)
}

/// Damped pendulum released from the inverted position.
///
/// Both arguments may be `undefined` to use the classroom values, and the
/// run object may name only the settings it changes.
#[wasm_bindgen]
pub fn run_damped_pendulum(params: JsValue, run: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let pendulum = optional(params, DampedPendulum::default(), "pendulum parameters")?;
    let run = optional(run, DemoRunOverrides::default(), "run settings")?
        .apply(DemoRun::damped_default());
    let points = damped(&pendulum, &run)
        .map_err(|e| JsValue::from_str(&format!("Damped pendulum failed: {}", e)))?;
    to_value(&points).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Kapitza pendulum trajectory and stroboscopic return map.
///
/// With `wrap_angles` the return-map angles are folded into `(−π, π]`.
#[wasm_bindgen]
pub fn run_driven_pendulum(
    params: JsValue,
    run: JsValue,
    wrap_angles: bool,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let pendulum = optional(params, DrivenPendulum::default(), "pendulum parameters")?;
    let run = optional(run, DemoRunOverrides::default(), "run settings")?
        .apply(DemoRun::driven_default());
    let result = driven(&pendulum, &run, wrap_angles)
        .map_err(|e| JsValue::from_str(&format!("Driven pendulum failed: {}", e)))?;
    to_value(&result).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}
