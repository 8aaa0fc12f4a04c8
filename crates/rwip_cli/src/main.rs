//! Headless runner for the reaction-wheel pendulum.
//!
//! # Commands
//!
//! - `rwip simulate` - Run the controller session and stream telemetry
//! - `rwip design` - Print the stabilizer design (gain, poles, residual)
//! - `rwip damped` - Damped pendulum released from the inverted position
//! - `rwip driven` - Kapitza pendulum trajectory or return map
//!
//! Results go to stdout; logs go to stderr and follow `RUST_LOG`.

mod output;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use output::{write_return_map, write_trajectory, Format, TelemetryWriter};
use rwip_core::demos::{
    simulate_damped, simulate_driven, wrap_angle, DampedPendulum, DemoRun, DrivenPendulum,
    MAX_STEPS,
};
use rwip_core::simulation::ScriptedInput;
use rwip_core::{Simulation, SimulationConfig, StabilizerKind};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rwip")]
#[command(about = "Reaction-wheel inverted pendulum simulator", long_about = None)]
#[command(version)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller session and stream telemetry
    Simulate {
        /// JSON configuration; omitted values keep their defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Simulated duration in seconds
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,

        /// Initial pendulum angle in degrees (0 upright, 180 hanging)
        #[arg(long)]
        angle: Option<f64>,

        /// Override the stabilizer
        #[arg(long, value_enum)]
        stabilizer: Option<Stabilizer>,

        /// Disturbance torque as TIME=VALUE, repeatable
        #[arg(long = "disturb", value_name = "TIME=VALUE")]
        disturbances: Vec<String>,

        #[arg(long, value_enum, default_value = "csv")]
        format: Format,

        /// Write every N-th step
        #[arg(long, default_value_t = 1)]
        every: usize,
    },

    /// Print the stabilizer design as JSON
    Design {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Damped pendulum released near the inverted position
    Damped {
        /// Initial angle in radians from hanging (pi is inverted)
        #[arg(long, default_value_t = std::f64::consts::PI)]
        angle: f64,

        #[arg(long, default_value_t = 0.5)]
        damping: f64,

        #[arg(long, default_value_t = 10.0)]
        seconds: f64,

        #[arg(long, default_value_t = 0.01)]
        dt: f64,

        #[arg(long, value_enum, default_value = "csv")]
        format: Format,
    },

    /// Pendulum on a vertically oscillating pivot
    Driven {
        /// Forcing amplitude F
        #[arg(long, default_value_t = 133.5)]
        forcing: f64,

        #[arg(long, default_value_t = 0.0)]
        damping: f64,

        /// Forcing frequency w
        #[arg(long, default_value_t = 20.0)]
        frequency: f64,

        /// Initial angle in radians from hanging
        #[arg(long, default_value_t = std::f64::consts::PI + 0.3)]
        angle: f64,

        /// Duration in time units
        #[arg(long, default_value_t = 2000.0)]
        time: f64,

        #[arg(long, default_value_t = 0.01)]
        dt: f64,

        /// Keep every N-th trajectory sample
        #[arg(long, default_value_t = 10)]
        every: usize,

        /// Print the stroboscopic return map instead of the trajectory
        #[arg(long)]
        return_map: bool,

        /// Fold return-map angles into (-pi, pi]
        #[arg(long)]
        wrap: bool,

        #[arg(long, value_enum, default_value = "csv")]
        format: Format,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum Stabilizer {
    Lqr,
    Pid,
}

impl From<Stabilizer> for StabilizerKind {
    fn from(value: Stabilizer) -> Self {
        match value {
            Stabilizer::Lqr => StabilizerKind::Lqr,
            Stabilizer::Pid => StabilizerKind::Pid,
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<SimulationConfig> {
    let Some(path) = path else {
        return Ok(SimulationConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    info!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Splits `TIME=VALUE`; the value text is passed through untouched so the
/// session applies its own parsing rules.
fn parse_disturbance_arg(arg: &str) -> Result<(f64, String)> {
    let Some((time, value)) = arg.split_once('=') else {
        bail!("Disturbance '{}' must look like TIME=VALUE.", arg);
    };
    let time: f64 = time
        .trim()
        .parse()
        .with_context(|| format!("Invalid disturbance time in '{}'", arg))?;
    if !(time.is_finite() && time >= 0.0) {
        bail!("Disturbance time must be a non-negative number, got {}.", time);
    }
    Ok((time, value.to_string()))
}

fn steps_for(seconds: f64, dt: f64) -> Result<usize> {
    if !(seconds.is_finite() && seconds > 0.0) {
        bail!("Duration must be positive, got {}.", seconds);
    }
    if !(dt.is_finite() && dt > 0.0) {
        bail!("Step size must be positive, got {}.", dt);
    }
    let steps = (seconds / dt).round();
    if !(steps <= MAX_STEPS as f64) {
        bail!(
            "{} s at dt = {} needs {} steps; the limit is {}.",
            seconds,
            dt,
            steps,
            MAX_STEPS
        );
    }
    Ok(steps as usize)
}

fn build_script(
    config: &SimulationConfig,
    seconds: f64,
    disturbances: &[String],
) -> Result<ScriptedInput> {
    let dt = config.step.nominal_dt;
    let steps = steps_for(seconds, dt)?;
    let mut script = ScriptedInput::new(steps);
    let mut scheduled = Vec::with_capacity(disturbances.len());
    for arg in disturbances {
        let (time, value) = parse_disturbance_arg(arg)?;
        let step = (time / dt).round();
        if step >= steps as f64 {
            bail!(
                "Disturbance at {} s falls after the end of the {} s run.",
                time,
                seconds
            );
        }
        let step = step as usize;
        if scheduled.contains(&step) {
            bail!("Two disturbances land on step {} (t = {} s).", step, time);
        }
        scheduled.push(step);
        script = script.disturb_at(step, value);
    }
    Ok(script)
}

fn simulate(
    config: SimulationConfig,
    seconds: f64,
    disturbances: &[String],
    format: Format,
    every: usize,
) -> Result<()> {
    let mut sim = Simulation::new(config)?;
    let mut script = build_script(sim.config(), seconds, disturbances)?;
    let stdout = io::stdout();
    let mut writer = TelemetryWriter::new(BufWriter::new(stdout.lock()), format, every)?;
    let steps = sim.run(&mut script, &mut writer);
    writer.finish().context("Failed to write telemetry")?;

    let state = sim.state();
    info!(
        steps,
        time = state.time,
        mode = ?state.last_mode,
        angle = state.pendulum.angle,
        "simulation finished"
    );
    Ok(())
}

fn design(config: SimulationConfig) -> Result<()> {
    let sim = Simulation::new(config)?;
    let law = sim.law();
    let summary = serde_json::json!({
        "stabilizer": law.stabilizer().label(),
        "bound_deg": law.config().stabilize_bound_deg,
        "proportional_gain": law.config().proportional_gain,
        "required_energy": law.required_energy(),
        "lqr": sim.design(),
        "stabilizing": sim.design().map(|d| d.is_stabilizing()),
    });
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, &summary)?;
    writeln!(out)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Simulate {
            config,
            seconds,
            angle,
            stabilizer,
            disturbances,
            format,
            every,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(angle) = angle {
                config.initial.angle_deg = angle;
            }
            if let Some(stabilizer) = stabilizer {
                config.controller.stabilizer = stabilizer.into();
            }
            simulate(config, seconds, &disturbances, format, every)
        }
        Commands::Design { config } => design(load_config(config.as_deref())?),
        Commands::Damped {
            angle,
            damping,
            seconds,
            dt,
            format,
        } => {
            let pendulum = DampedPendulum {
                damping,
                ..DampedPendulum::default()
            };
            let run = DemoRun {
                initial_angle: angle,
                dt,
                steps: steps_for(seconds, dt)?,
                ..DemoRun::damped_default()
            };
            let points = simulate_damped(&pendulum, &run)?;
            let mut out = BufWriter::new(io::stdout().lock());
            write_trajectory(&mut out, &points, format)?;
            out.flush()?;
            Ok(())
        }
        Commands::Driven {
            forcing,
            damping,
            frequency,
            angle,
            time,
            dt,
            every,
            return_map,
            wrap,
            format,
        } => {
            let pendulum = DrivenPendulum {
                forcing,
                damping,
                frequency,
            };
            let run = DemoRun {
                initial_angle: angle,
                initial_velocity: 0.0,
                dt,
                steps: steps_for(time, dt)?,
                stride: every,
            };
            let mut result = simulate_driven(&pendulum, &run)?;
            info!(
                period = result.period,
                returns = result.return_map.len(),
                "driven pendulum integrated"
            );
            let mut out = BufWriter::new(io::stdout().lock());
            if return_map {
                if wrap {
                    for point in &mut result.return_map {
                        point.angle = wrap_angle(point.angle);
                    }
                }
                write_return_map(&mut out, &result.return_map, format)?;
            } else {
                write_trajectory(&mut out, &result.trajectory, format)?;
            }
            out.flush()?;
            Ok(())
        }
    }
}
