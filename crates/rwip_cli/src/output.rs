//! Stdout writers for telemetry and demo samples.

use clap::ValueEnum;
use rwip_core::demos::{ReturnPoint, TrajectoryPoint};
use rwip_core::simulation::{Telemetry, TelemetrySink};
use serde::Serialize;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Comma-separated values with a header row.
    Csv,
    /// One JSON object per line.
    Json,
}

const TELEMETRY_HEADER: &str = "time,dt,mode,angle,velocity,setpoint,energy,wheel_angle,\
wheel_velocity,motor_rpm,motor_torque,current,voltage,requested_voltage,disturbance,\
settle_time,settle_energy,settled,bob_x,bob_y";

fn telemetry_row(t: &Telemetry) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        t.time,
        t.dt,
        t.mode.label(),
        t.angle,
        t.velocity,
        t.setpoint,
        t.energy,
        t.wheel_angle,
        t.wheel_velocity,
        t.motor_rpm,
        t.motor_torque,
        t.current,
        t.voltage,
        t.requested_voltage,
        t.disturbance,
        t.settle_time,
        t.settle_energy,
        t.settled,
        t.bob_x,
        t.bob_y
    )
}

fn write_json_line<W: Write, T: Serialize>(out: &mut W, value: &T) -> io::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)
}

/// Telemetry sink that writes every `every`-th record.
///
/// Write errors are kept and reported by [`TelemetryWriter::finish`], since
/// the sink interface cannot return them.
pub struct TelemetryWriter<W: Write> {
    out: W,
    format: Format,
    every: usize,
    seen: usize,
    error: Option<io::Error>,
}

impl<W: Write> TelemetryWriter<W> {
    pub fn new(mut out: W, format: Format, every: usize) -> io::Result<Self> {
        if format == Format::Csv {
            writeln!(out, "{}", TELEMETRY_HEADER)?;
        }
        Ok(Self {
            out,
            format,
            every: every.max(1),
            seen: 0,
            error: None,
        })
    }

    fn write(&mut self, telemetry: &Telemetry) -> io::Result<()> {
        match self.format {
            Format::Csv => writeln!(self.out, "{}", telemetry_row(telemetry)),
            Format::Json => write_json_line(&mut self.out, telemetry),
        }
    }

    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> TelemetrySink for TelemetryWriter<W> {
    fn publish(&mut self, telemetry: &Telemetry) {
        let index = self.seen;
        self.seen += 1;
        if self.error.is_some() || index % self.every != 0 {
            return;
        }
        if let Err(err) = self.write(telemetry) {
            self.error = Some(err);
        }
    }
}

pub fn write_trajectory<W: Write>(
    out: &mut W,
    points: &[TrajectoryPoint],
    format: Format,
) -> io::Result<()> {
    match format {
        Format::Csv => {
            writeln!(out, "t,angle,velocity,acceleration")?;
            for p in points {
                writeln!(out, "{},{},{},{}", p.t, p.angle, p.velocity, p.acceleration)?;
            }
        }
        Format::Json => {
            for p in points {
                write_json_line(out, p)?;
            }
        }
    }
    Ok(())
}

pub fn write_return_map<W: Write>(
    out: &mut W,
    points: &[ReturnPoint],
    format: Format,
) -> io::Result<()> {
    match format {
        Format::Csv => {
            writeln!(out, "t,angle,velocity")?;
            for p in points {
                writeln!(out, "{},{},{}", p.t, p.angle, p.velocity)?;
            }
        }
        Format::Json => {
            for p in points {
                write_json_line(out, p)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rwip_core::simulation::{ScriptedInput, Telemetry};
    use rwip_core::{Simulation, SimulationConfig};

    fn records(steps: usize) -> Vec<Telemetry> {
        let mut sim = Simulation::new(SimulationConfig::default()).expect("simulation");
        let mut records = Vec::new();
        sim.run(&mut ScriptedInput::new(steps), &mut records);
        records
    }

    #[test]
    fn csv_rows_match_header_width() {
        let columns = TELEMETRY_HEADER.split(',').count();
        for record in records(3) {
            assert_eq!(telemetry_row(&record).split(',').count(), columns);
        }
    }

    #[test]
    fn writer_thins_records() {
        let mut writer = TelemetryWriter::new(Vec::new(), Format::Csv, 4).expect("writer");
        for record in records(10) {
            writer.publish(&record);
        }
        let bytes = writer.finish().expect("finish");
        let text = String::from_utf8(bytes).expect("utf8");
        // Header plus records 0, 4 and 8.
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().nth(1).is_some_and(|line| line.contains("Bang-bang")));
    }

    #[test]
    fn json_lines_parse_back() {
        let mut writer = TelemetryWriter::new(Vec::new(), Format::Json, 1).expect("writer");
        for record in records(2) {
            writer.publish(&record);
        }
        let bytes = writer.finish().expect("finish");
        let text = String::from_utf8(bytes).expect("utf8");
        let parsed: Vec<Telemetry> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("telemetry json"))
            .collect();
        assert_eq!(parsed.len(), 2);
        assert!((parsed[1].time - 0.02).abs() < 1e-12);
    }

    #[test]
    fn trajectory_csv_has_header() {
        let points = [TrajectoryPoint {
            t: 0.0,
            angle: 1.0,
            velocity: 0.0,
            acceleration: -8.0,
        }];
        let mut out = Vec::new();
        write_trajectory(&mut out, &points, Format::Csv).expect("write");
        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(text, "t,angle,velocity,acceleration\n0,1,0,-8\n");
    }
}
