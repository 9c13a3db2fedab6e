//! Energy consumption of a day out of a power-measurement export.
//!
//! A file of timestamped `Power Avg [kW]` readings is loaded with
//! [`reader`], the energy of the selected day and of the days around it is
//! computed by [`energy`], and the selected day is drawn by [`chart`].

use std::path::Path;

use miette::Diagnostic;
use thiserror::Error;
use time::{Date, PrimitiveDateTime};

pub mod chart;
pub mod energy;
pub mod reader;
pub mod timestamp;

pub use chart::{render_svg, render_to_file, ChartOptions};
pub use energy::{aggregate, DayWindow, DayWindows, EnergySummary, Interval};
pub use reader::{load, read_readings, Format, ReaderOptions};

/// One row of the export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub timestamp: PrimitiveDateTime,
    // None when the cell was empty
    pub power_avg_kw: Option<f64>,
}

impl Reading {
    pub fn new(timestamp: PrimitiveDateTime, power_avg_kw: f64) -> Self {
        Self {
            timestamp,
            power_avg_kw: Some(power_avg_kw),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Read(#[from] reader::ReadError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Energy(#[from] energy::EnergyError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Chart(#[from] chart::ChartError),
}

/// Load the readings of `path` and compute the energy around `day`.
pub fn run(
    path: &Path,
    day: Date,
    format: Option<Format>,
    options: &ReaderOptions,
) -> Result<EnergySummary, Error> {
    let readings = load(path, format, options)?;
    Ok(aggregate(&readings, day)?)
}

/// Draw the selected day of `summary` into the SVG file `output`.
pub fn write_chart(
    summary: &EnergySummary,
    output: &Path,
    options: ChartOptions,
) -> Result<(), Error> {
    Ok(render_to_file(summary, output, options)?)
}
