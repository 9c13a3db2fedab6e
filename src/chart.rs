use std::{iter, ops::Range, path::Path};

use chrono::{NaiveDate, NaiveDateTime};
use miette::Diagnostic;
use plotters::{
    coord::{types::RangedDateTime, Shift},
    prelude::*,
    series::DashedLineSeries,
};
use thiserror::Error;
use time::PrimitiveDateTime;
use tracing::debug;

use crate::energy::EnergySummary;

pub const TITLE: &str = "Power Average over Time";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartOptions {
    pub width: u32,
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 600,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ChartError {
    #[error("Could not draw the chart: {0}")]
    #[diagnostic(code(power_avg::chart::draw))]
    Draw(String),
    #[error("{0} cannot be placed on the chart")]
    #[diagnostic(code(power_avg::chart::timestamp))]
    Timestamp(PrimitiveDateTime),
    #[error("Power values are not finite, the chart has no y axis")]
    #[diagnostic(
        code(power_avg::chart::not_finite),
        help("the readings of the day add up beyond what a float can hold")
    )]
    NotFinite,
}

/// Render the chart of the selected day as an SVG document.
pub fn render_svg(summary: &EnergySummary, options: ChartOptions) -> Result<String, ChartError> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (options.width, options.height))
            .into_drawing_area();
        draw(&root, summary)?;
    } // root borrows svg until here
    Ok(svg)
}

/// Render the chart of the selected day into an SVG file.
pub fn render_to_file(
    summary: &EnergySummary,
    output: &Path,
    options: ChartOptions,
) -> Result<(), ChartError> {
    let root = SVGBackend::new(output, (options.width, options.height)).into_drawing_area();
    draw(&root, summary)?;
    debug!(output = %output.display(), "chart written");
    Ok(())
}

/// Legend of the average line.
pub fn average_label(summary: &EnergySummary) -> String {
    format!("Average = {:.2} kWh/day", summary.today_kwh)
}

fn draw<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    summary: &EnergySummary,
) -> Result<(), ChartError> {
    root.fill(&WHITE).map_err(draw_error)?;

    let (start, end) = summary.day_bounds();
    let (start, end) = (to_chrono(start)?, to_chrono(end)?);
    let y_range = power_range(summary)?;

    let mut chart = ChartBuilder::on(root)
        .caption(TITLE, ("sans-serif", 24).into_font())
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(RangedDateTime::from(start..end), y_range)
        .map_err(draw_error)?;

    chart
        .configure_mesh()
        .x_desc("Timestamp")
        .y_desc("Power Avg [kW]")
        .x_labels(12)
        .x_label_formatter(&|dt: &NaiveDateTime| dt.format("%H:%M").to_string())
        .draw()
        .map_err(draw_error)?;

    let mut points = Vec::with_capacity(summary.today.len());
    for reading in &summary.today {
        if let Some(power) = reading.power_avg_kw {
            points.push((to_chrono(reading.timestamp)?, power));
        }
    }

    chart
        .draw_series(LineSeries::new(points, BLUE))
        .map_err(draw_error)?
        .label("Power Avg [kW]")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    chart
        .draw_series(DashedLineSeries::new(
            vec![(start, summary.avg_kw), (end, summary.avg_kw)],
            10,
            5,
            RED.stroke_width(2),
        ))
        .map_err(draw_error)?
        .label(average_label(summary))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(draw_error)?;

    root.present().map_err(draw_error)
}

/// Y axis from zero (or the lowest value) to the highest value plus 10%.
fn power_range(summary: &EnergySummary) -> Result<Range<f64>, ChartError> {
    let values = summary
        .today
        .iter()
        .filter_map(|reading| reading.power_avg_kw)
        .chain(iter::once(summary.avg_kw));

    let (low, high) = values.fold((0.0_f64, 0.0_f64), |(low, high), value| {
        (low.min(value), high.max(value))
    });
    // Plotters never finishes laying out ticks on an infinite axis
    if !(high - low).is_finite() {
        return Err(ChartError::NotFinite);
    }
    if high - low <= f64::EPSILON {
        return Ok(low..low + 1.0);
    }

    let headroom = (high - low) * 0.1;
    let low = if low < 0.0 { low - headroom } else { low };
    let high = high + headroom;
    if !low.is_finite() || !high.is_finite() {
        return Err(ChartError::NotFinite);
    }
    Ok(low..high)
}

fn to_chrono(timestamp: PrimitiveDateTime) -> Result<NaiveDateTime, ChartError> {
    NaiveDate::from_ymd_opt(
        timestamp.year(),
        timestamp.month() as u32,
        timestamp.day() as u32,
    )
    .and_then(|date| {
        date.and_hms_nano_opt(
            timestamp.hour() as u32,
            timestamp.minute() as u32,
            timestamp.second() as u32,
            timestamp.nanosecond(),
        )
    })
    .ok_or(ChartError::Timestamp(timestamp))
}

fn draw_error(error: impl std::fmt::Display) -> ChartError {
    ChartError::Draw(error.to_string())
}
