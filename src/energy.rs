//! Turning power readings into daily energy.
//!
//! Readings are assumed to be evenly spaced. The spacing is taken from the
//! first two rows and every reading is treated as the average power over one
//! such interval, so the energy of a day is a left Riemann sum:
//! `sum(kW) * interval_minutes / 60`.

use std::fmt;

use miette::Diagnostic;
use thiserror::Error;
use time::{Date, PrimitiveDateTime};
use tracing::{debug, warn};

use crate::Reading;

const HOURS_PER_DAY: f64 = 24.0;

#[derive(Debug, Error, Diagnostic, PartialEq)]
pub enum EnergyError {
    #[error("At least two readings are needed to derive the sample interval, found {0}")]
    #[diagnostic(code(power_avg::energy::not_enough_readings))]
    NotEnoughReadings(usize),
    #[error("The first two readings are {0} minutes apart")]
    #[diagnostic(
        code(power_avg::energy::interval),
        help("readings must be sorted by timestamp, oldest first")
    )]
    NonPositiveInterval(f64),
    #[error("Cannot build the days around {0}")]
    #[diagnostic(code(power_avg::energy::date))]
    DateOutOfRange(Date),
}

/// Spacing between two consecutive readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    minutes: f64,
}

impl Interval {
    pub fn between(
        first: PrimitiveDateTime,
        second: PrimitiveDateTime,
    ) -> Result<Self, EnergyError> {
        let minutes = (second - first).as_seconds_f64() / 60.0;
        if minutes <= 0.0 {
            return Err(EnergyError::NonPositiveInterval(minutes));
        }
        Ok(Self { minutes })
    }

    /// Derive the interval from the first two readings.
    pub fn from_readings(readings: &[Reading]) -> Result<Self, EnergyError> {
        match readings {
            [first, second, ..] => Self::between(first.timestamp, second.timestamp),
            _ => Err(EnergyError::NotEnoughReadings(readings.len())),
        }
    }

    pub fn minutes(&self) -> f64 {
        self.minutes
    }

    /// Hours covered by one reading, i.e. what a kW value is multiplied by
    /// to get kWh.
    pub fn kwh_factor(&self) -> f64 {
        self.minutes / 60.0
    }
}

/// The half-open range `[midnight, next midnight)` of a calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
}

impl DayWindow {
    pub fn for_day(date: Date) -> Result<Self, EnergyError> {
        let next = date.next_day().ok_or(EnergyError::DateOutOfRange(date))?;
        Ok(Self {
            start: date.midnight(),
            end: next.midnight(),
        })
    }

    pub fn date(&self) -> Date {
        self.start.date()
    }

    pub fn start(&self) -> PrimitiveDateTime {
        self.start
    }

    pub fn end(&self) -> PrimitiveDateTime {
        self.end
    }

    pub fn contains(&self, timestamp: PrimitiveDateTime) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    pub fn select<'a>(&self, readings: &'a [Reading]) -> impl Iterator<Item = &'a Reading> + 'a {
        let window = *self;
        readings
            .iter()
            .filter(move |reading| window.contains(reading.timestamp))
    }
}

/// The selected day and its two neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindows {
    pub before: DayWindow,
    pub today: DayWindow,
    pub after: DayWindow,
}

impl DayWindows {
    pub fn around(day: Date) -> Result<Self, EnergyError> {
        let out_of_range = || EnergyError::DateOutOfRange(day);
        let previous = day.previous_day().ok_or_else(out_of_range)?;
        let next = day.next_day().ok_or_else(out_of_range)?;

        Ok(Self {
            before: DayWindow::for_day(previous).map_err(|_| out_of_range())?,
            today: DayWindow::for_day(day)?,
            after: DayWindow::for_day(next).map_err(|_| out_of_range())?,
        })
    }
}

/// Energy in kWh of the readings falling in `window`. Readings without a
/// power value count as nothing.
pub fn energy_in(readings: &[Reading], window: &DayWindow, interval: Interval) -> f64 {
    let total_kw: f64 = window
        .select(readings)
        .filter_map(|reading| reading.power_avg_kw)
        .sum();
    total_kw * interval.kwh_factor()
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnergySummary {
    pub day: Date,
    pub interval: Interval,
    pub windows: DayWindows,
    pub before_kwh: f64,
    pub today_kwh: f64,
    pub after_kwh: f64,
    /// Constant power that would deliver `today_kwh` over 24 hours.
    pub avg_kw: f64,
    /// Readings of the selected day, in input order.
    pub today: Vec<Reading>,
}

pub fn aggregate(readings: &[Reading], day: Date) -> Result<EnergySummary, EnergyError> {
    let interval = Interval::from_readings(readings)?;
    let windows = DayWindows::around(day)?;

    if let Some(pair) = readings
        .windows(2)
        .position(|pair| pair[0].timestamp > pair[1].timestamp)
    {
        warn!(row = pair + 1, "readings are not ordered");
    }

    let before_kwh = energy_in(readings, &windows.before, interval);
    let today_kwh = energy_in(readings, &windows.today, interval);
    let after_kwh = energy_in(readings, &windows.after, interval);
    // kWh / 24 h, not kWh / samples per day: `avg_kw * 24 == today_kwh` must
    // hold at any interval. See "Average line formula" in DESIGN.md.
    let avg_kw = today_kwh / HOURS_PER_DAY;
    let today: Vec<Reading> = windows.today.select(readings).cloned().collect();

    debug!(
        %day,
        interval_minutes = interval.minutes(),
        today_readings = today.len(),
        before_kwh,
        today_kwh,
        after_kwh,
        "aggregated energy"
    );

    Ok(EnergySummary {
        day,
        interval,
        windows,
        before_kwh,
        today_kwh,
        after_kwh,
        avg_kw,
        today,
    })
}

impl EnergySummary {
    /// Start and end of the selected day.
    pub fn day_bounds(&self) -> (PrimitiveDateTime, PrimitiveDateTime) {
        (self.windows.today.start(), self.windows.today.end())
    }
}

impl fmt::Display for EnergySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Power avg summary for {} (interval {} min)",
            self.day,
            self.interval.minutes()
        )?;
        writeln!(f, "Power average before: {:.2} kWh", self.before_kwh)?;
        writeln!(f, "Power average: {:.2} kWh", self.today_kwh)?;
        write!(f, "Power average after: {:.2} kWh", self.after_kwh)
    }
}
