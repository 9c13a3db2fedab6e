use std::{fs, path::PathBuf};

use power_avg::{
    chart::ChartError, energy::EnergyError, reader::ReadError, render_svg, run, write_chart,
    ChartOptions, Error, Format, ReaderOptions,
};
use tempfile::TempDir;
use time::macros::date;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Three days of 15 minute readings at 1 kW, 2 kW and 3 kW.
fn three_days() -> String {
    let mut csv = String::from("Meter;4711;Site;Basement\nTimestamp;Power Avg [kW];Power Max [kW]\n");
    for (day, power) in [(1, 1.0), (2, 2.0), (3, 3.0)] {
        for quarter in 0..96 {
            csv.push_str(&format!(
                "2024-05-{day:02} {:02}:{:02}:00;{power};9.9\n",
                quarter / 4,
                quarter % 4 * 15
            ));
        }
    }
    csv
}

#[test]
fn energy_of_three_days() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "export.csv", &three_days());

    let summary = run(&path, date!(2024 - 05 - 02), None, &ReaderOptions::default()).unwrap();

    assert_eq!(summary.interval.minutes(), 15.0);
    assert!((summary.before_kwh - 24.0).abs() < 1e-9);
    assert!((summary.today_kwh - 48.0).abs() < 1e-9);
    assert!((summary.after_kwh - 72.0).abs() < 1e-9);
    assert!((summary.avg_kw - 2.0).abs() < 1e-9);
    assert_eq!(summary.today.len(), 96);

    let svg = render_svg(&summary, ChartOptions::default()).unwrap();
    assert!(svg.contains("Average = 48.00 kWh/day"));
}

#[test]
fn day_without_readings() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "export.csv", &three_days());

    let summary = run(&path, date!(2024 - 06 - 01), None, &ReaderOptions::default()).unwrap();
    assert_eq!(summary.before_kwh, 0.0);
    assert_eq!(summary.today_kwh, 0.0);
    assert_eq!(summary.after_kwh, 0.0);
    assert!(summary.today.is_empty());
}

#[test]
fn missing_power_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "export.csv",
        "meta\nTimestamp;Power [kW]\n2024-05-02 00:00;1\n2024-05-02 00:15;1\n",
    );

    let err = run(&path, date!(2024 - 05 - 02), None, &ReaderOptions::default()).unwrap_err();
    assert!(
        matches!(err, Error::Read(ReadError::MissingColumn(ref column)) if column == "Power Avg [kW]"),
        "{err:?}"
    );
}

#[test]
fn single_reading() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "export.csv",
        "meta\nTimestamp;Power Avg [kW]\n2024-05-02 00:00;1\n",
    );

    let err = run(&path, date!(2024 - 05 - 02), None, &ReaderOptions::default()).unwrap_err();
    assert!(
        matches!(err, Error::Energy(EnergyError::NotEnoughReadings(1))),
        "{err:?}"
    );
}

#[test]
fn format_can_be_forced() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "export.txt", &three_days());

    let err = run(&path, date!(2024 - 05 - 02), None, &ReaderOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Read(ReadError::UnsupportedFormat(_))));

    let summary = run(
        &path,
        date!(2024 - 05 - 02),
        Some(Format::Csv),
        &ReaderOptions::default(),
    )
    .unwrap();
    assert!((summary.today_kwh - 48.0).abs() < 1e-9);
}

#[test]
fn custom_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "export.csv",
        "time,load\n02.05.2024 00:00,\"1,5\"\n02.05.2024 01:00,\"2,5\"\n",
    );
    let options = ReaderOptions {
        delimiter: b',',
        skip_rows: 0,
        decimal: ',',
        timestamp_column: String::from("time"),
        power_column: String::from("load"),
    };

    let summary = run(&path, date!(2024 - 05 - 02), None, &options).unwrap();
    assert_eq!(summary.interval.minutes(), 60.0);
    assert_eq!(summary.today_kwh, 4.0);
}

#[test]
fn missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = run(
        &dir.path().join("nope.csv"),
        date!(2024 - 05 - 02),
        None,
        &ReaderOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Read(ReadError::Io { .. })));
    assert!(err.to_string().starts_with("Could not read"));
}

#[test]
fn chart_file_from_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "export.csv", &three_days());
    let output = dir.path().join("day.svg");

    let summary = run(&path, date!(2024 - 05 - 02), None, &ReaderOptions::default()).unwrap();
    write_chart(&summary, &output, ChartOptions::default()).unwrap();

    let svg = fs::read_to_string(&output).unwrap();
    assert!(svg.contains("Power Average over Time"));
    assert!(svg.contains("Average = 48.00 kWh/day"));
}

#[test]
fn chart_into_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "export.csv", &three_days());
    let output = dir.path().join("missing").join("day.svg");

    let summary = run(&path, date!(2024 - 05 - 02), None, &ReaderOptions::default()).unwrap();
    let err = write_chart(&summary, &output, ChartOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Chart(ChartError::Draw(_))), "{err:?}");
}

#[test]
fn infinite_power_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "export.csv",
        "meta\nTimestamp;Power Avg [kW]\n2024-05-02 00:00;inf\n2024-05-02 00:15;1\n",
    );

    let err = run(&path, date!(2024 - 05 - 02), None, &ReaderOptions::default()).unwrap_err();
    assert!(
        matches!(err, Error::Read(ReadError::BadPower { row: 3, ref value }) if value == "inf"),
        "{err:?}"
    );
}
