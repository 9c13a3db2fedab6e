use std::path::PathBuf;

use clap::Parser;
use miette::Result;
use power_avg::{write_chart, ChartOptions, Format, ReaderOptions};
use time::{macros::format_description, Date, OffsetDateTime};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "power-avg")]
#[command(about = "Energy used on a day, and the days around it, from a power-measurement export", long_about = None)]
struct Cli {
    /// CSV (`;` separated) or Excel export with `Timestamp` and `Power Avg [kW]` columns
    file: PathBuf,

    /// Day to check, as `YYYY-MM-DD` [default: today]
    #[arg(short, long, value_parser = parse_day)]
    day: Option<Date>,

    /// Input format (`csv`, `xlsx`, `xls`) when the extension is misleading
    #[arg(long)]
    format: Option<Format>,

    /// Where to write the SVG chart of the day
    #[arg(short, long, default_value = "power-avg.svg")]
    output: PathBuf,

    /// Skip the chart and only print the summary
    #[arg(long)]
    no_chart: bool,

    #[arg(long, default_value_t = 1200)]
    width: u32,

    #[arg(long, default_value_t = 600)]
    height: u32,

    /// CSV field separator
    #[arg(long, default_value_t = ';')]
    delimiter: char,

    /// Lines of metadata before the header row
    #[arg(long, default_value_t = 1)]
    skip_rows: usize,

    /// Power values use `,` as decimal separator
    #[arg(long)]
    decimal_comma: bool,

    #[arg(long, default_value = "Timestamp")]
    timestamp_column: String,

    #[arg(long, default_value = "Power Avg [kW]")]
    power_column: String,

    /// More logs on stderr, repeat for even more. `RUST_LOG` wins when set
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_day(s: &str) -> Result<Date, String> {
    Date::parse(s, format_description!("[year]-[month]-[day]")).map_err(|e| e.to_string())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if !cli.delimiter.is_ascii() {
        miette::bail!("The delimiter must be an ASCII character, got `{}`", cli.delimiter);
    }
    let options = ReaderOptions {
        delimiter: cli.delimiter as u8,
        skip_rows: cli.skip_rows,
        decimal: if cli.decimal_comma { ',' } else { '.' },
        timestamp_column: cli.timestamp_column,
        power_column: cli.power_column,
    };
    let day = cli.day.unwrap_or_else(|| {
        OffsetDateTime::now_local()
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
            .date()
    });
    tracing::info!(file = %cli.file.display(), %day, "computing energy");

    let summary = power_avg::run(&cli.file, day, cli.format, &options)?;

    if !cli.no_chart {
        write_chart(
            &summary,
            &cli.output,
            ChartOptions {
                width: cli.width,
                height: cli.height,
            },
        )?;
    }

    println!("{summary}");
    if !cli.no_chart {
        println!("Chart written to {}", cli.output.display());
    }

    Ok(())
}
