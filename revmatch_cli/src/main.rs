mod render;

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use revmatch::{
    analyze_ratios, annotate, build_legend, load_rpm_bounds, parse_vehicle_config,
    read_drive_samples, read_readings, read_samples, segment, Annotated, Drivetrain,
    GroupOutcome, LegendEntry, Summary,
};
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::render::{
    derive_gear_path, render_guard, render_ratio_chart, render_time_series, ChartKind,
    TimeSeriesChart,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Rev-match telemetry plotting CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plot RPM and rev-match targets against time, coloured by gear
    Plot(PlotArgs),
    /// Compare measured RPM with drivetrain-derived RPM for each gear
    Ratios(RatiosArgs),
    /// Derive CurrentGear/RevMatch columns from recorded RPM and MPH
    Annotate(AnnotateArgs),
}

#[derive(Parser, Debug)]
struct PlotArgs {
    /// Telemetry CSV with Time, RPM, CurrentGear and RevMatch columns
    #[arg(default_value = "output.csv", value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Config file holding the RPM axis limits
    #[arg(short, long, default_value = "config.txt", value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// Output PNG figure path
    #[arg(long, default_value = "rpm_revmatch.png", value_hint = ValueHint::FilePath)]
    png: PathBuf,

    /// Output SVG figure path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Figure width in pixels
    #[arg(long, default_value_t = 1200)]
    width: u32,

    /// Figure height in pixels
    #[arg(long, default_value_t = 800)]
    height: u32,

    /// Also write the run summary as JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    summary_json: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct RatiosArgs {
    /// Telemetry CSV with RPM, CurrentGear and MPH columns
    #[arg(default_value = "output.csv", value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Vehicle config with tooth counts and wheel size (built-in table if omitted)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Base PNG path; one `<stem>_gear<N>` figure is written per gear
    #[arg(long, default_value = "ratios.png", value_hint = ValueHint::FilePath)]
    png: PathBuf,

    /// Base SVG path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Figure width in pixels
    #[arg(long, default_value_t = 1000)]
    width: u32,

    /// Figure height in pixels
    #[arg(long, default_value_t = 700)]
    height: u32,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct AnnotateArgs {
    /// Recording with RPM and MPH columns (Time is carried through if present)
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Vehicle config with tooth counts, RPM window and wheel size
    #[arg(short, long, default_value = "config.txt", value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "annotated.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Plot(args) => args.verbose,
        Command::Ratios(args) => args.verbose,
        Command::Annotate(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let writer = if logs_to_stdout(&cli.command) {
        BoxMakeWriter::new(io::stdout)
    } else {
        BoxMakeWriter::new(io::stderr)
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .try_init();

    match cli.command {
        Command::Plot(args) => handle_plot(args),
        Command::Ratios(args) => handle_ratios(args),
        Command::Annotate(args) => handle_annotate(args),
    }
}

/// Chart commands report next to the printed summary; `annotate` may stream
/// CSV on stdout, so its log lines go to stderr.
fn logs_to_stdout(command: &Command) -> bool {
    matches!(command, Command::Plot(_) | Command::Ratios(_))
}

fn handle_plot(args: PlotArgs) -> Result<()> {
    let bounds = match load_rpm_bounds(&args.config) {
        Ok(range) => {
            info!(
                "Using RPM limits from {}: {} - {}",
                args.config.display(),
                range.min,
                range.max
            );
            Some(range)
        }
        Err(fallback) => {
            warn!("{}", fallback);
            None
        }
    };

    let file = File::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let samples =
        read_samples(file).with_context(|| format!("failed to parse {}", args.input.display()))?;
    if samples.is_empty() {
        warn!("{} contains no samples", args.input.display());
    }

    let segments = segment(&samples);
    let legend = build_legend(&segments);
    debug!(
        "{} RPM segments, {} rev-match segments, {} legend entries",
        segments.rpm.len(),
        segments.revmatch.len(),
        legend.len()
    );

    let chart = TimeSeriesChart {
        segments: &segments,
        legend: &legend,
        bounds,
        size: (args.width, args.height),
    };
    match bounds {
        Some(range) => info!("Y-axis set to: {} - {} RPM", range.min, range.max),
        None => info!("Y-axis auto-scaled (config not available or invalid)"),
    }

    let mut targets = vec![(args.png.clone(), ChartKind::Png)];
    if let Some(svg) = args.svg.clone() {
        targets.push((svg, ChartKind::Svg));
    }
    for (path, kind) in targets {
        match render_guard(|| render_time_series(&chart, &path, kind)) {
            Ok(()) => info!("Wrote plot: {}", path.display()),
            Err(err) => warn!("Skipping {} render ({}): {}", kind, path.display(), err),
        }
    }

    let summary = Summary::from_samples(&samples);
    println!("{}", summary);

    if let Some(path) = args.summary_json.as_ref() {
        let text = serde_json::to_string_pretty(&summary_report(&summary, &legend))?;
        fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote summary: {}", path.display());
    }

    Ok(())
}

fn summary_report(summary: &Summary, legend: &[LegendEntry]) -> serde_json::Value {
    serde_json::json!({
        "summary": summary,
        "legend": legend,
    })
}

fn handle_ratios(args: RatiosArgs) -> Result<()> {
    let drivetrain = match args.config.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            parse_vehicle_config(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
                .drivetrain
        }
        None => Drivetrain::default(),
    };
    debug!("Drivetrain: {:?}", drivetrain);

    let file = File::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let samples = read_drive_samples(file)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;

    let outcomes = analyze_ratios(&samples, &drivetrain)
        .with_context(|| format!("ratio analysis of {} failed", args.input.display()))?;

    let missing = missing_gears(outcomes.iter().map(GroupOutcome::gear));
    if !missing.is_empty() {
        warn!("No samples recorded in gear(s) {:?}", missing);
    }

    let size = (args.width, args.height);
    for outcome in &outcomes {
        let curve = match outcome {
            GroupOutcome::Fitted(curve) => curve,
            GroupOutcome::Skipped { gear, distinct_rpm } => {
                warn!(
                    "Gear {}: {} distinct RPM value(s), need at least 2 for a linear fit; skipping",
                    gear, distinct_rpm
                );
                continue;
            }
        };
        info!(
            "Gear {}: {} samples, MPH = {:.6} x RPM + {:.3}",
            curve.gear,
            curve.measured.len(),
            curve.fit.slope,
            curve.fit.intercept
        );

        let mut targets = vec![(derive_gear_path(&args.png, curve.gear), ChartKind::Png)];
        if let Some(svg) = args.svg.as_ref() {
            targets.push((derive_gear_path(svg, curve.gear), ChartKind::Svg));
        }
        for (path, kind) in targets {
            match render_guard(|| render_ratio_chart(curve, size, &path, kind)) {
                Ok(()) => info!("Wrote plot: {}", path.display()),
                Err(err) => warn!("Skipping {} render ({}): {}", kind, path.display(), err),
            }
        }
    }

    Ok(())
}

/// Gears between 1 and the highest observed gear that have no samples.
fn missing_gears<I: IntoIterator<Item = u32>>(observed: I) -> Vec<u32> {
    let observed: BTreeSet<u32> = observed.into_iter().collect();
    match observed.iter().next_back() {
        Some(&top) => (1..=top).filter(|g| !observed.contains(g)).collect(),
        None => Vec::new(),
    }
}

fn handle_annotate(args: AnnotateArgs) -> Result<()> {
    let text = fs::read_to_string(&args.config)
        .with_context(|| format!("failed to read {}", args.config.display()))?;
    let config = parse_vehicle_config(&text)
        .with_context(|| format!("failed to parse {}", args.config.display()))?;
    info!(
        "Final drive {:.4}, {} gears, RPM window {} - {}, wheel {} in",
        config.drivetrain.final_drive,
        config.drivetrain.gears().count(),
        config.rpm_range.min,
        config.rpm_range.max,
        config.drivetrain.wheel_circumference_in
    );

    let file = File::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?;
    let readings = read_readings(file)
        .with_context(|| format!("failed to parse {}", args.input.display()))?;
    let rows = annotate(&readings, &config)?;

    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut writer = csv::Writer::from_writer(stdout.lock());
        write_annotated_rows(&rows, &mut writer)?;
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        write_annotated_rows(&rows, &mut writer)?;
        info!("Wrote {} rows: {}", rows.len(), args.output.display());
    }
    Ok(())
}

fn write_annotated_rows<W: Write>(rows: &[Annotated], writer: &mut csv::Writer<W>) -> Result<()> {
    let with_time = rows.iter().any(|r| r.time.is_some());
    let mut header = Vec::with_capacity(5);
    if with_time {
        header.push("Time");
    }
    header.extend(["RPM", "MPH", "CurrentGear", "RevMatch"]);
    writer.write_record(&header)?;

    for row in rows {
        let mut record = Vec::with_capacity(5);
        if with_time {
            record.push(row.time.map(|t| t.to_string()).unwrap_or_default());
        }
        record.push(row.rpm.to_string());
        record.push(format!("{:.1}", row.mph));
        record.push(row.gear.to_string());
        record.push(row.revmatch.to_string());
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}
