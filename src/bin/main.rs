//! CLI tool for idlescope

#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "idlescope")]
#[command(about = "Idle-state and frequency residency statistics from kernel traces", long_about = None)]
#[command(version)]
struct Cli {
    /// Trace file to analyze (ftrace text or idlestat native)
    #[arg(short = 'f', long = "trace-file")]
    trace: PathBuf,

    /// Baseline trace to compare against
    #[arg(short = 'b', long)]
    baseline: Option<PathBuf>,

    /// Report format (default, csv, comparison)
    #[arg(short = 'r', long = "report-format")]
    format: Option<String>,

    /// Write the report to a file instead of stdout
    #[arg(short = 'o', long = "output-file")]
    output: Option<PathBuf>,

    /// Show C-state statistics
    #[arg(short = 'c', long)]
    idle: bool,

    /// Show P-state statistics
    #[arg(short = 'p', long)]
    frequency: bool,

    /// Show wake-up statistics
    #[arg(short = 'w', long)]
    wakeup: bool,

    /// Dump the populated topology as JSON instead of a report
    #[arg(long)]
    json: bool,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Report discarded intervals and duplicate wake-ups
    #[arg(short = 'v', long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only report warnings and errors
    #[arg(short = 'q', long)]
    quiet: bool,
}

#[cfg(feature = "cli")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use idlescope::report::{dump_json, render, ReportRegistry};
    use idlescope::trace::AdapterRegistry;
    use idlescope::{analyze, Config, Verbosity};
    use std::fs::File;
    use std::io::{BufWriter, Write};

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if cli.verbose {
        config.analysis.verbosity = Verbosity::Verbose;
    } else if cli.quiet {
        config.analysis.verbosity = Verbosity::Quiet;
    }
    if let Some(format) = &cli.format {
        config.report.format = format.clone();
    }
    if cli.idle || cli.frequency || cli.wakeup {
        config.report.idle = cli.idle;
        config.report.frequency = cli.frequency;
        config.report.wakeup = cli.wakeup;
    }

    let level = match config.analysis.verbosity {
        Verbosity::Quiet => "warn",
        Verbosity::Normal => "info",
        Verbosity::Verbose => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let reports = ReportRegistry::default();
    let mut report = reports.create(&config.report.format)?;

    let adapters = AdapterRegistry::default();
    let trace = adapters.load(&cli.trace)?;
    let mut analysis = analyze(&trace.description, trace.events, &config.analysis)?;

    if let Some(path) = &cli.baseline {
        let trace = adapters.load(path)?;
        let baseline = analyze(&trace.description, trace.events, &config.analysis)?;
        analysis.attach_baseline(baseline)?;
    }

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };

    if cli.json {
        dump_json(&analysis, &mut out)?;
    } else {
        render(&analysis, report.as_mut(), &config.report, &mut out)?;
    }

    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI features not enabled. Please compile with --features cli");
    std::process::exit(1);
}
