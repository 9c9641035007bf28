use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use vvc::utils::timing::FrameRate;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_DESCRIBE"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ", vvc ",
    env!("VVC_VERSION"),
    ")"
);

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for probing, packetizing and demultiplexing H.266/VVC elementary streams",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first malformed NAL unit).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn fail_level(&self) -> log::Level {
        if self.strict {
            log::Level::Warn
        } else {
            log::Level::Error
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check whether the input looks like a VVC elementary stream.
    Probe(ProbeArgs),

    /// Print stream and layer information
    Info(InfoArgs),

    /// Split the stream into one Annex-B file per layer sink.
    Demux(DemuxArgs),
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Input VVC bitstream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Report success even if the probe rejects the stream.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input VVC bitstream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Frame rate used for timestamps, e.g. 25, 29.97 or 30000/1001.
    #[arg(long, value_name = "RATE")]
    pub fps: Option<FrameRate>,

    /// Continue even if the probe rejects the stream.
    #[arg(long)]
    pub force: bool,

    /// Print the report as YAML.
    #[arg(long)]
    pub yaml: bool,
}

#[derive(Debug, Args)]
pub struct DemuxArgs {
    /// Input VVC bitstream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Base path for the sink files.
    #[arg(long, value_name = "PATH")]
    pub output_path: PathBuf,

    /// Frame rate used for timestamps, e.g. 25, 29.97 or 30000/1001.
    #[arg(long, value_name = "RATE")]
    pub fps: Option<FrameRate>,

    /// Continue even if the probe rejects the stream.
    #[arg(long)]
    pub force: bool,

    /// Only write the given sinks (repeatable). All sinks by default.
    #[arg(long = "sink", value_name = "N")]
    pub sinks: Vec<usize>,

    /// Write a YAML index of every access unit next to the sink files.
    #[arg(long)]
    pub index: bool,

    /// Disable progress estimation
    #[arg(long)]
    pub no_estimate_progress: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[test]
fn parse_demux_arguments() {
    let cli = Cli::try_parse_from([
        "vvcd",
        "--strict",
        "demux",
        "clip.266",
        "--output-path",
        "out/clip",
        "--fps",
        "30000/1001",
        "--sink",
        "0",
        "--sink",
        "2",
    ])
    .expect("valid arguments");

    assert_eq!(cli.fail_level(), log::Level::Warn);
    let Commands::Demux(args) = cli.command else {
        panic!("expected demux");
    };
    assert_eq!(args.sinks, [0, 2]);
    assert_eq!(args.fps.map(|rate| (rate.num(), rate.den())), Some((30000, 1001)));
    assert!(!args.index);
}
