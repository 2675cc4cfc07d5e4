use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use serde::Deserialize;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ngit: ",
    env!("VERGEN_GIT_DESCRIBE"),
    "\nttx: ",
    env!("TTX_VERSION"),
    "\nbuilt: ",
    env!("BUILD_TIMESTAMP"),
);

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for inspecting and decoding teletext streams",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat extraction warnings and packet errors as fatal.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress spinners during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// YAML file with decoder settings; command-line flags take precedence.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Decode a teletext stream and dump the received pages.
    Decode(DecodeArgs),

    /// Print stream information
    Info(InfoArgs),
}

/// Decoder settings shared by every subcommand.
#[derive(Debug, Default, Args)]
pub struct DecoderArgs {
    /// Input container format.
    #[arg(long, value_enum, default_value_t = InputFormat::Pes)]
    pub input_format: InputFormat,

    /// Initial current page in hex, e.g. 100.
    #[arg(long, value_name = "HEX")]
    pub page: Option<String>,

    /// Width of the caching window around the current page.
    #[arg(long, value_name = "N")]
    pub max_pages: Option<usize>,

    /// Policy for overwriting cached rows.
    #[arg(long, value_enum)]
    pub caching: Option<Caching>,

    /// Show characters that failed parity as spaces.
    #[arg(long)]
    pub substitute_spaces: bool,
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Input stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub decoder: DecoderArgs,

    /// Write the page dump to this file instead of stdout.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Page dump format.
    #[arg(long, value_enum, default_value_t = DumpFormat::Text)]
    pub dump_format: DumpFormat,

    /// Print the current page every time it changes.
    #[arg(long)]
    pub watch: bool,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    #[command(flatten)]
    pub decoder: DecoderArgs,
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
    /// Convert LogLevel to log::LevelFilter
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

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum InputFormat {
    /// PES packets with EBU teletext data units.
    #[default]
    Pes,
    /// Raw 42-byte packets in transmission bit order.
    T42,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum DumpFormat {
    /// Plain text, 24 rows per page.
    Text,
    /// One YAML document per page.
    Yaml,
}

#[derive(Debug, Clone, Copy, ValueEnum, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Caching {
    /// Replace rows on update or over errored copies.
    Normal,
    /// Also replace rows with any parity-clean copy.
    SecondChance,
    /// Always replace rows.
    AlwaysUpdate,
}
