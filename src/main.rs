use std::io::Write;

use anyhow::Result;
use clap::Parser as ClapParser;
use env_logger::Builder;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::LevelFilter;

use cli::command::{Cli, Commands, LogFormat};
use cli::decode::cmd_decode;
use cli::info::cmd_info;

mod cli;
mod input;
mod timestamp;

/// Targets that follow `--loglevel`. Dependencies stay at warnings so that
/// per-packet tracing is not drowned out.
const LOG_TARGETS: [&str; 2] = ["ttx", "ttxd"];

fn logger_builder(cli: &Cli) -> Builder {
    let level = cli.loglevel.to_level_filter();

    let mut builder = Builder::from_default_env();
    builder.filter_level(level.min(LevelFilter::Warn));
    for target in LOG_TARGETS {
        builder.filter_module(target, level);
    }

    match cli.log_format {
        LogFormat::Plain => {
            builder.format_timestamp_millis().format_target(level >= LevelFilter::Debug);
        }
        LogFormat::Json => {
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "{{\"ts\":\"{}\",\"lvl\":\"{}\",\"target\":\"{}\",\"msg\":{:?}}}",
                    buf.timestamp_millis(),
                    record.level(),
                    record.target(),
                    record.args().to_string()
                )
            });
        }
    }

    builder
}

/// Installs the logger. With a progress display, records are routed through
/// `multi` so that log lines do not tear the spinner.
fn init_logging(cli: &Cli, multi: &MultiProgress) -> Result<()> {
    let mut builder = logger_builder(cli);

    if cli.progress {
        let logger = builder.build();
        // Per-target filters defeat the bridge's own level detection.
        let max_level = logger.filter();
        LogWrapper::new(multi.clone(), logger).try_init()?;
        log::set_max_level(max_level);
    } else {
        builder.try_init()?;
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let multi = MultiProgress::new();
    init_logging(&cli, &multi)?;
    let multi = cli.progress.then_some(&multi);

    match cli.command {
        Commands::Decode(ref args) => cmd_decode(args, &cli, multi)?,
        Commands::Info(ref args) => cmd_info(args, &cli, multi)?,
    }

    Ok(())
}
