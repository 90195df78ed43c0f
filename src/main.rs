#![warn(clippy::all)]

// main entry point
use clap::Parser;
use log::{error, info, LevelFilter};
use nethook::commands::{self, Cli};
use nethook::settings::Config;
use nethook::utils::parse_level;
use std::env;
use std::io::Write;
use std::process::ExitCode;

/// Initialize the application logger
///
/// Level precedence: `--log-level`, then `RUST_LOG`, then the config file,
/// then Info.
fn init_logger(cli: &Cli) {
    let mut builder = env_logger::Builder::new();
    builder.format(|buf, record| {
        let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
        writeln!(
            buf,
            "[{}] {} - {}: {}",
            timestamp,
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(level) = &cli.log_level {
        builder.filter_level(parse_level(level));
    } else if let Ok(filters) = env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    } else {
        let level = Config::resolve_path(cli.command.config_path())
            .ok()
            .and_then(|path| Config::load(&path).ok())
            .and_then(|config| config.log_level)
            .map(|level| parse_level(&level))
            .unwrap_or(LevelFilter::Info);
        builder.filter_level(level);
    }

    builder.init();
}

/// Main entry point for the nethook tool
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(&cli);

    info!("nethook {} starting up", env!("CARGO_PKG_VERSION"));

    match commands::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
