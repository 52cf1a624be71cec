use args::{parse_args, Args};
use auto_updater::{
    config::{Config, ConfigError},
    reconcile::{Reconcile, Reconciler},
    runner::process::ProcessRunner,
    schedule::Scheduler,
};
use log::{error, info};
use logger::init_logger;
use std::{env, process};
use thiserror::Error;

mod args;
mod logger;

#[derive(Debug, Error)]
pub enum MainError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("cannot determine the current directory: {0}")]
    WorkingDirectory(std::io::Error),
    #[error("cannot open log file {0}: {1}")]
    LogFile(String, std::io::Error),
    #[error("cannot set up the logger: {0}")]
    FailedLogger(#[from] log::SetLoggerError),
    #[error("cannot determine the local timezone for the logger")]
    FailedLoggerTimezones,
}

fn print_banner(config: &Config) {
    info!("auto-updater started.");
    info!("Repository: {}", config.repository.display());
    info!("Branch: {}", config.branch);
    info!("Interval: every {} minutes", config.interval.as_secs() / 60);
    info!(
        "Restart: {}",
        config
            .restart_command
            .as_deref()
            .unwrap_or("(not configured)")
    );
}

fn main_inner(args: Args) -> Result<bool, MainError> {
    let working_directory = env::current_dir().map_err(MainError::WorkingDirectory)?;
    let config = Config::load(|key| env::var(key).ok(), args.overrides(), working_directory)?;
    init_logger(&args, config.log_file.as_deref())?;
    print_banner(&config);

    let runner = ProcessRunner::with_timeout(config.command_timeout);
    let scheduler = Scheduler::new(config.interval);
    let reconciler = Reconciler::new(config, Box::new(runner));

    if args.once {
        let outcome = reconciler.reconcile();
        return Ok(!outcome.is_failed());
    }

    scheduler.run(&reconciler);
    Ok(true)
}

fn main() {
    let args = parse_args();

    if args.version {
        println!("auto-updater {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    match main_inner(args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            error!("{err}");
            eprintln!("{err}");
            process::exit(1);
        }
    }
}
