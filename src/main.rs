mod cli;
mod clipboard;
mod config;
mod core;
mod domain;
mod notify;
mod screencast;
mod tray;
mod upload;

use std::process::ExitCode;

use cli::Command;
use config::AppConfig;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let command = match cli::parse(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("shotdrop: {}\n\n{}", e, cli::USAGE);
            return ExitCode::from(2);
        }
    };

    match run(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("shotdrop: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Help => {
            println!("{}", cli::USAGE);
            Ok(())
        }
        Command::Config => core::oneshot::write_default_config(),
        Command::Control(control) => core::oneshot::forward(control),
        Command::Tray => core::app::run(AppConfig::load()),
        Command::Screenshot { region } => core::oneshot::screenshot(&AppConfig::load(), region),
        Command::Record {
            region,
            duration,
            framerate,
        } => core::oneshot::record(&AppConfig::load(), region, duration, framerate),
        Command::Upload { path } => core::oneshot::upload(&AppConfig::load(), &path),
    }
}
