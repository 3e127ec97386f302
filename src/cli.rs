//! Command-line parsing

use std::path::PathBuf;
use std::time::Duration;

use crate::core::control::ControlCommand;
use crate::domain::{ParseRegionError, Region};

pub const USAGE: &str = "\
Usage:
  shotdrop [tray]                       run the tray application
  shotdrop screenshot [--region X,Y,W,H]
  shotdrop record [--region X,Y,W,H] [--duration SECS] [--fps N]
  shotdrop upload FILE
  shotdrop config                       write the default config if missing
  shotdrop --screenshot | --toggle-recording | --quit
                                        control the running tray instance";

/// What the invocation asks for
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Tray,
    Screenshot {
        region: Option<Region>,
    },
    Record {
        region: Option<Region>,
        duration: Option<Duration>,
        framerate: Option<u32>,
    },
    Upload {
        path: PathBuf,
    },
    Config,
    Control(ControlCommand),
    Help,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid region: {0}")]
    InvalidRegion(#[from] ParseRegionError),

    #[error("invalid value for {flag}: {value}")]
    InvalidNumber { flag: String, value: String },

    #[error("upload requires a file path")]
    MissingFile,
}

/// Parse arguments, excluding the program name
pub fn parse<I>(args: I) -> Result<Command, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(first) = args.next() else {
        return Ok(Command::Tray);
    };

    let command = match first.as_str() {
        "tray" => Command::Tray,
        "-h" | "--help" | "help" => Command::Help,
        "config" => Command::Config,
        "screenshot" => parse_screenshot(&mut args)?,
        "record" => parse_record(&mut args)?,
        "upload" => {
            let path = args.next().ok_or(CliError::MissingFile)?;
            Command::Upload { path: path.into() }
        }
        flag => match ControlCommand::from_flag(flag) {
            Some(control) => Command::Control(control),
            None => return Err(CliError::UnknownCommand(flag.to_string())),
        },
    };

    match args.next() {
        Some(extra) => Err(CliError::UnexpectedArgument(extra)),
        None => Ok(command),
    }
}

fn parse_screenshot(args: &mut impl Iterator<Item = String>) -> Result<Command, CliError> {
    let mut region = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--region" => region = Some(value(args, &arg)?.parse::<Region>()?),
            _ => return Err(CliError::UnexpectedArgument(arg)),
        }
    }
    Ok(Command::Screenshot { region })
}

fn parse_record(args: &mut impl Iterator<Item = String>) -> Result<Command, CliError> {
    let mut region = None;
    let mut duration = None;
    let mut framerate = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--region" => region = Some(value(args, &arg)?.parse::<Region>()?),
            "--duration" => {
                let secs: u64 = number(args, &arg)?;
                duration = Some(Duration::from_secs(secs));
            }
            "--fps" => framerate = Some(number(args, &arg)?),
            _ => return Err(CliError::UnexpectedArgument(arg)),
        }
    }

    Ok(Command::Record {
        region,
        duration,
        framerate,
    })
}

fn value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, CliError> {
    args.next()
        .ok_or_else(|| CliError::MissingValue(flag.to_string()))
}

fn number<T>(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<T, CliError>
where
    T: std::str::FromStr,
{
    let raw = value(args, flag)?;
    match raw.parse() {
        Ok(n) => Ok(n),
        Err(_) => Err(CliError::InvalidNumber {
            flag: flag.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(line: &str) -> Result<Command, CliError> {
        parse(line.split_whitespace().map(String::from))
    }

    #[test]
    fn test_no_arguments_runs_tray() {
        assert_eq!(parse_str("").unwrap(), Command::Tray);
        assert_eq!(parse_str("tray").unwrap(), Command::Tray);
    }

    #[test]
    fn test_screenshot_with_region() {
        assert_eq!(
            parse_str("screenshot --region 10,20,300,200").unwrap(),
            Command::Screenshot {
                region: Some(Region::new(10, 20, 300, 200))
            }
        );
        assert_eq!(
            parse_str("screenshot").unwrap(),
            Command::Screenshot { region: None }
        );
    }

    #[test]
    fn test_record_options() {
        assert_eq!(
            parse_str("record --duration 30 --fps 15").unwrap(),
            Command::Record {
                region: None,
                duration: Some(Duration::from_secs(30)),
                framerate: Some(15),
            }
        );
    }

    #[test]
    fn test_upload_requires_path() {
        assert!(matches!(parse_str("upload"), Err(CliError::MissingFile)));
        assert_eq!(
            parse_str("upload /tmp/a.png").unwrap(),
            Command::Upload {
                path: PathBuf::from("/tmp/a.png")
            }
        );
    }

    #[test]
    fn test_control_flags() {
        assert_eq!(
            parse_str("--toggle-recording").unwrap(),
            Command::Control(ControlCommand::ToggleRecording)
        );
        assert_eq!(
            parse_str("--quit").unwrap(),
            Command::Control(ControlCommand::Quit)
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse_str("frobnicate"), Err(CliError::UnknownCommand(_))));
        assert!(matches!(parse_str("tray extra"), Err(CliError::UnexpectedArgument(_))));
        assert!(matches!(parse_str("record --fps"), Err(CliError::MissingValue(_))));
        assert!(matches!(
            parse_str("record --fps fast"),
            Err(CliError::InvalidNumber { .. })
        ));
        assert!(matches!(
            parse_str("screenshot --region 1,2,0,4"),
            Err(CliError::InvalidRegion(_))
        ));
    }
}
