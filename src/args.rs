//! Commandline argument parser using clap for MyoSync

use crate::device_config::{AcquisitionConfig, ConfigError};
use crate::retime::DEFAULT_DELTA_SECONDS;

use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, time::Duration};

/// Parses a finite number of seconds, which may be negative.
fn finite_seconds(s: &str) -> Result<f64, String> {
    let seconds: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if !seconds.is_finite() {
        return Err(format!("{} is not a finite number of seconds", s));
    }
    Ok(seconds)
}

/// Parses a positive, finite number of seconds.
fn positive_seconds(s: &str) -> Result<Duration, String> {
    let seconds: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if !(seconds.is_finite() && seconds > 0.0) {
        return Err(format!("{} is not a positive number of seconds", s));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("{}", e))
}

/// Command line of the `myosync` binary.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct MyoArgs {
    #[command(subcommand, long_about)]
    /// Which task to perform
    pub command: CommandTask,
}

/// The tasks `myosync` can perform.
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Record EMG from the amplifier until Enter is pressed or time runs out
    #[command(about)]
    Record(RecordCommand),

    /// Log the 8-sensor board's serial output to a CSV file
    #[command(about)]
    Serial(SerialCommand),

    /// Shift the timestamps in processed EMG file names
    #[command(about)]
    Retime(RetimeCommand),

    /// Give camera recording folders millisecond timestamps from the logs
    #[command(about)]
    CameraSync(CameraSyncCommand),

    /// Print per-channel statistics of a saved recording
    #[command(about)]
    Inspect(InspectCommand),

    /// Print the default acquisition configuration as RON
    #[command(about)]
    Config,
}

/// Acquisition settings shared by `record` and the monitor
#[derive(Debug, Args, Clone)]
pub struct AcquisitionArgs {
    /// RON file with the acquisition configuration; the defaults match the
    /// two-grid setup
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory the recording is saved to, overriding the configuration
    #[arg(short = 'o', long = "out")]
    pub out_dir: Option<PathBuf>,
}

impl AcquisitionArgs {
    /// The configuration file if one was given, the defaults otherwise,
    /// with the output directory override applied.
    pub fn load(&self) -> Result<AcquisitionConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => AcquisitionConfig::from_path(path)?,
            None => AcquisitionConfig::default(),
        };
        if let Some(dir) = &self.out_dir {
            config.output_dir = dir.clone();
        }
        Ok(config)
    }
}

/// Arguments of `myosync record`.
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct RecordCommand {
    /// Where the configuration comes from
    #[command(flatten)]
    pub acquisition: AcquisitionArgs,

    /// Stop by itself after this many seconds
    #[arg(short, long, value_parser = positive_seconds)]
    pub seconds: Option<Duration>,

    /// Record from a simulated amplifier instead of the network
    #[arg(long)]
    pub dummy: bool,
}

/// Arguments of `myosync serial`.
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct SerialCommand {
    /// Serial port to read from; asks interactively when left out
    #[arg(short, long)]
    pub port: Option<PathBuf>,

    /// Directory the CSV file is written to
    #[arg(short = 'o', long = "out", default_value = ".")]
    pub out_dir: PathBuf,
}

/// Participants `P(first)` through `P(last)` under `base`
#[derive(Debug, Args, Clone)]
pub struct ParticipantArgs {
    /// Folder holding the `P(1)`, `P(2)`, ... participant folders
    #[arg(short, long)]
    pub base: Option<PathBuf>,

    /// First participant number
    #[arg(long, default_value_t = 1, requires = "base")]
    pub first: u32,

    /// Last participant number
    #[arg(long, default_value_t = 8, requires = "base")]
    pub last: u32,
}

/// Arguments of `myosync retime`.
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct RetimeCommand {
    /// Seconds to add to every timestamp, may be negative
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_DELTA_SECONDS,
        allow_hyphen_values = true,
        value_parser = finite_seconds
    )]
    pub delta: f64,

    /// Participant folders to walk
    #[command(flatten)]
    pub participants: ParticipantArgs,

    /// Folders to rename files in directly
    #[arg(conflicts_with = "base")]
    pub folders: Vec<PathBuf>,
}

/// Arguments of `myosync camera-sync`.
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct CameraSyncCommand {
    /// Participant folders to walk
    #[command(flatten)]
    pub participants: ParticipantArgs,

    /// A single camera data folder, the one holding
    /// `logs_info_and_settings` and `recording_sessions`
    #[arg(long, conflicts_with = "base")]
    pub camera_dir: Option<PathBuf>,
}

/// Arguments of `myosync inspect`.
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct InspectCommand {
    /// The `.npy` recording to inspect
    pub file: PathBuf,

    /// Also list every channel's statistics, not just the overview
    #[arg(short, long)]
    pub verbose: bool,
}

/// Command line of the `monitor` binary.
#[derive(Debug, Parser, Clone)]
#[clap(version, about = "Live terminal plot of an EMG acquisition")]
pub struct MonitorArgs {
    /// Where the configuration comes from
    #[command(flatten)]
    pub acquisition: AcquisitionArgs,

    /// Plot a simulated amplifier instead of the network
    #[arg(long)]
    pub dummy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definitions_are_consistent() {
        MyoArgs::command().debug_assert();
        MonitorArgs::command().debug_assert();
    }

    #[test]
    fn retime_defaults() {
        let args = MyoArgs::parse_from(["myosync", "retime", "a", "b"]);
        let CommandTask::Retime(cmd) = args.command else {
            panic!("expected retime");
        };
        assert_eq!(cmd.delta, DEFAULT_DELTA_SECONDS);
        assert_eq!(cmd.folders, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(cmd.participants.base.is_none());
    }

    #[test]
    fn retime_participants_with_negative_delta() {
        let args = MyoArgs::parse_from([
            "myosync", "retime", "--delta", "-0.5", "--base", "data", "--first", "2", "--last", "3",
        ]);
        let CommandTask::Retime(cmd) = args.command else {
            panic!("expected retime");
        };
        assert_eq!(cmd.delta, -0.5);
        assert_eq!(cmd.participants.base, Some(PathBuf::from("data")));
        assert_eq!((cmd.participants.first, cmd.participants.last), (2, 3));
    }

    #[test]
    fn folders_and_base_conflict() {
        assert!(MyoArgs::try_parse_from(["myosync", "retime", "--base", "data", "a"]).is_err());
        assert!(MyoArgs::try_parse_from(["myosync", "camera-sync", "--base", "d", "--camera-dir", "c"]).is_err());
    }

    #[test]
    fn record_flags() {
        let args = MyoArgs::parse_from(["myosync", "record", "--dummy", "-s", "2.5", "-o", "out"]);
        let CommandTask::Record(cmd) = args.command else {
            panic!("expected record");
        };
        assert!(cmd.dummy);
        assert_eq!(cmd.seconds, Some(Duration::from_millis(2500)));
        assert_eq!(cmd.acquisition.out_dir, Some(PathBuf::from("out")));
        assert_eq!(cmd.acquisition.load().unwrap().output_dir, PathBuf::from("out"));
    }

    #[test]
    fn record_seconds_must_be_positive() {
        for bad in ["--seconds=-1", "--seconds=0", "--seconds=inf", "--seconds=NaN", "--seconds=soon"] {
            assert!(
                MyoArgs::try_parse_from(["myosync", "record", bad]).is_err(),
                "{} was accepted",
                bad
            );
        }
        assert!(MyoArgs::try_parse_from(["myosync", "record", "--seconds=1e300"]).is_err());
        assert!(MyoArgs::try_parse_from(["myosync", "retime", "--delta", "inf", "a"]).is_err());
    }
}
