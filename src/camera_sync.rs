//! Gives camera recording folders millisecond timestamps.
//!
//! The camera software names each recording after its start time to the
//! second (`recording_14_47_20`, sometimes with a `_gmt+1` style suffix) but
//! logs the moment it switches to the new recording with microsecond
//! resolution. For every recording folder we look up the closest
//! `Setting active recording` log line and rename the folder to
//! `recording_14_47_20.123`.
//!
//! On disk a camera data folder looks like
//!
//! ```text
//! Camera Data Timestamped/
//!     logs_info_and_settings/logs/log_*.log
//!     recording_sessions/session_2024-11-18_14_15_03/recording_14_47_20/
//! ```

use crate::retime::participant_dir;

use chrono::{NaiveDate, NaiveDateTime};
use log::{info, warn};
use nom::{
    bytes::complete::{tag, take_until},
    character::complete::{char, u32 as decimal},
    combinator::rest,
    sequence::{delimited, preceded, tuple},
    IResult,
};
use std::{
    fs, io,
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

/// Log lines marking the start of a recording contain this, in any case.
pub const ACTIVE_RECORDING_MARKER: &str = "setting active recording";

/// Camera data folder names, preferred first.
pub const CAMERA_DIRS: [&str; 2] = ["Camera Data Timestamped", "Camera Data"];

/// Log folder, relative to the camera data folder.
pub const LOGS_SUBFOLDER: [&str; 2] = ["logs_info_and_settings", "logs"];

/// Sessions folder, relative to the camera data folder.
pub const SESSIONS_SUBFOLDER: &str = "recording_sessions";

const LOG_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const SESSION_TIME_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

fn bracketed(line: &str) -> IResult<&str, &str> {
    delimited(char('['), take_until("]"), char(']'))(line)
}

/// The timestamp of a `Setting active recording` line, `None` for any
/// other line.
pub fn parse_log_line(line: &str) -> Option<NaiveDateTime> {
    if !line.to_lowercase().contains(ACTIVE_RECORDING_MARKER) {
        return None;
    }
    let (_, stamp) = bracketed(line.trim_start()).ok()?;
    NaiveDateTime::parse_from_str(stamp, LOG_TIME_FORMAT).ok()
}

/// Every recording start found in the `log_*.log` files of `log_dir`, in
/// file name order.
pub fn gather_log_timestamps(log_dir: impl AsRef<Path>) -> io::Result<Vec<NaiveDateTime>> {
    let mut files: Vec<PathBuf> = fs::read_dir(log_dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("log_") && n.ends_with(".log"))
        })
        .collect();
    files.sort();

    let mut stamps = Vec::new();
    for file in files {
        let bytes = match fs::read(&file) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not read {}: {}", file.display(), e);
                continue;
            }
        };
        stamps.extend(String::from_utf8_lossy(&bytes).lines().filter_map(parse_log_line));
    }
    Ok(stamps)
}

/// The timestamp closest to `approx`; the earliest listed wins a tie.
pub fn closest(stamps: &[NaiveDateTime], approx: NaiveDateTime) -> Option<NaiveDateTime> {
    stamps
        .iter()
        .copied()
        .min_by_key(|&t| (t - approx).abs())
}

/// `session_YYYY-MM-DD_HH_MM_SS`
pub fn parse_session_name(name: &str) -> Option<NaiveDateTime> {
    let stamp = name.strip_prefix("session_")?;
    NaiveDateTime::parse_from_str(stamp, SESSION_TIME_FORMAT).ok()
}

fn recording_parts(name: &str) -> IResult<&str, (u32, u32, u32, &str)> {
    preceded(
        tag("recording_"),
        tuple((
            decimal,
            preceded(char('_'), decimal),
            preceded(char('_'), decimal),
            rest,
        )),
    )(name)
}

/// Hour, minute and second of `recording_HH_MM_SS[.mmm][_suffix]`.
/// Calibration recordings and seconds outside `0..=59` give `None`.
pub fn parse_recording_name(name: &str) -> Option<(u32, u32, u32)> {
    if name.to_lowercase().contains("calibration") {
        return None;
    }
    let (_, (hh, mm, ss, tail)) = recording_parts(name).ok()?;
    if !(tail.is_empty() || tail.starts_with('.') || tail.starts_with('_')) {
        return None;
    }
    if ss > 59 {
        return None;
    }
    Some((hh, mm, ss))
}

/// `recording_HH_MM_SS.mmm`
pub fn recording_name(start: NaiveDateTime) -> String {
    format!("recording_{}", start.format("%H_%M_%S%.3f"))
}

/// Renames the recordings of one session folder. Returns the `(from, to)`
/// pairs that were renamed.
pub fn sync_session(
    session_dir: impl AsRef<Path>,
    log_stamps: &[NaiveDateTime],
) -> io::Result<Vec<(PathBuf, PathBuf)>> {
    let session_dir = session_dir.as_ref();
    let session_name = session_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let Some(session_date) = parse_session_name(session_name).map(|t| t.date()) else {
        warn!(
            "Skipping '{}': not matching 'session_YYYY-MM-DD_HH_MM_SS'.",
            session_name
        );
        return Ok(Vec::new());
    };

    let mut renamed = Vec::new();
    for entry in fs::read_dir(session_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.starts_with("recording_") {
            continue;
        }
        if let Some(pair) = sync_recording(session_dir, &name, session_date, log_stamps) {
            renamed.push(pair);
        }
    }
    Ok(renamed)
}

fn sync_recording(
    session_dir: &Path,
    name: &str,
    session_date: NaiveDate,
    log_stamps: &[NaiveDateTime],
) -> Option<(PathBuf, PathBuf)> {
    let Some((hh, mm, ss)) = parse_recording_name(name) else {
        info!("  Skipping folder '{}'.", name);
        return None;
    };
    let Some(approx) = session_date.and_hms_opt(hh, mm, ss) else {
        warn!("  Skipping folder '{}': invalid time of day.", name);
        return None;
    };
    let Some(start) = closest(log_stamps, approx) else {
        warn!("  No suitable timestamp found for '{}' in logs.", name);
        return None;
    };

    let new_name = recording_name(start);
    if new_name == name {
        return None;
    }
    let from = session_dir.join(name);
    let to = session_dir.join(&new_name);
    if to.exists() {
        warn!("  Could not rename '{}' -> '{}': target exists.", name, new_name);
        return None;
    }
    match fs::rename(&from, &to) {
        Ok(()) => {
            info!("  Renamed '{}' -> '{}'", name, new_name);
            Some((from, to))
        }
        Err(e) => {
            warn!("  Could not rename '{}' -> '{}' due to: {}", name, new_name, e);
            None
        }
    }
}

/// Syncs every session under a camera data folder against its logs.
pub fn sync_camera_dir(camera_dir: impl AsRef<Path>) -> io::Result<Vec<(PathBuf, PathBuf)>> {
    let camera_dir = camera_dir.as_ref();
    let logs_dir = LOGS_SUBFOLDER
        .iter()
        .fold(camera_dir.to_path_buf(), |p, s| p.join(s));
    let sessions_dir = camera_dir.join(SESSIONS_SUBFOLDER);

    if !logs_dir.is_dir() {
        warn!("No 'logs' folder in {}.", camera_dir.display());
        return Ok(Vec::new());
    }
    if !sessions_dir.is_dir() {
        warn!("No '{}' folder in {}.", SESSIONS_SUBFOLDER, camera_dir.display());
        return Ok(Vec::new());
    }

    let stamps = gather_log_timestamps(&logs_dir)?;
    info!("Processing {}", sessions_dir.display());

    let mut renamed = Vec::new();
    for entry in fs::read_dir(&sessions_dir)? {
        let entry = entry?;
        let is_session = entry
            .file_name()
            .to_str()
            .map_or(false, |n| n.starts_with("session_"));
        if is_session && entry.file_type()?.is_dir() {
            renamed.extend(sync_session(entry.path(), &stamps)?);
        }
    }
    Ok(renamed)
}

/// The camera data folder of a participant, if there is one.
pub fn camera_dir_for(participant_dir: impl AsRef<Path>) -> Option<PathBuf> {
    CAMERA_DIRS
        .iter()
        .map(|name| participant_dir.as_ref().join(name))
        .find(|dir| dir.is_dir())
}

/// Runs [`sync_camera_dir`] for each participant in `participants`.
pub fn sync_participants(
    base: impl AsRef<Path>,
    participants: RangeInclusive<u32>,
) -> io::Result<Vec<(PathBuf, PathBuf)>> {
    let mut renamed = Vec::new();
    for participant in participants {
        let dir = participant_dir(&base, participant);
        if !dir.is_dir() {
            warn!("Participant folder 'P({})' not found. Skipping.", participant);
            continue;
        }
        match camera_dir_for(&dir) {
            Some(camera_dir) => renamed.extend(sync_camera_dir(camera_dir)?),
            None => warn!("No camera data folder for P({}). Skipping.", participant),
        }
    }
    Ok(renamed)
}
