//! Shifts the timestamp embedded in processed EMG file names, e.g.
//! `processed_emg_data_20241028_115040600_bad_channels.npy`, by a fixed
//! offset. Used to line up the amplifier's recordings with the other
//! sensors after the acquisition delay was measured.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use log::{info, warn};
use nom::{
    bytes::complete::{tag, take_while_m_n},
    character::complete::char,
    combinator::rest,
    sequence::{preceded, separated_pair, tuple},
    IResult,
};
use std::{
    fs, io,
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

/// Offset applied when none is given on the command line.
pub const DEFAULT_DELTA_SECONDS: f64 = 0.2;

/// Prefix of the files that get renamed.
pub const PROCESSED_PREFIX: &str = "processed_emg_data_";

/// Where a participant's processed amplifier files live, relative to the
/// participant folder.
pub const PROCESSED_SUBFOLDER: [&str; 2] = ["Processed EMG Data", "Processed OTB+"];

/// `<base>/P(<i>)`
pub fn participant_dir(base: impl AsRef<Path>, participant: u32) -> PathBuf {
    base.as_ref().join(format!("P({})", participant))
}

/// Converts fractional seconds into a [`Duration`], rounded to whole
/// microseconds.
pub fn seconds(delta: f64) -> Duration {
    Duration::microseconds((delta * 1e6).round() as i64)
}

fn digits(count: usize) -> impl Fn(&str) -> IResult<&str, &str> {
    move |s| take_while_m_n(count, count, |c: char| c.is_ascii_digit())(s)
}

/// `YYYYMMDD_HHMMSSmmm` into its date and time parts.
fn timestamp_parts(s: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(digits(8), char('_'), digits(9))(s)
}

fn file_name_parts(s: &str) -> IResult<&str, ((&str, &str), &str)> {
    preceded(tag(PROCESSED_PREFIX), tuple((timestamp_parts, rest)))(s)
}

/// Parses `YYYYMMDD_HHMMSSmmm`.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let (remaining, (date, time)) = timestamp_parts(s).ok()?;
    if !remaining.is_empty() {
        return None;
    }
    let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    let field = |range: std::ops::Range<usize>| time[range].parse::<u32>().ok();
    date.and_hms_milli_opt(field(0..2)?, field(2..4)?, field(4..6)?, field(6..9)?)
}

/// Formats back to `YYYYMMDD_HHMMSSmmm`; sub-millisecond precision is
/// truncated.
pub fn format_timestamp(t: NaiveDateTime) -> String {
    format!(
        "{}{:03}",
        t.format("%Y%m%d_%H%M%S"),
        t.nanosecond() % 1_000_000_000 / 1_000_000
    )
}

/// Adds `delta` to a `YYYYMMDD_HHMMSSmmm` timestamp.
pub fn shift_timestamp(s: &str, delta: Duration) -> Option<String> {
    let t = parse_timestamp(s)?;
    Some(format_timestamp(t.checked_add_signed(delta)?))
}

/// The new name for `name`, or `None` if it is not a processed `.npy` or
/// `.png` file with a valid timestamp.
pub fn retimed_name(name: &str, delta: Duration) -> Option<String> {
    let (_, ((date, time), suffix)) = file_name_parts(name).ok()?;
    if !(suffix.ends_with(".npy") || suffix.ends_with(".png")) {
        return None;
    }
    let shifted = shift_timestamp(&format!("{}_{}", date, time), delta);
    if shifted.is_none() {
        warn!("Skipping file due to timestamp adjustment error: {}", name);
    }
    Some(format!("{}{}{}", PROCESSED_PREFIX, shifted?, suffix))
}

/// What a pass over one folder did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RenameReport {
    /// `(from, to)` pairs, in the order they were renamed.
    pub renamed: Vec<(PathBuf, PathBuf)>,
    /// Matching files that were left alone.
    pub skipped: Vec<PathBuf>,
}

/// Renames every matching file directly inside `dir`. Files whose new
/// name is already taken are skipped rather than overwritten.
pub fn retime_folder(dir: impl AsRef<Path>, delta: Duration) -> io::Result<RenameReport> {
    let dir = dir.as_ref();
    let mut report = RenameReport::default();

    let mut names: Vec<String> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map_or(false, |t| t.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    // Later files go first on a positive shift, earlier ones on a negative.
    names.sort_unstable();
    if delta > Duration::zero() {
        names.reverse();
    }

    for name in names {
        let from = dir.join(&name);
        let Some(new_name) = retimed_name(&name, delta) else {
            continue;
        };
        let to = dir.join(&new_name);

        if to.exists() {
            warn!(
                "Cannot rename '{}' -> '{}': target file already exists.",
                name, new_name
            );
            report.skipped.push(from);
            continue;
        }

        match fs::rename(&from, &to) {
            Ok(()) => {
                info!("Renamed '{}' -> '{}'", name, new_name);
                report.renamed.push((from, to));
            }
            Err(e) => {
                warn!("Error renaming '{}' -> '{}': {}", name, new_name, e);
                report.skipped.push(from);
            }
        }
    }

    Ok(report)
}

/// Runs [`retime_folder`] over the processed folder of each participant
/// in `participants`. Missing folders are logged and passed over.
pub fn retime_participants(
    base: impl AsRef<Path>,
    participants: RangeInclusive<u32>,
    delta: Duration,
) -> io::Result<Vec<RenameReport>> {
    let mut reports = Vec::new();
    for participant in participants {
        let folder = PROCESSED_SUBFOLDER
            .iter()
            .fold(participant_dir(&base, participant), |p, s| p.join(s));
        if !folder.is_dir() {
            warn!("[Participant P({})] Folder not found: {}", participant, folder.display());
            continue;
        }
        info!("[Participant P({})] Renaming files in: {}", participant, folder.display());
        reports.push(retime_folder(&folder, delta)?);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn shifts_by_two_tenths() {
        assert_eq!(
            shift_timestamp("20241028_115040600", seconds(0.2)).unwrap(),
            "20241028_115040800"
        );
    }

    #[test]
    fn carries_across_midnight() {
        assert_eq!(
            shift_timestamp("20241231_235959900", seconds(0.2)).unwrap(),
            "20250101_000000100"
        );
        assert_eq!(
            shift_timestamp("20241101_000000100", seconds(-0.2)).unwrap(),
            "20241031_235959900"
        );
    }

    #[test]
    fn rejects_bad_timestamps() {
        assert_eq!(shift_timestamp("20241028_255040600", seconds(0.2)), None);
        assert_eq!(shift_timestamp("20241328_115040600", seconds(0.2)), None);
        assert_eq!(shift_timestamp("2024102_115040600", seconds(0.2)), None);
    }

    #[test]
    fn names_keep_their_suffix() {
        let d = seconds(0.2);
        assert_eq!(
            retimed_name("processed_emg_data_20241028_115040600_bad_channels.npy", d).unwrap(),
            "processed_emg_data_20241028_115040800_bad_channels.npy"
        );
        assert_eq!(
            retimed_name("processed_emg_data_20241028_115040600.png", d).unwrap(),
            "processed_emg_data_20241028_115040800.png"
        );
        assert_eq!(retimed_name("processed_emg_data_20241028_115040600.csv", d), None);
        assert_eq!(retimed_name("emg_data_20241028_115040600.npy", d), None);
    }

    #[test]
    fn renames_in_place() {
        let dir = tempdir().unwrap();
        let keep = dir.path().join("notes.txt");
        fs::write(&keep, "x").unwrap();
        fs::write(dir.path().join("processed_emg_data_20241028_115040600.npy"), "a").unwrap();
        fs::write(dir.path().join("processed_emg_data_20241028_115040800.npy"), "b").unwrap();

        let report = retime_folder(dir.path(), seconds(0.2)).unwrap();
        assert_eq!(report.renamed.len(), 2);
        assert!(report.skipped.is_empty());

        let read = |name: &str| fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("processed_emg_data_20241028_115040800.npy"), "a");
        assert_eq!(read("processed_emg_data_20241028_115041000.npy"), "b");
        assert!(!dir.path().join("processed_emg_data_20241028_115040600.npy").exists());
        assert!(keep.exists());
    }

    #[test]
    fn never_overwrites() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("processed_emg_data_20241028_115040600.npy"), "a").unwrap();
        let taken = dir.path().join("processed_emg_data_20241028_115040800.npy");
        fs::create_dir(&taken).unwrap();

        let report = retime_folder(dir.path(), seconds(0.2)).unwrap();
        assert!(report.renamed.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert!(dir.path().join("processed_emg_data_20241028_115040600.npy").exists());
        assert!(taken.is_dir());
    }

    #[test]
    fn negative_shift_walks_forward() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("processed_emg_data_20241028_115040600.npy"), "a").unwrap();
        fs::write(dir.path().join("processed_emg_data_20241028_115040800.npy"), "b").unwrap();

        let report = retime_folder(dir.path(), seconds(-0.2)).unwrap();
        assert_eq!(report.renamed.len(), 2);
        let read = |name: &str| fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("processed_emg_data_20241028_115040400.npy"), "a");
        assert_eq!(read("processed_emg_data_20241028_115040600.npy"), "b");
    }

    #[test]
    fn walks_participant_folders() {
        let base = tempdir().unwrap();
        let folder = participant_dir(base.path(), 2)
            .join("Processed EMG Data")
            .join("Processed OTB+");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("processed_emg_data_20241028_115040600.npy"), "a").unwrap();

        let reports = retime_participants(base.path(), 1..=3, seconds(0.2)).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(folder.join("processed_emg_data_20241028_115040800.npy").exists());
    }
}
