//! A finished session's data and the two files it is saved as: a `.npy`
//! array of shape `(channels, samples)` and a comma separated text file with
//! one line per sample. Both are named after the session's start time with
//! millisecond precision, e.g. `emg_data_20241028_115040600.npy`.

use chrono::{DateTime, Local};
use log::info;
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use ndarray_npy::{read_npy, write_npy, ReadNpyError, WriteNpyError};
use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Prefix shared by both output files.
pub const FILE_PREFIX: &str = "emg_data_";

/// `strftime` pattern of the timestamp in file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S%3f";

/// Returned when a recording cannot be written.
#[derive(Debug)]
pub enum RecordingError {
    /// Writing the `.npy` array failed.
    Npy(WriteNpyError),
    /// Writing the CSV file failed.
    IoError(std::io::Error),
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npy(e) => write!(f, "could not write array file: {}", e),
            Self::IoError(e) => write!(f, "could not write text file: {}", e),
        }
    }
}

impl std::error::Error for RecordingError {}

impl From<WriteNpyError> for RecordingError {
    fn from(value: WriteNpyError) -> Self {
        Self::Npy(value)
    }
}

impl From<std::io::Error> for RecordingError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

/// Paths of a saved recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFiles {
    /// The `(channels, samples)` array.
    pub npy: PathBuf,
    /// One line per sample.
    pub csv: PathBuf,
}

/// Joins decoded blocks along the sample axis. Returns `None` when there
/// are no blocks or their channel counts differ.
pub fn join_blocks(blocks: &[Array2<f64>]) -> Option<Array2<f64>> {
    let views: Vec<ArrayView2<'_, f64>> = blocks.iter().map(Array2::view).collect();
    concatenate(Axis(1), &views).ok()
}

/// Reads back a `.npy` file written by [`Recording::save`].
pub fn read_recording(path: impl AsRef<Path>) -> Result<Array2<f64>, ReadNpyError> {
    read_npy(path)
}

/// The data of one finished session, with the time it started.
#[derive(Debug, Clone)]
pub struct Recording {
    started_at: DateTime<Local>,
    sample_rate: u32,
    matrix: Option<Array2<f64>>,
}

impl Recording {
    /// `matrix` is `None` when nothing was recorded.
    pub fn new(started_at: DateTime<Local>, sample_rate: u32, matrix: Option<Array2<f64>>) -> Self {
        Self {
            started_at,
            sample_rate,
            matrix,
        }
    }

    /// When the session started.
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Samples per second per channel.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The channels x samples data, if anything was recorded.
    pub fn matrix(&self) -> Option<&Array2<f64>> {
        self.matrix.as_ref()
    }

    /// Seconds of data held.
    pub fn duration_seconds(&self) -> f64 {
        self.matrix
            .as_ref()
            .map_or(0.0, |m| m.ncols() as f64 / self.sample_rate as f64)
    }

    /// The shared file stem, `emg_data_<timestamp>`.
    pub fn file_stem(&self) -> String {
        format!("{}{}", FILE_PREFIX, self.started_at.format(TIMESTAMP_FORMAT))
    }

    /// Writes the `.npy` and `.csv` files into `dir`. Returns `None` when
    /// there was nothing to save.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<Option<SavedFiles>, RecordingError> {
        let Some(matrix) = &self.matrix else {
            info!("No data recorded.");
            return Ok(None);
        };

        let stem = self.file_stem();
        let files = SavedFiles {
            npy: dir.as_ref().join(format!("{}.npy", stem)),
            csv: dir.as_ref().join(format!("{}.csv", stem)),
        };

        write_npy(&files.npy, matrix)?;
        info!("EMG data saved to {}", files.npy.display());

        let mut csv = BufWriter::new(File::create(&files.csv)?);
        write_csv(matrix, &mut csv)?;
        csv.flush()?;
        info!("EMG data saved to {}", files.csv.display());

        Ok(Some(files))
    }
}

/// Writes one line per sample, channels separated by commas.
pub fn write_csv(matrix: &Array2<f64>, out: &mut impl Write) -> std::io::Result<()> {
    for sample in matrix.t().rows() {
        let line: Vec<String> = sample.iter().map(f64::to_string).collect();
        writeln!(out, "{}", line.join(","))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::array;
    use std::fs;
    use tempfile::tempdir;

    fn start() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 10, 28, 11, 50, 40)
            .unwrap()
            + chrono::Duration::milliseconds(600)
    }

    #[test]
    fn file_stem_has_milliseconds() {
        let rec = Recording::new(start(), 2000, None);
        assert_eq!(rec.file_stem(), "emg_data_20241028_115040600");
    }

    #[test]
    fn empty_recording_writes_nothing() {
        let dir = tempdir().unwrap();
        let rec = Recording::new(start(), 2000, None);
        assert!(rec.save(dir.path()).unwrap().is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn saves_both_files() {
        let dir = tempdir().unwrap();
        let matrix = array![[1.0, 2.0, 3.0], [-0.5, 0.25, 0.0]];
        let rec = Recording::new(start(), 3, Some(matrix.clone()));
        assert_eq!(rec.duration_seconds(), 1.0);

        let files = rec.save(dir.path()).unwrap().unwrap();
        assert_eq!(read_recording(&files.npy).unwrap(), matrix);

        let csv = fs::read_to_string(&files.csv).unwrap();
        assert_eq!(csv, "1,-0.5\n2,0.25\n3,0\n");
    }

    #[test]
    fn joins_blocks_along_samples() {
        let a = array![[0.0, 1.0], [2.0, 3.0]];
        let b = array![[10.0], [11.0]];
        let joined = join_blocks(&[a, b]).unwrap();
        assert_eq!(joined, array![[0.0, 1.0, 10.0], [2.0, 3.0, 11.0]]);

        assert!(join_blocks(&[]).is_none());
        assert!(join_blocks(&[Array2::zeros((2, 1)), Array2::zeros((3, 1))]).is_none());
    }

    #[test]
    fn oversized_header_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.npy");

        let dict = "{'descr': '<f8', 'fortran_order': False, 'shape': (4611686018427387904, 8), }";
        // magic, version, header length, then the dict padded to 64 bytes
        let padded = 64 - (10 + dict.len() + 1) % 64;
        let header = format!("{}{}\n", dict, " ".repeat(padded % 64));
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend((header.len() as u16).to_le_bytes());
        bytes.extend(header.as_bytes());
        bytes.extend([0u8; 64]);
        fs::write(&path, bytes).unwrap();

        assert!(read_recording(&path).is_err());
    }
}
