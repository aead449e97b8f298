//! Quick sanity check of a recording: a statistical fingerprint of the
//! whole array and of each channel, and a list of channels that look flat
//! (disconnected electrodes, a grid that never started streaming).

use ndarray::{Array2, ArrayBase, Data, Dimension};
use std::fmt;

/// Values within this distance of zero count as zero.
pub const NEAR_ZERO: f64 = 1e-8;

/// A channel is flat when more than this share of its values is near zero.
pub const FLAT_FRACTION: f64 = 0.95;

/// Summary of a set of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
}

impl Stats {
    /// `None` for an empty array.
    pub fn of<S, D>(values: &ArrayBase<S, D>) -> Option<Self>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let mean = values.mean()?;
        Some(Self {
            mean,
            std: values.std(0.0),
            min: values.fold(f64::INFINITY, |m, &v| m.min(v)),
            max: values.fold(f64::NEG_INFINITY, |m, &v| m.max(v)),
        })
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mean {:.6}  std {:.6}  min {:.6}  max {:.6}",
            self.mean, self.std, self.min, self.max
        )
    }
}

/// Statistics of one row of a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReport {
    /// Row index.
    pub channel: usize,
    /// Statistics of the row.
    pub stats: Stats,
    /// Share of values within [`NEAR_ZERO`] of zero.
    pub near_zero: f64,
}

impl ChannelReport {
    /// More than [`FLAT_FRACTION`] of the values are near zero.
    pub fn is_flat(&self) -> bool {
        self.near_zero > FLAT_FRACTION
    }
}

/// The fingerprint of a whole recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    /// Rows of the array.
    pub channels: usize,
    /// Columns of the array.
    pub samples: usize,
    /// `None` when the recording has no samples.
    pub overall: Option<Stats>,
    /// One report per channel that has samples.
    pub per_channel: Vec<ChannelReport>,
}

impl Inspection {
    /// Inspects a channels x samples array.
    pub fn of(matrix: &Array2<f64>) -> Self {
        let per_channel = matrix
            .outer_iter()
            .enumerate()
            .filter_map(|(channel, row)| {
                let stats = Stats::of(&row)?;
                let zeros = row.iter().filter(|v| v.abs() <= NEAR_ZERO).count();
                Some(ChannelReport {
                    channel,
                    stats,
                    near_zero: zeros as f64 / row.len() as f64,
                })
            })
            .collect();

        Self {
            channels: matrix.nrows(),
            samples: matrix.ncols(),
            overall: Stats::of(matrix),
            per_channel,
        }
    }

    /// Reports of the channels that look flat.
    pub fn flat_channels(&self) -> impl Iterator<Item = &ChannelReport> {
        self.per_channel.iter().filter(|c| c.is_flat())
    }
}

impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Shape: ({}, {})", self.channels, self.samples)?;
        match &self.overall {
            Some(stats) => writeln!(f, "All channels: {}", stats)?,
            None => return writeln!(f, "Recording is empty!"),
        }

        // {:#} lists every channel
        if f.alternate() {
            for report in &self.per_channel {
                writeln!(f, "  {:>4}: {}", report.channel, report.stats)?;
            }
        }

        let mut any_flat = false;
        for report in self.flat_channels() {
            any_flat = true;
            writeln!(
                f,
                "[WARNING] channel {} appears to be flat ({:.1}% of values are near-zero).",
                report.channel,
                report.near_zero * 100.0
            )?;
        }
        if !any_flat {
            writeln!(f, "All channels appear to have valid, non-flat data.")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn stats_of_an_array() {
        let s = Stats::of(&array![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(s.mean, 5.0);
        assert!((s.std - 2.0).abs() < 1e-12);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 9.0);
        assert_eq!(Stats::of(&Array1::<f64>::zeros(0)), None);
    }

    #[test]
    fn finds_flat_channels() {
        let mut rows = vec![0.0; 3 * 40];
        // channel 0 is alive, channel 1 has one blip, channel 2 has three
        for (i, v) in rows[..40].iter_mut().enumerate() {
            *v = (i as f64).sin();
        }
        rows[40] = 1.0;
        rows[80] = 1.0;
        rows[81] = 1.0;
        rows[82] = 1.0;
        let matrix = Array2::from_shape_vec((3, 40), rows).unwrap();

        let inspection = Inspection::of(&matrix);
        let flat: Vec<usize> = inspection.flat_channels().map(|c| c.channel).collect();
        assert_eq!(flat, vec![1]);
        assert!(inspection.to_string().contains("channel 1 appears to be flat (97.5%"));
        assert!(!inspection.to_string().contains("   2: mean"));
        assert!(format!("{:#}", inspection).contains("   2: mean"));
    }

    #[test]
    fn empty_recording() {
        let inspection = Inspection::of(&Array2::zeros((4, 0)));
        assert_eq!(inspection.overall, None);
        assert!(inspection.per_channel.is_empty());
        assert!(inspection.to_string().contains("empty"));
    }
}
