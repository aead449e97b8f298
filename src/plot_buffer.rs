//! Keeps the last few seconds of a few channels for the live plot.

use ndarray::{s, Array2};

/// A fixed-width window per plotted channel. New samples enter on the right
/// and push old ones out on the left; the window starts out filled with
/// zeros.
#[derive(Debug, Clone)]
pub struct PlotBuffer {
    channels: Vec<usize>,
    width: usize,
    data: Vec<Vec<f64>>,
}

impl PlotBuffer {
    /// `channels` are rows of the incoming blocks; `width` is in samples.
    pub fn new(channels: Vec<usize>, width: usize) -> Self {
        let data = vec![vec![0.0; width]; channels.len()];
        Self {
            channels,
            width,
            data,
        }
    }

    /// Block rows shown, in plot order.
    pub fn channels(&self) -> &[usize] {
        &self.channels
    }

    /// Samples per window.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Shifts `block` into the window. Channels the block does not have are
    /// left alone.
    pub fn push(&mut self, block: &Array2<f64>) {
        let take = block.ncols().min(self.width);
        if take == 0 {
            return;
        }

        for (window, &channel) in self.data.iter_mut().zip(&self.channels) {
            if channel >= block.nrows() {
                continue;
            }
            let newest = block.slice(s![channel, block.ncols() - take..]);
            window.rotate_left(take);
            for (slot, &value) in window[self.width - take..].iter_mut().zip(newest) {
                *slot = value;
            }
        }
    }

    /// The window of the `i`-th plotted channel.
    pub fn window(&self, i: usize) -> &[f64] {
        &self.data[i]
    }

    /// `(seconds, value)` points for a chart, time running from
    /// `-width / sample_rate` up to zero.
    pub fn points(&self, i: usize, sample_rate: f64) -> Vec<(f64, f64)> {
        let width = self.width as f64;
        self.data[i]
            .iter()
            .enumerate()
            .map(|(s, &v)| ((s as f64 - width + 1.0) / sample_rate, v))
            .collect()
    }
}
