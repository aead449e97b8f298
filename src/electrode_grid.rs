//! Maps electrode positions on the high-density grids to channel numbers,
//! so the live plot can show a handful of spread-out electrodes instead of
//! the first twelve channels.
//!
//! Each grid has 13 rows by 5 columns of electrodes. The top-left and the
//! bottom-right positions are not populated, and channels are numbered row
//! by row over the remaining 63 electrodes.

/// Electrode rows per grid.
pub const GRID_ROWS: usize = 13;
/// Electrode columns per grid.
pub const GRID_COLS: usize = 5;

/// Positions without an electrode.
pub const MISSING: [(usize, usize); 2] = [(0, 0), (GRID_ROWS - 1, GRID_COLS - 1)];

/// Corners, middle row and bottom-left; a rough outline of the muscle.
pub const DEFAULT_POSITIONS: [(usize, usize); 6] = [(0, 1), (0, 4), (6, 0), (6, 2), (6, 4), (12, 0)];

/// Most channels the monitor plots at once.
pub const MAX_PLOTTED: usize = 12;

/// Channel of the electrode at `(row, col)` within its grid, or `None` if
/// the position is empty or off the grid.
pub fn channel_at(row: usize, col: usize) -> Option<usize> {
    if row >= GRID_ROWS || col >= GRID_COLS || MISSING.contains(&(row, col)) {
        return None;
    }
    let linear = row * GRID_COLS + col;
    let skipped = MISSING
        .iter()
        .filter(|&&(r, c)| r * GRID_COLS + c < linear)
        .count();
    Some(linear - skipped)
}

/// Channels to plot for a chain of grids, where `grid_channels[i]` is the
/// number of channels grid `i` occupies in a decoded block. Positions
/// beyond a device's own channel count are skipped, so a small device never
/// borrows its neighbour's channels. Sorted and capped at [`MAX_PLOTTED`].
pub fn channels_to_plot(grid_channels: &[usize], positions: &[(usize, usize)]) -> Vec<usize> {
    let mut offset = 0;
    let mut channels: Vec<usize> = grid_channels
        .iter()
        .flat_map(|&count| {
            let base = offset;
            offset += count;
            positions
                .iter()
                .filter_map(move |&(row, col)| channel_at(row, col))
                .filter(move |&ch| ch < count)
                .map(move |ch| base + ch)
        })
        .collect();
    channels.sort_unstable();
    channels.truncate(MAX_PLOTTED);
    channels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_skips_missing_corners() {
        assert_eq!(channel_at(0, 0), None);
        assert_eq!(channel_at(0, 1), Some(0));
        assert_eq!(channel_at(1, 0), Some(4));
        assert_eq!(channel_at(12, 3), Some(62));
        assert_eq!(channel_at(12, 4), None);
        assert_eq!(channel_at(13, 0), None);
    }

    #[test]
    fn default_selection_for_two_grids() {
        assert_eq!(
            channels_to_plot(&[70, 70], &DEFAULT_POSITIONS),
            vec![0, 3, 29, 31, 33, 59, 70, 73, 99, 101, 103, 129]
        );
    }

    #[test]
    fn selection_is_capped() {
        assert_eq!(channels_to_plot(&[70, 70, 70], &DEFAULT_POSITIONS).len(), MAX_PLOTTED);
    }

    #[test]
    fn small_device_keeps_to_its_channels() {
        assert_eq!(
            channels_to_plot(&[8, 70], &DEFAULT_POSITIONS),
            vec![0, 3, 8, 11, 37, 39, 41, 67]
        );
        assert_eq!(channels_to_plot(&[2], &DEFAULT_POSITIONS), vec![0]);
    }
}
