//! Turns one raw block from the sync station into a channels x samples
//! [`Array2`] of millivolts.
//!
//! A block is a run of samples. Each sample holds, for every enabled device
//! in enable order, all of that device's channels back to back, followed by
//! the six sync/status channels. EMG channels are big-endian 16 bit two's
//! complement words; other channels are big-endian 24 bit two's complement.
//! Every value is scaled to millivolts by [`MILLIVOLTS_PER_LSB`].
//!
//! Nothing here checks the data for corruption. A block either lines up with
//! the layout and decodes, or the accumulator already gave up on the stream.

use crate::device_config::{AcquisitionConfig, DeviceLayout, SYNC_BYTES, SYNC_CHANNELS};

use ndarray::{Array2, ArrayViewMut1};

/// Conversion factor from raw counts to millivolts.
pub const MILLIVOLTS_PER_LSB: f64 = 0.000286;

/// Reinterprets `hi:lo` as a signed 16 bit count.
pub fn decode_i16(hi: u8, lo: u8) -> i32 {
    let raw = hi as i32 * 256 + lo as i32;
    if raw >= 32768 {
        raw - 65536
    } else {
        raw
    }
}

/// Reinterprets `b0:b1:b2` as a signed 24 bit count.
pub fn decode_i24(b0: u8, b1: u8, b2: u8) -> i32 {
    let raw = b0 as i32 * 65536 + b1 as i32 * 256 + b2 as i32;
    if raw >= 8388608 {
        raw - 16777216
    } else {
        raw
    }
}

/// Decodes 16 bit channels into `column[first_row..]`.
fn decode_words(bytes: &[u8], first_row: usize, column: &mut ArrayViewMut1<'_, f64>) {
    for (ch, word) in bytes.chunks_exact(2).enumerate() {
        column[first_row + ch] = decode_i16(word[0], word[1]) as f64 * MILLIVOLTS_PER_LSB;
    }
}

/// Decodes 24 bit channels into `column[first_row..]`.
fn decode_triples(bytes: &[u8], first_row: usize, column: &mut ArrayViewMut1<'_, f64>) {
    for (ch, triple) in bytes.chunks_exact(3).enumerate() {
        column[first_row + ch] =
            decode_i24(triple[0], triple[1], triple[2]) as f64 * MILLIVOLTS_PER_LSB;
    }
}

/// Knows the layout of one session's samples and decodes blocks with it.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    layout: Vec<DeviceLayout>,
    bytes_per_sample: usize,
    total_channels: usize,
}

impl FrameDecoder {
    /// Captures the sample layout of `config`; later changes to the config
    /// do not affect the decoder.
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            layout: config.layout(),
            bytes_per_sample: config.bytes_per_sample(),
            total_channels: config.total_channels(),
        }
    }

    /// Bytes in one sample, sync/status bytes included.
    pub fn bytes_per_sample(&self) -> usize {
        self.bytes_per_sample
    }

    /// Rows of every decoded block.
    pub fn total_channels(&self) -> usize {
        self.total_channels
    }

    /// Number of whole samples in `block`; a trailing partial sample is not
    /// counted.
    pub fn sample_count(&self, block: &[u8]) -> usize {
        block.len() / self.bytes_per_sample
    }

    /// Decodes every whole sample in `block` into one column each. Returns
    /// `None` when the block does not hold a single whole sample.
    pub fn decode(&self, block: &[u8]) -> Option<Array2<f64>> {
        let n_samples = self.sample_count(block);
        if n_samples == 0 {
            return None;
        }

        let mut out = Array2::zeros((self.total_channels, n_samples));
        let sync_row = self.total_channels - SYNC_CHANNELS;

        for (bytes, mut column) in block
            .chunks_exact(self.bytes_per_sample)
            .zip(out.columns_mut())
        {
            for DeviceLayout {
                device,
                rows,
                bytes: range,
            } in &self.layout
            {
                let device_bytes = &bytes[range.clone()];
                if device.emg {
                    decode_words(device_bytes, rows.start, &mut column);
                } else {
                    decode_triples(device_bytes, rows.start, &mut column);
                }
            }

            let sync_bytes = &bytes[self.bytes_per_sample - SYNC_BYTES..];
            decode_words(sync_bytes, sync_row, &mut column);
        }

        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_config::DeviceConfig;

    fn config(devices: Vec<DeviceConfig>) -> AcquisitionConfig {
        AcquisitionConfig {
            devices,
            ..Default::default()
        }
    }

    fn device(index: u8, emg: bool, channels: usize) -> DeviceConfig {
        DeviceConfig {
            index,
            emg,
            mode: 0,
            channels,
        }
    }

    #[test]
    fn sixteen_bit_wraps_at_midpoint() {
        assert_eq!(decode_i16(0x80, 0x00), -32768);
        assert_eq!(decode_i16(0x00, 0x01), 1);
        assert_eq!(decode_i16(0xFF, 0xFF), -1);
        assert_eq!(decode_i16(0x7F, 0xFF), 32767);
    }

    #[test]
    fn twenty_four_bit_wraps_at_midpoint() {
        assert_eq!(decode_i24(0x80, 0x00, 0x00), -8388608);
        assert_eq!(decode_i24(0x7F, 0xFF, 0xFF), 8388607);
        assert_eq!(decode_i24(0xFF, 0xFF, 0xFF), -1);
        assert_eq!(decode_i24(0x00, 0x01, 0x00), 256);
    }

    #[test]
    fn emg_sample_scaled_to_millivolts() {
        let decoder = FrameDecoder::new(&config(vec![device(0, true, 1)]));
        let mut block = vec![0x80, 0x00];
        block.extend([0; SYNC_BYTES]);
        let m = decoder.decode(&block).unwrap();
        assert_eq!(m[[0, 0]], -32768.0 * 0.000286);

        let mut block = vec![0x00, 0x01];
        block.extend([0; SYNC_BYTES]);
        let m = decoder.decode(&block).unwrap();
        assert_eq!(m[[0, 0]], 1.0 * 0.000286);
    }

    #[test]
    fn non_emg_sample_uses_three_bytes() {
        let decoder = FrameDecoder::new(&config(vec![device(0, false, 1)]));
        let mut block = vec![0x80, 0x00, 0x00];
        block.extend([0; SYNC_BYTES]);
        let m = decoder.decode(&block).unwrap();
        assert_eq!(m.nrows(), 7);
        assert_eq!(m[[0, 0]], -8388608.0 * 0.000286);
    }

    #[test]
    fn partial_sample_is_dropped() {
        let decoder = FrameDecoder::new(&config(vec![device(0, true, 2)]));
        let per_sample = decoder.bytes_per_sample();
        assert_eq!(per_sample, 16);

        assert!(decoder.decode(&vec![0; per_sample - 1]).is_none());

        let m = decoder.decode(&vec![0; per_sample * 2 + 5]).unwrap();
        assert_eq!(m.ncols(), 2);
    }

    #[test]
    fn second_device_starts_after_first() {
        let decoder = FrameDecoder::new(&config(vec![device(1, true, 3), device(2, true, 5)]));
        let mut block = vec![0u8; decoder.bytes_per_sample()];
        // first channel of the second device lives after 3 words
        block[6] = 0x00;
        block[7] = 0x07;
        let m = decoder.decode(&block).unwrap();
        assert_eq!(m.nrows(), 3 + 5 + SYNC_CHANNELS);
        assert_eq!(m[[3, 0]], 7.0 * 0.000286);
        assert_eq!(m[[2, 0]], 0.0);
    }

    #[test]
    fn mixed_widths_and_sync_rows() {
        let decoder = FrameDecoder::new(&config(vec![device(0, true, 1), device(3, false, 2)]));
        // 2 + 6 + 12 bytes per sample
        let sample: Vec<u8> = [
            &[0x00, 0x02][..],
            &[0x00, 0x00, 0x03, 0xFF, 0xFF, 0xFE],
            &[0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF],
        ]
        .concat();
        let block = [sample.clone(), sample].concat();
        let m = decoder.decode(&block).unwrap();

        assert_eq!(m.ncols(), 2);
        for s in 0..2 {
            assert_eq!(m[[0, s]], 2.0 * MILLIVOLTS_PER_LSB);
            assert_eq!(m[[1, s]], 3.0 * MILLIVOLTS_PER_LSB);
            assert_eq!(m[[2, s]], -2.0 * MILLIVOLTS_PER_LSB);
            assert_eq!(m[[3, s]], 1.0 * MILLIVOLTS_PER_LSB);
            assert_eq!(m[[8, s]], -1.0 * MILLIVOLTS_PER_LSB);
        }
    }
}
