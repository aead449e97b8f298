//! An in-process stand-in for the sync station. It accepts the same start
//! and stop commands and streams synthetic sine-plus-noise samples in the
//! exact wire layout the real station uses, which makes it good for tests
//! and for trying the monitor without hardware.

use crate::command_frame::stop_frame;
use crate::crc8::crc8;
use crate::device_config::{AcquisitionConfig, SYNC_CHANNELS};
use crate::device_link::DeviceLink;
use crate::frame_decoder::MILLIVOLTS_PER_LSB;

use log::{debug, info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    collections::VecDeque,
    f64::consts::PI,
    io::{self, Read, Write},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// A command frame the dummy station received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A start frame with a valid checksum, as received.
    Start(Vec<u8>),
    /// The stop frame.
    Stop,
}

/// Shared record of received commands, readable after the device moved
/// into a worker thread.
pub type CommandLog = Arc<Mutex<Vec<Command>>>;

/// A simulated sync station behind the [`DeviceLink`] interface.
pub struct DummyDevice {
    config: AcquisitionConfig,
    amplitude: f64,
    noise: f64,
    realtime: bool,
    block_limit: Option<usize>,
    rng: StdRng,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    commands: CommandLog,
    streaming: bool,
    started: Option<Instant>,
    sample_index: usize,
}

/// Settings of a [`DummyDevice`], see [`DummyDevice::builder`].
pub struct DummyDeviceBuilder {
    config: AcquisitionConfig,
    amplitude: f64,
    noise: f64,
    realtime: bool,
    block_limit: Option<usize>,
    seed: u64,
}

impl DummyDeviceBuilder {
    /// Peak amplitude of the sine on every channel, in millivolts.
    pub fn amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Half-width of the uniform noise, in millivolts.
    pub fn noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Pace samples to the configured sample rate instead of producing
    /// them as fast as they are read.
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Hang up, as in a zero byte read, after this many whole blocks.
    pub fn block_limit(mut self, blocks: usize) -> Self {
        self.block_limit = Some(blocks);
        self
    }

    /// Seed of the noise generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// A device that stays silent until it receives a start frame.
    pub fn build(self) -> DummyDevice {
        DummyDevice {
            config: self.config,
            amplitude: self.amplitude,
            noise: self.noise,
            realtime: self.realtime,
            block_limit: self.block_limit,
            rng: StdRng::seed_from_u64(self.seed),
            inbox: Vec::new(),
            outbox: VecDeque::new(),
            commands: Arc::new(Mutex::new(Vec::new())),
            streaming: false,
            started: None,
            sample_index: 0,
        }
    }
}

/// Wire encoding of a signed 16 bit count.
pub fn encode_i16(count: i32) -> [u8; 2] {
    (count.clamp(i16::MIN as i32, i16::MAX as i32) as i16).to_be_bytes()
}

/// Wire encoding of a signed 24 bit count.
pub fn encode_i24(count: i32) -> [u8; 3] {
    let [_, b0, b1, b2] = (count.clamp(-8388608, 8388607) as u32 & 0x00FF_FFFF).to_be_bytes();
    [b0, b1, b2]
}

impl DummyDevice {
    /// Starts building a device that streams the layout of `config`.
    pub fn builder(config: &AcquisitionConfig) -> DummyDeviceBuilder {
        DummyDeviceBuilder {
            config: config.clone(),
            amplitude: 0.5,
            noise: 0.02,
            realtime: false,
            block_limit: None,
            seed: 0,
        }
    }

    /// Handle on the commands received so far.
    pub fn command_log(&self) -> CommandLog {
        Arc::clone(&self.commands)
    }

    fn record(&self, command: Command) {
        if let Ok(mut log) = self.commands.lock() {
            log.push(command);
        }
    }

    /// Splits complete frames off the front of the inbox.
    fn parse_commands(&mut self) {
        loop {
            let Some(&len_byte) = self.inbox.first() else {
                return;
            };
            let frame_len = if len_byte == 0 {
                2
            } else {
                (len_byte as usize - 1) / 2 + 2
            };
            if self.inbox.len() < frame_len {
                return;
            }

            let frame: Vec<u8> = self.inbox.drain(..frame_len).collect();
            let (body, trailer) = frame.split_at(frame_len - 1);
            if crc8(body, body.len()) != trailer[0] {
                warn!("Dummy station dropped a frame with a bad checksum: {:?}", frame);
                continue;
            }

            if frame[..] == stop_frame()[..] {
                info!("Dummy station stopped after {} samples", self.sample_index);
                self.streaming = false;
                self.record(Command::Stop);
            } else {
                info!("Dummy station started with {:?}", frame);
                self.streaming = true;
                self.started = Some(Instant::now());
                self.sample_index = 0;
                self.outbox.clear();
                self.record(Command::Start(frame));
            }
        }
    }

    fn sample_limit(&self) -> Option<usize> {
        self.block_limit
            .map(|blocks| blocks * self.config.samples_per_block())
    }

    /// Appends `n` synthetic samples to the outbox.
    fn generate(&mut self, n: usize) {
        let rate = self.config.sample_rate as f64;
        let layout = self.config.layout();

        for _ in 0..n {
            let t = self.sample_index as f64 / rate;
            let mut row = 0;
            for entry in &layout {
                for _ in 0..entry.device.channels {
                    let freq = 1.0 + (row % 10) as f64;
                    let noise = if self.noise > 0.0 {
                        self.rng.gen_range(-self.noise..self.noise)
                    } else {
                        0.0
                    };
                    let mv = self.amplitude * (2.0 * PI * freq * t).sin() + noise;
                    let count = (mv / MILLIVOLTS_PER_LSB).round() as i32;
                    if entry.device.emg {
                        self.outbox.extend(encode_i16(count));
                    } else {
                        self.outbox.extend(encode_i24(count));
                    }
                    row += 1;
                }
            }

            // first sync channel counts samples, the rest stay quiet
            self.outbox
                .extend(encode_i16((self.sample_index % 65536) as i32 - 32768));
            for _ in 1..SYNC_CHANNELS {
                self.outbox.extend(encode_i16(0));
            }

            self.sample_index += 1;
        }
    }
}

impl Read for DummyDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.outbox.is_empty() {
            if !self.streaming {
                return Ok(0);
            }

            let chunk = (self.config.sample_rate as usize / 50).max(1);
            let chunk = match self.sample_limit() {
                Some(limit) if self.sample_index >= limit => {
                    debug!("Dummy station reached its block limit, hanging up");
                    return Ok(0);
                }
                Some(limit) => chunk.min(limit - self.sample_index),
                None => chunk,
            };

            if self.realtime {
                if let Some(started) = self.started {
                    let due = Duration::from_secs_f64(
                        (self.sample_index + chunk) as f64 / self.config.sample_rate as f64,
                    );
                    if let Some(wait) = due.checked_sub(started.elapsed()) {
                        spin_sleep::sleep(wait);
                    }
                }
            }

            self.generate(chunk);
        }

        let n = buf.len().min(self.outbox.len());
        for (dst, src) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for DummyDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inbox.extend_from_slice(buf);
        self.parse_commands();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DeviceLink for DummyDevice {
    fn close(&mut self) -> io::Result<()> {
        self.streaming = false;
        self.outbox.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_frame::start_frame;
    use crate::device_config::DeviceConfig;
    use crate::frame_decoder::{decode_i16, decode_i24, FrameDecoder};

    fn small_config() -> AcquisitionConfig {
        AcquisitionConfig {
            devices: vec![
                DeviceConfig {
                    index: 0,
                    emg: true,
                    mode: 0,
                    channels: 2,
                },
                DeviceConfig {
                    index: 2,
                    emg: false,
                    mode: 1,
                    channels: 1,
                },
            ],
            sample_rate: 100,
            ..Default::default()
        }
    }

    #[test]
    fn encoders_invert_decoders() {
        for count in [-32768, -1, 0, 1, 32767] {
            let [hi, lo] = encode_i16(count);
            assert_eq!(decode_i16(hi, lo), count);
        }
        for count in [-8388608, -70000, -1, 0, 1, 8388607] {
            let [b0, b1, b2] = encode_i24(count);
            assert_eq!(decode_i24(b0, b1, b2), count);
        }
    }

    #[test]
    fn silent_until_started() {
        let mut device = DummyDevice::builder(&small_config()).build();
        let mut buf = [0u8; 16];
        assert_eq!(device.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn streams_decodable_blocks_until_limit() {
        let config = small_config();
        let mut device = DummyDevice::builder(&config)
            .noise(0.0)
            .block_limit(1)
            .build();
        let log = device.command_log();

        device.write_all(&start_frame(&config.devices)).unwrap();
        let mut block = Vec::new();
        device.read_to_end(&mut block).unwrap();
        assert_eq!(block.len(), config.block_size());

        let m = FrameDecoder::new(&config).decode(&block).unwrap();
        assert_eq!(m.ncols(), 100);
        assert_eq!(m.nrows(), 3 + SYNC_CHANNELS);
        // sine starts at zero, sample counter starts at the bottom
        assert_eq!(m[[0, 0]], 0.0);
        assert_eq!(m[[3, 0]], -32768.0 * MILLIVOLTS_PER_LSB);
        assert_eq!(m[[3, 1]], -32767.0 * MILLIVOLTS_PER_LSB);

        device.write_all(&stop_frame()).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![Command::Start(start_frame(&config.devices)), Command::Stop]
        );
    }

    #[test]
    fn bad_checksum_is_ignored() {
        let config = small_config();
        let mut device = DummyDevice::builder(&config).build();
        let mut frame = start_frame(&config.devices);
        *frame.last_mut().unwrap() ^= 0xFF;
        device.write_all(&frame).unwrap();
        assert!(device.command_log().lock().unwrap().is_empty());
        let mut buf = [0u8; 4];
        assert_eq!(device.read(&mut buf).unwrap(), 0);
    }
}
