//! Describes which amplifier slots of the sync station are in use and what
//! the resulting sample layout on the wire looks like.
//!
//! The station has sixteen physical slots. Only enabled slots appear in the
//! data stream, in slot order, so an [`AcquisitionConfig`] simply holds one
//! [`DeviceConfig`] per enabled slot.

use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt,
    fs::File,
    io::Read,
    ops::Range,
    path::{Path, PathBuf},
    time::Duration,
};

/// Number of physical slots on the sync station.
pub const NUM_SLOTS: usize = 16;

/// Highest acquisition mode the firmware accepts.
pub const MAX_MODE: u8 = 3;

/// The sync/status channels appended after the last device.
pub const SYNC_CHANNELS: usize = 6;

/// Every sync/status channel is sent as a 16 bit word.
pub const SYNC_BYTES: usize = SYNC_CHANNELS * 2;

/// Most channels a single device may declare.
pub const MAX_CHANNELS: usize = 256;

/// Largest raw block the receiver will allocate.
pub const MAX_BLOCK_BYTES: usize = 64 * 1024 * 1024;

/// Longest live plot window, in seconds.
pub const MAX_PLOT_WINDOW_SECONDS: f64 = 60.0;

/// One enabled slot on the sync station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Physical slot, `0..16`
    pub index: u8,
    /// EMG channels are 16 bit, everything else 24 bit
    pub emg: bool,
    /// Acquisition mode, `0..=3`
    pub mode: u8,
    /// Number of channels this device streams
    pub channels: usize,
}

impl DeviceConfig {
    /// Bytes a single channel occupies in one sample.
    pub fn bytes_per_channel(&self) -> usize {
        if self.emg {
            2
        } else {
            3
        }
    }

    /// Bytes this device occupies in one sample.
    pub fn bytes_per_sample(&self) -> usize {
        self.channels * self.bytes_per_channel()
    }

    /// The byte announcing this device in the start command.
    pub fn command_byte(&self) -> u8 {
        self.index * 16 + u8::from(self.emg) * 8 + self.mode * 2 + 1
    }
}

/// Where the decoded rows of one device land in a sample matrix, and where
/// its bytes sit inside one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLayout {
    /// The device described.
    pub device: DeviceConfig,
    /// Its rows in a decoded block.
    pub rows: Range<usize>,
    /// Its bytes within one sample.
    pub bytes: Range<usize>,
}

/// Everything an acquisition session needs to know up front.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// `host:port` of the sync station
    pub address: String,
    /// Enabled devices, in slot order
    pub devices: Vec<DeviceConfig>,
    /// Samples per second per channel
    pub sample_rate: u32,
    /// Length of one received block, in seconds
    pub block_seconds: f64,
    /// Receive timeout; hitting it ends the session
    pub receive_timeout: Duration,
    /// How long to wait for the TCP connection
    pub connect_timeout: Duration,
    /// Width of the live plot, in seconds
    pub plot_window_seconds: f64,
    /// Where recordings are written
    pub output_dir: PathBuf,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        let hd_grid = |index| DeviceConfig {
            index,
            emg: true,
            mode: 0,
            channels: 70,
        };

        Self {
            address: "192.168.76.1:54320".to_owned(),
            devices: vec![hd_grid(4), hd_grid(5)],
            sample_rate: 2000,
            block_seconds: 1.0,
            receive_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            plot_window_seconds: 5.0,
            output_dir: PathBuf::from("."),
        }
    }
}

/// Returned when an [`AcquisitionConfig`] cannot be used.
#[derive(Debug)]
pub enum ConfigError {
    /// An enable or EMG flag in a legacy slot array was neither 0 nor 1.
    FlagOutOfRange {
        /// Slot of the bad flag
        slot: usize,
        /// Which array it came from
        name: &'static str,
        /// The value found
        value: u8,
    },
    /// Acquisition mode above [`MAX_MODE`].
    ModeOutOfRange {
        /// Slot of the bad mode
        slot: usize,
        /// The value found
        value: u8,
    },
    /// Slot index above 15.
    SlotOutOfRange(u8),
    /// The same slot was listed twice.
    DuplicateSlot(u8),
    /// Devices must be listed in slot order, that is the order they stream in.
    SlotsOutOfOrder,
    /// A device with no channels.
    NoChannels(u8),
    /// A device with more than [`MAX_CHANNELS`] channels.
    TooManyChannels(u8),
    /// Sample rate of zero.
    ZeroSampleRate,
    /// A duration that is not a positive number of seconds.
    BadDuration {
        /// Which setting
        name: &'static str,
        /// The value found
        value: f64,
    },
    /// A block duration that rounds down to zero samples.
    EmptyBlock,
    /// A block of more than [`MAX_BLOCK_BYTES`] bytes.
    BlockTooLarge {
        /// The configured block duration
        seconds: f64,
    },
    /// A plot window longer than [`MAX_PLOT_WINDOW_SECONDS`].
    PlotWindowTooLong(f64),
    /// Returned when io fails while reading a config file.
    IoError(std::io::Error),
    /// Returned when deserialization of a config file fails.
    RonSpannedError(ron::de::SpannedError),
    /// Returned when serialization of a config fails.
    RonError(ron::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ConfigError as CE;
        let msg = match self {
            CE::FlagOutOfRange { slot, name, value } => Cow::from(format!(
                "{name} flag of slot {slot} is {value}, set it to 0 or 1"
            )),
            CE::ModeOutOfRange { slot, value } => Cow::from(format!(
                "mode of slot {slot} is {value}, set it between 0 and {MAX_MODE}"
            )),
            CE::SlotOutOfRange(slot) => Cow::from(format!(
                "slot {slot} does not exist, there are {NUM_SLOTS} slots"
            )),
            CE::DuplicateSlot(slot) => Cow::from(format!("slot {slot} is listed twice")),
            CE::SlotsOutOfOrder => Cow::from("devices must be listed in slot order"),
            CE::NoChannels(slot) => Cow::from(format!("device in slot {slot} has no channels")),
            CE::TooManyChannels(slot) => Cow::from(format!(
                "device in slot {slot} has more than {MAX_CHANNELS} channels"
            )),
            CE::ZeroSampleRate => Cow::from("sample rate must be positive"),
            CE::BadDuration { name, value } => Cow::from(format!(
                "{name} is {value}, it must be a positive number of seconds"
            )),
            CE::EmptyBlock => Cow::from("block duration holds no samples"),
            CE::BlockTooLarge { seconds } => Cow::from(format!(
                "a block of {seconds} s is larger than {MAX_BLOCK_BYTES} bytes"
            )),
            CE::PlotWindowTooLong(seconds) => Cow::from(format!(
                "plot window of {seconds} s is longer than {MAX_PLOT_WINDOW_SECONDS} s"
            )),
            CE::IoError(error) => Cow::from(format!("io error: {}", error)),
            CE::RonSpannedError(error) => Cow::from(format!("ron spanning error: {}", error)),
            CE::RonError(error) => Cow::from(format!("ron error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

impl AcquisitionConfig {
    /// Builds the device list from the sixteen-slot arrays the station's
    /// manual uses. Out-of-range values are rejected before anything else
    /// happens.
    pub fn from_slot_arrays(
        enabled: [u8; NUM_SLOTS],
        emg: [u8; NUM_SLOTS],
        mode: [u8; NUM_SLOTS],
        channels: [usize; NUM_SLOTS],
    ) -> Result<Vec<DeviceConfig>, ConfigError> {
        let check_flag = |slot: usize, name: &'static str, value: u8| {
            if value > 1 {
                Err(ConfigError::FlagOutOfRange { slot, name, value })
            } else {
                Ok(())
            }
        };

        for slot in 0..NUM_SLOTS {
            check_flag(slot, "enable", enabled[slot])?;
            check_flag(slot, "EMG", emg[slot])?;
            if mode[slot] > MAX_MODE {
                return Err(ConfigError::ModeOutOfRange {
                    slot,
                    value: mode[slot],
                });
            }
        }

        Ok((0..NUM_SLOTS)
            .filter(|&slot| enabled[slot] == 1)
            .map(|slot| DeviceConfig {
                index: slot as u8,
                emg: emg[slot] == 1,
                mode: mode[slot],
                channels: channels[slot],
            })
            .collect())
    }

    /// Reads a config from a RON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut text = String::new();
        File::open(path)?.read_to_string(&mut text)?;
        let config: Self = ron::from_str(&text).map_err(ConfigError::RonSpannedError)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty RON rendition of this config, suitable for [`Self::from_path`].
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(ConfigError::RonError)
    }

    /// Fails fast on anything the station would reject or that would make
    /// the block size meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut previous: Option<u8> = None;
        for device in &self.devices {
            if device.index as usize >= NUM_SLOTS {
                return Err(ConfigError::SlotOutOfRange(device.index));
            }
            if device.mode > MAX_MODE {
                return Err(ConfigError::ModeOutOfRange {
                    slot: device.index as usize,
                    value: device.mode,
                });
            }
            if device.channels == 0 {
                return Err(ConfigError::NoChannels(device.index));
            }
            if device.channels > MAX_CHANNELS {
                return Err(ConfigError::TooManyChannels(device.index));
            }
            match previous {
                Some(p) if p == device.index => return Err(ConfigError::DuplicateSlot(p)),
                Some(p) if p > device.index => return Err(ConfigError::SlotsOutOfOrder),
                _ => {}
            }
            previous = Some(device.index);
        }

        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        for (name, value) in [
            ("block duration", self.block_seconds),
            ("plot window", self.plot_window_seconds),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::BadDuration { name, value });
            }
        }
        if self.samples_per_block() == 0 {
            return Err(ConfigError::EmptyBlock);
        }
        let fits = self
            .checked_block_size()
            .map_or(false, |size| size <= MAX_BLOCK_BYTES);
        if !fits {
            return Err(ConfigError::BlockTooLarge {
                seconds: self.block_seconds,
            });
        }
        if self.plot_window_seconds > MAX_PLOT_WINDOW_SECONDS {
            return Err(ConfigError::PlotWindowTooLong(self.plot_window_seconds));
        }
        Ok(())
    }

    /// Channels in a decoded matrix, sync/status channels included.
    pub fn total_channels(&self) -> usize {
        self.devices.iter().map(|d| d.channels).sum::<usize>() + SYNC_CHANNELS
    }

    /// Bytes in one sample across all devices, sync/status bytes included.
    pub fn bytes_per_sample(&self) -> usize {
        self.devices
            .iter()
            .map(DeviceConfig::bytes_per_sample)
            .sum::<usize>()
            + SYNC_BYTES
    }

    /// Samples per channel in one block.
    pub fn samples_per_block(&self) -> usize {
        (self.sample_rate as f64 * self.block_seconds) as usize
    }

    /// Bytes in one raw block, `None` if that does not fit a `usize`.
    pub fn checked_block_size(&self) -> Option<usize> {
        self.bytes_per_sample().checked_mul(self.samples_per_block())
    }

    /// Bytes in one raw block. Only meaningful once [`Self::validate`]
    /// passed.
    pub fn block_size(&self) -> usize {
        self.checked_block_size().unwrap_or(usize::MAX)
    }

    /// Samples shown per channel in the live plot.
    pub fn plot_width(&self) -> usize {
        (self.plot_window_seconds * self.sample_rate as f64).round() as usize
    }

    /// Row range of the sync/status channels.
    pub fn sync_rows(&self) -> Range<usize> {
        let total = self.total_channels();
        total - SYNC_CHANNELS..total
    }

    /// Row and byte ranges of every device, in enable order.
    pub fn layout(&self) -> Vec<DeviceLayout> {
        let mut row = 0;
        let mut byte = 0;
        self.devices
            .iter()
            .map(|&device| {
                let rows = row..row + device.channels;
                let bytes = byte..byte + device.bytes_per_sample();
                row = rows.end;
                byte = bytes.end;
                DeviceLayout {
                    device,
                    rows,
                    bytes,
                }
            })
            .collect()
    }
}
