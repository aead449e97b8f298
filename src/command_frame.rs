//! The two commands we ever send to the sync station: start streaming with a
//! given device set, and stop.

use crate::crc8::crc8;
use crate::device_config::DeviceConfig;

/// Builds the start command for the given enabled devices.
///
/// The frame is a length byte (`2 * n + 1` for `n` devices, which is what
/// the firmware counts), one byte per device and a trailing checksum over
/// everything before it.
pub fn start_frame(devices: &[DeviceConfig]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(devices.len() + 2);
    frame.push((devices.len() * 2 + 1) as u8);
    frame.extend(devices.iter().map(DeviceConfig::command_byte));
    let checksum = crc8(&frame, frame.len());
    frame.push(checksum);
    frame
}

/// Builds the two byte stop command.
pub fn stop_frame() -> [u8; 2] {
    [0, crc8(&[0], 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emg_grid(index: u8) -> DeviceConfig {
        DeviceConfig {
            index,
            emg: true,
            mode: 0,
            channels: 70,
        }
    }

    #[test]
    fn start_frame_for_two_grids() {
        let frame = start_frame(&[emg_grid(4), emg_grid(5)]);
        assert_eq!(frame.len(), 4);
        assert_eq!(&frame[..3], &[5, 73, 89]);
        assert_eq!(frame[3], crc8(&[5, 73, 89], 3));
    }

    #[test]
    fn start_frame_without_devices() {
        let frame = start_frame(&[]);
        assert_eq!(frame, vec![1, crc8(&[1], 1)]);
    }

    #[test]
    fn trailer_checks_whole_prefix() {
        let frame = start_frame(&[emg_grid(0), emg_grid(7), emg_grid(15)]);
        let (body, trailer) = frame.split_at(frame.len() - 1);
        assert_eq!(body[0], 7);
        assert_eq!(trailer[0], crc8(body, body.len()));
    }

    #[test]
    fn stop_frame_is_zero_and_checksum() {
        assert_eq!(stop_frame(), [0, 0]);
    }
}
