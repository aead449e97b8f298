//! MyoSync records high-density surface EMG from a multi-channel amplifier
//! over TCP, alongside the lower density sensors and cameras of the same
//! experiment.
//!
//! The amplifier streams raw big-endian samples once it has been sent a
//! configuration frame naming which of its sixteen input slots are in use.
//! A [`session::Session`] owns that conversation: it sends the frame, pulls
//! fixed-size blocks off the socket on a worker thread, decodes each into a
//! channels x samples [`ndarray::Array2`] of millivolts and hands it to the live
//! plot through a [`block_queue::BlockQueue`]. When the session is stopped
//! the blocks are joined into a [`recording::Recording`] and saved as a
//! `.npy` array plus a CSV file named after the start time.
//!
//! Around that core sit the tools the rest of the experiment needs:
//!
//! -   [`serial_logger`] writes the 8-sensor board's serial output to CSV
//! -   [`retime`] shifts the timestamps of processed amplifier files
//! -   [`camera_sync`] gives camera recording folders millisecond start times
//! -   [`inspect`] prints a statistical fingerprint of a saved recording
//!
//! There are two binaries. `myosync` is the command line front end for all
//! of the above; `monitor` is a terminal UI that plots a dozen electrodes
//! live while recording.
//!
//! Without the amplifier at hand, [`dummy_device::DummyDevice`] speaks the
//! same protocol over an in-memory link.

#![warn(missing_docs)]

pub mod args;
pub mod block_accumulator;
pub mod block_queue;
pub mod camera_sync;
pub mod command_frame;
pub mod crc8;
pub mod device_config;
pub mod device_link;
pub mod dummy_device;
pub mod electrode_grid;
pub mod frame_decoder;
pub mod gui;
pub mod inspect;
pub mod plot_buffer;
pub mod recording;
pub mod retime;
pub mod sensor_line;
pub mod serial_logger;
pub mod session;
