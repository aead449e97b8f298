//! Records the 8-sensor board's serial output to a CSV file.

use crate::sensor_line::SensorLine;

use chrono::{DateTime, Local};
use log::{debug, warn};
use serial2::SerialPort;
use std::{
    io::{self, ErrorKind, Read, Write},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

/// The board prints at this rate.
pub const BAUD_RATE: u32 = 115200;

/// How long a single read may wait, so the logger stays responsive to a
/// stop request.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Longest line kept while waiting for its line break. Anything longer is
/// noise and gets dropped.
pub const MAX_LINE_BYTES: usize = 1024;

/// Opens `name` at [`BAUD_RATE`] and drops whatever was buffered before.
pub fn open_port(name: &str) -> io::Result<SerialPort> {
    let mut port = SerialPort::open(name, BAUD_RATE)?;
    port.set_read_timeout(READ_TIMEOUT)?;
    port.discard_input_buffer()?;
    Ok(port)
}

/// Paths of serial devices that look usable.
pub fn available_ports() -> io::Result<Vec<PathBuf>> {
    SerialPort::available_ports()
}

/// A serial port found on the system, and whether it opens at
/// [`BAUD_RATE`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    /// Device path.
    pub path: PathBuf,
    /// Why opening failed, `None` when the port is usable.
    pub problem: Option<String>,
}

impl PortStatus {
    /// The port opened during the survey.
    pub fn is_usable(&self) -> bool {
        self.problem.is_none()
    }
}

/// Lists the serial ports and tries each at [`BAUD_RATE`], so busy or
/// forbidden ports show up as such before the user picks one.
pub fn survey_ports() -> io::Result<Vec<PortStatus>> {
    let ports = available_ports()?
        .into_iter()
        .map(|path| {
            let problem = SerialPort::open(&path, BAUD_RATE)
                .err()
                .map(|e| e.to_string());
            PortStatus { path, problem }
        })
        .collect();
    Ok(ports)
}

/// `sensor_data_<YYYY-MM-DD_HH-MM-SS.mmm>.csv`
pub fn sensor_file_name(started_at: DateTime<Local>) -> String {
    format!(
        "sensor_data_{}.csv",
        started_at.format("%Y-%m-%d_%H-%M-%S%.3f")
    )
}

/// Splits a byte stream into lines, parses them and appends the good ones
/// to a CSV writer.
pub struct SensorRecorder<R, W> {
    source: R,
    out: W,
    line: Vec<u8>,
    recorded: usize,
    rejected: usize,
}

impl<R: Read, W: Write> SensorRecorder<R, W> {
    /// Writes the CSV header and gets ready to record.
    pub fn new(source: R, mut out: W) -> io::Result<Self> {
        writeln!(out, "{}", SensorLine::csv_header())?;
        Ok(Self {
            source,
            out,
            line: Vec::new(),
            recorded: 0,
            rejected: 0,
        })
    }

    /// Lines written so far.
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Lines dropped for not having eight numbers, or for running past
    /// [`MAX_LINE_BYTES`].
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Does one read and records every line it completes. Returns the
    /// number of lines recorded; a read timeout counts as zero lines.
    pub fn poll(&mut self) -> io::Result<usize> {
        let mut buffer = [0; 256];
        let read_len = match self.source.read(&mut buffer) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => return Ok(0),
            Err(e) => return Err(e),
        };

        let before = self.recorded;
        for &c in buffer.iter().take(read_len) {
            self.line.push(c);
            if c == b'\n' {
                self.record_line()?;
                self.line.clear();
            } else if self.line.len() >= MAX_LINE_BYTES {
                self.rejected += 1;
                warn!("Dropping {} bytes without a line break", self.line.len());
                self.line.clear();
            }
        }
        Ok(self.recorded - before)
    }

    fn record_line(&mut self) -> io::Result<()> {
        // Undecodable bytes are dropped, they often linger in the hardware
        // buffer at the beginning of transmission
        let text = String::from_utf8_lossy(&self.line).replace(char::REPLACEMENT_CHARACTER, "");
        match SensorLine::from_str(&text) {
            Ok(sensors) => {
                writeln!(self.out, "{}", sensors.to_csv())?;
                self.recorded += 1;
                debug!("Data recorded: {:?}", sensors.fields);
            }
            Err(e) => {
                self.rejected += 1;
                warn!("{}", e);
            }
        }
        Ok(())
    }

    /// Flushes the CSV writer and hands back the pieces.
    pub fn finish(mut self) -> io::Result<(R, W)> {
        self.out.flush()?;
        Ok((self.source, self.out))
    }
}
