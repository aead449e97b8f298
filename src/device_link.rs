//! The byte pipe between a session and a sync station.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

/// `DeviceLink`
///
/// A byte pipe to a sync station: commands go out through [`Write`], sample
/// blocks come back through [`Read`]. Reads are expected to time out rather
/// than block forever. Implemented by the TCP socket and by the in-process
/// dummy station.
pub trait DeviceLink: Read + Write + Send {
    /// Tears the link down after the stop command was sent.
    fn close(&mut self) -> io::Result<()>;
}

impl DeviceLink for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}
