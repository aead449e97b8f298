//! Collects bytes from the station until one whole block is available.
//!
//! The stream carries no framing of its own, so block boundaries are purely
//! a matter of counting. A read that returns nothing, or a read that times
//! out, means the station is gone and the session is over; we never retry.

use log::{debug, warn};
use std::{
    fmt,
    io::{ErrorKind, Read},
    sync::atomic::{AtomicBool, Ordering},
};

/// Why filling a block stopped short.
#[derive(Debug)]
pub enum AccumulatorError {
    /// The peer closed the connection, a read returned zero bytes.
    Disconnected,
    /// The read timed out.
    Timeout,
    /// Any other io error.
    IoError(std::io::Error),
}

impl fmt::Display for AccumulatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "no data received, the station disconnected"),
            Self::Timeout => write!(f, "timed out waiting for data"),
            Self::IoError(error) => write!(f, "socket error: {}", error),
        }
    }
}

impl std::error::Error for AccumulatorError {}

/// Where the accumulator is in filling its current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    /// Collecting bytes for a block.
    Accumulating,
    /// A whole block was handed out.
    Ready,
    /// Stopped between reads; the partial block was dropped.
    Cancelled,
    /// The source disconnected, timed out or failed. Terminal.
    Failed,
}

/// Result of one [`BlockAccumulator::fill`] call.
#[derive(Debug)]
pub enum Fill<'a> {
    /// A whole block; it stays valid until the next call.
    Block(&'a [u8]),
    /// The running flag was cleared between two reads. The partial block
    /// was thrown away.
    Cancelled,
}

/// Counts bytes from a source into blocks of a fixed size, reusing one
/// buffer for every block.
pub struct BlockAccumulator {
    block_size: usize,
    buffer: Vec<u8>,
    state: AccumulatorState,
}

impl BlockAccumulator {
    /// An accumulator for blocks of `block_size` bytes.
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            buffer: Vec::with_capacity(block_size),
            state: AccumulatorState::Accumulating,
        }
    }

    /// Bytes per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Where the current block stands.
    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Bytes held for the block currently being filled.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Reads from `source` until one block is complete, `running` is
    /// cleared, or the source fails. Once failed, every later call fails
    /// with [`AccumulatorError::Disconnected`] without touching `source`.
    pub fn fill<R: Read + ?Sized>(
        &mut self,
        source: &mut R,
        running: &AtomicBool,
    ) -> Result<Fill<'_>, AccumulatorError> {
        match self.state {
            AccumulatorState::Failed => return Err(AccumulatorError::Disconnected),
            AccumulatorState::Ready | AccumulatorState::Cancelled => {
                self.buffer.clear();
                self.state = AccumulatorState::Accumulating;
            }
            AccumulatorState::Accumulating => {}
        }

        while self.buffer.len() < self.block_size {
            if !running.load(Ordering::SeqCst) {
                debug!("Dropping partial block of {} bytes", self.buffer.len());
                self.buffer.clear();
                self.state = AccumulatorState::Cancelled;
                return Ok(Fill::Cancelled);
            }

            let start = self.buffer.len();
            self.buffer.resize(self.block_size, 0);
            let result = source.read(&mut self.buffer[start..]);
            let received = *result.as_ref().unwrap_or(&0);
            self.buffer.truncate(start + received);

            match result {
                Ok(0) => {
                    warn!("No data received. Possible disconnection.");
                    return Err(self.fail(AccumulatorError::Disconnected));
                }
                Ok(n) => debug!("Received {} bytes", n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    warn!("Socket timeout. Stopping data acquisition.");
                    return Err(self.fail(AccumulatorError::Timeout));
                }
                Err(e) => {
                    warn!("Socket error: {}", e);
                    return Err(self.fail(AccumulatorError::IoError(e)));
                }
            }
        }

        self.state = AccumulatorState::Ready;
        Ok(Fill::Block(&self.buffer))
    }

    fn fail(&mut self, error: AccumulatorError) -> AccumulatorError {
        self.buffer.clear();
        self.state = AccumulatorState::Failed;
        error
    }
}
