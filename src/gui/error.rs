use std::{error::Error, fmt::Display, sync::mpsc};

/// Errors raised while a terminal dialog is up.
#[derive(Debug)]
pub enum GuiError {
    /// Drawing to or reading from the terminal failed.
    IOError(std::io::Error),
    /// The worker thread stopped listening.
    MPSCSendError,
    /// The worker thread went away without a result.
    MPSCRecvError(mpsc::RecvError),
    /// The worker thread panicked.
    JoinError,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IOError(e) => write!(f, "terminal error: {}", e),
            Self::MPSCSendError => write!(f, "worker thread hung up"),
            Self::MPSCRecvError(e) => write!(f, "worker thread hung up: {}", e),
            Self::JoinError => write!(f, "worker thread panicked"),
        }
    }
}

impl Error for GuiError {}

impl From<std::io::Error> for GuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl<T> From<mpsc::SendError<T>> for GuiError {
    fn from(_: mpsc::SendError<T>) -> Self {
        Self::MPSCSendError
    }
}

impl From<mpsc::RecvError> for GuiError {
    fn from(value: mpsc::RecvError) -> Self {
        Self::MPSCRecvError(value)
    }
}
