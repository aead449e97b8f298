//! One acquisition session against a sync station.
//!
//! A [`Session`] owns a background worker that holds the link, sends the
//! start command, and then loops: fill a block, decode it, queue it for
//! display and keep it for the recording. Clearing the running flag makes
//! the worker finish after the read in progress; a failed read ends the
//! session on its own. Either way the worker sends the stop command, closes
//! the link and hands back every block it decoded.

use crate::block_accumulator::{AccumulatorError, BlockAccumulator, Fill};
use crate::block_queue::BlockQueue;
use crate::command_frame::{start_frame, stop_frame};
use crate::device_config::{AcquisitionConfig, ConfigError};
use crate::device_link::DeviceLink;
use crate::frame_decoder::FrameDecoder;
use crate::recording::{join_blocks, Recording};

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use ndarray::Array2;
use std::{
    fmt,
    io::Write,
    net::{TcpStream, ToSocketAddrs},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

/// Everything that can end a session early.
#[derive(Debug)]
pub enum SessionError {
    /// The configuration was rejected before connecting.
    Config(ConfigError),
    /// The station's address did not resolve.
    Resolve(String),
    /// Connecting to the station failed.
    Connect(std::io::Error),
    /// The start command could not be sent.
    Send(std::io::Error),
    /// Receiving a block failed.
    Receive(AccumulatorError),
    /// The worker thread could not be started.
    Spawn(std::io::Error),
    /// The worker thread panicked.
    WorkerPanicked,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid configuration: {}", e),
            Self::Resolve(addr) => write!(f, "could not resolve {}", addr),
            Self::Connect(e) => write!(f, "could not connect: {}", e),
            Self::Send(e) => write!(f, "could not send start command: {}", e),
            Self::Receive(e) => write!(f, "{}", e),
            Self::Spawn(e) => write!(f, "could not start acquisition thread: {}", e),
            Self::WorkerPanicked => write!(f, "acquisition thread panicked"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<ConfigError> for SessionError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<AccumulatorError> for SessionError {
    fn from(value: AccumulatorError) -> Self {
        Self::Receive(value)
    }
}

/// What a finished session leaves behind. Blocks decoded before a failure
/// are kept.
#[derive(Debug)]
pub struct SessionSummary {
    /// Everything decoded, joined along the sample axis.
    pub recording: Recording,
    /// Why the session ended, if it did not end on request.
    pub failure: Option<SessionError>,
}

struct WorkerOutput {
    blocks: Vec<Array2<f64>>,
    failure: Option<SessionError>,
}

/// A running acquisition. Dropping it stops the worker without saving.
pub struct Session {
    config: Arc<AcquisitionConfig>,
    queue: BlockQueue,
    running: Arc<AtomicBool>,
    started_at: DateTime<Local>,
    worker: Option<JoinHandle<WorkerOutput>>,
}

impl Session {
    /// Validates `config`, connects to the station over TCP and starts the
    /// worker. Nothing is retried.
    pub fn connect(config: AcquisitionConfig) -> Result<Self, SessionError> {
        config.validate()?;

        let addr = config
            .address
            .to_socket_addrs()
            .map_err(|_| SessionError::Resolve(config.address.clone()))?
            .next()
            .ok_or_else(|| SessionError::Resolve(config.address.clone()))?;

        info!("Attempting to connect to {}", addr);
        let stream =
            TcpStream::connect_timeout(&addr, config.connect_timeout).map_err(SessionError::Connect)?;
        stream
            .set_read_timeout(Some(config.receive_timeout))
            .map_err(SessionError::Connect)?;
        info!("Connected to {}", addr);

        Self::start(config, stream)
    }

    /// Starts the worker over an already open link.
    pub fn start<L>(config: AcquisitionConfig, link: L) -> Result<Self, SessionError>
    where
        L: DeviceLink + 'static,
    {
        config.validate()?;

        let config = Arc::new(config);
        let queue = BlockQueue::new();
        let running = Arc::new(AtomicBool::new(true));

        let worker = {
            let config = Arc::clone(&config);
            let queue = queue.clone();
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("acquisition".to_owned())
                .spawn(move || acquire(link, &config, &queue, &running))
                .map_err(SessionError::Spawn)?
        };

        Ok(Self {
            config,
            queue,
            running,
            started_at: Local::now(),
            worker: Some(worker),
        })
    }

    /// The validated configuration the session runs with.
    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// A handle on the queue of decoded blocks waiting to be displayed.
    pub fn queue(&self) -> BlockQueue {
        self.queue.clone()
    }

    /// When the worker was started; names the saved files.
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// False once the session was asked to stop or the worker gave up.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Asks the worker to stop, waits for it and gathers the recording.
    pub fn stop(mut self) -> SessionSummary {
        self.running.store(false, Ordering::SeqCst);

        let output = match self.worker.take().map(JoinHandle::join) {
            Some(Ok(output)) => output,
            Some(Err(_)) | None => WorkerOutput {
                blocks: Vec::new(),
                failure: Some(SessionError::WorkerPanicked),
            },
        };

        let recording = Recording::new(
            self.started_at,
            self.config.sample_rate,
            join_blocks(&output.blocks),
        );
        info!("Session stopped with {} blocks", output.blocks.len());

        SessionSummary {
            recording,
            failure: output.failure,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// The worker body.
fn acquire<L: DeviceLink>(
    mut link: L,
    config: &AcquisitionConfig,
    queue: &BlockQueue,
    running: &AtomicBool,
) -> WorkerOutput {
    let mut blocks = Vec::new();

    let start = start_frame(&config.devices);
    if let Err(e) = link.write_all(&start).and_then(|_| link.flush()) {
        error!("Could not send start command: {}", e);
        running.store(false, Ordering::SeqCst);
        return WorkerOutput {
            blocks,
            failure: Some(SessionError::Send(e)),
        };
    }
    info!("Start command sent: {:?}", start);

    let decoder = FrameDecoder::new(config);
    let mut accumulator = BlockAccumulator::new(config.block_size());
    let mut failure = None;

    while running.load(Ordering::SeqCst) {
        match accumulator.fill(&mut link, running) {
            Ok(Fill::Block(raw)) => match decoder.decode(raw) {
                Some(block) => {
                    debug!(
                        "Data block of {} channels x {} samples added to queue",
                        block.nrows(),
                        block.ncols()
                    );
                    queue.push(block.clone());
                    blocks.push(block);
                }
                None => debug!("No complete samples received"),
            },
            Ok(Fill::Cancelled) => break,
            Err(e) => {
                error!("Acquisition failed: {}", e);
                running.store(false, Ordering::SeqCst);
                failure = Some(SessionError::Receive(e));
                break;
            }
        }
    }
    info!("Recording stopped");

    if let Err(e) = link.write_all(&stop_frame()).and_then(|_| link.flush()) {
        warn!("Could not send stop command: {}", e);
    } else {
        info!("Stop command sent");
    }
    if let Err(e) = link.close() {
        warn!("Could not close link: {}", e);
    }

    WorkerOutput { blocks, failure }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_config::DeviceConfig;
    use crate::dummy_device::{Command, DummyDevice};
    use std::{net::TcpListener, time::Duration};

    fn small_config() -> AcquisitionConfig {
        AcquisitionConfig {
            devices: vec![DeviceConfig {
                index: 3,
                emg: true,
                mode: 0,
                channels: 4,
            }],
            sample_rate: 50,
            ..Default::default()
        }
    }

    #[test]
    fn block_limit_ends_session_as_disconnect() {
        let config = small_config();
        let device = DummyDevice::builder(&config).block_limit(3).build();
        let log = device.command_log();

        let session = Session::start(config.clone(), device).unwrap();
        while session.is_running() {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(session.queue().drain().len(), 3);

        let summary = session.stop();
        assert!(matches!(
            summary.failure,
            Some(SessionError::Receive(AccumulatorError::Disconnected))
        ));
        let matrix = summary.recording.matrix().unwrap();
        assert_eq!(matrix.nrows(), 4 + 6);
        assert_eq!(matrix.ncols(), 3 * 50);

        assert_eq!(
            *log.lock().unwrap(),
            vec![Command::Start(start_frame(&config.devices)), Command::Stop]
        );
    }

    #[test]
    fn stop_keeps_decoded_blocks() {
        let config = small_config();
        let device = DummyDevice::builder(&config).realtime(true).build();
        let session = Session::start(config, device).unwrap();

        let queue = session.queue();
        let mut seen = 0;
        while seen == 0 {
            seen += queue.drain().len();
            thread::sleep(Duration::from_millis(20));
        }

        let summary = session.stop();
        assert!(summary.failure.is_none());
        let matrix = summary.recording.matrix().unwrap();
        assert!(matrix.ncols() >= 50);
        assert_eq!(matrix.ncols() % 50, 0);
    }

    #[test]
    fn invalid_config_fails_before_connecting() {
        let config = AcquisitionConfig {
            sample_rate: 0,
            ..small_config()
        };
        assert!(matches!(
            Session::connect(config),
            Err(SessionError::Config(ConfigError::ZeroSampleRate))
        ));
    }

    #[test]
    fn tcp_session_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = AcquisitionConfig {
            address: listener.local_addr().unwrap().to_string(),
            receive_timeout: Duration::from_secs(5),
            ..small_config()
        };
        let block_size = config.block_size();
        let expected_start = start_frame(&config.devices);

        let station = thread::spawn(move || {
            use std::io::{Read, Write};
            let (mut socket, _) = listener.accept().unwrap();
            let mut start = vec![0u8; expected_start.len()];
            socket.read_exact(&mut start).unwrap();
            assert_eq!(start, expected_start);
            socket.write_all(&vec![0u8; block_size * 2]).unwrap();
            // hang up, the session sees a zero byte read
        });

        let session = Session::connect(config).unwrap();
        station.join().unwrap();
        while session.is_running() {
            thread::sleep(Duration::from_millis(5));
        }

        let summary = session.stop();
        assert!(summary.failure.is_some());
        assert_eq!(summary.recording.matrix().unwrap().ncols(), 100);
    }

    #[test]
    fn refused_connection_is_not_retried() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let config = AcquisitionConfig {
            address,
            connect_timeout: Duration::from_secs(5),
            ..small_config()
        };
        let started = std::time::Instant::now();
        assert!(matches!(
            Session::connect(config),
            Err(SessionError::Connect(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn silent_station_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = AcquisitionConfig {
            address: listener.local_addr().unwrap().to_string(),
            receive_timeout: Duration::from_millis(100),
            ..small_config()
        };
        let (hang_up_tx, hang_up_rx) = std::sync::mpsc::channel::<()>();

        let station = thread::spawn(move || {
            let (socket, _) = listener.accept().unwrap();
            // hold the connection open without sending anything
            let _ = hang_up_rx.recv();
            drop(socket);
        });

        let session = Session::connect(config).unwrap();
        while session.is_running() {
            thread::sleep(Duration::from_millis(5));
        }
        let summary = session.stop();
        hang_up_tx.send(()).unwrap();
        station.join().unwrap();

        assert!(matches!(
            summary.failure,
            Some(SessionError::Receive(AccumulatorError::Timeout))
        ));
        assert!(summary.recording.matrix().is_none());
    }
}
