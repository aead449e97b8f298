use clap::Parser;
use myosync::{
    args::{
        CameraSyncCommand, CommandTask, InspectCommand, MyoArgs, RecordCommand, RetimeCommand,
        SerialCommand,
    },
    camera_sync::{sync_camera_dir, sync_participants},
    device_config::AcquisitionConfig,
    dummy_device::DummyDevice,
    gui::{fold_until_stop, port_selector},
    inspect::Inspection,
    recording::read_recording,
    retime::{retime_folder, retime_participants, seconds},
    serial_logger::{open_port, sensor_file_name, survey_ports, SensorRecorder},
    session::Session,
};

use chrono::Local;
use log::{error, info, warn};
use serial2::SerialPort;
use std::{
    error::Error,
    fs::File,
    io::{self, BufWriter},
    sync::mpsc,
    thread::{self, sleep},
    time::{Duration, Instant},
};

// Example:
// cargo run --bin myosync -- record --out recordings --seconds 60
// cargo run --bin myosync -- retime --delta 0.2 --base "Experimental Data" --first 1 --last 8
// cargo run --bin myosync -- inspect recordings/emg_data_20241028_115040600.npy

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = MyoArgs::parse();

    match args.command {
        CommandTask::Record(cmd) => record(cmd),
        CommandTask::Serial(cmd) => serial(cmd),
        CommandTask::Retime(cmd) => retime(cmd),
        CommandTask::CameraSync(cmd) => camera_sync(cmd),
        CommandTask::Inspect(cmd) => inspect(cmd),
        CommandTask::Config => {
            print!("{}", AcquisitionConfig::default().to_ron()?);
            Ok(())
        }
    }
}

fn record(cmd: RecordCommand) -> Result<(), Box<dyn Error>> {
    let config = cmd.acquisition.load()?;
    let out_dir = config.output_dir.clone();

    let session = if cmd.dummy {
        let device = DummyDevice::builder(&config).realtime(true).build();
        Session::start(config, device)?
    } else {
        Session::connect(config)?
    };
    let queue = session.queue();

    // Enter on stdin stops the recording
    let (enter_tx, enter_rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_ok() {
            let _ = enter_tx.send(());
        }
    });

    println!("Recording, press Enter to stop.");
    let limit = cmd.seconds;
    let started = Instant::now();
    let mut received = 0;
    while session.is_running() {
        if enter_rx.try_recv().is_ok() || limit.map_or(false, |l| started.elapsed() >= l) {
            break;
        }
        // Nothing displays the blocks here, but the queue must not grow
        let fresh = queue.drain().len();
        if fresh > 0 {
            received += fresh;
            info!("{} blocks received", received);
        }
        sleep(Duration::from_millis(50));
    }

    let summary = session.stop();
    println!(
        "Recorded {:.1} s of data.",
        summary.recording.duration_seconds()
    );
    if let Some(files) = summary.recording.save(&out_dir)? {
        println!("Saved {}", files.npy.display());
        println!("Saved {}", files.csv.display());
    }

    match summary.failure {
        Some(e) => {
            error!("Session ended early: {}", e);
            Err(e.into())
        }
        None => Ok(()),
    }
}

struct SensorLogging {
    recorder: SensorRecorder<SerialPort, BufWriter<File>>,
    failure: Option<io::Error>,
}

fn serial(cmd: SerialCommand) -> Result<(), Box<dyn Error>> {
    let port_name = match cmd.port {
        Some(port) => port,
        None => match port_selector(survey_ports)? {
            Some(port) => port,
            None => {
                warn!("No serial port selected");
                return Ok(());
            }
        },
    };

    let port = open_port(&port_name.to_string_lossy())?;
    let path = cmd.out_dir.join(sensor_file_name(Local::now()));
    let file = BufWriter::new(File::create(&path)?);
    info!("Logging {} to {}", port_name.display(), path.display());

    let state = SensorLogging {
        recorder: SensorRecorder::new(port, file)?,
        failure: None,
    };
    let state = fold_until_stop("Logging Sensor Data", state, |mut state| {
        if state.failure.is_some() {
            sleep(Duration::from_millis(50));
        } else if let Err(e) = state.recorder.poll() {
            state.failure = Some(e);
        }
        state
    })?;

    println!(
        "{} lines recorded, {} rejected, saved to {}",
        state.recorder.recorded(),
        state.recorder.rejected(),
        path.display()
    );
    state.recorder.finish()?;

    match state.failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn retime(cmd: RetimeCommand) -> Result<(), Box<dyn Error>> {
    let delta = seconds(cmd.delta);

    let reports = match &cmd.participants.base {
        Some(base) => retime_participants(
            base,
            cmd.participants.first..=cmd.participants.last,
            delta,
        )?,
        None if !cmd.folders.is_empty() => cmd
            .folders
            .iter()
            .map(|folder| retime_folder(folder, delta))
            .collect::<io::Result<Vec<_>>>()?,
        None => return Err("give either --base or one or more folders".into()),
    };

    let renamed: usize = reports.iter().map(|r| r.renamed.len()).sum();
    let skipped: usize = reports.iter().map(|r| r.skipped.len()).sum();
    println!("{} files renamed, {} skipped.", renamed, skipped);
    Ok(())
}

fn camera_sync(cmd: CameraSyncCommand) -> Result<(), Box<dyn Error>> {
    let renamed = match (&cmd.camera_dir, &cmd.participants.base) {
        (Some(dir), _) => sync_camera_dir(dir)?,
        (None, Some(base)) => {
            sync_participants(base, cmd.participants.first..=cmd.participants.last)?
        }
        (None, None) => return Err("give either --base or --camera-dir".into()),
    };
    println!("{} recording folders renamed.", renamed.len());
    Ok(())
}

fn inspect(cmd: InspectCommand) -> Result<(), Box<dyn Error>> {
    let matrix = read_recording(&cmd.file)?;
    let inspection = Inspection::of(&matrix);

    println!("{}", cmd.file.display());
    if cmd.verbose {
        print!("{:#}", inspection);
    } else {
        print!("{}", inspection);
    }
    Ok(())
}
