use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::{
    error::Error,
    io,
    time::{Duration, Instant},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style, Stylize},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
    Frame, Terminal,
};

use log::{error, info};
use myosync::{
    device_config::AcquisitionConfig,
    dummy_device::DummyDevice,
    electrode_grid::{channels_to_plot, DEFAULT_POSITIONS},
    plot_buffer::PlotBuffer,
    session::Session,
};

/// Charts per row of the grid.
const CHART_COLUMNS: usize = 6;

/// Points drawn per chart, at most; the window is decimated down to this.
const MAX_POINTS: usize = 400;

pub struct App {
    config: AcquisitionConfig,
    dummy: bool,
    session: Option<Session>,
    plot: PlotBuffer,
    status: String,
}

impl App {
    pub fn new(config: AcquisitionConfig, dummy: bool) -> App {
        let grids: Vec<usize> = config.devices.iter().map(|d| d.channels).collect();
        let plot = PlotBuffer::new(
            channels_to_plot(&grids, &DEFAULT_POSITIONS),
            config.plot_width(),
        );
        App {
            config,
            dummy,
            session: None,
            plot,
            status: "Idle".to_owned(),
        }
    }

    fn start(&mut self) {
        if self.session.is_some() {
            return;
        }
        let session = if self.dummy {
            let device = DummyDevice::builder(&self.config).realtime(true).build();
            Session::start(self.config.clone(), device)
        } else {
            Session::connect(self.config.clone())
        };
        match session {
            Ok(session) => {
                self.plot = PlotBuffer::new(self.plot.channels().to_vec(), self.plot.width());
                self.status = format!("Recording since {}", session.started_at().format("%H:%M:%S"));
                self.session = Some(session);
            }
            Err(e) => {
                error!("Could not start session: {}", e);
                self.status = format!("Could not start: {}", e);
            }
        }
    }

    /// Stops the running session, if any, and saves what it recorded.
    fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let summary = session.stop();
        let saved = summary.recording.save(&self.config.output_dir);

        self.status = match (&summary.failure, saved) {
            (_, Err(e)) => format!("Could not save: {}", e),
            (Some(failure), Ok(files)) => format!(
                "Session failed ({}); {}",
                failure,
                saved_message(files.map(|f| f.npy))
            ),
            (None, Ok(files)) => saved_message(files.map(|f| f.npy)),
        };
        info!("{}", self.status);
    }

    fn on_tick(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        for block in session.queue().drain() {
            self.plot.push(&block);
        }
        if !session.is_running() {
            self.stop();
        }
    }

    fn is_recording(&self) -> bool {
        self.session.is_some()
    }
}

fn saved_message(npy: Option<std::path::PathBuf>) -> String {
    match npy {
        Some(path) => format!("Saved {}", path.display()),
        None => "Nothing recorded".to_owned(),
    }
}

pub fn engage_gui(app: App) -> Result<(), Box<dyn Error>> {
    // setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // create app and run it
    let tick_rate = Duration::from_millis(50);
    let res = run_app(&mut terminal, app, tick_rate);

    // restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    let status = res?;
    println!("{}", status);
    Ok(())
}

/// Runs until `q`. Returns the last status line.
fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
    tick_rate: Duration,
) -> io::Result<String> {
    let mut last_tick = Instant::now();
    loop {
        terminal.draw(|f| ui(f, &app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('s') => app.start(),
                        KeyCode::Char('x') => app.stop(),
                        KeyCode::Char('q') => {
                            app.stop();
                            return Ok(app.status);
                        }
                        _ => {}
                    }
                }
            }
        }
        if last_tick.elapsed() >= tick_rate {
            app.on_tick();
            last_tick = Instant::now();
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let [charts, status] = split_status(f.size());

    let n_charts = app.plot.channels().len();
    let n_rows = n_charts.div_ceil(CHART_COLUMNS).max(1);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Ratio(1, n_rows as u32); n_rows])
        .split(charts);

    for (i, &channel) in app.plot.channels().iter().enumerate() {
        let cells = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Ratio(1, CHART_COLUMNS as u32); CHART_COLUMNS])
            .split(rows[i / CHART_COLUMNS]);
        render_channel(f, cells[i % CHART_COLUMNS], app, i, channel);
    }

    let state = if app.is_recording() {
        " REC ".white().on_red().bold()
    } else {
        " IDLE ".black().on_gray()
    };
    let help = Line::from(vec![
        state,
        " ".into(),
        app.status.as_str().into(),
        "  Start ".into(),
        "<S>".cyan().bold(),
        " Stop and save ".into(),
        "<X>".cyan().bold(),
        " Quit ".into(),
        "<Q>".cyan().bold(),
    ]);
    f.render_widget(Paragraph::new(help), status);
}

fn split_status(area: Rect) -> [Rect; 2] {
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);
    [parts[0], parts[1]]
}

fn render_channel(f: &mut Frame, area: Rect, app: &App, i: usize, channel: usize) {
    let points = app.plot.points(i, app.config.sample_rate as f64);
    let step = (points.len() / MAX_POINTS).max(1);
    let points: Vec<(f64, f64)> = points.into_iter().step_by(step).collect();

    let (lo, hi) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| {
            (lo.min(y), hi.max(y))
        });
    let (lo, hi) = if lo.is_finite() && hi > lo {
        (lo, hi)
    } else {
        (-1.0, 1.0)
    };
    let x_start = points.first().map_or(0.0, |p| p.0);

    let chart = Chart::new(vec![Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(&points)])
    .block(
        Block::default()
            .title(format!(" Ch {} ", channel + 1))
            .borders(Borders::ALL),
    )
    .x_axis(
        Axis::default()
            .style(Style::default().fg(Color::White))
            .bounds([x_start, 0.0]),
    )
    .y_axis(
        Axis::default()
            .style(Style::default().fg(Color::White))
            .bounds([lo, hi])
            .labels(vec![
                Span::from(format!("{:.2}", lo)),
                Span::from(format!("{:.2}", hi)),
            ]),
    );

    f.render_widget(chart, area);
}
