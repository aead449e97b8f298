use std::{
    io::{self, stdout},
    path::PathBuf,
    time::Duration,
};

use crate::gui::error::GuiError;
use crate::serial_logger::PortStatus;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// Cursor and message state of the port selector, kept apart from drawing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPicker {
    ports: Vec<PortStatus>,
    cursor: usize,
    notice: Option<String>,
}

impl PortPicker {
    /// Starts on the first port that opened.
    pub fn new(ports: Vec<PortStatus>) -> Self {
        let cursor = ports.iter().position(PortStatus::is_usable).unwrap_or(0);
        Self {
            ports,
            cursor,
            notice: None,
        }
    }

    /// Swaps in a fresh survey, staying on the same port if it is still
    /// there.
    pub fn rescan(&mut self, ports: Vec<PortStatus>) {
        let current = self.ports.get(self.cursor).map(|p| p.path.clone());
        *self = Self::new(ports);
        if let Some(i) = current.and_then(|c| self.ports.iter().position(|p| p.path == c)) {
            self.cursor = i;
        }
        self.notice = Some(format!("{} ports found", self.ports.len()));
    }

    /// Ports on offer.
    pub fn ports(&self) -> &[PortStatus] {
        &self.ports
    }

    /// Index of the highlighted port.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Last message for the user, if any.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Moves the cursor down, wrapping around.
    pub fn down(&mut self) {
        if !self.ports.is_empty() {
            self.cursor = (self.cursor + 1) % self.ports.len();
        }
    }

    /// Moves the cursor up, wrapping around.
    pub fn up(&mut self) {
        let n = self.ports.len();
        if n > 0 {
            self.cursor = (self.cursor + n - 1) % n;
        }
    }

    /// The highlighted port if it opened during the survey. Otherwise
    /// leaves a notice saying why it cannot be used.
    pub fn choose(&mut self) -> Option<PathBuf> {
        let Some(port) = self.ports.get(self.cursor) else {
            self.notice = Some("No serial ports found".to_owned());
            return None;
        };
        match &port.problem {
            None => Some(port.path.clone()),
            Some(problem) => {
                self.notice = Some(format!("{} cannot be opened: {}", port.path.display(), problem));
                None
            }
        }
    }
}

fn port_line(port: &PortStatus) -> Line<'_> {
    let name = port.path.to_string_lossy();
    match &port.problem {
        None => Line::from(vec![Span::raw(name), "  ready".green()]),
        Some(problem) => Line::from(vec![
            Span::styled(name, Style::default().fg(Color::DarkGray)),
            Span::styled(format!("  {}", problem), Style::default().fg(Color::Red)),
        ]),
    }
}

/// Lets the user pick the serial port the sensor board is plugged into.
/// Every port found by `survey` is listed with whether it opened; ports
/// that did not cannot be picked. `<R>` runs the survey again. Returns
/// `None` if the user quits instead.
pub fn port_selector<F>(mut survey: F) -> Result<Option<PathBuf>, GuiError>
where
    F: FnMut() -> io::Result<Vec<PortStatus>>,
{
    let mut picker = PortPicker::new(survey()?);

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut list_state = ListState::default();
    let chosen = loop {
        let title = Title::from(" Sensor Board Port ".cyan().bold());
        let instructions = Title::from(Line::from(vec![
            " Navigate ".into(),
            "<Up>/<Down>".cyan().bold(),
            " Select ".into(),
            "<Enter>".cyan().bold(),
            " Rescan ".into(),
            "<R>".cyan().bold(),
            " Quit ".into(),
            "<Q> ".cyan().bold(),
        ]));
        let block = Block::default()
            .title(title.alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL);
        let list = List::new(picker.ports().iter().map(port_line))
            .highlight_symbol(">>")
            .highlight_style(Style::default().add_modifier(Modifier::BOLD))
            .block(block);
        let notice = Paragraph::new(picker.notice().unwrap_or_default().yellow());
        list_state.select(Some(picker.cursor()));

        let drawn = terminal.draw(|frame| {
            let [list_area, notice_area] = {
                let parts = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Min(0), Constraint::Length(1)])
                    .split(frame.size());
                [parts[0], parts[1]]
            };
            frame.render_stateful_widget(list, list_area, &mut list_state);
            frame.render_widget(notice, notice_area);
        });
        if let Err(e) = drawn {
            break Err(e);
        }

        match event::poll(Duration::from_millis(16)) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => break Err(e),
        }
        match event::read() {
            Ok(event::Event::Key(key)) if key.kind == KeyEventKind::Press => match key.code {
                KeyCode::Down => picker.down(),
                KeyCode::Up => picker.up(),
                KeyCode::Enter => {
                    if let Some(path) = picker.choose() {
                        break Ok(Some(path));
                    }
                }
                KeyCode::Char('r') => match survey() {
                    Ok(ports) => picker.rescan(ports),
                    Err(e) => break Err(e),
                },
                KeyCode::Char('q') | KeyCode::Esc => break Ok(None),
                _ => {}
            },
            Ok(_) => {}
            Err(e) => break Err(e),
        }
    };

    // The terminal is restored before any error is reported
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(chosen?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, problem: Option<&str>) -> PortStatus {
        PortStatus {
            path: PathBuf::from(name),
            problem: problem.map(str::to_owned),
        }
    }

    #[test]
    fn starts_on_first_usable_port() {
        let picker = PortPicker::new(vec![
            port("/dev/ttyS0", Some("Permission denied")),
            port("/dev/ttyACM0", None),
        ]);
        assert_eq!(picker.cursor(), 1);
        assert_eq!(PortPicker::new(Vec::new()).cursor(), 0);
    }

    #[test]
    fn busy_port_cannot_be_chosen() {
        let mut picker = PortPicker::new(vec![
            port("/dev/ttyACM0", None),
            port("/dev/ttyUSB0", Some("Device or resource busy")),
        ]);
        picker.down();
        assert_eq!(picker.choose(), None);
        assert!(picker.notice().unwrap().contains("resource busy"));

        picker.down();
        assert_eq!(picker.choose(), Some(PathBuf::from("/dev/ttyACM0")));
    }

    #[test]
    fn cursor_wraps_and_survives_empty_lists() {
        let mut picker = PortPicker::new(vec![port("a", None), port("b", None)]);
        picker.up();
        assert_eq!(picker.cursor(), 1);

        let mut empty = PortPicker::new(Vec::new());
        empty.up();
        empty.down();
        assert_eq!(empty.choose(), None);
        assert_eq!(empty.notice(), Some("No serial ports found"));
    }

    #[test]
    fn rescan_keeps_the_highlighted_port() {
        let mut picker = PortPicker::new(vec![port("a", None), port("b", None)]);
        picker.down();
        picker.rescan(vec![port("new", None), port("a", None), port("b", None)]);
        assert_eq!(picker.cursor(), 2);
        assert_eq!(picker.notice(), Some("3 ports found"));
    }
}
