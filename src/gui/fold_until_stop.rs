use std::{io::stdout, sync::mpsc, thread, time::Duration};

use crate::gui::error::GuiError;

use crossterm::{
    event::{self, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};

use ratatui::{
    prelude::*,
    widgets::{block::Title, *},
    Terminal,
};

enum ThreadMessage {
    Stop,
}

/// Generates a gui that runs a function until the user provides input.
///
/// The function can be thought of as a recursive fold. `init` contains the
/// inital state of the loop, then `f` is called on the inital state to produce
/// a new state, and then `f` is called on that new state, and so on until the
/// user indicates that this should stop. `title` heads the screen shown
/// meanwhile.
pub fn fold_until_stop<F, T>(title: &str, init: T, mut f: F) -> Result<T, GuiError>
where
    F: FnMut(T) -> T + Send + 'static,
    T: Send + 'static,
{
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let (stop_tx, stop_rx) = mpsc::channel();
    let (res_tx, res_rx) = mpsc::channel();

    let th = thread::spawn(move || {
        let mut val = init;

        loop {
            val = f(val);
            if let Ok(ThreadMessage::Stop) = stop_rx.try_recv() {
                // Nobody is listening if the gui side already failed
                let _ = res_tx.send(val);
                break;
            }
        }
    });

    let title = format!(" {} ", title);
    let drawn = loop {
        let text = Paragraph::new(Line::from(vec![
            " Recording... ".into(),
            " Press any key to stop ".cyan().bold(),
        ]));
        let block = Block::default()
            .title(Title::from(title.as_str().cyan().bold()).alignment(Alignment::Center))
            .borders(Borders::ALL);
        if let Err(e) = terminal.draw(|frame| {
            let area = frame.size();
            frame.render_widget(text.block(block), area);
        }) {
            break Err(e);
        }
        match event::poll(Duration::from_millis(16)) {
            Ok(true) => match event::read() {
                Ok(event::Event::Key(key)) if key.kind == KeyEventKind::Press => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(e),
            },
            Ok(false) => {}
            Err(e) => break Err(e),
        }
    };

    // The worker gets stopped and the terminal restored even if drawing failed
    stop_tx.send(ThreadMessage::Stop)?;
    let res = res_rx.recv()?;
    th.join().map_err(|_| GuiError::JoinError)?;
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    drawn?;

    Ok(res)
}
