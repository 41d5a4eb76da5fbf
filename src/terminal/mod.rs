pub mod events;
pub mod state;
pub mod ui;

use anyhow::Result;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::DefaultTerminal;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::domain::inbox::Message;
use crate::manager::InboxManager;
use crate::notify::{Notice, Notifier};
use crate::terminal::state::AppState;

const FRAME: Duration = Duration::from_millis(200);
/// How long a notice stays in the footer.
const NOTICE_TTL: Duration = Duration::from_secs(5);

type Latest = Arc<Mutex<Option<(Notice, Instant)>>>;

/// Shows notices in the footer and optionally forwards them.
pub struct StatusNotifier {
    latest: Latest,
    forward: Option<Box<dyn Notifier>>,
}

impl StatusNotifier {
    pub fn new(forward: Option<Box<dyn Notifier>>) -> (Self, StatusLine) {
        let latest: Latest = Arc::new(Mutex::new(None));
        let line = StatusLine {
            latest: Arc::clone(&latest),
        };
        (Self { latest, forward }, line)
    }
}

impl Notifier for StatusNotifier {
    fn notice(&self, notice: &Notice) {
        if let Ok(mut g) = self.latest.lock() {
            *g = Some((notice.clone(), Instant::now()));
        }
        if let Some(f) = &self.forward {
            f.notice(notice);
        }
    }

    fn new_message(&self, message: &Message) {
        if let Some(f) = &self.forward {
            f.new_message(message);
        }
    }
}

/// Read side of a [`StatusNotifier`].
#[derive(Clone)]
pub struct StatusLine {
    latest: Latest,
}

impl StatusLine {
    pub fn current(&self) -> Option<String> {
        let g = self.latest.lock().ok()?;
        let (notice, at) = g.as_ref()?;
        (at.elapsed() < NOTICE_TTL).then(|| notice.text.clone())
    }
}

pub fn run_tui(manager: &mut InboxManager, status: StatusLine) -> Result<()> {
    let mut state = AppState::new();
    let opened = Arc::clone(&state.opened_id);
    manager.on_message_select(Box::new(move |id| {
        if let Ok(mut g) = opened.lock() {
            *g = Some(id.to_string());
        }
    }));

    let terminal = ratatui::init();
    let result = run(terminal, manager, &mut state, &status);
    ratatui::restore();
    manager.shutdown();

    result
}

fn run(
    mut terminal: DefaultTerminal,
    manager: &mut InboxManager,
    state: &mut AppState,
    status: &StatusLine,
) -> Result<()> {
    manager.start();
    loop {
        manager.pump();
        let snap = manager.snapshot();
        state.sync(&snap);

        let line = status.current();
        terminal.draw(|f| ui::render(f, &snap, state, line.as_deref()))?;

        if event::poll(FRAME)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && events::handle_key(key, state, manager, &snap)?
        {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;

    #[test]
    fn test_status_line_shows_latest_notice() {
        let recorder = RecordingNotifier::default();
        let (notifier, line) = StatusNotifier::new(Some(Box::new(recorder.clone())));
        assert_eq!(line.current(), None);

        notifier.notice(&Notice::info("Copied to clipboard"));
        notifier.notice(&Notice::error("Failed to delete message"));
        assert_eq!(line.current().as_deref(), Some("Failed to delete message"));
        assert_eq!(recorder.texts().len(), 2);
    }
}
