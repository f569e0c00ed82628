//! App state and main loop: input handling, applying dashboard events, and drawing.

use std::{io, time::Duration};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};

use fleetwatch::dashboard::Dashboard;
use fleetwatch::ui::{
    detail::draw_detail, header::draw_header, logs::draw_logs,
    notifications::draw_notifications, servers::draw_servers, toast::draw_toast,
};

const TICK: Duration = Duration::from_millis(250);

pub struct App {
    dashboard: Dashboard,
    selected: usize,
    should_quit: bool,
}

impl App {
    pub fn new(dashboard: Dashboard) -> Self {
        Self {
            dashboard,
            selected: 0,
            should_quit: false,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.dashboard.start();

        // Terminal setup
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let res = self.event_loop(&mut terminal).await;

        // Teardown
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        res
    }

    async fn event_loop<B: ratatui::backend::Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
    ) -> anyhow::Result<()> {
        loop {
            // Input (non-blocking)
            while event::poll(Duration::from_millis(10))? {
                if let Event::Key(k) = event::read()? {
                    if k.kind == KeyEventKind::Press {
                        self.on_key(k);
                    }
                }
            }
            if self.should_quit {
                break;
            }

            self.dashboard.drain();
            let len = self.dashboard.roster().len();
            self.selected = self.selected.min(len.saturating_sub(1));

            terminal.draw(|f| self.draw(f))?;

            // Wake early when an event arrives
            tokio::select! {
                msg = self.dashboard.next() => {
                    if let Some(msg) = msg {
                        self.dashboard.handle(msg);
                    }
                }
                _ = tokio::time::sleep(TICK) => {}
            }
        }
        Ok(())
    }

    fn on_key(&mut self, k: KeyEvent) {
        // raw mode swallows SIGINT
        if k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }
        match k.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => self.selected = self.selected.saturating_add(1),
            KeyCode::Char('a') => self.dashboard.mark_all_read(),
            KeyCode::Char('n') => self.dashboard.mark_newest_read(),
            KeyCode::Char('r') => self.dashboard.refresh(),
            _ => {}
        }
    }

    fn draw(&self, f: &mut ratatui::Frame<'_>) {
        let area = f.area();
        let roster = self.dashboard.roster();
        let notes = self.dashboard.notifications();

        // Root rows: header, servers, detail, notifications + logs, toast
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Percentage(30),
                Constraint::Min(12),
                Constraint::Length(9),
                Constraint::Length(1),
            ])
            .split(area);

        draw_header(
            f,
            rows[0],
            &roster,
            self.dashboard.push_state(),
            notes.unread_count(),
        );
        draw_servers(f, rows[1], &roster, self.selected);

        let selected = roster.get(self.selected);
        draw_detail(f, rows[2], selected);

        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[3]);
        draw_notifications(f, bottom[0], &notes.snapshot(), notes.is_new());
        draw_logs(
            f,
            bottom[1],
            self.dashboard.logs(),
            selected.map(|s| s.code.as_str()),
        );

        draw_toast(f, rows[4], self.dashboard.toast());
    }
}
