use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction as LayoutDirection, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Text},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row, Table, Wrap},
};
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::api::ReviewApi;
use crate::highlight::{ConflictHighlighter, Slot, TagComparison};
use crate::host::{EditorHost, ReviewUi, Severity};
use crate::journal::{Decision, ReviewJournal};
use crate::navigator::{
    AdvanceOutcome, AdvanceStatus, AdvanceTicket, NavigatorOptions, RetryChoice, ReviewNavigator,
};
use crate::resolver::ConflictResolver;
use crate::session::ReviewSession;
use crate::{Direction, ReviewCursor, ReviewError};

const WORKER_THREAD: &str = "review-fetch";
const STATUS_TTL: Duration = Duration::from_secs(4);

/// Terminal cell size used to approximate the map view in pixels.
const CELL_WIDTH_PX: u32 = 8;
const CELL_HEIGHT_PX: u32 = 16;

/// Where the session starts.
#[derive(Debug, Clone)]
pub enum StartPoint {
    /// Let the service pick a random reviewable.
    Random,
    /// Continue after a previously recorded position.
    Resume(ReviewCursor),
    /// Jump to the reviewable with this sort order.
    Sequence(i64),
}

/// Confirmation action for bulk operations.
#[derive(Debug, Clone)]
enum ConfirmAction {
    AcceptAll,
}

enum WorkerMessage {
    Done(AdvanceOutcome),
    Panicked(u64),
}

/// [`ReviewUi`] that buffers what the TUI draws on the next frame.
#[derive(Debug, Default)]
pub struct TerminalUi {
    status_message: Option<(Severity, String, Instant)>,
    processing: Option<String>,
    nav_enabled: bool,
    comparison: Option<TagComparison>,
    remaining: Option<u64>,
    retry_prompt: Option<String>,
    completed: Option<i64>,
    exit_message: Option<String>,
    exited: bool,
}

impl TerminalUi {
    pub fn status(&self) -> Option<(Severity, &str)> {
        self.status_message
            .as_ref()
            .map(|(severity, msg, _)| (*severity, msg.as_str()))
    }

    pub fn processing(&self) -> Option<&str> {
        self.processing.as_deref()
    }

    pub fn nav_enabled(&self) -> bool {
        self.nav_enabled
    }

    pub fn retry_prompt(&self) -> Option<&str> {
        self.retry_prompt.as_deref()
    }

    pub fn has_exited(&self) -> bool {
        self.exited
    }

    fn expire_status(&mut self) {
        let expired = self
            .status_message
            .as_ref()
            .map(|(_, _, time)| time.elapsed() >= STATUS_TTL)
            .unwrap_or(false);
        if expired {
            self.status_message = None;
        }
    }
}

impl ReviewUi for TerminalUi {
    fn alert(&mut self, severity: Severity, message: &str) {
        self.status_message = Some((severity, message.to_string(), Instant::now()));
    }

    fn set_processing(&mut self, active: bool, message: Option<&str>) {
        self.processing = active.then(|| message.unwrap_or("Working...").to_string());
    }

    fn set_nav_enabled(&mut self, enabled: bool) {
        self.nav_enabled = enabled;
    }

    fn show_comparison(&mut self, comparison: &TagComparison) {
        self.comparison = Some(comparison.clone());
    }

    fn meta_updated(&mut self, remaining: u64) {
        self.remaining = Some(remaining);
    }

    fn prompt_retry(&mut self, message: &str) {
        self.retry_prompt = Some(message.to_string());
    }

    fn review_complete(&mut self, map_id: i64) {
        self.completed = Some(map_id);
    }

    fn session_exited(&mut self, message: Option<&str>) {
        self.exited = true;
        self.comparison = None;
        self.retry_prompt = None;
        self.exit_message = message.map(str::to_string);
    }
}

/// Application state for the TUI.
pub struct App {
    session: ReviewSession,
    navigator: ReviewNavigator,
    resolver: ConflictResolver,
    host: EditorHost,
    api: Arc<dyn ReviewApi>,
    journal: Option<ReviewJournal>,
    map_id: i64,
    layer: String,
    ui: TerminalUi,
    confirm_action: Option<ConfirmAction>,
    should_quit: bool,
    show_help: bool,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
}

impl App {
    pub fn new(
        api: Arc<dyn ReviewApi>,
        map_id: i64,
        layer: String,
        highlighter: ConflictHighlighter,
        journal: Option<ReviewJournal>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            session: ReviewSession::new(),
            navigator: ReviewNavigator::new(highlighter),
            resolver: ConflictResolver::new(),
            host: EditorHost::new(Arc::clone(&api), map_id),
            api,
            journal,
            map_id,
            layer,
            ui: TerminalUi::default(),
            confirm_action: None,
            should_quit: false,
            show_help: false,
            tx,
            rx,
        }
    }

    /// Enter review mode and request the first reviewable.
    pub fn start(&mut self, start: StartPoint) {
        let options = NavigatorOptions {
            next_control: Some("n".to_string()),
            prev_control: Some("p".to_string()),
            map_id: Some(self.map_id),
        };
        if !self
            .navigator
            .initialize(&mut self.session, &mut self.ui, &options)
        {
            return;
        }
        let ticket = match start {
            StartPoint::Random => self.begin(Direction::Forward),
            StartPoint::Resume(cursor) => {
                self.session.seed_cursor(cursor);
                self.begin(Direction::Forward)
            }
            StartPoint::Sequence(sequence) => self.navigator.begin_jump(
                &mut self.session,
                &self.host,
                &mut self.ui,
                sequence,
            ),
        };
        self.dispatch(ticket);
    }

    fn begin(&mut self, direction: Direction) -> Result<AdvanceTicket, ReviewError> {
        self.navigator
            .begin_advance(&mut self.session, &self.host, &mut self.ui, direction)
    }

    fn dispatch(&mut self, ticket: Result<AdvanceTicket, ReviewError>) {
        match ticket {
            Ok(ticket) => self.spawn_fetch(ticket),
            Err(e) => self.report(e),
        }
    }

    /// Run the ticket's network round trips off the UI thread.
    fn spawn_fetch(&mut self, ticket: AdvanceTicket) {
        let api = Arc::clone(&self.api);
        let tx = self.tx.clone();
        let ticket_id = ticket.id();
        let spawned = thread::Builder::new()
            .name(WORKER_THREAD.to_string())
            .spawn(move || {
                let message = match catch_unwind(AssertUnwindSafe(|| ticket.fetch(api.as_ref()))) {
                    Ok(outcome) => WorkerMessage::Done(outcome),
                    Err(_) => WorkerMessage::Panicked(ticket_id),
                };
                // The receiver is gone only when the app is shutting down.
                let _ = tx.send(message);
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn review worker");
            self.navigator
                .abort_advance(&mut self.session, &mut self.ui, ticket_id);
        }
    }

    /// Apply finished worker results.
    fn poll_worker(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            match message {
                WorkerMessage::Done(outcome) => self.apply_outcome(outcome),
                WorkerMessage::Panicked(ticket_id) => {
                    self.navigator
                        .abort_advance(&mut self.session, &mut self.ui, ticket_id);
                }
            }
        }
    }

    fn apply_outcome(&mut self, outcome: AdvanceOutcome) {
        let result = self.navigator.finish_advance(
            &mut self.session,
            &mut self.host,
            &mut self.ui,
            outcome,
        );
        match result {
            Ok(AdvanceStatus::Highlighted(cursor)) => self.record_cursor(&cursor),
            Ok(AdvanceStatus::Exhausted) | Ok(AdvanceStatus::Discarded) => {}
            Err(e) => self.report(e),
        }
    }

    /// Surface errors the workflow did not already alert about.
    fn report(&mut self, e: ReviewError) {
        debug!(error = %e, "review action failed");
        if matches!(
            e,
            ReviewError::NothingToReview | ReviewError::Host(_) | ReviewError::FeatureNotFound(_)
        ) {
            self.ui.alert(Severity::Warning, &e.to_string());
        }
    }

    fn record_cursor(&mut self, cursor: &ReviewCursor) {
        if let Some(journal) = self.journal.as_mut()
            && let Err(e) = journal.save_cursor(cursor)
        {
            warn!(error = %e, "failed to record review position");
        }
    }

    fn record_decision(&mut self, relation_id: i64, decision: Decision) {
        if let Some(journal) = self.journal.as_mut()
            && let Err(e) = journal.record_decision(self.map_id, relation_id, decision)
        {
            warn!(error = %e, "failed to record review decision");
        }
    }

    /// Handle keyboard input.
    fn handle_input(&mut self, key: event::KeyEvent) {
        if self.ui.retry_prompt.is_some() {
            let choice = match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => RetryChoice::Retry,
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => RetryChoice::Abandon,
                _ => return,
            };
            self.ui.retry_prompt = None;
            match self.navigator.resolve_failure(
                &mut self.session,
                &mut self.host,
                &mut self.ui,
                choice,
            ) {
                Ok(Some(ticket)) => self.spawn_fetch(ticket),
                Ok(None) => {}
                Err(e) => self.report(e),
            }
            return;
        }

        if let Some(action) = self.confirm_action.take() {
            if let KeyCode::Char('y') | KeyCode::Char('Y') = key.code {
                match action {
                    ConfirmAction::AcceptAll => self.accept_all(),
                }
            }
            return;
        }

        if self.show_help {
            self.show_help = false;
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Char('n') | KeyCode::Right => {
                let ticket = self.begin(Direction::Forward);
                self.dispatch(ticket);
            }
            KeyCode::Char('p') | KeyCode::Left => {
                let ticket = self.begin(Direction::Backward);
                self.dispatch(ticket);
            }
            KeyCode::Char('r') => self.retain(),
            KeyCode::Char('A') => {
                if self.session.is_active() {
                    self.confirm_action = Some(ConfirmAction::AcceptAll);
                }
            }
            KeyCode::Char('[') => self.cycle(Slot::Left, Direction::Backward),
            KeyCode::Char(']') => self.cycle(Slot::Left, Direction::Forward),
            KeyCode::Char('{') => self.cycle(Slot::Right, Direction::Backward),
            KeyCode::Char('}') => self.cycle(Slot::Right, Direction::Forward),
            KeyCode::Char('c') => self.recenter(),
            _ => {}
        }
    }

    fn retain(&mut self) {
        let relation_id = self.session.current_pair().map(|pair| pair.relation_id);
        let ticket = self.resolver.retain(
            &self.navigator,
            &mut self.session,
            &mut self.host,
            &mut self.ui,
        );
        if let (Ok(_), Some(relation_id)) = (&ticket, relation_id) {
            self.record_decision(relation_id, Decision::Retained);
        }
        self.dispatch(ticket);
    }

    fn accept_all(&mut self) {
        let result = self.resolver.accept_all(
            &self.navigator,
            &mut self.session,
            self.api.as_ref(),
            &mut self.host,
            &mut self.ui,
            &self.layer,
        );
        match result {
            Ok(()) => self.record_decision(0, Decision::AcceptedAll),
            Err(e) => self.report(e),
        }
    }

    fn cycle(&mut self, slot: Slot, direction: Direction) {
        if let Err(e) = self.navigator.highlighter().cycle(
            &mut self.session,
            &mut self.host,
            &mut self.ui,
            slot,
            direction,
        ) {
            self.report(e);
        }
    }

    fn recenter(&mut self) {
        let Some(pair) = self.session.current_pair().cloned() else {
            return;
        };
        if let Err(e) =
            self.navigator
                .highlighter()
                .highlight(&mut self.session, &mut self.host, &mut self.ui, pair, true)
        {
            self.report(e);
        }
    }

    /// Render the UI.
    fn render(&mut self, frame: &mut Frame) {
        self.ui.expire_status();
        let area = frame.area();
        self.host.set_viewport_size(
            u32::from(area.width) * CELL_WIDTH_PX,
            u32::from(area.height) * CELL_HEIGHT_PX,
        );

        if self.show_help {
            self.render_help(frame);
            return;
        }

        let chunks = Layout::default()
            .direction(LayoutDirection::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(3),
            ])
            .split(area);
        let main_chunks = Layout::default()
            .direction(LayoutDirection::Horizontal)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(chunks[1]);

        self.render_header(frame, chunks[0]);
        self.render_tags(frame, main_chunks[0]);
        self.render_members(frame, main_chunks[1]);
        self.render_status_bar(frame, chunks[2]);

        if let Some(message) = &self.ui.processing {
            render_popup(frame, "Working", message, Color::Cyan, 40, 20);
        }
        if let Some(message) = &self.ui.retry_prompt {
            let text = format!("{message}\n\n(y)es to retry / (n)o to abandon the session");
            render_popup(frame, "Request failed", &text, Color::Red, 60, 30);
        } else if self.confirm_action.is_some() {
            let text = format!(
                "Accept all remaining reviews of map {}?\n\n(y)es / (n)o",
                self.map_id
            );
            render_popup(frame, "Confirm", &text, Color::Yellow, 50, 30);
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let position = match self.session.cursor() {
            Some(cursor) => format!(
                "review r{} (sort order {})",
                cursor.relation_id, cursor.sort_order
            ),
            None => "no reviewable".to_string(),
        };
        let counts = match self.session.statistics() {
            Some(stats) => format!(
                "{} of {} unreviewed",
                self.ui.remaining.unwrap_or(stats.unreviewed_count),
                stats.total_count
            ),
            None => "statistics pending".to_string(),
        };
        let viewport = self.host.viewport();
        let state = if self.ui.exited {
            " | session ended"
        } else if !self.ui.nav_enabled {
            " | navigation disabled"
        } else {
            ""
        };
        let text = format!(
            "Map {} | {} | {} | z{:.1} @ {:.5},{:.5}{}",
            self.map_id,
            position,
            counts,
            viewport.zoom,
            viewport.center.1,
            viewport.center.0,
            state
        );
        let header = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("Conflation Review"))
            .style(Style::default().add_modifier(Modifier::BOLD));
        frame.render_widget(header, area);
    }

    fn render_tags(&self, frame: &mut Frame, area: Rect) {
        let Some(comparison) = &self.ui.comparison else {
            let text = match (&self.ui.exit_message, self.ui.completed) {
                (Some(message), _) => message.clone(),
                (None, Some(map_id)) => format!("Review of map {map_id} complete."),
                (None, None) => "No reviewable loaded. Press n to load the next one.".to_string(),
            };
            let paragraph = Paragraph::new(text)
                .block(Block::default().borders(Borders::ALL).title("Tags"))
                .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
            return;
        };

        let rows: Vec<Row> = comparison
            .rows
            .iter()
            .map(|row| {
                let style = if row.differs() {
                    Style::default().fg(Color::Yellow)
                } else {
                    Style::default()
                };
                Row::new(vec![
                    Cell::from(row.key.clone()),
                    Cell::from(row.left.clone().unwrap_or_default()),
                    Cell::from(row.right.clone().unwrap_or_default()),
                ])
                .style(style)
            })
            .collect();

        let right_title = comparison
            .right
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let header = Row::new(vec![
            "Key".to_string(),
            comparison.left.to_string(),
            right_title,
        ])
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        );

        let widths = [
            Constraint::Percentage(30),
            Constraint::Percentage(35),
            Constraint::Percentage(35),
        ];
        let table = Table::new(rows, widths)
            .block(Block::default().borders(Borders::ALL).title("Tags"))
            .header(header);
        frame.render_widget(table, area);
    }

    fn render_members(&self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = match self.session.current_pair() {
            Some(pair) => pair
                .members
                .iter()
                .enumerate()
                .map(|(idx, id)| {
                    let (marker, color) = if idx == pair.left {
                        ("L", Color::Green)
                    } else if Some(idx) == pair.right {
                        ("R", Color::Magenta)
                    } else {
                        (" ", Color::Gray)
                    };
                    let modified = if self.host.graph().is_modified(id) {
                        " *"
                    } else {
                        ""
                    };
                    let style = if marker == " " {
                        Style::default().fg(color)
                    } else {
                        Style::default().fg(color).add_modifier(Modifier::BOLD)
                    };
                    ListItem::new(format!("{marker} {id}{modified}")).style(style)
                })
                .collect(),
            None => Vec::new(),
        };

        let title = match self.session.current_pair() {
            Some(pair) => format!("Members of r{}", pair.relation_id),
            None => "Members".to_string(),
        };
        let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(list, area);
    }

    fn render_status_bar(&self, frame: &mut Frame, area: Rect) {
        let (text, style) = match self.ui.status() {
            Some((severity, message)) => (message.to_string(), severity_style(severity)),
            None => (
                "n/p: next/prev  r: retain  A: accept all  [ ]/{ }: cycle  c: center  ?: help  q: quit"
                    .to_string(),
                Style::default(),
            ),
        };
        let paragraph = Paragraph::new(text)
            .style(style)
            .block(Block::default().borders(Borders::ALL))
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, area);
    }

    fn render_help(&self, frame: &mut Frame) {
        let help_text = [
            "Conflation Review - Keyboard Shortcuts",
            "",
            "Navigation:",
            "  n / Right     - Next reviewable",
            "  p / Left      - Previous reviewable",
            "  [ / ]         - Cycle left feature through the relation",
            "  { / }         - Cycle right feature through the relation",
            "  c             - Center the map on the displayed pair",
            "",
            "Actions:",
            "  r             - Mark reviewed, save and move on",
            "  A (Shift+A)   - Accept all remaining reviews",
            "",
            "Other:",
            "  ?             - Show this help",
            "  q / Esc       - Quit",
            "",
            "Press any key to close this help",
        ];

        let text = Text::from(help_text.iter().map(|&s| Line::from(s)).collect::<Vec<_>>());
        let paragraph = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("Help"))
            .wrap(Wrap { trim: false });

        let area = centered_rect(60, 80, frame.area());
        frame.render_widget(Clear, area);
        frame.render_widget(paragraph, area);
    }
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Notice => Style::default().fg(Color::Cyan),
        Severity::Warning => Style::default().fg(Color::Yellow),
        Severity::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        Severity::Success => Style::default().fg(Color::Green),
    }
}

fn render_popup(
    frame: &mut Frame,
    title: &str,
    message: &str,
    color: Color,
    percent_x: u16,
    percent_y: u16,
) {
    let paragraph = Paragraph::new(message.to_string())
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(color));

    let area = centered_rect(percent_x, percent_y, frame.area());
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

/// Create a centered rectangle.
fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(LayoutDirection::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(LayoutDirection::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Setup the terminal for TUI rendering.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("Failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("Failed to create terminal")
}

/// Restore the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;
    Ok(())
}

/// Launch the interactive review interface.
///
/// Accepts an [`App`] that has already been started with [`App::start`].
pub fn run_tui(mut app: App) -> Result<()> {
    // Worker panics are reported through the channel; only restore for the UI thread.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        if thread::current().name() != Some(WORKER_THREAD) {
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        }
        original_hook(panic_info);
    }));

    let mut terminal = setup_terminal()?;

    let result = (|| -> Result<()> {
        loop {
            app.poll_worker();

            terminal
                .draw(|f| app.render(f))
                .context("Failed to draw frame")?;

            if app.should_quit {
                break;
            }

            if event::poll(Duration::from_millis(200)).context("Failed to poll events")?
                && let Event::Key(key) = event::read().context("Failed to read event")?
            {
                // Ignore key release events
                if key.kind == event::KeyEventKind::Press {
                    app.handle_input(key);
                }
            }
        }
        Ok(())
    })();

    restore_terminal(&mut terminal)?;

    result
}
