use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

mod forms;

use forms::{FieldKind, Form};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Frame, Terminal,
};
use std::io::stdout;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use studio_core::jobs::{JobKind, JobStatus};
use studio_core::view::{Action, JobCard, ViewModel};
use studio_core::{Outcome, Session};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Index of the "Logs & Metrics" tab, after one tab per job kind.
const LOGS_TAB: usize = JobKind::ALL.len();
const TAB_COUNT: usize = LOGS_TAB + 1;

/// How long a status message stays on screen.
const MESSAGE_SECS: i64 = 6;

/// Color scheme for consistent UI styling
#[derive(Debug, Clone)]
struct ColorScheme {
    queued: Color,
    processing: Color,
    completed: Color,
    failed: Color,

    border_normal: Color,
    border_selected: Color,
    header: Color,
    text_primary: Color,
    text_secondary: Color,
    text_muted: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            queued: Color::Yellow,
            processing: Color::Green,
            completed: Color::Blue,
            failed: Color::Red,

            border_normal: Color::DarkGray,
            border_selected: Color::Cyan,
            header: Color::Cyan,
            text_primary: Color::White,
            text_secondary: Color::Gray,
            text_muted: Color::DarkGray,
        }
    }
}

impl ColorScheme {
    fn status_color(&self, status: JobStatus) -> Color {
        match status {
            JobStatus::Queued => self.queued,
            JobStatus::Processing => self.processing,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct UiState {
    tab: usize,
    /// Index into the recent-jobs sidebar.
    selected_job: usize,
}

struct App {
    session: Session,
    forms: Vec<Form>,
    ui_state: UiState,
    recent_limit: usize,

    logs_json: Option<String>,
    last_message: Option<String>,
    message_timeout: Option<DateTime<Utc>>,

    color_scheme: ColorScheme,
    should_quit: bool,
}

impl App {
    fn new(session: Session, recent_limit: usize) -> Self {
        Self {
            session,
            forms: JobKind::ALL.into_iter().map(Form::new).collect(),
            ui_state: UiState::default(),
            recent_limit: recent_limit.max(1),
            logs_json: None,
            last_message: None,
            message_timeout: None,
            color_scheme: ColorScheme::default(),
            should_quit: false,
        }
    }

    /// Apply poller updates and expire old messages.
    fn tick(&mut self) {
        self.session.pump();
        if let Some(timeout) = self.message_timeout {
            if Utc::now() >= timeout {
                self.last_message = None;
                self.message_timeout = None;
            }
        }
    }

    fn view(&self) -> ViewModel {
        self.session.render()
    }

    fn set_message(&mut self, message: impl Into<String>) {
        self.last_message = Some(message.into());
        self.message_timeout = Some(Utc::now() + chrono::Duration::seconds(MESSAGE_SECS));
    }

    fn current_form(&self) -> Option<&Form> {
        self.forms.get(self.ui_state.tab)
    }

    fn current_form_mut(&mut self) -> Option<&mut Form> {
        self.forms.get_mut(self.ui_state.tab)
    }

    fn selected_card(&self) -> Option<JobCard> {
        let view = self.view();
        view.recent(self.recent_limit)
            .get(self.ui_state.selected_job)
            .cloned()
    }

    fn next_tab(&mut self) {
        self.ui_state.tab = (self.ui_state.tab + 1) % TAB_COUNT;
    }

    fn prev_tab(&mut self) {
        self.ui_state.tab = (self.ui_state.tab + TAB_COUNT - 1) % TAB_COUNT;
    }

    fn move_selection_up(&mut self) {
        self.ui_state.selected_job = self.ui_state.selected_job.saturating_sub(1);
    }

    fn move_selection_down(&mut self) {
        let shown = self.session.store().len().min(self.recent_limit);
        if self.ui_state.selected_job + 1 < shown {
            self.ui_state.selected_job += 1;
        }
    }

    fn submit_current_form(&mut self) {
        let Some(form) = self.current_form() else {
            return;
        };
        let kind = form.kind;
        let parameters = match form.to_parameters() {
            Ok(parameters) => parameters,
            Err(e) => {
                self.set_message(format!("❌ {}", e));
                return;
            }
        };

        match self.session.handle(Action::SubmitForm { kind, parameters }) {
            Ok(Outcome::Submitted(record)) => {
                // Newest job goes to the top of the sidebar
                self.ui_state.selected_job = 0;
                self.set_message(format!("✅ Job submitted: {}", record.id_prefix()));
            }
            Ok(other) => warn!("Unexpected outcome for a submission: {:?}", other),
            Err(e) => self.set_message(format!("❌ {}", e)),
        }
    }

    fn download_selected(&mut self) {
        let Some(card) = self.selected_card() else {
            self.set_message("No job selected");
            return;
        };

        match self.session.handle(Action::RequestDownload { job_id: card.id }) {
            Ok(Outcome::Download { url, .. }) => self.set_message(format!("⬇ Download: {}", url)),
            Ok(Outcome::Rejected(reason)) => self.set_message(format!("⚠ {}", reason)),
            Ok(other) => warn!("Unexpected outcome for a download: {:?}", other),
            Err(e) => self.set_message(format!("❌ {}", e)),
        }
    }

    fn fetch_logs(&mut self) {
        match self.session.handle(Action::FetchLogs) {
            Ok(Outcome::Logs(json)) => {
                self.logs_json = Some(json);
                self.ui_state.tab = LOGS_TAB;
            }
            Ok(other) => warn!("Unexpected outcome for logs: {:?}", other),
            Err(e) => self.set_message(format!("❌ {}", e)),
        }
    }

    fn clear_all(&mut self) {
        match self.session.handle(Action::ClearAll) {
            Ok(Outcome::Cleared(removed)) => {
                self.ui_state.selected_job = 0;
                self.logs_json = None;
                self.set_message(format!("🗑 Cleared {} jobs", removed));
            }
            Ok(other) => warn!("Unexpected outcome for clear: {:?}", other),
            Err(e) => self.set_message(format!("❌ {}", e)),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') if ctrl => self.should_quit = true,
            KeyCode::Char('d') if ctrl => self.download_selected(),
            KeyCode::Char('l') if ctrl => self.fetch_logs(),
            KeyCode::Char('x') if ctrl => self.clear_all(),
            KeyCode::Tab => self.next_tab(),
            KeyCode::BackTab => self.prev_tab(),
            KeyCode::PageUp => self.move_selection_up(),
            KeyCode::PageDown => self.move_selection_down(),
            KeyCode::Esc => {
                self.last_message = None;
                self.message_timeout = None;
            }
            KeyCode::Enter if self.ui_state.tab == LOGS_TAB => self.fetch_logs(),
            KeyCode::Enter => self.submit_current_form(),
            KeyCode::Up => {
                if let Some(form) = self.current_form_mut() {
                    form.focus_prev();
                }
            }
            KeyCode::Down => {
                if let Some(form) = self.current_form_mut() {
                    form.focus_next();
                }
            }
            KeyCode::Left | KeyCode::Right => {
                let forward = key.code == KeyCode::Right;
                if let Some(form) = self.current_form_mut() {
                    form.cycle_choice(forward);
                }
            }
            KeyCode::Backspace => {
                if let Some(form) = self.current_form_mut() {
                    form.backspace();
                }
            }
            KeyCode::Char(c) if !ctrl => {
                if let Some(form) = self.current_form_mut() {
                    form.input(c);
                }
            }
            _ => {}
        }
    }
}

/// Video studio terminal dashboard
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where logs go when RUST_LOG is set
    #[arg(long, default_value = "studio-tui.log")]
    log_file: PathBuf,
}

/// Log to a file, and only when asked to; the terminal belongs to the UI.
fn init_logging(log_file: &Path) -> Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        return Ok(());
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {:?}", log_file))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file)?;

    let cfg = studio_core::config::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    let session = Session::from_config(&cfg)?;
    let mut app = App::new(session, cfg.recent_jobs_limit);
    info!("Dashboard started with {:?} runner", cfg.runner);

    // Setup terminal
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);
    app.session.shutdown();

    // Restore terminal
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )?;

    result
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        app.tick();
        terminal.draw(|f| ui(f, app))?;

        // Poll faster while jobs are moving
        let poll_timeout = if app.view().kpis.active_jobs > 0 {
            Duration::from_millis(200)
        } else {
            Duration::from_millis(1000)
        };

        if crossterm::event::poll(poll_timeout)? {
            if let crossterm::event::Event::Key(key) = crossterm::event::read()? {
                if key.kind == crossterm::event::KeyEventKind::Press {
                    app.handle_key(key);
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let view = app.view();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // KPIs
            Constraint::Length(3), // Tabs
            Constraint::Min(8),    // Body
            Constraint::Length(4), // Status bar
        ])
        .split(f.area());

    render_kpis(f, app, &view, chunks[0]);
    render_tabs(f, app, chunks[1]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
        .split(chunks[2]);

    match app.current_form() {
        Some(form) => render_form(f, app, form, body[0]),
        None => render_logs_and_metrics(f, app, &view, body[0]),
    }
    render_recent_jobs(f, app, &view, body[1]);
    render_status_bar(f, app, chunks[3]);
}

fn render_kpis(f: &mut Frame, app: &App, view: &ViewModel, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(area);

    let kpis = [
        ("⚙ ACTIVE JOBS", view.kpis.active_jobs.to_string(), app.color_scheme.processing),
        ("✅ COMPLETED", view.kpis.completed_jobs.to_string(), app.color_scheme.completed),
        ("❌ FAILED", view.kpis.failed_jobs.to_string(), app.color_scheme.failed),
        (
            "⏱ AVG RENDER TIME",
            view.kpis.average_render_time_display(),
            app.color_scheme.text_primary,
        ),
    ];

    for ((title, value, color), chunk) in kpis.into_iter().zip(chunks.iter()) {
        let paragraph = Paragraph::new(value)
            .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title)
                    .border_style(Style::default().fg(app.color_scheme.border_normal)),
            );
        f.render_widget(paragraph, *chunk);
    }
}

fn render_tabs(f: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<Line> = JobKind::ALL
        .iter()
        .map(|kind| Line::from(kind.label()))
        .chain(std::iter::once(Line::from("Logs & Metrics")))
        .collect();

    let tabs = Tabs::new(titles)
        .select(app.ui_state.tab)
        .block(Block::default().borders(Borders::ALL).title("🎬 VIDEO STUDIO"))
        .style(Style::default().fg(app.color_scheme.text_secondary))
        .highlight_style(
            Style::default()
                .fg(app.color_scheme.header)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, area);
}

fn field_hint(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "",
        FieldKind::Number => "digits only",
        FieldKind::OptionalNumber => "optional",
        FieldKind::Style => "←/→ to change",
        FieldKind::Files => "comma-separated png/jpg files",
        FieldKind::OptionalFile => "optional png/jpg file",
    }
}

fn render_form(f: &mut Frame, app: &App, form: &Form, area: Rect) {
    let mut lines = Vec::with_capacity(form.fields.len() * 2 + 2);
    for (i, field) in form.fields.iter().enumerate() {
        let focused = i == form.focus;
        let marker = if focused { "▶ " } else { "  " };
        let value_style = if focused {
            Style::default()
                .fg(app.color_scheme.text_primary)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(app.color_scheme.text_secondary)
        };
        let cursor = if focused && field.kind != FieldKind::Style { "▏" } else { "" };

        lines.push(Line::from(vec![
            Span::styled(marker, Style::default().fg(app.color_scheme.header)),
            Span::styled(format!("{}: ", field.label), Style::default().fg(app.color_scheme.header)),
            Span::styled(format!("{}{}", field.value, cursor), value_style),
        ]));
        let hint = field_hint(field.kind);
        if focused && !hint.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("    {}", hint),
                Style::default().fg(app.color_scheme.text_muted),
            )));
        }
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Enter to generate",
        Style::default().fg(app.color_scheme.text_muted),
    )));

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("📝 {}", form.kind.label()))
                .border_style(Style::default().fg(app.color_scheme.border_selected)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, area);
}

fn render_logs_and_metrics(f: &mut Frame, app: &App, view: &ViewModel, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(JobKind::ALL.len() as u16 + 3),
            Constraint::Min(3),
        ])
        .split(area);

    let mut metrics = vec![Line::from(format!("Total jobs: {}", view.kpis.total_jobs))];
    for kind in JobKind::ALL {
        let count = view.jobs.iter().filter(|card| card.kind == kind).count();
        metrics.push(Line::from(format!("  {:<20} {}", kind.label(), count)));
    }
    let metrics = Paragraph::new(metrics).block(
        Block::default()
            .borders(Borders::ALL)
            .title("📊 USAGE")
            .border_style(Style::default().fg(app.color_scheme.border_normal)),
    );
    f.render_widget(metrics, chunks[0]);

    let logs = app
        .logs_json
        .as_deref()
        .unwrap_or("Press Enter or Ctrl+L to fetch logs");
    let logs = Paragraph::new(logs)
        .style(Style::default().fg(app.color_scheme.text_secondary))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("📜 ACTIVITY LOG")
                .border_style(Style::default().fg(app.color_scheme.border_selected)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(logs, chunks[1]);
}

fn render_recent_jobs(f: &mut Frame, app: &App, view: &ViewModel, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(5)])
        .split(area);

    let cards = view.recent(app.recent_limit);
    let items: Vec<ListItem> = cards
        .iter()
        .map(|card| {
            ListItem::new(Line::from(Span::styled(
                card.summary_line(),
                Style::default().fg(app.color_scheme.status_color(card.status)),
            )))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("🗂 RECENT JOBS ({})", view.kpis.total_jobs))
                .border_style(Style::default().fg(app.color_scheme.border_normal)),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = ListState::default();
    if !cards.is_empty() {
        state.select(Some(app.ui_state.selected_job.min(cards.len() - 1)));
    }
    f.render_stateful_widget(list, chunks[0], &mut state);

    let detail = match state.selected().and_then(|i| cards.get(i)) {
        Some(card) => match (&card.download_url, &card.error) {
            (Some(url), _) => format!("Ready: {}\nCtrl+D to download", url),
            (_, Some(error)) => format!("Failed: {}", error),
            _ => format!("{} ({})", card.kind.label(), card.status),
        },
        None => "No jobs yet".to_string(),
    };
    let detail = Paragraph::new(detail)
        .style(Style::default().fg(app.color_scheme.text_secondary))
        .block(Block::default().borders(Borders::ALL).title("ℹ DETAILS"))
        .wrap(Wrap { trim: true });
    f.render_widget(detail, chunks[1]);
}

fn render_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let line1 = match &app.last_message {
        Some(message) => format!("  {}", message),
        None => format!("  Tracking {} jobs", app.session.tracked_count()),
    };
    let line2 = "  Tab/Shift+Tab=switch ↑↓=field PgUp/PgDn=job │ Enter=submit Ctrl+D=download Ctrl+L=logs Ctrl+X=clear all │ Ctrl+Q=quit";

    let paragraph = Paragraph::new(vec![Line::from(line1), Line::from(line2)])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("⌨  CONTROLS & STATUS")
                .style(Style::default().fg(app.color_scheme.header)),
        )
        .style(Style::default().fg(app.color_scheme.text_primary));
    f.render_widget(paragraph, area);
}
