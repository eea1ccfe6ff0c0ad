use std::io;
use std::panic;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph, Wrap};
use time::OffsetDateTime;

use crate::core::{CheckResult, CheckStatus, Severity};
use crate::engine::{CancelToken, ScanOptions, Scanner};
use crate::export::{self, ExportFormat};
use crate::probes::{self, ProbeContext};
use crate::scoring::{NotApplicablePolicy, ScanStats, ScoreBand, group_by_category};

/// Everything needed to (re)build and run a scan from the dashboard thread.
#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub probe_keys: Vec<String>,
    pub ctx: ProbeContext,
    pub scan: ScanOptions,
    pub policy: NotApplicablePolicy,
    pub export_dir: PathBuf,
    pub color: bool,
}

pub fn run(settings: DashboardSettings) -> Result<()> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;

    let mut terminal =
        Terminal::new(CrosstermBackend::new(stdout)).context("failed to initialize terminal")?;
    terminal.clear().ok();

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        run_app(&mut terminal, settings)
    }));

    let _ = terminal.show_cursor();
    let _ = disable_raw_mode();
    let mut stdout = io::stdout();
    let _ = execute!(stdout, LeaveAlternateScreen);

    match res {
        Ok(res) => res,
        Err(_) => Err(anyhow::anyhow!(
            "the dashboard panicked (terminal state has been restored)"
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Running,
    Dashboard,
    Help,
    Error,
}

enum ScanMsg {
    Progress {
        index: usize,
        total: usize,
        title: String,
    },
    Done(Result<Vec<CheckResult>>),
}

struct PendingScan {
    rx: mpsc::Receiver<ScanMsg>,
    cancel: CancelToken,
    started_at: Instant,
}

/// One line of the result list: a category heading or a result index.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Row {
    Category(String),
    Result(usize),
}

struct App {
    settings: DashboardSettings,
    screen: Screen,
    help_return_to: Screen,
    results: Vec<CheckResult>,
    stats: ScanStats,
    rows: Vec<Row>,
    list_state: ListState,
    show_evidence: bool,
    progress: Option<(usize, usize, String)>,
    status_line: Option<String>,
    error: Option<String>,
    pending: Option<PendingScan>,
    tick: u64,
}

impl App {
    fn new(settings: DashboardSettings) -> Self {
        Self {
            settings,
            screen: Screen::Running,
            help_return_to: Screen::Dashboard,
            results: Vec::new(),
            stats: ScanStats::default(),
            rows: Vec::new(),
            list_state: ListState::default(),
            show_evidence: false,
            progress: None,
            status_line: None,
            error: None,
            pending: None,
            tick: 0,
        }
    }

    fn set_results(&mut self, results: Vec<CheckResult>) {
        self.stats = ScanStats::from_results(&results, self.settings.policy);
        self.rows = build_rows(&results);
        self.results = results;
        self.list_state
            .select(self.rows.iter().position(|r| matches!(r, Row::Result(_))));
        self.screen = Screen::Dashboard;
    }

    fn selected_result(&self) -> Option<&CheckResult> {
        match self.rows.get(self.list_state.selected()?)? {
            Row::Result(i) => self.results.get(*i),
            Row::Category(_) => None,
        }
    }

    /// Move by `delta` result rows, skipping category headings.
    fn move_selection(&mut self, delta: i32) {
        let result_rows: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| matches!(r, Row::Result(_)))
            .map(|(i, _)| i)
            .collect();
        if result_rows.is_empty() {
            self.list_state.select(None);
            return;
        }
        let current = self
            .list_state
            .selected()
            .and_then(|sel| result_rows.iter().position(|&r| r == sel))
            .unwrap_or(0) as i32;
        let next = (current + delta).clamp(0, result_rows.len() as i32 - 1) as usize;
        self.list_state.select(Some(result_rows[next]));
    }

    fn open_error(&mut self, msg: impl Into<String>) {
        self.error = Some(msg.into());
        self.screen = Screen::Error;
    }
}

fn build_rows(results: &[CheckResult]) -> Vec<Row> {
    let mut rows = Vec::new();
    for group in group_by_category(results) {
        rows.push(Row::Category(group.category.to_string()));
        for r in group.results {
            if let Some(i) = results.iter().position(|x| std::ptr::eq(x, r)) {
                rows.push(Row::Result(i));
            }
        }
    }
    rows
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    settings: DashboardSettings,
) -> Result<()> {
    let mut app = App::new(settings);
    start_scan(&mut app);

    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| draw(f, &mut app)).context("failed to draw")?;
        poll_pending(&mut app);

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event::poll(timeout).context("failed to poll events")? {
            if let Event::Key(key) = event::read().context("failed to read event")? {
                if key.kind == KeyEventKind::Press && handle_key(&mut app, key) {
                    break;
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick = app.tick.wrapping_add(1);
            last_tick = Instant::now();
        }
    }

    if let Some(pending) = app.pending.take() {
        pending.cancel.cancel();
    }
    Ok(())
}

fn start_scan(app: &mut App) {
    let (tx, rx) = mpsc::channel::<ScanMsg>();
    let cancel = CancelToken::new();
    let settings = app.settings.clone();
    let worker_cancel = cancel.clone();

    thread::spawn(move || {
        let res = probes::select(&settings.probe_keys, &settings.ctx)
            .and_then(|selected| Scanner::new(selected, settings.scan.clone()))
            .map(|scanner| {
                let progress = |index: usize, total: usize, title: &str| {
                    let _ = tx.send(ScanMsg::Progress {
                        index,
                        total,
                        title: title.to_string(),
                    });
                };
                scanner.run(&progress, &worker_cancel)
            });
        let _ = tx.send(ScanMsg::Done(res));
    });

    app.pending = Some(PendingScan {
        rx,
        cancel,
        started_at: Instant::now(),
    });
    app.progress = None;
    app.status_line = None;
    app.screen = Screen::Running;
}

fn poll_pending(app: &mut App) {
    let Some(pending) = app.pending.take() else {
        return;
    };
    loop {
        match pending.rx.try_recv() {
            Ok(ScanMsg::Progress {
                index,
                total,
                title,
            }) => app.progress = Some((index, total, title)),
            Ok(ScanMsg::Done(Ok(results))) => {
                let elapsed = pending.started_at.elapsed();
                app.set_results(results);
                app.status_line = Some(format!(
                    "Scan finished in {:.1}s",
                    elapsed.as_secs_f64()
                ));
                return;
            }
            Ok(ScanMsg::Done(Err(err))) => {
                app.open_error(format!("{err:#}"));
                return;
            }
            Err(mpsc::TryRecvError::Empty) => {
                app.pending = Some(pending);
                return;
            }
            Err(mpsc::TryRecvError::Disconnected) => {
                app.open_error("the scan thread exited without a result");
                return;
            }
        }
    }
}

/// Returns `true` when the app should exit.
fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }

    match app.screen {
        Screen::Help => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                app.screen = app.help_return_to;
            }
            false
        }
        Screen::Error => match key.code {
            KeyCode::Char('q') => true,
            KeyCode::Char('r') => {
                start_scan(app);
                false
            }
            KeyCode::Esc | KeyCode::Enter => {
                app.error = None;
                app.screen = Screen::Dashboard;
                false
            }
            _ => false,
        },
        Screen::Running => match key.code {
            KeyCode::Char('q') => true,
            KeyCode::Esc | KeyCode::Char('c') => {
                if let Some(pending) = &app.pending {
                    pending.cancel.cancel();
                }
                false
            }
            _ => false,
        },
        Screen::Dashboard => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => true,
            KeyCode::Char('?') | KeyCode::Char('h') => {
                app.help_return_to = Screen::Dashboard;
                app.screen = Screen::Help;
                false
            }
            KeyCode::Char('r') => {
                start_scan(app);
                false
            }
            KeyCode::Char('e') => {
                export_csv(app);
                false
            }
            KeyCode::Char('v') => {
                app.show_evidence = !app.show_evidence;
                false
            }
            KeyCode::Down | KeyCode::Char('j') => {
                app.move_selection(1);
                false
            }
            KeyCode::Up | KeyCode::Char('k') => {
                app.move_selection(-1);
                false
            }
            KeyCode::Home | KeyCode::Char('g') => {
                app.move_selection(i32::MIN / 2);
                false
            }
            KeyCode::End | KeyCode::Char('G') => {
                app.move_selection(i32::MAX / 2);
                false
            }
            _ => false,
        },
    }
}

fn export_csv(app: &mut App) {
    let path = export::timestamped_path(
        &app.settings.export_dir,
        ExportFormat::Csv,
        OffsetDateTime::now_utc(),
    );
    let res = export::csv_string(&app.results).and_then(|csv| export::write_file(&path, &csv));
    app.status_line = Some(match res {
        Ok(()) => format!("Exported {} result(s) to {}", app.results.len(), path.display()),
        Err(err) => format!("Export failed: {err:#}"),
    });
}

fn draw(f: &mut ratatui::Frame, app: &mut App) {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(size);

    draw_header(f, chunks[0], app);
    draw_footer(f, chunks[2], app);

    match app.screen {
        Screen::Running => draw_running(f, chunks[1], app),
        Screen::Dashboard => draw_dashboard(f, chunks[1], app),
        Screen::Help => draw_help(f, chunks[1]),
        Screen::Error => draw_error(f, chunks[1], app),
    }
}

fn draw_header(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let title = match app.screen {
        Screen::Running => "complianceguard · scanning",
        Screen::Dashboard => "complianceguard · dashboard",
        Screen::Help => "complianceguard · help",
        Screen::Error => "complianceguard · error",
    };
    let right = format!("v{}", env!("CARGO_PKG_VERSION"));

    let line = Line::from(vec![
        Span::styled(title, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" "),
        Span::styled(right, Style::default().fg(Color::DarkGray)),
    ]);
    let w = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
    f.render_widget(w, area);
}

fn draw_footer(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let keys = match app.screen {
        Screen::Running => "Esc/c: cancel  q: quit",
        Screen::Dashboard => "↑↓/jk: move  r: rerun  e: export CSV  v: evidence  ?: help  q: quit",
        Screen::Help => "Esc/?: back",
        Screen::Error => "r: retry  Esc: back  q: quit",
    };
    let mut lines = vec![Line::from(Span::styled(
        keys,
        Style::default().fg(Color::DarkGray),
    ))];
    if let Some(status) = &app.status_line {
        lines.push(Line::from(Span::raw(status.clone())));
    }
    f.render_widget(Paragraph::new(lines), area);
}

fn draw_running(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let spinner = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
    let s = spinner[(app.tick as usize) % spinner.len()];
    let msg = match &app.progress {
        Some((index, total, title)) => format!("[{}/{}] Running: {title}...", index + 1, total),
        None => "Preparing scan...".to_string(),
    };
    let cancelled = app
        .pending
        .as_ref()
        .is_some_and(|p| p.cancel.is_cancelled());

    let mut lines = vec![Line::from(vec![
        Span::styled(s, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" "),
        Span::raw(msg),
    ])];
    if cancelled {
        lines.push(Line::from(Span::styled(
            "Cancelling after the running checks finish...",
            Style::default().fg(Color::Yellow),
        )));
    }
    let w = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    f.render_widget(w, centered_rect(60, 20, area));
}

fn draw_dashboard(f: &mut ratatui::Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(area);

    let s = &app.stats;
    let gauge = Gauge::default()
        .block(
            Block::default().borders(Borders::ALL).title(format!(
                "Compliance score · {} passed · {} failed · {} warnings · {} errors · {} n/a",
                s.passed, s.failed, s.warnings, s.errors, s.not_applicable
            )),
        )
        .gauge_style(
            Style::default()
                .fg(band_color(s.band(), app.settings.color))
                .add_modifier(Modifier::BOLD),
        )
        .ratio((s.compliance_score / 100.0).clamp(0.0, 1.0))
        .label(format!("{:.1}%", s.compliance_score));
    f.render_widget(gauge, chunks[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(chunks[1]);

    let color = app.settings.color;
    let items: Vec<ListItem> = app
        .rows
        .iter()
        .map(|row| match row {
            Row::Category(name) => ListItem::new(Line::from(Span::styled(
                name.clone(),
                Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
            ))),
            Row::Result(i) => {
                let r = &app.results[*i];
                ListItem::new(Line::from(vec![
                    Span::raw("  "),
                    Span::styled(
                        format!("{:<14}", r.status.as_str()),
                        status_style(r.status, color),
                    ),
                    Span::raw(r.title.clone()),
                ]))
            }
        })
        .collect();
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Checks ({})", app.results.len())),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    f.render_stateful_widget(list, body[0], &mut app.list_state);

    let detail = match app.selected_result() {
        Some(r) => result_detail(r, app.show_evidence, color),
        None => Text::from("No checks were run."),
    };
    let w = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title("Detail"))
        .wrap(Wrap { trim: false });
    f.render_widget(w, body[1]);
}

fn result_detail(r: &CheckResult, show_evidence: bool, color: bool) -> Text<'static> {
    let label = Style::default().fg(Color::DarkGray);
    let mut lines = vec![
        Line::from(Span::styled(
            r.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(vec![
            Span::styled(r.status.as_str().to_string(), status_style(r.status, color)),
            Span::raw("  "),
            Span::styled(
                r.severity.as_str().to_string(),
                severity_style(r.severity, color),
            ),
            Span::raw(format!("  {}", r.id)),
        ]),
        Line::from(""),
        Line::from(r.description.clone()),
        Line::from(""),
        Line::from(vec![Span::styled("Finding: ", label), Span::raw(r.finding.clone())]),
    ];
    if !r.risk.is_empty() {
        lines.push(Line::from(vec![
            Span::styled("Risk: ", label),
            Span::raw(r.risk.clone()),
        ]));
    }
    if let Some(err) = &r.error {
        lines.push(Line::from(vec![
            Span::styled("Error: ", label),
            Span::raw(err.clone()),
        ]));
    }
    if !r.compliance_frameworks.is_empty() {
        lines.push(Line::from(vec![
            Span::styled("Frameworks: ", label),
            Span::raw(r.compliance_frameworks.join(", ")),
        ]));
    }
    let remediation = r.remediation.trim();
    if r.status != CheckStatus::Pass && !remediation.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Remediation", label)));
        for l in remediation.lines() {
            lines.push(Line::from(l.trim().to_string()));
        }
    }
    if show_evidence {
        lines.push(Line::from(""));
        match r.evidence.as_ref().filter(|e| !e.is_empty()) {
            Some(ev) => {
                lines.push(Line::from(Span::styled("Evidence", label)));
                for (k, v) in ev.iter() {
                    lines.push(Line::from(format!("  {k}: {v}")));
                }
            }
            None => lines.push(Line::from(Span::styled("No evidence recorded", label))),
        }
    }
    Text::from(lines)
}

fn draw_help(f: &mut ratatui::Frame, area: Rect) {
    let lines = vec![
        Line::from("↑/↓, j/k   move between checks"),
        Line::from("g / G      first / last check"),
        Line::from("r          run the scan again"),
        Line::from("e          export results as CSV to the current directory"),
        Line::from("v          show or hide evidence"),
        Line::from("?          toggle this help"),
        Line::from("q, Esc     quit"),
    ];
    let w = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Keys"));
    f.render_widget(w, centered_rect(70, 60, area));
}

fn draw_error(f: &mut ratatui::Frame, area: Rect, app: &App) {
    let msg = app.error.clone().unwrap_or_default();
    let w = Paragraph::new(msg)
        .style(Style::default().fg(Color::Red))
        .block(Block::default().borders(Borders::ALL).title("Error"))
        .wrap(Wrap { trim: true });
    f.render_widget(w, centered_rect(70, 40, area));
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn status_style(status: CheckStatus, enabled: bool) -> Style {
    if !enabled {
        return Style::default();
    }
    let color = match status {
        CheckStatus::Pass => Color::Green,
        CheckStatus::Fail => Color::Red,
        CheckStatus::Warning => Color::Yellow,
        CheckStatus::Error => Color::Magenta,
        CheckStatus::NotApplicable => Color::DarkGray,
    };
    Style::default().fg(color)
}

fn severity_style(severity: Severity, enabled: bool) -> Style {
    if !enabled {
        return Style::default();
    }
    match severity {
        Severity::Critical => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        Severity::High => Style::default().fg(Color::Red),
        Severity::Medium => Style::default().fg(Color::Yellow),
        Severity::Low => Style::default().fg(Color::Cyan),
        Severity::Info => Style::default().fg(Color::DarkGray),
    }
}

fn band_color(band: ScoreBand, enabled: bool) -> Color {
    if !enabled {
        return Color::Reset;
    }
    match band {
        ScoreBand::Good => Color::Green,
        ScoreBand::Fair => Color::LightGreen,
        ScoreBand::Moderate => Color::Yellow,
        ScoreBand::Poor => Color::LightRed,
        ScoreBand::Critical => Color::Red,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new(tag: &str) -> Self {
            use std::sync::atomic::{AtomicU64, Ordering};
            static SEQ: AtomicU64 = AtomicU64::new(0);
            let n = SEQ.fetch_add(1, Ordering::Relaxed);
            let dir = std::env::temp_dir().join(format!(
                "complianceguard-tui-{tag}-{}-{n}",
                std::process::id()
            ));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn settings(export_dir: PathBuf) -> DashboardSettings {
        DashboardSettings {
            probe_keys: vec![],
            ctx: ProbeContext::default(),
            scan: ScanOptions::default(),
            policy: NotApplicablePolicy::Include,
            export_dir,
            color: false,
        }
    }

    fn result(id: &str, category: &str, status: CheckStatus) -> CheckResult {
        CheckResult {
            id: id.to_string(),
            title: format!("Title {id}"),
            description: String::new(),
            category: category.to_string(),
            severity: Severity::High,
            compliance_frameworks: vec![],
            status,
            finding: "f".to_string(),
            evidence: None,
            risk: String::new(),
            remediation: String::new(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            error: None,
        }
    }

    fn app_with_results() -> App {
        let mut app = App::new(settings(std::env::temp_dir()));
        app.set_results(vec![
            result("A", "Network Security", CheckStatus::Pass),
            result("B", "Data Protection", CheckStatus::Fail),
            result("C", "Network Security", CheckStatus::Warning),
        ]);
        app
    }

    fn press(app: &mut App, code: KeyCode) -> bool {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn rows_group_results_under_category_headings() {
        let app = app_with_results();
        assert_eq!(
            app.rows,
            vec![
                Row::Category("Network Security".to_string()),
                Row::Result(0),
                Row::Result(2),
                Row::Category("Data Protection".to_string()),
                Row::Result(1),
            ]
        );
        assert_eq!(app.list_state.selected(), Some(1));
        assert_eq!(app.stats.compliance_score, 33.3);
    }

    #[test]
    fn navigation_skips_category_headings() {
        let mut app = app_with_results();
        press(&mut app, KeyCode::Down);
        assert_eq!(app.selected_result().map(|r| r.id.as_str()), Some("C"));
        press(&mut app, KeyCode::Char('j'));
        assert_eq!(app.selected_result().map(|r| r.id.as_str()), Some("B"));
        press(&mut app, KeyCode::Down);
        assert_eq!(app.selected_result().map(|r| r.id.as_str()), Some("B"));
        press(&mut app, KeyCode::Char('g'));
        assert_eq!(app.selected_result().map(|r| r.id.as_str()), Some("A"));
    }

    #[test]
    fn evidence_toggle_and_help_round_trip() {
        let mut app = app_with_results();
        assert!(!press(&mut app, KeyCode::Char('v')));
        assert!(app.show_evidence);
        press(&mut app, KeyCode::Char('?'));
        assert_eq!(app.screen, Screen::Help);
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.screen, Screen::Dashboard);
        assert!(press(&mut app, KeyCode::Char('q')));
    }

    #[test]
    fn export_writes_csv_into_export_dir() {
        let tmp = TempDir::new("export");
        let mut app = app_with_results();
        app.settings.export_dir = tmp.0.clone();
        press(&mut app, KeyCode::Char('e'));

        let status = app.status_line.clone().unwrap();
        assert!(status.starts_with("Exported 3 result(s)"), "{status}");
        let files: Vec<_> = std::fs::read_dir(&tmp.0).unwrap().flatten().collect();
        assert_eq!(files.len(), 1);
        let csv = std::fs::read_to_string(files[0].path()).unwrap();
        assert!(csv.starts_with("id,title,category,status,severity,finding,risk\n"));
    }

    #[test]
    fn empty_result_set_has_no_selection() {
        let mut app = App::new(settings(std::env::temp_dir()));
        app.set_results(vec![]);
        assert_eq!(app.list_state.selected(), None);
        app.move_selection(1);
        assert!(app.selected_result().is_none());
    }

    #[test]
    fn detail_shows_evidence_only_when_toggled() {
        let mut r = result("A", "X", CheckStatus::Fail);
        r.evidence = Some(crate::core::Evidence::new().with("firewall_enabled", false));
        let hidden = result_detail(&r, false, false);
        let shown = result_detail(&r, true, false);
        let flat = |t: &Text| {
            t.lines
                .iter()
                .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert!(!flat(&hidden).contains("firewall_enabled"));
        assert!(flat(&shown).contains("  firewall_enabled: false"));
    }
}
