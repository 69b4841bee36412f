use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;

use crate::client::ApiClient;
use crate::models::{Job, JobPatch, JobStats, NewJob, Patch, Stage};
use crate::views::{self, SortKey, StageFilter};

/// Where keystrokes currently go. The prompt modes reuse the status
/// line as a one-line input field.
enum InputMode {
    Normal,
    Search,
    AddTitle { title: String },
    AddCompany { title: String, company: String },
    EditNotes { buffer: String },
}

struct AppState {
    jobs: Vec<Job>,
    visible: Vec<Job>,
    stats: JobStats,
    selected: usize,
    scroll_offset: u16,
    search: String,
    mode: InputMode,
    filter: StageFilter,
    sort: SortKey,
    error: Option<String>,
}

impl AppState {
    fn new() -> Self {
        Self {
            jobs: Vec::new(),
            visible: Vec::new(),
            stats: JobStats::default(),
            selected: 0,
            scroll_offset: 0,
            search: String::new(),
            mode: InputMode::Normal,
            filter: StageFilter::All,
            sort: SortKey::UpdatedAt,
            error: None,
        }
    }

    /// Refetch jobs and stats. On failure the previous data stays on
    /// screen and the status line shows what went wrong.
    fn refresh(&mut self, api: &ApiClient) {
        match api.list_jobs().and_then(|jobs| Ok((jobs, api.stats()?))) {
            Ok((jobs, stats)) => {
                self.jobs = jobs;
                self.stats = stats;
                self.error = None;
            }
            Err(e) => self.error = Some(format!("{e:#}")),
        }
        self.apply_views();
    }

    fn apply_views(&mut self) {
        self.visible = views::filter_and_sort(&self.jobs, &self.search, self.filter, self.sort);
        if self.selected >= self.visible.len() {
            self.selected = self.visible.len().saturating_sub(1);
        }
        self.scroll_offset = 0;
    }

    fn current_job(&self) -> Option<&Job> {
        self.visible.get(self.selected)
    }

    fn next(&mut self) {
        if !self.visible.is_empty() && self.selected < self.visible.len() - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    fn set_stage(&mut self, api: &ApiClient, stage: Stage) {
        let Some(id) = self.current_job().map(|j| j.id) else { return };
        match api.update_stage(id, stage) {
            Ok(_) => self.refresh(api),
            Err(e) => self.error = Some(format!("{e:#}")),
        }
    }

    fn delete_current(&mut self, api: &ApiClient) {
        let Some(id) = self.current_job().map(|j| j.id) else { return };
        match api.delete_job(id) {
            Ok(()) => self.refresh(api),
            Err(e) => self.error = Some(format!("{e:#}")),
        }
    }

    fn submit_new_job(&mut self, api: &ApiClient, title: String, company: String) {
        let input = NewJob {
            title,
            company,
            ..Default::default()
        };
        match api.create_job(&input) {
            Ok(_) => self.refresh(api),
            Err(e) => self.error = Some(format!("{e:#}")),
        }
    }

    fn submit_notes(&mut self, api: &ApiClient, buffer: String) {
        let Some(id) = self.current_job().map(|j| j.id) else { return };
        let patch = JobPatch {
            notes: if buffer.trim().is_empty() {
                Patch::Clear
            } else {
                Patch::Set(buffer)
            },
            ..Default::default()
        };
        match api.update_job(id, &patch) {
            Ok(_) => self.refresh(api),
            Err(e) => self.error = Some(format!("{e:#}")),
        }
    }
}

pub fn run_browse(api: &ApiClient) -> Result<()> {
    let mut state = AppState::new();
    state.refresh(api);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, api);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    api: &ApiClient,
) -> Result<()> {
    let mut list_state = ListState::default();
    list_state.select(Some(0));

    loop {
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match std::mem::replace(&mut state.mode, InputMode::Normal) {
                InputMode::Search => match key.code {
                    KeyCode::Esc | KeyCode::Enter => {}
                    KeyCode::Backspace => {
                        state.search.pop();
                        state.apply_views();
                        state.mode = InputMode::Search;
                    }
                    KeyCode::Char(c) => {
                        state.search.push(c);
                        state.apply_views();
                        state.mode = InputMode::Search;
                    }
                    _ => state.mode = InputMode::Search,
                },

                InputMode::AddTitle { mut title } => match key.code {
                    KeyCode::Esc => {}
                    KeyCode::Enter => {
                        state.mode = InputMode::AddCompany {
                            title,
                            company: String::new(),
                        };
                    }
                    KeyCode::Backspace => {
                        title.pop();
                        state.mode = InputMode::AddTitle { title };
                    }
                    KeyCode::Char(c) => {
                        title.push(c);
                        state.mode = InputMode::AddTitle { title };
                    }
                    _ => state.mode = InputMode::AddTitle { title },
                },

                InputMode::AddCompany { title, mut company } => match key.code {
                    KeyCode::Esc => {}
                    KeyCode::Enter => state.submit_new_job(api, title, company),
                    KeyCode::Backspace => {
                        company.pop();
                        state.mode = InputMode::AddCompany { title, company };
                    }
                    KeyCode::Char(c) => {
                        company.push(c);
                        state.mode = InputMode::AddCompany { title, company };
                    }
                    _ => state.mode = InputMode::AddCompany { title, company },
                },

                InputMode::EditNotes { mut buffer } => match key.code {
                    KeyCode::Esc => {}
                    KeyCode::Enter => state.submit_notes(api, buffer),
                    KeyCode::Backspace => {
                        buffer.pop();
                        state.mode = InputMode::EditNotes { buffer };
                    }
                    KeyCode::Char(c) => {
                        buffer.push(c);
                        state.mode = InputMode::EditNotes { buffer };
                    }
                    _ => state.mode = InputMode::EditNotes { buffer },
                },

                InputMode::Normal => {
                    let prev_selected = state.selected;
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => break,
                        KeyCode::Down | KeyCode::Char('j') => state.next(),
                        KeyCode::Up | KeyCode::Char('k') => state.prev(),
                        KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
                        KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
                        KeyCode::Char('/') => state.mode = InputMode::Search,
                        KeyCode::Char('a') => {
                            state.mode = InputMode::AddTitle {
                                title: String::new(),
                            };
                        }
                        KeyCode::Char('e') => {
                            let notes = state
                                .current_job()
                                .map(|j| j.notes.clone().unwrap_or_default());
                            if let Some(buffer) = notes {
                                state.mode = InputMode::EditNotes { buffer };
                            }
                        }
                        KeyCode::Char('f') => {
                            state.filter = state.filter.next();
                            state.apply_views();
                        }
                        KeyCode::Char('o') => {
                            state.sort = state.sort.next();
                            state.apply_views();
                        }
                        KeyCode::Char('r') => state.refresh(api),
                        KeyCode::Char('d') => state.delete_current(api),
                        KeyCode::Char(c @ '1'..='6') => {
                            let stage = Stage::ALL[c as usize - '1' as usize];
                            state.set_stage(api, stage);
                        }
                        _ => {}
                    }
                    if state.selected != prev_selected {
                        state.scroll_offset = 0;
                    }
                }
            }

            list_state.select(Some(state.selected));
        }
    }
    Ok(())
}

fn stage_icon(stage: Stage) -> &'static str {
    match stage {
        Stage::Saved => " ",
        Stage::Applied => "+",
        Stage::PhoneScreen => "~",
        Stage::Interview => "*",
        Stage::Offer => "o",
        Stage::Rejected => "x",
    }
}

fn stage_style(stage: Stage) -> Style {
    match stage {
        Stage::Saved => Style::default().fg(Color::Gray),
        Stage::Applied => Style::default().fg(Color::Blue),
        Stage::PhoneScreen => Style::default().fg(Color::Yellow),
        Stage::Interview => Style::default().fg(Color::Magenta),
        Stage::Offer => Style::default().fg(Color::Green),
        Stage::Rejected => Style::default().fg(Color::Red),
    }
}

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(rows[0]);

    // Left panel: job list
    let items: Vec<ListItem> = state
        .visible
        .iter()
        .map(|job| {
            let title = if job.title.len() > 30 {
                format!("{}...", &job.title[..27])
            } else {
                job.title.clone()
            };
            ListItem::new(format!(
                "{} #{:<4} {} | {}",
                stage_icon(job.current_stage),
                job.id,
                title,
                job.company
            ))
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            " Jobs ({}/{}) ",
            state.visible.len(),
            state.jobs.len()
        )))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, panes[0], list_state);

    // Right panel: job detail
    let detail = build_detail(state);
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));

    frame.render_widget(detail_widget, panes[1]);

    // Status line: active prompt first, then errors, then the summary
    let status = match &state.mode {
        InputMode::Search => Paragraph::new(format!(" search: {}_", state.search))
            .style(Style::default().fg(Color::Yellow)),
        InputMode::AddTitle { title } => Paragraph::new(format!(" new job title: {}_", title))
            .style(Style::default().fg(Color::Yellow)),
        InputMode::AddCompany { company, .. } => {
            Paragraph::new(format!(" company: {}_", company))
                .style(Style::default().fg(Color::Yellow))
        }
        InputMode::EditNotes { buffer } => Paragraph::new(format!(" notes: {}_", buffer))
            .style(Style::default().fg(Color::Yellow)),
        InputMode::Normal => {
            if let Some(error) = &state.error {
                Paragraph::new(format!(" {} (r to retry)", error))
                    .style(Style::default().fg(Color::Red))
            } else {
                Paragraph::new(format!(
                    " {} tracked | {:.0}% active | filter:{} sort:{} search:{}",
                    state.stats.total_jobs,
                    views::active_percent(&state.stats),
                    state.filter.label(),
                    state.sort.label(),
                    if state.search.is_empty() { "-" } else { &state.search },
                ))
            }
        }
    };
    frame.render_widget(status, rows[1]);

    let help = Paragraph::new(
        " j/k:nav  /:search  f:filter  o:sort  a:add  e:notes  1-6:stage  d:delete  r:refresh  q:quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, rows[2]);
}

fn build_detail<'a>(state: &'a AppState) -> Text<'a> {
    let Some(job) = state.current_job() else {
        return Text::raw("No job selected");
    };

    let mut lines: Vec<Line> = Vec::new();

    // Header
    lines.push(Line::from(Span::styled(
        &job.title,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("at {}", job.company)));
    lines.push(Line::from(Span::styled(
        format!("Stage: {}", job.current_stage),
        stage_style(job.current_stage),
    )));

    if let Some(location) = &job.location {
        lines.push(Line::from(format!("Location: {}", location)));
    }
    lines.push(Line::from(format!("Applied: {}", job.application_date)));
    if let Some(url) = &job.job_url {
        lines.push(Line::from(format!("URL: {}", url)));
    }
    if let Some(resume) = &job.resume_used {
        lines.push(Line::from(format!("Resume: {}", resume)));
    }
    lines.push(Line::from(format!("Updated: {}", job.updated_at)));
    lines.push(Line::from(""));

    if !job.contacts.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("Contacts ({})", job.contacts.len()),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for contact in &job.contacts {
            let role = contact.role.as_deref().unwrap_or("-");
            lines.push(Line::from(format!("  #{} {} ({})", contact.id, contact.name, role)));
            if let Some(email) = &contact.email {
                lines.push(Line::from(format!("      {}", email)));
            }
        }
        lines.push(Line::from(""));
    }

    if !job.interviews.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("Interviews ({})", job.interviews.len()),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for interview in &job.interviews {
            lines.push(Line::from(format!(
                "  #{} {} at {}",
                interview.id, interview.kind, interview.scheduled_at
            )));
            if let Some(feedback) = &interview.feedback {
                lines.push(Line::from(format!("      {}", feedback)));
            }
        }
        lines.push(Line::from(""));
    }

    if let Some(notes) = &job.notes {
        lines.push(Line::from(Span::styled(
            "Notes",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(notes, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
    } else {
        lines.push(Line::from(Span::styled(
            "(No notes)",
            Style::default().fg(Color::DarkGray),
        )));
    }

    Text::from(lines)
}
