use crate::daily::{self, RunOnceGate};
use crate::delete::{apply_deletion, choices_for, DeleteChoice};
use crate::events::{EventBus, Topic};
use crate::gist::GistStore;
use crate::model::{group_tasks, same_task, TodayTask};
use crate::reconcile::TodayList;
use crate::scheduler::materialize_today;
use crate::store::TaskStore;
use anyhow::Result;
use chrono::NaiveDate;
use crossterm::event::{
    self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEvent, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::prelude::{Alignment, Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, Paragraph};
use ratatui::Terminal;
use std::io::{stdout, Stdout};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub async fn run(store: Arc<GistStore>, state_path: PathBuf) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let mut app = App::new(store, state_path);
    let result = app.event_loop(&mut terminal).await;
    teardown_terminal(&mut terminal)?;
    result
}

struct App {
    store: Arc<GistStore>,
    list: TodayList,
    gate: RunOnceGate,
    bus: EventBus,
    dirty: Arc<AtomicBool>,
    date: NaiveDate,
    selected: usize,
    status: String,
    mode: Mode,
}

enum Mode {
    Normal,
    ConfirmDelete {
        task: TodayTask,
        choices: Vec<DeleteChoice>,
        selected: usize,
    },
    Adding(AddForm),
}

struct AddForm {
    title: String,
    group: String,
    field: FormField,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum FormField {
    Title,
    Group,
}

impl AddForm {
    fn new() -> Self {
        AddForm {
            title: String::new(),
            group: String::new(),
            field: FormField::Title,
        }
    }

    fn active_value(&mut self) -> &mut String {
        match self.field {
            FormField::Title => &mut self.title,
            FormField::Group => &mut self.group,
        }
    }

    fn next_field(&mut self) {
        self.field = match self.field {
            FormField::Title => FormField::Group,
            FormField::Group => FormField::Title,
        };
    }
}

impl App {
    fn new(store: Arc<GistStore>, state_path: PathBuf) -> Self {
        let bus = EventBus::new();
        let dirty = Arc::new(AtomicBool::new(false));
        {
            let dirty = dirty.clone();
            bus.subscribe(Topic::TodayChanged, move || {
                dirty.store(true, Ordering::SeqCst);
            });
        }
        let list: Arc<dyn TaskStore> = store.clone();
        App {
            store,
            list: TodayList::new(list, bus.clone()),
            gate: RunOnceGate::new(state_path),
            bus,
            dirty,
            date: daily::today(),
            selected: 0,
            status: String::new(),
            mode: Mode::Normal,
        }
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    ) -> Result<()> {
        self.daily_trigger().await;
        self.reload().await;
        loop {
            if self.dirty.swap(false, Ordering::SeqCst) {
                self.reload().await;
            }
            terminal.draw(|f| self.draw(f))?;
            if !event::poll(Duration::from_millis(200))? {
                continue;
            }
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if self.handle_key(key).await? {
                        return Ok(());
                    }
                }
                // The terminal regaining focus may be the first trigger of a
                // new day; the gate decides whether anything actually runs.
                Event::FocusGained => self.daily_trigger().await,
                _ => {}
            }
        }
    }

    async fn daily_trigger(&mut self) {
        self.date = daily::today();
        let store = self.store.clone();
        let bus = self.bus.clone();
        let date = self.date;
        let ran = self
            .gate
            .run_once_per_day(date, || async move {
                store.ensure_sections().await?;
                materialize_today(store.as_ref(), &bus, date).await?;
                Ok(())
            })
            .await;
        if ran {
            self.status = format!("Ran daily materialization for {}", self.date);
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    async fn reload(&mut self) {
        match self.list.refresh(self.date).await {
            Ok(()) => {
                let count = self.visible_tasks().len();
                if count > 0 && self.selected >= count {
                    self.selected = count - 1;
                }
            }
            Err(err) => self.status = format!("Load failed: {err}"),
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        match &self.mode {
            Mode::Normal => self.handle_normal_key(key).await,
            Mode::ConfirmDelete { .. } => {
                self.handle_confirm_key(key).await;
                Ok(false)
            }
            Mode::Adding(_) => {
                self.handle_form_key(key).await;
                Ok(false)
            }
        }
    }

    async fn handle_normal_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(true),
            KeyCode::Down | KeyCode::Char('j') => {
                let count = self.visible_tasks().len();
                if count > 0 && self.selected + 1 < count {
                    self.selected += 1;
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Char(' ') | KeyCode::Enter => self.toggle_selected().await,
            KeyCode::Char('d') => {
                if let Some(task) = self.visible_tasks().get(self.selected).cloned() {
                    self.mode = Mode::ConfirmDelete {
                        choices: choices_for(&task),
                        task,
                        selected: 0,
                    };
                }
            }
            KeyCode::Char('a') => self.mode = Mode::Adding(AddForm::new()),
            KeyCode::Char('r') => {
                self.dirty.store(true, Ordering::SeqCst);
                self.status = "Reloading".to_string();
            }
            _ => {}
        }
        Ok(false)
    }

    async fn toggle_selected(&mut self) {
        let Some(task) = self.visible_tasks().get(self.selected).cloned() else {
            return;
        };
        let before = task.is_done();
        self.list.toggle(&task).await;
        let after = self
            .list
            .tasks()
            .iter()
            .find(|t| same_task(t, &task))
            .map(|t| t.is_done());
        self.status = match after {
            Some(done) if done != before => {
                format!(
                    "{} {:?}",
                    if done { "Done" } else { "Not done" },
                    task.display_title()
                )
            }
            _ => "Save failed; change reverted".to_string(),
        };
    }

    async fn handle_confirm_key(&mut self, key: KeyEvent) {
        let Mode::ConfirmDelete {
            task,
            choices,
            selected,
        } = &mut self.mode
        else {
            return;
        };
        match key.code {
            KeyCode::Esc => self.mode = Mode::Normal,
            KeyCode::Down | KeyCode::Char('j') => {
                if *selected + 1 < choices.len() {
                    *selected += 1;
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                *selected = selected.saturating_sub(1);
            }
            KeyCode::Enter => {
                let task = task.clone();
                let choice = choices[*selected];
                self.mode = Mode::Normal;
                match apply_deletion(self.store.as_ref(), &self.bus, &task, choice).await {
                    Ok(()) => self.status = format!("{}: {:?}", choice.label(), task.display_title()),
                    Err(err) => self.status = format!("Delete failed: {err}"),
                }
            }
            _ => {}
        }
    }

    async fn handle_form_key(&mut self, key: KeyEvent) {
        let Mode::Adding(form) = &mut self.mode else {
            return;
        };
        match key.code {
            KeyCode::Esc => self.mode = Mode::Normal,
            KeyCode::Tab => form.next_field(),
            KeyCode::Backspace => {
                form.active_value().pop();
            }
            KeyCode::Char(c) => form.active_value().push(c),
            KeyCode::Enter => {
                let title = form.title.trim().to_string();
                if title.is_empty() {
                    self.status = "Title must not be empty".to_string();
                    return;
                }
                let group = match form.group.trim() {
                    "" => None,
                    g => Some(g.to_string()),
                };
                let task = TodayTask::new(title, group, self.date);
                self.mode = Mode::Normal;
                match self.store.create_today(task).await {
                    Ok(()) => {
                        self.status = "Added".to_string();
                        self.dirty.store(true, Ordering::SeqCst);
                    }
                    Err(err) => self.status = format!("Add failed: {err}"),
                }
            }
            _ => {}
        }
    }

    /// Local view in display order: grouped, real groups first.
    fn visible_tasks(&self) -> Vec<TodayTask> {
        let tasks = self.list.tasks();
        let mut out = Vec::new();
        for (_, bucket) in group_tasks(&tasks) {
            out.extend(bucket.into_iter().cloned());
        }
        out
    }

    fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(3),
                Constraint::Length(3),
            ])
            .split(f.size());

        self.draw_header(f, chunks[0]);
        self.draw_checklist(f, chunks[1]);
        self.draw_footer(f, chunks[2]);

        match &self.mode {
            Mode::ConfirmDelete {
                task,
                choices,
                selected,
            } => draw_delete_modal(f, task, choices, *selected),
            Mode::Adding(form) => draw_add_form(f, form),
            Mode::Normal => {}
        }
    }

    fn draw_header(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let tasks = self.list.tasks();
        let done = tasks.iter().filter(|t| t.is_done()).count();
        let title = Line::from(vec![
            Span::styled(
                format!("Tasks for {}", self.date),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!("   {}/{} done", done, tasks.len())),
        ]);
        let block = Paragraph::new(title)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(block, area);
    }

    fn draw_checklist(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let tasks = self.list.tasks();
        let mut items: Vec<ListItem> = Vec::new();
        let mut row = 0usize;
        for (key, bucket) in group_tasks(&tasks) {
            items.push(ListItem::new(Span::styled(
                key,
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )));
            for task in bucket {
                let position = tasks.iter().position(|t| same_task(t, task));
                let saving = position.map(|p| self.list.is_saving(p)).unwrap_or(false);
                let mark = if saving {
                    "[~]"
                } else if task.is_done() {
                    "[x]"
                } else {
                    "[ ]"
                };
                let mut style = Style::default();
                if task.is_done() {
                    style = style
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::CROSSED_OUT);
                }
                if row == self.selected {
                    style = style
                        .fg(Color::Black)
                        .bg(Color::White)
                        .remove_modifier(Modifier::CROSSED_OUT);
                }
                items.push(ListItem::new(Span::styled(
                    format!("  {} {}", mark, task.display_title()),
                    style,
                )));
                row += 1;
            }
        }
        if items.is_empty() {
            items.push(ListItem::new(format!("No tasks for {}", self.date)));
        }
        let list = List::new(items).block(Block::default().borders(Borders::ALL));
        f.render_widget(list, area);
    }

    fn draw_footer(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let help = match self.mode {
            Mode::Normal => "space toggle · a add · d delete · r reload · q quit",
            Mode::ConfirmDelete { .. } => "enter confirm · esc cancel",
            Mode::Adding(_) => "enter save · tab next field · esc cancel",
        };
        let mut lines = vec![Line::from(help)];
        if !self.status.is_empty() {
            lines.push(Line::from(Span::styled(
                self.status.clone(),
                Style::default().fg(Color::Yellow),
            )));
        }
        let footer = Paragraph::new(lines).block(Block::default().borders(Borders::ALL));
        f.render_widget(footer, area);
    }
}

fn draw_delete_modal(
    f: &mut ratatui::Frame<'_>,
    task: &TodayTask,
    choices: &[DeleteChoice],
    selected: usize,
) {
    let area = centered_rect(50, 40, f.size());
    f.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(Span::styled(
            format!("Delete {:?}", task.display_title()),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    for (i, choice) in choices.iter().enumerate() {
        let style = if i == selected {
            Style::default().fg(Color::Black).bg(Color::White)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(
            format!(" {}  — {}", choice.label(), choice.hint()),
            style,
        )));
    }
    let modal = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Delete task"));
    f.render_widget(modal, area);
}

fn draw_add_form(f: &mut ratatui::Frame<'_>, form: &AddForm) {
    let area = centered_rect(50, 30, f.size());
    f.render_widget(Clear, area);

    let field_line = |label: &str, value: &str, active: bool| {
        let style = if active {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let caret = if active { "_" } else { "" };
        Line::from(Span::styled(format!("{label}: {value}{caret}"), style))
    };
    let lines = vec![
        field_line("Title", &form.title, form.field == FormField::Title),
        field_line("Group", &form.group, form.field == FormField::Group),
    ];
    let modal = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("New task"));
    f.render_widget(modal, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen, EnableFocusChange)?;
    let terminal = Terminal::new(CrosstermBackend::new(out))?;
    Ok(terminal)
}

fn teardown_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableFocusChange
    )?;
    terminal.show_cursor()?;
    Ok(())
}
