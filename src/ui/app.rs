use std::mem;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use chrono::Local;
use crossterm::event::KeyCode;
use open::that as open_link;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Clear, HighlightSpacing, List, ListItem, ListState, Paragraph, Tabs, Wrap,
};
use ratatui::Frame;

use crate::circulation::{tracking_label, Library};
use crate::config::data_dir;
use crate::models::{
    Book, BorrowLogEntry, LibraryReport, OverdueLoan, TopRatedBook, TrackedLoan, UserStatus,
    UserSummary,
};
use crate::transfer::export_tables;

use super::forms::{ConfirmAction, Form, FormKind};
use super::helpers::{
    borrower_name, centered_rect, fit_column, short_date, short_timestamp, status_style,
    surface_error,
};
use super::screens::{ListScreen, Tab};

/// Space reserved for the tab bar.
const HEADER_HEIGHT: u16 = 3;
/// Footer space reserved for status messages and instructions.
const FOOTER_HEIGHT: u16 = 3;
/// Rows shown in the top-rated section of the reports tab.
const TOP_RATED_LIMIT: usize = 5;
const PAGE: isize = 10;

/// Fine-grained modes layered over the active tab.
enum Mode {
    Normal,
    Editing(Form),
    Confirm(ConfirmAction),
    Searching(SearchState),
}

/// State for an active inline search.
struct SearchState {
    target: Tab,
    query: String,
}

/// Holds the footer message text plus its severity.
struct StatusMessage {
    text: String,
    kind: StatusKind,
}

/// Severity levels shown in the footer.
enum StatusKind {
    Info,
    Error,
}

impl StatusKind {
    fn style(&self) -> Style {
        match self {
            StatusKind::Info => Style::default().fg(Color::Green),
            StatusKind::Error => Style::default().fg(Color::Red),
        }
    }
}

/// Central application state shared across the TUI.
pub struct App {
    library: Library,
    tab: Tab,
    books: ListScreen<Book>,
    users: ListScreen<UserSummary>,
    loans: ListScreen<TrackedLoan>,
    overdue: ListScreen<OverdueLoan>,
    overdue_total: f64,
    history: ListScreen<BorrowLogEntry>,
    /// When set, the history tab shows only this user's loans.
    history_user: Option<String>,
    history_total: f64,
    report: LibraryReport,
    top_rated: Vec<TopRatedBook>,
    mode: Mode,
    status: Option<StatusMessage>,
    last_export: Option<PathBuf>,
}

impl App {
    pub fn new(library: Library) -> Result<Self> {
        let mut app = Self {
            library,
            tab: Tab::Books,
            books: ListScreen::default(),
            users: ListScreen::default(),
            loans: ListScreen::default(),
            overdue: ListScreen::default(),
            overdue_total: 0.0,
            history: ListScreen::default(),
            history_user: None,
            history_total: 0.0,
            report: LibraryReport::default(),
            top_rated: Vec::new(),
            mode: Mode::Normal,
            status: None,
            last_export: None,
        };
        app.refresh_all()?;
        Ok(app)
    }

    /// Hand the engine back so the caller can close it cleanly.
    pub fn into_library(self) -> Library {
        self.library
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let mut exit = false;
        let mut mode = mem::replace(&mut self.mode, Mode::Normal);

        mode = match mode {
            Mode::Normal => self.handle_normal_key(code, &mut exit)?,
            Mode::Editing(form) => self.handle_form(code, form)?,
            Mode::Confirm(action) => self.handle_confirm(code, action)?,
            Mode::Searching(state) => self.handle_search(code, state)?,
        };

        self.mode = mode;
        Ok(exit)
    }

    fn handle_normal_key(&mut self, code: KeyCode, exit: &mut bool) -> Result<Mode> {
        match code {
            KeyCode::Char('q') | KeyCode::Char('Q') => *exit = true,
            KeyCode::Tab => self.switch_tab(self.tab.next()),
            KeyCode::BackTab => self.switch_tab(self.tab.previous()),
            KeyCode::Char(ch @ '1'..='6') => {
                if let Some(tab) = Tab::from_digit(ch) {
                    self.switch_tab(tab);
                }
            }
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::PageUp => self.move_selection(-PAGE),
            KeyCode::PageDown => self.move_selection(PAGE),
            KeyCode::Home => self.jump_selection(false),
            KeyCode::End => self.jump_selection(true),
            KeyCode::Char('+') => {
                self.clear_status();
                match self.tab {
                    Tab::Users => return Ok(Mode::Editing(Form::register_user())),
                    _ => return Ok(Mode::Editing(Form::add_book())),
                }
            }
            KeyCode::Char('d') | KeyCode::Char('D') => {
                self.clear_status();
                return Ok(Mode::Editing(Form::donate_book()));
            }
            KeyCode::Char('e') | KeyCode::Char('E') => {
                if self.tab != Tab::Books {
                    self.set_status("Switch to the Books tab to edit a book.", StatusKind::Error);
                } else if let Some(book) = self.books.current() {
                    let form = Form::edit_book(book);
                    self.clear_status();
                    return Ok(Mode::Editing(form));
                } else {
                    self.set_status("No book selected to edit.", StatusKind::Error);
                }
            }
            KeyCode::Char('-') => match self.tab {
                Tab::Books => match self.books.current() {
                    Some(book) => {
                        let title = book.title.clone();
                        self.clear_status();
                        return Ok(Mode::Confirm(ConfirmAction::RemoveBook { title }));
                    }
                    None => self.set_status("No book selected to remove.", StatusKind::Error),
                },
                Tab::Users => match self.users.current() {
                    Some(summary) => {
                        let username = summary.user.username.clone();
                        self.clear_status();
                        return Ok(Mode::Confirm(ConfirmAction::RemoveUser { username }));
                    }
                    None => self.set_status("No user selected to remove.", StatusKind::Error),
                },
                _ => {}
            },
            KeyCode::Char('b') | KeyCode::Char('B') => {
                return Ok(self.loan_form(FormKind::Borrow));
            }
            KeyCode::Char('r') | KeyCode::Char('R') => {
                return Ok(self.loan_form(FormKind::Return));
            }
            KeyCode::Char('n') | KeyCode::Char('N') => {
                return Ok(self.loan_form(FormKind::Renew));
            }
            KeyCode::Char('v') | KeyCode::Char('V') => {
                let (username, title) = self.selection_context();
                self.clear_status();
                return Ok(Mode::Editing(Form::review(&username, &title)));
            }
            KeyCode::Char('s') | KeyCode::Char('S') if self.tab == Tab::Users => {
                self.cycle_user_status()?;
            }
            KeyCode::Char('/') | KeyCode::Char('f') => {
                if self.tab.is_searchable() {
                    let query = match self.tab {
                        Tab::Users => self.users.filter.clone(),
                        _ => self.books.filter.clone(),
                    };
                    return Ok(Mode::Searching(SearchState {
                        target: self.tab,
                        query: query.unwrap_or_default(),
                    }));
                }
            }
            KeyCode::Enter if self.tab == Tab::Users => {
                if let Some(summary) = self.users.current() {
                    let username = summary.user.username.clone();
                    self.history_user = Some(username);
                    self.refresh_history()?;
                    self.switch_tab(Tab::History);
                }
            }
            KeyCode::Esc => self.clear_tab_filter()?,
            KeyCode::Char('x') | KeyCode::Char('X') => self.export_snapshot(),
            KeyCode::Char('o') | KeyCode::Char('O') => self.open_last_export(),
            _ => {}
        }
        Ok(Mode::Normal)
    }

    fn handle_form(&mut self, code: KeyCode, mut form: Form) -> Result<Mode> {
        match code {
            KeyCode::Esc => {
                if form.kind == FormKind::Review {
                    self.set_status("Review skipped.", StatusKind::Info);
                } else {
                    self.set_status("Cancelled.", StatusKind::Info);
                }
                return Ok(Mode::Normal);
            }
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::BackTab | KeyCode::Up => form.previous_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Enter => match self.submit_form(&form) {
                Ok(next) => return Ok(next),
                Err(err) => {
                    let message = surface_error(&err);
                    form.error = Some(message.clone());
                    self.set_status(message, StatusKind::Error);
                }
            },
            KeyCode::Char(ch) => {
                if form.push_char(ch) {
                    form.error = None;
                }
            }
            _ => {}
        }
        Ok(Mode::Editing(form))
    }

    fn handle_confirm(&mut self, code: KeyCode, action: ConfirmAction) -> Result<Mode> {
        match code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.set_status("Removal cancelled.", StatusKind::Info);
                Ok(Mode::Normal)
            }
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                if let Err(err) = self.perform_removal(&action) {
                    self.set_status(surface_error(&err), StatusKind::Error);
                }
                Ok(Mode::Normal)
            }
            _ => Ok(Mode::Confirm(action)),
        }
    }

    /// Live search: every keystroke re-queries the database.
    fn handle_search(&mut self, code: KeyCode, mut state: SearchState) -> Result<Mode> {
        match code {
            KeyCode::Esc => {
                self.apply_search(state.target, None)?;
                return Ok(Mode::Normal);
            }
            KeyCode::Enter => {
                if state.query.trim().is_empty() {
                    self.apply_search(state.target, None)?;
                } else {
                    self.set_status(format!("Filtered by '{}'.", state.query), StatusKind::Info);
                }
                return Ok(Mode::Normal);
            }
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::Backspace => {
                state.query.pop();
                self.apply_search(state.target, Some(state.query.clone()))?;
            }
            KeyCode::Char(ch) => {
                state.query.push(ch);
                self.apply_search(state.target, Some(state.query.clone()))?;
            }
            _ => {}
        }
        Ok(Mode::Searching(state))
    }

    pub(crate) fn handle_ctrl_r(&mut self) -> Result<()> {
        self.refresh_all()?;
        self.set_status("Reloaded from the database.", StatusKind::Info);
        Ok(())
    }

    pub(crate) fn handle_ctrl_x(&mut self) {
        if matches!(self.mode, Mode::Normal) {
            self.export_snapshot();
        }
    }

    fn submit_form(&mut self, form: &Form) -> Result<Mode> {
        match form.kind {
            FormKind::AddBook | FormKind::DonateBook => {
                let title = form.required("Title")?;
                let author = form.optional("Author");
                let category = form.optional("Category");
                let book = if form.kind == FormKind::AddBook {
                    let copies = form.number("Copies")?;
                    self.library.add_new_book(
                        &title,
                        author.as_deref(),
                        category.as_deref(),
                        copies,
                    )?
                } else {
                    self.library
                        .donate_book(&title, author.as_deref(), category.as_deref())?
                };
                self.refresh_all()?;
                self.focus_book(&book.title);
                self.set_status(
                    format!(
                        "'{}' now has {} of {} copies available.",
                        book.title, book.available_copies, book.total_copies
                    ),
                    StatusKind::Info,
                );
            }
            FormKind::EditBook => {
                let original = form
                    .original_title
                    .clone()
                    .ok_or_else(|| anyhow!("No book selected to edit."))?;
                let title = form.required("Title")?;
                let total = form.number("Total copies")?;
                let book = self.library.edit_book(
                    &original,
                    &title,
                    form.optional("Author").as_deref(),
                    form.optional("Category").as_deref(),
                    total,
                )?;
                self.refresh_all()?;
                self.focus_book(&book.title);
                self.set_status(format!("Updated '{}'.", book.title), StatusKind::Info);
            }
            FormKind::RegisterUser => {
                let username = form.required("Username")?;
                let full_name = form.required("Full name")?;
                let user = self.library.register_user(
                    &username,
                    &full_name,
                    form.optional("Class").as_deref(),
                    form.optional("Section").as_deref(),
                )?;
                self.refresh_users()?;
                self.set_status(
                    format!("Registered {} ({}).", user.full_name, user.username),
                    StatusKind::Info,
                );
            }
            FormKind::Borrow => {
                let receipt = self
                    .library
                    .borrow_book(&form.required("Username")?, &form.required("Title")?)?;
                self.refresh_all()?;
                self.set_status(
                    format!(
                        "{} borrowed '{}'. Due {}.",
                        receipt.username,
                        receipt.title,
                        short_date(receipt.due_date)
                    ),
                    StatusKind::Info,
                );
            }
            FormKind::Return => {
                let receipt = self
                    .library
                    .return_book(&form.required("Username")?, &form.required("Title")?)?;
                self.refresh_all()?;
                let message = if receipt.fine_amount > 0.0 {
                    format!(
                        "'{}' returned {} days late. Fine: {:.2}",
                        receipt.title, receipt.days_overdue, receipt.fine_amount
                    )
                } else {
                    format!("'{}' returned on time.", receipt.title)
                };
                self.set_status(message, StatusKind::Info);
                return Ok(Mode::Editing(Form::review(
                    &receipt.username,
                    &receipt.title,
                )));
            }
            FormKind::Renew => {
                let receipt = self
                    .library
                    .renew_book(&form.required("Username")?, &form.required("Title")?)?;
                self.refresh_all()?;
                self.set_status(
                    format!(
                        "'{}' renewed. New due date {}.",
                        receipt.title,
                        short_date(receipt.new_due_date)
                    ),
                    StatusKind::Info,
                );
            }
            FormKind::Review => {
                let rating = form.number("Rating (1-5)")?;
                let review = self.library.add_book_review(
                    &form.required("Username")?,
                    &form.required("Title")?,
                    rating,
                    form.optional("Review").as_deref(),
                )?;
                self.refresh_reports()?;
                self.set_status(
                    format!("Rated '{}' {}/5. Thanks!", review.title, review.rating),
                    StatusKind::Info,
                );
            }
        }
        Ok(Mode::Normal)
    }

    fn perform_removal(&mut self, action: &ConfirmAction) -> Result<()> {
        match action {
            ConfirmAction::RemoveBook { title } => {
                self.library.remove_book(title)?;
                self.set_status(format!("Removed '{title}'."), StatusKind::Info);
            }
            ConfirmAction::RemoveUser { username } => {
                self.library.remove_user(username)?;
                if self.history_user.as_deref() == Some(username.as_str()) {
                    self.history_user = None;
                }
                self.set_status(format!("Removed user '{username}'."), StatusKind::Info);
            }
        }
        self.refresh_all()
    }

    fn cycle_user_status(&mut self) -> Result<()> {
        let Some(summary) = self.users.current() else {
            self.set_status("No user selected.", StatusKind::Error);
            return Ok(());
        };
        let username = summary.user.username.clone();
        let current = UserStatus::ALL
            .iter()
            .position(|status| *status == summary.user.status)
            .unwrap_or(0);
        let next = UserStatus::ALL[(current + 1) % UserStatus::ALL.len()];

        match self.library.set_user_status(&username, next) {
            Ok(user) => {
                self.refresh_users()?;
                self.set_status(
                    format!("{} is now {}.", user.username, user.status),
                    StatusKind::Info,
                );
            }
            Err(err) => self.set_status(err.to_string(), StatusKind::Error),
        }
        Ok(())
    }

    fn export_snapshot(&mut self) {
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let result = data_dir()
            .map(|dir| dir.join("exports").join(stamp))
            .and_then(|dir| {
                let stats = export_tables(self.library.connection(), &dir)?;
                Ok((dir, stats.values().sum::<usize>()))
            });
        match result {
            Ok((dir, rows)) => {
                log::info!("exported {rows} rows to {}", dir.display());
                self.set_status(
                    format!("Exported {rows} rows to {}. Press 'o' to open.", dir.display()),
                    StatusKind::Info,
                );
                self.last_export = Some(dir);
            }
            Err(err) => self.set_status(
                format!("Export failed: {}", surface_error(&err)),
                StatusKind::Error,
            ),
        }
    }

    fn open_last_export(&mut self) {
        let Some(dir) = self.last_export.clone() else {
            self.set_status("Nothing exported yet. Press 'x' first.", StatusKind::Error);
            return;
        };
        if let Err(err) = open_link(&dir) {
            self.set_status(format!("Failed to open folder: {err}"), StatusKind::Error);
        } else {
            self.set_status(format!("Opened {}.", dir.display()), StatusKind::Info);
        }
    }

    fn loan_form(&mut self, kind: FormKind) -> Mode {
        let (username, title) = self.selection_context();
        self.clear_status();
        Mode::Editing(Form::loan(kind, &username, &title))
    }

    /// Username and title implied by the highlighted row, used to prefill
    /// loan and review forms.
    fn selection_context(&self) -> (String, String) {
        match self.tab {
            Tab::Books => (
                String::new(),
                self.books
                    .current()
                    .map(|book| book.title.clone())
                    .unwrap_or_default(),
            ),
            Tab::Users => (
                self.users
                    .current()
                    .map(|summary| summary.user.username.clone())
                    .unwrap_or_default(),
                String::new(),
            ),
            Tab::Loans => self
                .loans
                .current()
                .map(|loan| (loan.username.clone().unwrap_or_default(), loan.title.clone()))
                .unwrap_or_default(),
            Tab::Overdue => self
                .overdue
                .current()
                .map(|loan| (loan.username.clone().unwrap_or_default(), loan.title.clone()))
                .unwrap_or_default(),
            Tab::History => self
                .history
                .current()
                .map(|entry| (entry.username.clone().unwrap_or_default(), entry.title.clone()))
                .unwrap_or_default(),
            Tab::Reports => Default::default(),
        }
    }

    fn switch_tab(&mut self, tab: Tab) {
        if self.tab != tab {
            self.tab = tab;
            self.clear_status();
        }
    }

    fn move_selection(&mut self, offset: isize) {
        match self.tab {
            Tab::Books => self.books.move_selection(offset),
            Tab::Users => self.users.move_selection(offset),
            Tab::Loans => self.loans.move_selection(offset),
            Tab::Overdue => self.overdue.move_selection(offset),
            Tab::History => self.history.move_selection(offset),
            Tab::Reports => {}
        }
    }

    fn jump_selection(&mut self, to_end: bool) {
        macro_rules! jump {
            ($screen:expr) => {
                if to_end {
                    $screen.select_last()
                } else {
                    $screen.select_first()
                }
            };
        }
        match self.tab {
            Tab::Books => jump!(self.books),
            Tab::Users => jump!(self.users),
            Tab::Loans => jump!(self.loans),
            Tab::Overdue => jump!(self.overdue),
            Tab::History => jump!(self.history),
            Tab::Reports => {}
        }
    }

    fn focus_book(&mut self, title: &str) {
        if let Some(idx) = self.books.items.iter().position(|book| book.title == title) {
            self.books.selected = idx;
        }
    }

    fn apply_search(&mut self, target: Tab, query: Option<String>) -> Result<()> {
        let query = query.filter(|q| !q.trim().is_empty());
        match target {
            Tab::Users => {
                self.users.filter = query;
                self.users.select_first();
                self.refresh_users()
            }
            _ => {
                self.books.filter = query;
                self.books.select_first();
                self.refresh_books()
            }
        }
    }

    fn clear_tab_filter(&mut self) -> Result<()> {
        match self.tab {
            Tab::Books if self.books.filter.is_some() => self.apply_search(Tab::Books, None),
            Tab::Users if self.users.filter.is_some() => self.apply_search(Tab::Users, None),
            Tab::History if self.history_user.is_some() => {
                self.history_user = None;
                self.history.select_first();
                self.refresh_history()
            }
            _ => Ok(()),
        }
    }

    fn refresh_all(&mut self) -> Result<()> {
        self.refresh_books()?;
        self.refresh_users()?;
        self.refresh_loans()?;
        self.refresh_history()?;
        self.refresh_reports()
    }

    fn refresh_books(&mut self) -> Result<()> {
        let books = match self.books.filter.as_deref() {
            Some(term) => self.library.search_books(term)?,
            None => self.library.list_books()?,
        };
        self.books.set_items(books);
        Ok(())
    }

    fn refresh_users(&mut self) -> Result<()> {
        let users = match self.users.filter.as_deref() {
            Some(term) => self.library.search_users(term)?,
            None => self.library.list_all_users()?,
        };
        self.users.set_items(users);
        Ok(())
    }

    fn refresh_loans(&mut self) -> Result<()> {
        self.loans.set_items(self.library.track_books()?);
        let overdue = self.library.overdue_books()?;
        self.overdue_total = overdue.total_fine;
        self.overdue.set_items(overdue.loans);
        Ok(())
    }

    fn refresh_history(&mut self) -> Result<()> {
        let log = match self.history_user.as_deref() {
            Some(username) => self.library.user_history(username)?,
            None => self.library.borrow_logs()?,
        };
        self.history_total = log.total_fines;
        self.history.set_items(log.entries);
        Ok(())
    }

    fn refresh_reports(&mut self) -> Result<()> {
        self.report = self.library.generate_reports()?;
        self.top_rated = self.library.top_rated_books(TOP_RATED_LIMIT)?;
        Ok(())
    }

    fn set_status<S: Into<String>>(&mut self, text: S, kind: StatusKind) {
        self.status = Some(StatusMessage {
            text: text.into(),
            kind,
        });
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    pub(crate) fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(HEADER_HEIGHT),
                Constraint::Min(0),
                Constraint::Length(FOOTER_HEIGHT),
            ])
            .split(area);

        self.draw_tabs(frame, chunks[0]);
        match self.tab {
            Tab::Books => self.draw_books(frame, chunks[1]),
            Tab::Users => self.draw_users(frame, chunks[1]),
            Tab::Loans => self.draw_loans(frame, chunks[1]),
            Tab::Overdue => self.draw_overdue(frame, chunks[1]),
            Tab::History => self.draw_history(frame, chunks[1]),
            Tab::Reports => self.draw_reports(frame, chunks[1]),
        }
        self.draw_footer(frame, chunks[2]);

        match &self.mode {
            Mode::Editing(form) => self.draw_form(frame, area, form),
            Mode::Confirm(action) => self.draw_confirm(frame, area, action),
            Mode::Searching(state) => self.draw_search_bar(frame, chunks[1], state),
            Mode::Normal => {}
        }
    }

    fn draw_tabs(&self, frame: &mut Frame, area: Rect) {
        let titles: Vec<String> = Tab::ALL
            .iter()
            .enumerate()
            .map(|(idx, tab)| format!("{} {tab}", idx + 1))
            .collect();
        let tabs = Tabs::new(titles)
            .select(self.tab.index())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Library Circulation  ·  {}", self.library.today())),
            )
            .highlight_style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            );
        frame.render_widget(tabs, area);
    }

    /// Bordered list with a bold header row and the selection highlighted.
    #[allow(clippy::too_many_arguments)]
    fn render_rows(
        &self,
        frame: &mut Frame,
        area: Rect,
        title: String,
        header: String,
        rows: Vec<ListItem<'static>>,
        selected: usize,
        empty_message: &str,
    ) {
        let block = Block::default().title(title).borders(Borders::ALL);
        if rows.is_empty() {
            let message = Paragraph::new(empty_message.to_string())
                .alignment(Alignment::Center)
                .block(block);
            frame.render_widget(message, area);
            return;
        }

        let inner = block.inner(area);
        frame.render_widget(block, area);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(0)])
            .split(inner);

        let header = Paragraph::new(Span::styled(
            format!("  {header}"),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(header, chunks[0]);

        let list = List::new(rows)
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        state.select(Some(selected));
        frame.render_stateful_widget(list, chunks[1], &mut state);
    }

    fn draw_books(&self, frame: &mut Frame, area: Rect) {
        let title = match &self.books.filter {
            Some(term) => format!("Books matching '{term}' ({})", self.books.len()),
            None => format!("Books ({})", self.books.len()),
        };
        let header = format!(
            "{} {} {} {}",
            fit_column("Title", 32),
            fit_column("Author", 22),
            fit_column("Category", 14),
            "Available"
        );
        let rows = self
            .books
            .items
            .iter()
            .map(|book| {
                let availability = format!("{}/{}", book.available_copies, book.total_copies);
                let style = if book.is_available() {
                    Style::default()
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                ListItem::new(Line::from(vec![
                    Span::raw(format!(
                        "{} {} {} ",
                        fit_column(&book.title, 32),
                        fit_column(book.author_or_unknown(), 22),
                        fit_column(&book.category, 14),
                    )),
                    Span::styled(availability, style),
                ]))
            })
            .collect();
        let empty = if self.books.filter.is_some() {
            "No books match the current search."
        } else {
            "No books yet. Press '+' to add one."
        };
        self.render_rows(frame, area, title, header, rows, self.books.selected, empty);
    }

    fn draw_users(&self, frame: &mut Frame, area: Rect) {
        let title = match &self.users.filter {
            Some(term) => format!("Users matching '{term}' ({})", self.users.len()),
            None => format!("Users ({})", self.users.len()),
        };
        let header = format!(
            "{} {} {} {} {} {}",
            fit_column("Username", 16),
            fit_column("Full name", 24),
            fit_column("Class", 8),
            fit_column("Section", 8),
            fit_column("Status", 10),
            "Loans"
        );
        let rows = self
            .users
            .items
            .iter()
            .map(|summary| {
                let user = &summary.user;
                let status_style = if user.is_active() {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Red)
                };
                ListItem::new(Line::from(vec![
                    Span::raw(format!(
                        "{} {} {} {} ",
                        fit_column(&user.username, 16),
                        fit_column(&user.full_name, 24),
                        fit_column(user.class_name.as_deref().unwrap_or("-"), 8),
                        fit_column(user.section.as_deref().unwrap_or("-"), 8),
                    )),
                    Span::styled(fit_column(user.status.as_str(), 10), status_style),
                    Span::raw(format!(" {}", summary.active_loans)),
                ]))
            })
            .collect();
        let empty = if self.users.filter.is_some() {
            "No users match the current search."
        } else {
            "No users yet. Press '+' to register one."
        };
        self.render_rows(frame, area, title, header, rows, self.users.selected, empty);
    }

    fn draw_loans(&self, frame: &mut Frame, area: Rect) {
        let header = format!(
            "{} {} {} {} {}",
            fit_column("Borrower", 16),
            fit_column("Title", 32),
            fit_column("Borrowed", 16),
            fit_column("Due", 10),
            "Status"
        );
        let rows = self
            .loans
            .items
            .iter()
            .map(|loan| {
                ListItem::new(Line::from(vec![
                    Span::raw(format!(
                        "{} {} {} {} ",
                        fit_column(borrower_name(loan.username.as_deref()), 16),
                        fit_column(&loan.title, 32),
                        fit_column(&short_timestamp(loan.borrowed_date), 16),
                        short_date(loan.due_date),
                    )),
                    Span::styled(tracking_label(loan.status), status_style(loan.status)),
                ]))
            })
            .collect();
        self.render_rows(
            frame,
            area,
            format!("Books on loan ({})", self.loans.len()),
            header,
            rows,
            self.loans.selected,
            "No books are currently on loan.",
        );
    }

    fn draw_overdue(&self, frame: &mut Frame, area: Rect) {
        let header = format!(
            "{} {} {} {} {}",
            fit_column("Borrower", 16),
            fit_column("Title", 32),
            fit_column("Due", 10),
            fit_column("Days", 5),
            "Fine"
        );
        let rows = self
            .overdue
            .items
            .iter()
            .map(|loan| {
                ListItem::new(Line::from(vec![
                    Span::raw(format!(
                        "{} {} {} {:>5} ",
                        fit_column(borrower_name(loan.username.as_deref()), 16),
                        fit_column(&loan.title, 32),
                        short_date(loan.due_date),
                        loan.days_overdue,
                    )),
                    Span::styled(format!("{:.2}", loan.fine), Style::default().fg(Color::Red)),
                ]))
            })
            .collect();
        self.render_rows(
            frame,
            area,
            format!(
                "Overdue ({})  ·  fines if returned today: {:.2}",
                self.overdue.len(),
                self.overdue_total
            ),
            header,
            rows,
            self.overdue.selected,
            "No overdue books.",
        );
    }

    fn draw_history(&self, frame: &mut Frame, area: Rect) {
        let title = match &self.history_user {
            Some(username) => format!(
                "History of {username} ({})  ·  fines: {:.2}",
                self.history.len(),
                self.history_total
            ),
            None => format!(
                "Borrow log ({})  ·  fines collected: {:.2}",
                self.history.len(),
                self.history_total
            ),
        };
        let header = format!(
            "{} {} {} {} {} {}",
            fit_column("Borrower", 16),
            fit_column("Title", 28),
            fit_column("Borrowed", 10),
            fit_column("Due", 10),
            fit_column("Returned", 10),
            "Status / Fine"
        );
        let rows = self
            .history
            .items
            .iter()
            .map(|entry| {
                let returned = entry
                    .return_date
                    .map(|date| short_date(date.date()))
                    .unwrap_or_else(|| "-".to_string());
                let mut spans = vec![
                    Span::raw(format!(
                        "{} {} {} {} {} ",
                        fit_column(borrower_name(entry.username.as_deref()), 16),
                        fit_column(&entry.title, 28),
                        short_date(entry.borrowed_date.date()),
                        short_date(entry.due_date),
                        fit_column(&returned, 10),
                    )),
                    Span::styled(entry.status.to_string(), status_style(entry.status)),
                ];
                if entry.fine > 0.0 {
                    spans.push(Span::raw(format!("  {:.2}", entry.fine)));
                }
                ListItem::new(Line::from(spans))
            })
            .collect();
        self.render_rows(
            frame,
            area,
            title,
            header,
            rows,
            self.history.selected,
            "No loans recorded yet.",
        );
    }

    fn draw_reports(&self, frame: &mut Frame, area: Rect) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);
        let heading = Style::default().add_modifier(Modifier::BOLD);
        let summary = &self.report.summary;

        let mut left = vec![
            Line::from(Span::styled("Catalog", heading)),
            Line::from(format!("  Unique titles:    {}", summary.unique_titles)),
            Line::from(format!("  Total copies:     {}", summary.total_copies)),
            Line::from(format!("  Available copies: {}", summary.available_copies)),
            Line::from(format!("  Borrowed copies:  {}", summary.borrowed_copies)),
            Line::from(""),
            Line::from(Span::styled("Most borrowed", heading)),
        ];
        if self.report.popular_books.is_empty() {
            left.push(Line::from("  No loans yet."));
        }
        for book in &self.report.popular_books {
            left.push(Line::from(format!(
                "  {} {:>4}",
                fit_column(&book.title, 30),
                book.borrow_count
            )));
        }

        let mut right = vec![Line::from(Span::styled("Active borrowers", heading))];
        if self.report.active_borrowers.is_empty() {
            right.push(Line::from("  Nobody has a book out."));
        }
        for borrower in &self.report.active_borrowers {
            right.push(Line::from(format!(
                "  {} {:>2}",
                fit_column(&borrower.username, 20),
                borrower.active_loans
            )));
        }
        right.push(Line::from(""));
        right.push(Line::from(Span::styled("Top rated", heading)));
        if self.top_rated.is_empty() {
            right.push(Line::from("  No reviews yet."));
        }
        for book in &self.top_rated {
            right.push(Line::from(format!(
                "  {} {:.1}★ ({})",
                fit_column(&book.title, 26),
                book.average_rating,
                book.review_count
            )));
        }

        let left = Paragraph::new(left)
            .block(Block::default().borders(Borders::ALL).title("Reports"))
            .wrap(Wrap { trim: false });
        let right = Paragraph::new(right)
            .block(Block::default().borders(Borders::ALL))
            .wrap(Wrap { trim: false });
        frame.render_widget(left, columns[0]);
        frame.render_widget(right, columns[1]);
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::TOP);
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area);

        let status_line = if let Some(status) = &self.status {
            Line::from(vec![Span::styled(status.text.clone(), status.kind.style())])
        } else {
            Line::from("")
        };

        let instructions = self.footer_instructions();

        let paragraph = Paragraph::new(vec![status_line, instructions]).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn footer_instructions(&self) -> Line<'static> {
        let key_style = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let keys: &[(&str, &str)] = match (&self.mode, self.tab) {
            (Mode::Editing(_), _) => &[
                ("[Enter]", "Save"),
                ("[Tab]", "Next field"),
                ("[Esc]", "Cancel"),
            ],
            (Mode::Confirm(_), _) => &[("[y]", "Confirm"), ("[n]", "Cancel")],
            (Mode::Searching(_), _) => &[
                ("[Enter]", "Keep filter"),
                ("[Esc]", "Clear"),
                ("[↑↓]", "Navigate"),
            ],
            (Mode::Normal, Tab::Books) => &[
                ("[+]", "Add"),
                ("[d]", "Donate"),
                ("[e]", "Edit"),
                ("[-]", "Remove"),
                ("[b]", "Borrow"),
                ("[v]", "Review"),
                ("[/]", "Search"),
                ("[x]", "Export"),
                ("[q]", "Quit"),
            ],
            (Mode::Normal, Tab::Users) => &[
                ("[+]", "Register"),
                ("[-]", "Remove"),
                ("[s]", "Status"),
                ("[Enter]", "History"),
                ("[b]", "Borrow"),
                ("[/]", "Search"),
                ("[q]", "Quit"),
            ],
            (Mode::Normal, Tab::Loans | Tab::Overdue | Tab::History) => &[
                ("[r]", "Return"),
                ("[n]", "Renew"),
                ("[v]", "Review"),
                ("[Tab]", "Next tab"),
                ("[Ctrl+R]", "Reload"),
                ("[q]", "Quit"),
            ],
            (Mode::Normal, Tab::Reports) => &[
                ("[x]", "Export"),
                ("[o]", "Open export"),
                ("[Tab]", "Next tab"),
                ("[q]", "Quit"),
            ],
        };

        let mut spans = Vec::with_capacity(keys.len() * 2);
        for (key, label) in keys {
            spans.push(Span::styled(key.to_string(), key_style));
            spans.push(Span::raw(format!(" {label}   ")));
        }
        Line::from(spans)
    }

    fn draw_search_bar(&self, frame: &mut Frame, area: Rect, state: &SearchState) {
        let height = 3u16.min(area.height);
        let popup_area = Rect {
            x: area.x,
            y: area.y,
            width: area.width,
            height,
        };
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("Search {}", state.target));
        let paragraph = Paragraph::new(Span::raw(format!("Search: {}", state.query)))
            .block(block.clone())
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);

        let inner = block.inner(popup_area);
        let cursor_x = inner.x + "Search: ".len() as u16 + state.query.chars().count() as u16;
        frame.set_cursor_position((cursor_x, inner.y));
    }

    fn draw_form(&self, frame: &mut Frame, area: Rect, form: &Form) {
        let popup_area = centered_rect(60, 50, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .title(form.kind.title())
            .borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let mut lines: Vec<Line> = (0..form.fields.len())
            .map(|idx| form.build_line(idx))
            .collect();
        lines.push(Line::from(""));

        if let Some(error) = &form.error {
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            )));
        } else {
            lines.push(Line::from(Span::styled(
                "Enter to save • Tab to switch • Esc to cancel",
                Style::default().fg(Color::Gray),
            )));
        }

        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);

        let (dx, dy) = form.cursor_offset();
        frame.set_cursor_position((inner.x + dx, inner.y + dy));
    }

    fn draw_confirm(&self, frame: &mut Frame, area: Rect, action: &ConfirmAction) {
        let popup_area = centered_rect(60, 30, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default()
            .title("Confirm Removal")
            .borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let lines = vec![
            Line::from(action.prompt()),
            Line::from(""),
            Line::from(Span::styled(
                "Press Y to confirm or N / Esc to cancel.",
                Style::default().fg(Color::Gray),
            )),
        ];

        let paragraph = Paragraph::new(lines)
            .alignment(Alignment::Left)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }
}
