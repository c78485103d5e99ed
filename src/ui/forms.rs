use anyhow::{anyhow, Context, Result};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::models::Book;

/// Which operation a modal form submits to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FormKind {
    AddBook,
    DonateBook,
    EditBook,
    RegisterUser,
    Borrow,
    Return,
    Renew,
    Review,
}

impl FormKind {
    pub(crate) fn title(&self) -> &'static str {
        match self {
            FormKind::AddBook => "Add Books",
            FormKind::DonateBook => "Donate a Book",
            FormKind::EditBook => "Edit Book",
            FormKind::RegisterUser => "Register User",
            FormKind::Borrow => "Borrow Book",
            FormKind::Return => "Return Book",
            FormKind::Renew => "Renew Book",
            FormKind::Review => "Review Book",
        }
    }
}

/// One labelled text input.
#[derive(Clone, Debug)]
pub(crate) struct FormField {
    pub(crate) label: &'static str,
    pub(crate) value: String,
    pub(crate) required: bool,
    pub(crate) numeric: bool,
}

impl FormField {
    fn required(label: &'static str) -> Self {
        Self {
            label,
            value: String::new(),
            required: true,
            numeric: false,
        }
    }

    fn optional(label: &'static str) -> Self {
        Self {
            required: false,
            ..Self::required(label)
        }
    }

    fn number(label: &'static str, initial: i64) -> Self {
        Self {
            value: initial.to_string(),
            numeric: true,
            ..Self::required(label)
        }
    }

    fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }
}

/// State of a modal form: its fields, the focused one, and the last
/// validation error.
#[derive(Clone, Debug)]
pub(crate) struct Form {
    pub(crate) kind: FormKind,
    pub(crate) fields: Vec<FormField>,
    pub(crate) active: usize,
    pub(crate) error: Option<String>,
    /// Title of the book being edited, kept separately so a rename can still
    /// find the original row.
    pub(crate) original_title: Option<String>,
}

impl Form {
    fn new(kind: FormKind, fields: Vec<FormField>) -> Self {
        Self {
            kind,
            fields,
            active: 0,
            error: None,
            original_title: None,
        }
    }

    pub(crate) fn add_book() -> Self {
        Self::new(
            FormKind::AddBook,
            vec![
                FormField::required("Title"),
                FormField::optional("Author"),
                FormField::optional("Category"),
                FormField::number("Copies", 1),
            ],
        )
    }

    pub(crate) fn donate_book() -> Self {
        Self::new(
            FormKind::DonateBook,
            vec![
                FormField::required("Title"),
                FormField::optional("Author"),
                FormField::optional("Category"),
            ],
        )
    }

    /// Populate the form from an existing book when editing.
    pub(crate) fn edit_book(book: &Book) -> Self {
        let mut form = Self::new(
            FormKind::EditBook,
            vec![
                FormField::required("Title").with_value(book.title.clone()),
                FormField::optional("Author").with_value(book.author.clone().unwrap_or_default()),
                FormField::optional("Category").with_value(book.category.clone()),
                FormField::number("Total copies", book.total_copies),
            ],
        );
        form.original_title = Some(book.title.clone());
        form
    }

    pub(crate) fn register_user() -> Self {
        Self::new(
            FormKind::RegisterUser,
            vec![
                FormField::required("Username"),
                FormField::required("Full name"),
                FormField::optional("Class"),
                FormField::optional("Section"),
            ],
        )
    }

    /// Borrow, return and renew all ask for the same two fields. Focus starts
    /// on the first empty one.
    pub(crate) fn loan(kind: FormKind, username: &str, title: &str) -> Self {
        let mut form = Self::new(
            kind,
            vec![
                FormField::required("Username").with_value(username),
                FormField::required("Title").with_value(title),
            ],
        );
        form.focus_first_empty();
        form
    }

    pub(crate) fn review(username: &str, title: &str) -> Self {
        let mut form = Self::new(
            FormKind::Review,
            vec![
                FormField::required("Username").with_value(username),
                FormField::required("Title").with_value(title),
                FormField::number("Rating (1-5)", 5),
                FormField::optional("Review"),
            ],
        );
        form.focus_first_empty();
        form
    }

    fn focus_first_empty(&mut self) {
        if let Some(idx) = self.fields.iter().position(|f| f.value.is_empty()) {
            self.active = idx;
        }
    }

    pub(crate) fn next_field(&mut self) {
        if !self.fields.is_empty() {
            self.active = (self.active + 1) % self.fields.len();
        }
    }

    pub(crate) fn previous_field(&mut self) {
        if !self.fields.is_empty() {
            self.active = (self.active + self.fields.len() - 1) % self.fields.len();
        }
    }

    /// Append a character to the active field, rejecting letters in numeric
    /// fields.
    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        let Some(field) = self.fields.get_mut(self.active) else {
            return false;
        };
        let accepted = if field.numeric {
            ch.is_ascii_digit() || (ch == '-' && field.value.is_empty())
        } else {
            !ch.is_control()
        };
        if accepted {
            field.value.push(ch);
        }
        accepted
    }

    pub(crate) fn backspace(&mut self) {
        if let Some(field) = self.fields.get_mut(self.active) {
            field.value.pop();
        }
    }

    fn field(&self, label: &str) -> Result<&FormField> {
        self.fields
            .iter()
            .find(|f| f.label == label)
            .ok_or_else(|| anyhow!("form has no field '{label}'"))
    }

    /// Trimmed value of a required field.
    pub(crate) fn required(&self, label: &str) -> Result<String> {
        let value = self.field(label)?.value.trim();
        if value.is_empty() {
            return Err(anyhow!("{label} is required."));
        }
        Ok(value.to_string())
    }

    /// Trimmed value of an optional field, `None` when blank.
    pub(crate) fn optional(&self, label: &str) -> Option<String> {
        self.field(label)
            .ok()
            .map(|f| f.value.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub(crate) fn number(&self, label: &str) -> Result<i64> {
        self.required(label)?
            .parse::<i64>()
            .with_context(|| format!("{label} must be a whole number."))
    }

    /// Render a single line for the form widget.
    pub(crate) fn build_line(&self, idx: usize) -> Line<'static> {
        let Some(field) = self.fields.get(idx) else {
            return Line::from("");
        };
        let is_active = idx == self.active;

        let display = if field.value.is_empty() {
            if field.required { "<required>" } else { "<optional>" }.to_string()
        } else {
            field.value.clone()
        };

        let style = if is_active {
            Style::default().fg(Color::Yellow)
        } else if field.value.is_empty() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };

        Line::from(vec![
            Span::raw(format!("{}: ", field.label)),
            Span::styled(display, style),
        ])
    }

    /// Cursor column offset (within the form) and row of the active field.
    pub(crate) fn cursor_offset(&self) -> (u16, u16) {
        match self.fields.get(self.active) {
            Some(field) => {
                let prefix = field.label.chars().count() + 2;
                (
                    (prefix + field.value.chars().count()) as u16,
                    self.active as u16,
                )
            }
            None => (0, 0),
        }
    }
}

/// Destructive actions waiting for a yes/no answer.
#[derive(Clone, Debug)]
pub(crate) enum ConfirmAction {
    RemoveBook { title: String },
    RemoveUser { username: String },
}

impl ConfirmAction {
    pub(crate) fn prompt(&self) -> String {
        match self {
            ConfirmAction::RemoveBook { title } => {
                format!("Remove '{title}' with all of its reviews and loan history?")
            }
            ConfirmAction::RemoveUser { username } => format!("Remove user '{username}'?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loan_form_focuses_first_missing_field() {
        let form = Form::loan(FormKind::Borrow, "alice", "");
        assert_eq!(form.active, 1);
        let form = Form::loan(FormKind::Return, "", "Dune");
        assert_eq!(form.active, 0);
    }

    #[test]
    fn numeric_fields_reject_letters() {
        let mut form = Form::add_book();
        form.active = 3;
        form.backspace();
        assert!(!form.push_char('x'));
        assert!(form.push_char('4'));
        assert_eq!(form.number("Copies").unwrap(), 4);
    }

    #[test]
    fn required_fields_are_enforced() {
        let form = Form::register_user();
        let err = form.required("Username").unwrap_err();
        assert_eq!(err.to_string(), "Username is required.");
        assert_eq!(form.optional("Class"), None);
    }

    #[test]
    fn focus_wraps_around() {
        let mut form = Form::donate_book();
        form.previous_field();
        assert_eq!(form.active, 2);
        form.next_field();
        assert_eq!(form.active, 0);
    }
}
