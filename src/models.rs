//! Domain records that mirror the SQLite schema and the report queries built
//! on top of it. Everything here is a plain data holder; the rules that move a
//! loan between states live in [`crate::circulation`].

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

#[derive(Debug, Clone, PartialEq)]
/// A catalog title together with its copy counters.
pub struct Book {
    pub id: i64,
    /// Unique key; loans and reviews reference books by title.
    pub title: String,
    pub author: Option<String>,
    pub category: String,
    pub total_copies: i64,
    /// Always within `0..=total_copies`.
    pub available_copies: i64,
    pub created_at: NaiveDateTime,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }

    /// Copies currently out on loan.
    pub fn borrowed_copies(&self) -> i64 {
        self.total_copies - self.available_copies
    }

    /// Author name for display, with a placeholder for blank authors.
    pub fn author_or_unknown(&self) -> &str {
        match self.author.as_deref() {
            Some(author) if !author.trim().is_empty() => author,
            _ => "Unknown",
        }
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.title, self.author_or_unknown())
    }
}

/// Account states. Only active users may borrow, return or renew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserStatus {
    #[default]
    Active,
    Suspended,
    Inactive,
}

impl UserStatus {
    pub const ALL: [UserStatus; 3] = [
        UserStatus::Active,
        UserStatus::Suspended,
        UserStatus::Inactive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(UserStatus::Active),
            "suspended" => Ok(UserStatus::Suspended),
            "inactive" => Ok(UserStatus::Inactive),
            other => Err(format!("unknown user status '{other}'")),
        }
    }
}

impl ToSql for UserStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for UserStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|msg: String| FromSqlError::Other(msg.into()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub full_name: String,
    pub class_name: Option<String>,
    pub section: Option<String>,
    pub registration_date: NaiveDateTime,
    pub status: UserStatus,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// A user row augmented with the live count of unreturned loans.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub user: User,
    pub active_loans: i64,
}

#[derive(Debug, Clone, PartialEq)]
/// One row of `borrowed_books`.
pub struct Loan {
    pub id: i64,
    /// `None` once the borrower has been removed from the system.
    pub username: Option<String>,
    pub title: String,
    pub borrowed_date: NaiveDateTime,
    pub due_date: NaiveDate,
    pub returned: bool,
    pub return_date: Option<NaiveDateTime>,
    pub fine_amount: f64,
}

impl Loan {
    pub fn status_on(&self, today: NaiveDate) -> LoanStatus {
        LoanStatus::evaluate(self.returned, self.due_date, today)
    }
}

/// Where a loan sits in its lifecycle relative to a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanStatus {
    Active,
    Overdue { days: i64 },
    Returned,
}

impl LoanStatus {
    pub fn evaluate(returned: bool, due_date: NaiveDate, today: NaiveDate) -> Self {
        if returned {
            return LoanStatus::Returned;
        }
        let days = days_overdue(due_date, today);
        if days > 0 {
            LoanStatus::Overdue { days }
        } else {
            LoanStatus::Active
        }
    }

    pub fn is_overdue(&self) -> bool {
        matches!(self, LoanStatus::Overdue { .. })
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoanStatus::Active => f.write_str("Active"),
            LoanStatus::Overdue { days } => write!(f, "Overdue ({days}d)"),
            LoanStatus::Returned => f.write_str("Returned"),
        }
    }
}

/// Whole days past the due date, never negative.
pub fn days_overdue(due_date: NaiveDate, today: NaiveDate) -> i64 {
    (today - due_date).num_days().max(0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub id: i64,
    pub title: String,
    pub username: Option<String>,
    pub rating: i64,
    pub text: Option<String>,
    pub review_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BorrowReceipt {
    pub title: String,
    pub username: String,
    pub borrowed_date: NaiveDateTime,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnReceipt {
    pub title: String,
    pub username: String,
    pub return_date: NaiveDateTime,
    pub days_overdue: i64,
    pub fine_amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenewReceipt {
    pub title: String,
    pub username: String,
    pub previous_due_date: NaiveDate,
    pub new_due_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverdueLoan {
    pub username: Option<String>,
    pub title: String,
    pub borrowed_date: NaiveDateTime,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
    /// Fine that would be charged if the book came back today.
    pub fine: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverdueReport {
    pub loans: Vec<OverdueLoan>,
    pub total_fine: f64,
}

/// An unreturned loan annotated with its on-time/overdue state.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedLoan {
    pub username: Option<String>,
    pub title: String,
    pub borrowed_date: NaiveDateTime,
    pub due_date: NaiveDate,
    pub status: LoanStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BorrowLogEntry {
    pub username: Option<String>,
    pub title: String,
    pub borrowed_date: NaiveDateTime,
    pub due_date: NaiveDate,
    pub status: LoanStatus,
    pub return_date: Option<NaiveDateTime>,
    pub fine: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BorrowLog {
    pub entries: Vec<BorrowLogEntry>,
    /// Sum of every fine ever recorded on a return.
    pub total_fines: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopySummary {
    pub unique_titles: i64,
    pub total_copies: i64,
    pub available_copies: i64,
    pub borrowed_copies: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopularBook {
    pub title: String,
    pub borrow_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveBorrower {
    pub username: String,
    pub active_loans: i64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LibraryReport {
    pub summary: CopySummary,
    pub popular_books: Vec<PopularBook>,
    pub active_borrowers: Vec<ActiveBorrower>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopRatedBook {
    pub title: String,
    pub author: Option<String>,
    pub category: String,
    pub average_rating: f64,
    pub review_count: i64,
}
