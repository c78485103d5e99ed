//! The circulation engine: registration, borrow/return/renew, catalog edits,
//! reviews and reports.
//!
//! [`Library`] owns the single SQLite connection. Operations that touch more
//! than one row run inside an IMMEDIATE transaction, which takes the write
//! lock before the precondition reads; an early return drops the uncommitted
//! transaction and rolls everything back, so copy counters and loan rows never
//! diverge.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::clock::{Clock, SystemClock};
use crate::config::LoanPolicy;
use crate::db::{books, loans, reports, reviews, users};
use crate::error::{LibraryError, Result, StorageContext};
use crate::models::{
    days_overdue, Book, BorrowLog, BorrowLogEntry, BorrowReceipt, Category, LibraryReport, Loan,
    LoanStatus, OverdueLoan, OverdueReport, RenewReceipt, ReturnReceipt, Review, TopRatedBook,
    TrackedLoan, User, UserStatus, UserSummary,
};

/// Number of titles listed in the "most borrowed" section of the report.
const POPULAR_BOOKS_LIMIT: usize = 5;
/// Category assigned when a book is added without one.
pub const DEFAULT_CATEGORY: &str = "General";

pub struct Library {
    conn: Connection,
    policy: LoanPolicy,
    clock: Box<dyn Clock>,
}

impl Library {
    pub fn new(conn: Connection, policy: LoanPolicy) -> Self {
        Self::with_clock(conn, policy, Box::new(SystemClock))
    }

    pub fn with_clock(conn: Connection, policy: LoanPolicy, clock: Box<dyn Clock>) -> Self {
        Self {
            conn,
            policy,
            clock,
        }
    }

    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.clock = clock;
    }

    pub fn policy(&self) -> &LoanPolicy {
        &self.policy
    }

    /// Read access to the underlying connection for batch tooling.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Close the connection, reporting any error SQLite raises while doing so.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, source)| LibraryError::Storage {
                operation: "failed to close database",
                source,
            })
    }

    fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    fn begin(&mut self) -> Result<Transaction<'_>> {
        self.conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .storage("failed to begin transaction")
    }

    // ── Registration & lookup ───────────────────────────────────────────

    pub fn register_user(
        &mut self,
        username: &str,
        full_name: &str,
        class_name: Option<&str>,
        section: Option<&str>,
    ) -> Result<User> {
        let username = username.trim();
        let full_name = full_name.trim();
        if username.is_empty() || full_name.is_empty() {
            return Err(LibraryError::validation(
                "Username and full name are required!",
            ));
        }
        if users::fetch_user(&self.conn, username)?.is_some() {
            return Err(LibraryError::DuplicateUsername(username.to_string()));
        }

        let user = users::insert_user(
            &self.conn,
            username,
            full_name,
            non_blank(class_name),
            non_blank(section),
            self.now(),
        )?;
        log::info!("registered user '{}'", user.username);
        Ok(user)
    }

    /// The user, but only when their account is active.
    pub fn check_user_exists(&self, username: &str) -> Result<Option<User>> {
        Ok(users::fetch_user(&self.conn, username.trim())?.filter(User::is_active))
    }

    /// The user whatever their account status.
    pub fn find_user(&self, username: &str) -> Result<Option<User>> {
        users::fetch_user(&self.conn, username.trim())
    }

    pub fn set_user_status(&mut self, username: &str, status: UserStatus) -> Result<User> {
        let username = username.trim();
        if users::update_user_status(&self.conn, username, status)? == 0 {
            return Err(LibraryError::UserNotFound(username.to_string()));
        }
        log::info!("user '{username}' is now {status}");
        users::fetch_user(&self.conn, username)?
            .ok_or_else(|| LibraryError::UserNotFound(username.to_string()))
    }

    pub fn search_users(&self, term: &str) -> Result<Vec<UserSummary>> {
        users::fetch_user_summaries(&self.conn, Some(term))
    }

    pub fn list_all_users(&self) -> Result<Vec<UserSummary>> {
        users::fetch_user_summaries(&self.conn, None)
    }

    // ── Circulation ─────────────────────────────────────────────────────

    /// Lend one copy of `title` to `username`.
    ///
    /// Preconditions are checked in a fixed order and the first failure wins:
    /// registered and active user, existing book, a free copy, not already
    /// holding the title, under the borrowing limit.
    pub fn borrow_book(&mut self, username: &str, title: &str) -> Result<BorrowReceipt> {
        let username = username.trim();
        let title = title.trim();
        let now = self.now();
        let due_date = now.date() + Duration::days(self.policy.loan_days);
        let limit = self.policy.max_active_loans;

        let tx = self.begin()?;
        require_active_user(&tx, username)?;
        let book = books::fetch_book(&tx, title)?
            .ok_or_else(|| LibraryError::BookNotFound(title.to_string()))?;
        if !book.is_available() {
            return Err(LibraryError::NoCopiesAvailable(book.title));
        }
        if loans::find_open_loan(&tx, username, title)?.is_some() {
            return Err(LibraryError::AlreadyHeld {
                username: username.to_string(),
                title: title.to_string(),
            });
        }
        if loans::count_open_loans_for_user(&tx, username)? >= limit {
            return Err(LibraryError::LimitExceeded {
                username: username.to_string(),
                limit,
            });
        }

        if !books::take_copy(&tx, title)? {
            return Err(LibraryError::NoCopiesAvailable(title.to_string()));
        }
        loans::insert_loan(&tx, username, title, now, due_date)?;
        tx.commit().storage("failed to commit borrow")?;

        log::info!("'{username}' borrowed '{title}', due {due_date}");
        Ok(BorrowReceipt {
            title: title.to_string(),
            username: username.to_string(),
            borrowed_date: now,
            due_date,
        })
    }

    /// Close the user's open loan of `title`, charging the daily fine for
    /// every whole day past the due date.
    pub fn return_book(&mut self, username: &str, title: &str) -> Result<ReturnReceipt> {
        let username = username.trim();
        let title = title.trim();
        let now = self.now();
        let policy = self.policy;

        let tx = self.begin()?;
        require_active_user(&tx, username)?;
        if books::fetch_book(&tx, title)?.is_none() {
            return Err(LibraryError::BookNotFound(title.to_string()));
        }
        let loan = require_open_loan(&tx, username, title)?;

        let days_overdue = days_overdue(loan.due_date, now.date());
        let fine_amount = policy.fine_for(days_overdue);

        if !loans::mark_returned(&tx, loan.id, now, fine_amount)? {
            return Err(LibraryError::NoActiveLoan {
                username: username.to_string(),
                title: title.to_string(),
            });
        }
        if !books::restore_copy(&tx, title)? {
            log::warn!("'{title}' already had every copy on the shelf when a loan came back");
        }
        tx.commit().storage("failed to commit return")?;

        log::info!("'{username}' returned '{title}' ({days_overdue} days late, fine {fine_amount:.2})");
        Ok(ReturnReceipt {
            title: title.to_string(),
            username: username.to_string(),
            return_date: now,
            days_overdue,
            fine_amount,
        })
    }

    /// Push the due date of an open, not yet overdue loan back by one loan
    /// period.
    pub fn renew_book(&mut self, username: &str, title: &str) -> Result<RenewReceipt> {
        let username = username.trim();
        let title = title.trim();
        let today = self.today();
        let extension = Duration::days(self.policy.loan_days);

        let tx = self.begin()?;
        require_active_user(&tx, username)?;
        let loan = require_open_loan(&tx, username, title)?;
        if loan.due_date < today {
            return Err(LibraryError::Overdue {
                title: title.to_string(),
                due_date: loan.due_date,
            });
        }

        let new_due_date = loan.due_date + extension;
        loans::update_due_date(&tx, loan.id, new_due_date)?;
        tx.commit().storage("failed to commit renewal")?;

        log::info!("'{username}' renewed '{title}' until {new_due_date}");
        Ok(RenewReceipt {
            title: title.to_string(),
            username: username.to_string(),
            previous_due_date: loan.due_date,
            new_due_date,
        })
    }

    // ── Catalog ─────────────────────────────────────────────────────────

    /// Add `copies` of a title. Re-adding an existing title grows its stock
    /// instead of failing.
    pub fn add_new_book(
        &mut self,
        title: &str,
        author: Option<&str>,
        category: Option<&str>,
        copies: i64,
    ) -> Result<Book> {
        let title = title.trim();
        if title.is_empty() {
            return Err(LibraryError::validation("Book title is required."));
        }
        if copies < 1 {
            return Err(LibraryError::validation(
                "Number of copies must be at least 1.",
            ));
        }
        let category = non_blank(category).unwrap_or(DEFAULT_CATEGORY);
        let now = self.now();

        let tx = self.begin()?;
        if books::add_copies(&tx, title, copies)? == 0 {
            books::insert_book(&tx, title, non_blank(author), category, copies, now)?;
        }
        let book = books::fetch_book(&tx, title)?
            .ok_or_else(|| LibraryError::BookNotFound(title.to_string()))?;
        tx.commit().storage("failed to commit new book")?;

        log::info!(
            "added {copies} cop{} of '{title}' ({} total)",
            if copies == 1 { "y" } else { "ies" },
            book.total_copies
        );
        Ok(book)
    }

    /// A donation is a single copy added to the catalog.
    pub fn donate_book(
        &mut self,
        title: &str,
        author: Option<&str>,
        category: Option<&str>,
    ) -> Result<Book> {
        self.add_new_book(title, author, category, 1)
    }

    /// Rewrite a book's details. The copies currently on loan are preserved:
    /// the new total may not drop below them and the available count is
    /// recomputed from them. A rename carries loans and reviews along.
    pub fn edit_book(
        &mut self,
        old_title: &str,
        new_title: &str,
        author: Option<&str>,
        category: Option<&str>,
        total_copies: i64,
    ) -> Result<Book> {
        let old_title = old_title.trim();
        let new_title = new_title.trim();
        if new_title.is_empty() {
            return Err(LibraryError::validation("Book title is required."));
        }
        if total_copies < 0 {
            return Err(LibraryError::validation(
                "Total copies cannot be negative.",
            ));
        }

        let tx = self.begin()?;
        let book = books::fetch_book(&tx, old_title)?
            .ok_or_else(|| LibraryError::BookNotFound(old_title.to_string()))?;
        let borrowed = book.borrowed_copies();
        if total_copies < borrowed {
            return Err(LibraryError::BelowBorrowedCount {
                title: book.title,
                borrowed,
            });
        }

        let category = non_blank(category).unwrap_or(DEFAULT_CATEGORY);
        books::update_book(
            &tx,
            old_title,
            new_title,
            non_blank(author),
            category,
            total_copies,
            total_copies - borrowed,
        )?;
        let updated = books::fetch_book(&tx, new_title)?
            .ok_or_else(|| LibraryError::BookNotFound(new_title.to_string()))?;
        tx.commit().storage("failed to commit book edit")?;

        if old_title != new_title {
            log::info!("renamed '{old_title}' to '{new_title}'");
        }
        log::info!("updated '{new_title}': {total_copies} copies, {borrowed} on loan");
        Ok(updated)
    }

    /// Delete a title with no copies on loan, together with its reviews and
    /// loan history.
    pub fn remove_book(&mut self, title: &str) -> Result<()> {
        let title = title.trim();

        let tx = self.begin()?;
        if books::fetch_book(&tx, title)?.is_none() {
            return Err(LibraryError::BookNotFound(title.to_string()));
        }
        let outstanding = loans::count_open_loans_for_book(&tx, title)?;
        if outstanding > 0 {
            log::warn!("refusing to remove '{title}': {outstanding} copies on loan");
            return Err(LibraryError::HasOutstandingLoans {
                entity: "book",
                name: title.to_string(),
                count: outstanding,
            });
        }

        let reviews_removed = reviews::delete_reviews_for_book(&tx, title)?;
        let loans_removed = loans::delete_loans_for_book(&tx, title)?;
        books::delete_book(&tx, title)?;
        tx.commit().storage("failed to commit book removal")?;

        log::info!(
            "removed '{title}' ({reviews_removed} reviews, {loans_removed} past loans)"
        );
        Ok(())
    }

    pub fn remove_user(&mut self, username: &str) -> Result<()> {
        let username = username.trim();

        let tx = self.begin()?;
        if users::fetch_user(&tx, username)?.is_none() {
            return Err(LibraryError::UserNotFound(username.to_string()));
        }
        let outstanding = loans::count_open_loans_for_user(&tx, username)?;
        if outstanding > 0 {
            log::warn!("refusing to remove '{username}': {outstanding} books not returned");
            return Err(LibraryError::HasOutstandingLoans {
                entity: "user",
                name: username.to_string(),
                count: outstanding,
            });
        }

        users::delete_user(&tx, username)?;
        tx.commit().storage("failed to commit user removal")?;

        log::info!("removed user '{username}'");
        Ok(())
    }

    pub fn list_books(&self) -> Result<Vec<Book>> {
        books::fetch_all_books(&self.conn)
    }

    pub fn available_books(&self) -> Result<Vec<Book>> {
        books::fetch_available_books(&self.conn)
    }

    pub fn search_books(&self, term: &str) -> Result<Vec<Book>> {
        books::search_books(&self.conn, term)
    }

    pub fn find_book(&self, title: &str) -> Result<Option<Book>> {
        books::fetch_book(&self.conn, title.trim())
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        books::fetch_categories(&self.conn)
    }

    // ── Reviews ─────────────────────────────────────────────────────────

    /// Store a 1–5 star rating. Any registered user may review any book;
    /// having borrowed it is not required.
    pub fn add_book_review(
        &mut self,
        username: &str,
        title: &str,
        rating: i64,
        text: Option<&str>,
    ) -> Result<Review> {
        if !(1..=5).contains(&rating) {
            return Err(LibraryError::InvalidRating(rating));
        }
        let username = username.trim();
        let title = title.trim();
        if users::fetch_user(&self.conn, username)?.is_none() {
            return Err(LibraryError::UserNotFound(username.to_string()));
        }
        if books::fetch_book(&self.conn, title)?.is_none() {
            return Err(LibraryError::BookNotFound(title.to_string()));
        }

        let review =
            reviews::insert_review(&self.conn, title, username, rating, non_blank(text), self.now())?;
        log::info!("'{username}' rated '{title}' {rating}/5");
        Ok(review)
    }

    pub fn book_reviews(&self, title: &str) -> Result<Vec<Review>> {
        reviews::fetch_reviews_for_book(&self.conn, title.trim())
    }

    pub fn top_rated_books(&self, limit: usize) -> Result<Vec<TopRatedBook>> {
        reviews::fetch_top_rated(&self.conn, limit)
    }

    // ── Reports ─────────────────────────────────────────────────────────

    pub fn generate_reports(&self) -> Result<LibraryReport> {
        Ok(LibraryReport {
            summary: reports::copy_summary(&self.conn)?,
            popular_books: reports::popular_books(&self.conn, POPULAR_BOOKS_LIMIT)?,
            active_borrowers: reports::active_borrowers(&self.conn)?,
        })
    }

    /// Unreturned loans past their due date with the fine each would carry
    /// if returned today.
    pub fn overdue_books(&self) -> Result<OverdueReport> {
        let today = self.today();
        let mut overdue: Vec<OverdueLoan> = loans::fetch_overdue_loans(&self.conn, today)?
            .into_iter()
            .map(|loan| {
                let days = days_overdue(loan.due_date, today);
                OverdueLoan {
                    username: loan.username,
                    title: loan.title,
                    borrowed_date: loan.borrowed_date,
                    due_date: loan.due_date,
                    days_overdue: days,
                    fine: self.policy.fine_for(days),
                }
            })
            .collect();
        overdue.sort_by(|a, b| b.days_overdue.cmp(&a.days_overdue));

        let total_fine = overdue.iter().map(|loan| loan.fine).sum();
        Ok(OverdueReport {
            loans: overdue,
            total_fine,
        })
    }

    /// Every unreturned loan, soonest due first.
    pub fn track_books(&self) -> Result<Vec<TrackedLoan>> {
        let today = self.today();
        let tracked = loans::fetch_open_loans(&self.conn)?
            .into_iter()
            .map(|loan| TrackedLoan {
                status: loan.status_on(today),
                username: loan.username,
                title: loan.title,
                borrowed_date: loan.borrowed_date,
                due_date: loan.due_date,
            })
            .collect();
        Ok(tracked)
    }

    /// Full loan history with the total of every fine ever recorded.
    pub fn borrow_logs(&self) -> Result<BorrowLog> {
        let entries = self.log_entries(loans::fetch_loan_history(&self.conn, None)?);
        let total_fines = loans::total_recorded_fines(&self.conn)?;
        Ok(BorrowLog {
            entries,
            total_fines,
        })
    }

    /// Loan history of a single user.
    pub fn user_history(&self, username: &str) -> Result<BorrowLog> {
        let username = username.trim();
        if users::fetch_user(&self.conn, username)?.is_none() {
            return Err(LibraryError::UserNotFound(username.to_string()));
        }
        let entries = self.log_entries(loans::fetch_loan_history(&self.conn, Some(username))?);
        let total_fines = entries.iter().map(|entry| entry.fine).sum();
        Ok(BorrowLog {
            entries,
            total_fines,
        })
    }

    fn log_entries(&self, history: Vec<Loan>) -> Vec<BorrowLogEntry> {
        let today = self.today();
        history
            .into_iter()
            .map(|loan| BorrowLogEntry {
                status: loan.status_on(today),
                username: loan.username,
                title: loan.title,
                borrowed_date: loan.borrowed_date,
                due_date: loan.due_date,
                return_date: loan.return_date,
                fine: loan.fine_amount,
            })
            .collect()
    }
}

fn require_active_user(conn: &Connection, username: &str) -> Result<User> {
    let user = users::fetch_user(conn, username)?
        .ok_or_else(|| LibraryError::NotRegistered(username.to_string()))?;
    if !user.is_active() {
        return Err(LibraryError::UserNotActive {
            username: user.username,
            status: user.status,
        });
    }
    Ok(user)
}

fn require_open_loan(conn: &Connection, username: &str, title: &str) -> Result<Loan> {
    loans::find_open_loan(conn, username, title)?.ok_or_else(|| LibraryError::NoActiveLoan {
        username: username.to_string(),
        title: title.to_string(),
    })
}

/// Trim an optional text field, treating blank input as absent.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Status of a loan as shown in tracking views.
pub fn tracking_label(status: LoanStatus) -> String {
    match status {
        LoanStatus::Overdue { days } => format!("OVERDUE ({days}d)"),
        LoanStatus::Active => "On Time".to_string(),
        LoanStatus::Returned => "Returned".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_optional_fields_are_dropped() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(Some(" A ")), Some("A"));
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn tracking_labels_distinguish_overdue() {
        assert_eq!(tracking_label(LoanStatus::Active), "On Time");
        assert_eq!(tracking_label(LoanStatus::Overdue { days: 2 }), "OVERDUE (2d)");
    }
}
