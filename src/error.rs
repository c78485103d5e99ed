//! Error taxonomy for the circulation core.
//!
//! Every operation on [`crate::Library`] returns a [`LibraryError`] variant
//! that names the exact rule that was violated, so the presentation layer can
//! word its message without parsing strings. Storage failures keep the
//! underlying `rusqlite` error plus the name of the step that failed.

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::UserStatus;

/// Broad classes used by callers that only care about the category of a
/// failure (for example to pick a status colour).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Integrity,
    Storage,
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("{0}")]
    Validation(String),

    #[error("Username '{0}' already exists. Please choose a different username.")]
    DuplicateUsername(String),

    #[error("A book titled '{0}' already exists.")]
    DuplicateTitle(String),

    #[error("User '{0}' is not registered in the system.")]
    NotRegistered(String),

    #[error("User account '{username}' is {status}. Please contact the librarian.")]
    UserNotActive { username: String, status: UserStatus },

    #[error("User '{0}' not found in the system.")]
    UserNotFound(String),

    #[error("Book '{0}' does not exist in the library.")]
    BookNotFound(String),

    #[error("Book '{0}' is currently not available. All copies are borrowed.")]
    NoCopiesAvailable(String),

    #[error("'{username}' already has '{title}' borrowed. Please return it first.")]
    AlreadyHeld { username: String, title: String },

    #[error("'{username}' has reached the maximum borrowing limit ({limit} books).")]
    LimitExceeded { username: String, limit: i64 },

    #[error("No active loan found for '{username}' borrowing '{title}'.")]
    NoActiveLoan { username: String, title: String },

    #[error("Cannot renew overdue book '{title}' (due {due_date}). Please return it and pay the fine.")]
    Overdue { title: String, due_date: NaiveDate },

    #[error("Cannot reduce total copies of '{title}' below borrowed copies ({borrowed}).")]
    BelowBorrowedCount { title: String, borrowed: i64 },

    #[error("Cannot remove {entity} '{name}': {count} borrowed book(s) not yet returned.")]
    HasOutstandingLoans {
        entity: &'static str,
        name: String,
        count: i64,
    },

    #[error("Rating must be between 1 and 5 (got {0}).")]
    InvalidRating(i64),

    #[error("{operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

pub type Result<T, E = LibraryError> = std::result::Result<T, E>;

impl LibraryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LibraryError::Validation(_) | LibraryError::InvalidRating(_) => ErrorKind::Validation,
            LibraryError::NotRegistered(_)
            | LibraryError::UserNotFound(_)
            | LibraryError::BookNotFound(_)
            | LibraryError::NoActiveLoan { .. } => ErrorKind::NotFound,
            LibraryError::DuplicateUsername(_)
            | LibraryError::DuplicateTitle(_)
            | LibraryError::UserNotActive { .. }
            | LibraryError::NoCopiesAvailable(_)
            | LibraryError::AlreadyHeld { .. }
            | LibraryError::LimitExceeded { .. }
            | LibraryError::Overdue { .. } => ErrorKind::Conflict,
            LibraryError::BelowBorrowedCount { .. } | LibraryError::HasOutstandingLoans { .. } => {
                ErrorKind::Integrity
            }
            LibraryError::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// True for both a missing user and one whose account is not active;
    /// borrowing treats the two the same way.
    pub fn is_not_registered(&self) -> bool {
        matches!(
            self,
            LibraryError::NotRegistered(_) | LibraryError::UserNotActive { .. }
        )
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        LibraryError::Validation(message.into())
    }
}

/// Attach the name of the failing step to a raw SQLite error.
pub(crate) trait StorageContext<T> {
    fn storage(self, operation: &'static str) -> Result<T>;
}

impl<T> StorageContext<T> for std::result::Result<T, rusqlite::Error> {
    fn storage(self, operation: &'static str) -> Result<T> {
        self.map_err(|source| LibraryError::Storage { operation, source })
    }
}

/// Whether a SQLite error is a UNIQUE/CHECK/foreign-key violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_and_missing_users_both_count_as_not_registered() {
        let missing = LibraryError::NotRegistered("bob".into());
        let suspended = LibraryError::UserNotActive {
            username: "bob".into(),
            status: UserStatus::Suspended,
        };
        assert!(missing.is_not_registered());
        assert!(suspended.is_not_registered());
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert_eq!(suspended.kind(), ErrorKind::Conflict);
        assert!(!LibraryError::BookNotFound("Dune".into()).is_not_registered());
    }

    #[test]
    fn storage_errors_keep_their_operation() {
        let err: Result<()> =
            Err(rusqlite::Error::QueryReturnedNoRows).storage("failed to load book");
        let err = err.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().starts_with("failed to load book"));
    }

    #[test]
    fn suspended_status_renders_in_message() {
        let err = LibraryError::UserNotActive {
            username: "carol".into(),
            status: UserStatus::Suspended,
        };
        assert_eq!(
            err.to_string(),
            "User account 'carol' is suspended. Please contact the librarian."
        );
    }
}
