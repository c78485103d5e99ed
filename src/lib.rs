//! Core library surface for the library circulation manager.
//!
//! The circulation engine ([`Library`]) sits on top of per-table query modules
//! in [`db`]; the terminal UI and the command line in `main.rs` are thin
//! adapters over it. Re-exports below keep the public API small enough that
//! the binary and the integration tests import from one place.
pub mod circulation;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod transfer;
pub mod ui;

/// The circulation engine and its collaborators.
pub use circulation::Library;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{LoanPolicy, Settings};
pub use error::{ErrorKind, LibraryError};

/// Opening helpers for the embedded SQLite store.
pub use db::{open_database, open_memory};

pub use models::{
    Book, BorrowReceipt, Loan, LoanStatus, RenewReceipt, ReturnReceipt, Review, User, UserStatus,
    UserSummary,
};

/// The interactive application entry point and state container.
pub use ui::{run_app, App};
