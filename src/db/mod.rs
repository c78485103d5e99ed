//! Persistence module split per table. Every function takes a borrowed
//! connection, so the same helpers run inside or outside a transaction.

pub mod books;
mod connection;
pub mod loans;
pub mod reports;
pub mod reviews;
pub mod users;

pub use connection::{ensure_schema, open_database, open_memory, TABLES};

/// Build a `LIKE` pattern matching `term` anywhere, with the wildcard
/// characters in `term` escaped (use with `ESCAPE '\'`).
pub(crate) fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.trim().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
