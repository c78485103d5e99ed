//! Aggregate queries behind the statistics screen.

use rusqlite::Connection;

use crate::error::{Result, StorageContext};
use crate::models::{ActiveBorrower, CopySummary, PopularBook};

pub fn copy_summary(conn: &Connection) -> Result<CopySummary> {
    let (unique_titles, total_copies, available_copies): (i64, i64, i64) = conn
        .query_row(
            "SELECT COUNT(*), COALESCE(SUM(total_copies), 0), COALESCE(SUM(available_copies), 0)
             FROM books",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .storage("failed to summarize copies")?;

    Ok(CopySummary {
        unique_titles,
        total_copies,
        available_copies,
        borrowed_copies: total_copies - available_copies,
    })
}

/// Titles with the most loans ever recorded.
pub fn popular_books(conn: &Connection, limit: usize) -> Result<Vec<PopularBook>> {
    let mut stmt = conn
        .prepare(
            "SELECT book_title, COUNT(*) AS borrow_count
             FROM borrowed_books
             GROUP BY book_title
             ORDER BY borrow_count DESC, book_title COLLATE NOCASE
             LIMIT ?1",
        )
        .storage("failed to prepare popular books query")?;

    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let books = stmt
        .query_map([limit], |row| {
            Ok(PopularBook {
                title: row.get(0)?,
                borrow_count: row.get(1)?,
            })
        })
        .storage("failed to load popular books")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect popular books")?;

    Ok(books)
}

/// Users holding at least one unreturned loan, heaviest borrowers first.
pub fn active_borrowers(conn: &Connection) -> Result<Vec<ActiveBorrower>> {
    let mut stmt = conn
        .prepare(
            "SELECT student_name, COUNT(*) AS active_books
             FROM borrowed_books
             WHERE returned = 0 AND student_name IS NOT NULL
             GROUP BY student_name
             ORDER BY active_books DESC, student_name",
        )
        .storage("failed to prepare active borrowers query")?;

    let borrowers = stmt
        .query_map([], |row| {
            Ok(ActiveBorrower {
                username: row.get(0)?,
                active_loans: row.get(1)?,
            })
        })
        .storage("failed to load active borrowers")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect active borrowers")?;

    Ok(borrowers)
}
