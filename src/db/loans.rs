use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Result, StorageContext};
use crate::models::Loan;

const LOAN_COLUMNS: &str =
    "id, student_name, book_title, borrowed_date, due_date, returned, return_date, fine_amount";

fn loan_from_row(row: &Row<'_>) -> rusqlite::Result<Loan> {
    Ok(Loan {
        id: row.get(0)?,
        username: row.get(1)?,
        title: row.get(2)?,
        borrowed_date: row.get(3)?,
        due_date: row.get(4)?,
        returned: row.get(5)?,
        return_date: row.get(6)?,
        fine_amount: row.get(7)?,
    })
}

fn collect_loans(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    operation: &'static str,
) -> Result<Vec<Loan>> {
    let mut stmt = conn.prepare(sql).storage(operation)?;
    let loans = stmt
        .query_map(params, loan_from_row)
        .storage(operation)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage(operation)?;
    Ok(loans)
}

/// The unreturned loan a user holds for a title, if any.
pub fn find_open_loan(conn: &Connection, username: &str, title: &str) -> Result<Option<Loan>> {
    conn.query_row(
        &format!(
            "SELECT {LOAN_COLUMNS} FROM borrowed_books
             WHERE student_name = ?1 AND book_title = ?2 AND returned = 0
             ORDER BY id LIMIT 1"
        ),
        params![username, title],
        loan_from_row,
    )
    .optional()
    .storage("failed to look up loan")
}

pub fn count_open_loans_for_user(conn: &Connection, username: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM borrowed_books WHERE student_name = ?1 AND returned = 0",
        [username],
        |row| row.get(0),
    )
    .storage("failed to count user loans")
}

pub fn count_open_loans_for_book(conn: &Connection, title: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM borrowed_books WHERE book_title = ?1 AND returned = 0",
        [title],
        |row| row.get(0),
    )
    .storage("failed to count book loans")
}

/// Record a new unreturned loan and return its id.
pub fn insert_loan(
    conn: &Connection,
    username: &str,
    title: &str,
    borrowed_date: NaiveDateTime,
    due_date: NaiveDate,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO borrowed_books (student_name, book_title, borrowed_date, due_date, returned, fine_amount)
         VALUES (?1, ?2, ?3, ?4, 0, 0)",
        params![username, title, borrowed_date, due_date],
    )
    .storage("failed to record loan")?;
    Ok(conn.last_insert_rowid())
}

/// Close a loan. Only an unreturned loan can be closed, so the state machine
/// never leaves `Returned`.
pub fn mark_returned(
    conn: &Connection,
    loan_id: i64,
    return_date: NaiveDateTime,
    fine_amount: f64,
) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE borrowed_books SET returned = 1, return_date = ?1, fine_amount = ?2
             WHERE id = ?3 AND returned = 0",
            params![return_date, fine_amount, loan_id],
        )
        .storage("failed to mark loan returned")?;
    Ok(updated == 1)
}

pub fn update_due_date(conn: &Connection, loan_id: i64, due_date: NaiveDate) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE borrowed_books SET due_date = ?1 WHERE id = ?2 AND returned = 0",
            params![due_date, loan_id],
        )
        .storage("failed to extend due date")?;
    Ok(updated == 1)
}

/// Drop the whole loan history of a title.
pub fn delete_loans_for_book(conn: &Connection, title: &str) -> Result<usize> {
    conn.execute("DELETE FROM borrowed_books WHERE book_title = ?1", [title])
        .storage("failed to delete loan history")
}

/// Unreturned loans, soonest due first.
pub fn fetch_open_loans(conn: &Connection) -> Result<Vec<Loan>> {
    collect_loans(
        conn,
        &format!(
            "SELECT {LOAN_COLUMNS} FROM borrowed_books
             WHERE returned = 0
             ORDER BY due_date, id"
        ),
        [],
        "failed to load open loans",
    )
}

/// Unreturned loans whose due date is before `today`, most overdue first.
pub fn fetch_overdue_loans(conn: &Connection, today: NaiveDate) -> Result<Vec<Loan>> {
    collect_loans(
        conn,
        &format!(
            "SELECT {LOAN_COLUMNS} FROM borrowed_books
             WHERE returned = 0 AND due_date < ?1
             ORDER BY due_date, id"
        ),
        [today],
        "failed to load overdue loans",
    )
}

/// Every loan ever recorded, newest first, optionally for a single user.
pub fn fetch_loan_history(conn: &Connection, username: Option<&str>) -> Result<Vec<Loan>> {
    match username {
        Some(username) => collect_loans(
            conn,
            &format!(
                "SELECT {LOAN_COLUMNS} FROM borrowed_books
                 WHERE student_name = ?1
                 ORDER BY borrowed_date DESC, id DESC"
            ),
            [username],
            "failed to load user loan history",
        ),
        None => collect_loans(
            conn,
            &format!(
                "SELECT {LOAN_COLUMNS} FROM borrowed_books
                 ORDER BY borrowed_date DESC, id DESC"
            ),
            [],
            "failed to load loan history",
        ),
    }
}

/// Sum of every fine recorded on a return.
pub fn total_recorded_fines(conn: &Connection) -> Result<f64> {
    conn.query_row(
        "SELECT COALESCE(SUM(fine_amount), 0.0) FROM borrowed_books",
        [],
        |row| row.get(0),
    )
    .storage("failed to total fines")
}
