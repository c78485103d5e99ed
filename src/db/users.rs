use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{is_constraint_violation, LibraryError, Result, StorageContext};
use crate::models::{User, UserStatus, UserSummary};

use super::like_pattern;

const USER_COLUMNS: &str = "id, username, full_name, class, section, registration_date, status";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        full_name: row.get(2)?,
        class_name: row.get(3)?,
        section: row.get(4)?,
        registration_date: row.get(5)?,
        status: row.get(6)?,
    })
}

/// Fetch a user regardless of account status.
pub fn fetch_user(conn: &Connection, username: &str) -> Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
        [username],
        user_from_row,
    )
    .optional()
    .storage("failed to load user")
}

/// Insert a freshly registered, active user.
pub fn insert_user(
    conn: &Connection,
    username: &str,
    full_name: &str,
    class_name: Option<&str>,
    section: Option<&str>,
    registered_at: NaiveDateTime,
) -> Result<User> {
    conn.execute(
        "INSERT INTO users (username, full_name, class, section, registration_date, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            username,
            full_name,
            class_name,
            section,
            registered_at,
            UserStatus::Active
        ],
    )
    .map_err(|err| {
        if is_constraint_violation(&err) {
            LibraryError::DuplicateUsername(username.to_string())
        } else {
            LibraryError::Storage {
                operation: "failed to insert user",
                source: err,
            }
        }
    })?;

    Ok(User {
        id: conn.last_insert_rowid(),
        username: username.to_string(),
        full_name: full_name.to_string(),
        class_name: class_name.map(str::to_string),
        section: section.map(str::to_string),
        registration_date: registered_at,
        status: UserStatus::Active,
    })
}

/// List users with their live count of unreturned loans, newest registrations
/// first. With a search term, only users whose username, full name, class or
/// section contains it (case-insensitively) are returned.
pub fn fetch_user_summaries(conn: &Connection, term: Option<&str>) -> Result<Vec<UserSummary>> {
    let filter = if term.is_some() {
        "WHERE u.username LIKE ?1 ESCAPE '\\'
            OR u.full_name LIKE ?1 ESCAPE '\\'
            OR u.class LIKE ?1 ESCAPE '\\'
            OR u.section LIKE ?1 ESCAPE '\\'"
    } else {
        ""
    };
    let sql = format!(
        "SELECT u.id, u.username, u.full_name, u.class, u.section, u.registration_date, u.status,
                (SELECT COUNT(*) FROM borrowed_books b
                 WHERE b.student_name = u.username AND b.returned = 0) AS active_loans
         FROM users u
         {filter}
         ORDER BY u.registration_date DESC, u.id DESC"
    );

    let mut stmt = conn
        .prepare(&sql)
        .storage("failed to prepare user listing")?;

    let map_row = |row: &Row<'_>| -> rusqlite::Result<UserSummary> {
        Ok(UserSummary {
            user: user_from_row(row)?,
            active_loans: row.get(7)?,
        })
    };

    let rows = match term {
        Some(term) => stmt.query_map([like_pattern(term)], map_row),
        None => stmt.query_map([], map_row),
    }
    .storage("failed to load users")?;

    let users = rows
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect users")?;

    Ok(users)
}

pub fn update_user_status(conn: &Connection, username: &str, status: UserStatus) -> Result<usize> {
    conn.execute(
        "UPDATE users SET status = ?1 WHERE username = ?2",
        params![status, username],
    )
    .storage("failed to update user status")
}

/// Delete a user row. The schema trigger refuses while loans are outstanding;
/// returned loans and reviews keep their rows with a NULL username.
pub fn delete_user(conn: &Connection, username: &str) -> Result<usize> {
    conn.execute("DELETE FROM users WHERE username = ?1", [username])
        .storage("failed to delete user")
}
