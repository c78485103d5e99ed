use std::fs;
use std::path::Path;

use rusqlite::{params, Connection};

use crate::error::{LibraryError, Result, StorageContext};

/// Reference categories inserted on first start.
const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Fiction", "Novels, short stories, and fictional works"),
    ("Non-Fiction", "Biographies, history, science, etc."),
    ("Science", "Scientific books and research"),
    ("Technology", "Computer science, engineering, etc."),
    ("Literature", "Classic literature and poetry"),
    ("Economics", "Economic theories and business"),
    ("Education", "Educational and academic books"),
    ("General", "General purpose books"),
];

/// Tables in foreign-key order: parents before the rows that reference them.
pub const TABLES: &[&str] = &[
    "books",
    "book_categories",
    "users",
    "borrowed_books",
    "book_reviews",
];

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL UNIQUE,
    author TEXT,
    category TEXT NOT NULL DEFAULT 'General',
    total_copies INTEGER NOT NULL DEFAULT 1 CHECK (total_copies >= 0),
    available_copies INTEGER NOT NULL DEFAULT 1
        CHECK (available_copies >= 0 AND available_copies <= total_copies),
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS book_categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category_name TEXT NOT NULL UNIQUE,
    description TEXT
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL,
    class TEXT,
    section TEXT,
    registration_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    status TEXT NOT NULL DEFAULT 'active'
        CHECK (status IN ('active', 'suspended', 'inactive'))
);

CREATE TABLE IF NOT EXISTS borrowed_books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    student_name TEXT,
    book_title TEXT NOT NULL,
    borrowed_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    due_date TEXT NOT NULL,
    returned INTEGER NOT NULL DEFAULT 0,
    return_date TEXT,
    fine_amount REAL NOT NULL DEFAULT 0,
    FOREIGN KEY (book_title) REFERENCES books(title) ON UPDATE CASCADE ON DELETE CASCADE,
    FOREIGN KEY (student_name) REFERENCES users(username) ON UPDATE CASCADE ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_borrowed_books_open
    ON borrowed_books (student_name, book_title, returned);
CREATE INDEX IF NOT EXISTS idx_borrowed_books_title ON borrowed_books (book_title);

CREATE TABLE IF NOT EXISTS book_reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    book_title TEXT NOT NULL,
    username TEXT,
    rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
    review_text TEXT,
    review_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (book_title) REFERENCES books(title) ON UPDATE CASCADE ON DELETE CASCADE,
    FOREIGN KEY (username) REFERENCES users(username) ON UPDATE CASCADE ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_book_reviews_title ON book_reviews (book_title);

CREATE TRIGGER IF NOT EXISTS users_keep_outstanding_loans
BEFORE DELETE ON users
WHEN EXISTS (
    SELECT 1 FROM borrowed_books WHERE student_name = OLD.username AND returned = 0
)
BEGIN
    SELECT RAISE(ABORT, 'user has outstanding loans');
END;
";

/// Open (or create) the database file at `path`, enable foreign keys and make
/// sure every table exists.
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            LibraryError::validation(format!(
                "failed to create data directory {}: {err}",
                parent.display()
            ))
        })?;
    }

    let conn = Connection::open(path).storage("failed to open SQLite database")?;
    ensure_schema(&conn)?;
    log::info!("opened library database at {}", path.display());
    Ok(conn)
}

/// In-memory database with the full schema. Useful for tests.
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().storage("failed to open in-memory database")?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// Create missing tables and seed the reference categories. Idempotent.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .storage("failed to enable foreign keys")?;
    conn.execute_batch(SCHEMA_SQL)
        .storage("failed to create library tables")?;
    seed_categories(conn)?;
    log::debug!("library schema ready");
    Ok(())
}

fn seed_categories(conn: &Connection) -> Result<()> {
    let mut stmt = conn
        .prepare(
            "INSERT OR IGNORE INTO book_categories (category_name, description) VALUES (?1, ?2)",
        )
        .storage("failed to prepare category seed")?;
    for (name, description) in DEFAULT_CATEGORIES {
        stmt.execute(params![name, description])
            .storage("failed to seed categories")?;
    }
    Ok(())
}
