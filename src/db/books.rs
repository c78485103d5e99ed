use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{is_constraint_violation, LibraryError, Result, StorageContext};
use crate::models::{Book, Category};

use super::like_pattern;

const BOOK_COLUMNS: &str =
    "id, title, author, category, total_copies, available_copies, created_at";

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        category: row.get(3)?,
        total_copies: row.get(4)?,
        available_copies: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Look up a single book by its unique title.
pub fn fetch_book(conn: &Connection, title: &str) -> Result<Option<Book>> {
    conn.query_row(
        &format!("SELECT {BOOK_COLUMNS} FROM books WHERE title = ?1"),
        [title],
        book_from_row,
    )
    .optional()
    .storage("failed to load book")
}

/// Every book in the catalog, ordered case-insensitively by title.
pub fn fetch_all_books(conn: &Connection) -> Result<Vec<Book>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {BOOK_COLUMNS} FROM books ORDER BY title COLLATE NOCASE"
        ))
        .storage("failed to prepare book query")?;

    let books = stmt
        .query_map([], book_from_row)
        .storage("failed to load books")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect books")?;

    Ok(books)
}

/// Books with at least one copy on the shelf, grouped by category.
pub fn fetch_available_books(conn: &Connection) -> Result<Vec<Book>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {BOOK_COLUMNS} FROM books
             WHERE available_copies > 0
             ORDER BY category COLLATE NOCASE, title COLLATE NOCASE"
        ))
        .storage("failed to prepare available books query")?;

    let books = stmt
        .query_map([], book_from_row)
        .storage("failed to load available books")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect available books")?;

    Ok(books)
}

/// Case-insensitive substring search over title, author and category. Books
/// with the most copies on the shelf come first.
pub fn search_books(conn: &Connection, term: &str) -> Result<Vec<Book>> {
    let pattern = like_pattern(term);
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {BOOK_COLUMNS} FROM books
             WHERE title LIKE ?1 ESCAPE '\\'
                OR author LIKE ?1 ESCAPE '\\'
                OR category LIKE ?1 ESCAPE '\\'
             ORDER BY available_copies DESC, title COLLATE NOCASE"
        ))
        .storage("failed to prepare book search")?;

    let books = stmt
        .query_map([pattern], book_from_row)
        .storage("failed to search books")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect book search results")?;

    Ok(books)
}

/// Insert a new title with every copy on the shelf.
pub fn insert_book(
    conn: &Connection,
    title: &str,
    author: Option<&str>,
    category: &str,
    copies: i64,
    created_at: NaiveDateTime,
) -> Result<Book> {
    conn.execute(
        "INSERT INTO books (title, author, category, total_copies, available_copies, created_at)
         VALUES (?1, ?2, ?3, ?4, ?4, ?5)",
        params![title, author, category, copies, created_at],
    )
    .map_err(|err| map_duplicate_title(err, title))?;

    Ok(Book {
        id: conn.last_insert_rowid(),
        title: title.to_string(),
        author: author.map(str::to_string),
        category: category.to_string(),
        total_copies: copies,
        available_copies: copies,
        created_at,
    })
}

/// Grow both counters of an existing title. Returns the number of rows
/// touched (0 when the title does not exist).
pub fn add_copies(conn: &Connection, title: &str, copies: i64) -> Result<usize> {
    conn.execute(
        "UPDATE books
         SET total_copies = total_copies + ?1, available_copies = available_copies + ?1
         WHERE title = ?2",
        params![copies, title],
    )
    .storage("failed to add copies")
}

/// Rewrite the editable columns of a book. Renames cascade to loans and
/// reviews through the foreign keys.
pub fn update_book(
    conn: &Connection,
    old_title: &str,
    new_title: &str,
    author: Option<&str>,
    category: &str,
    total_copies: i64,
    available_copies: i64,
) -> Result<usize> {
    conn.execute(
        "UPDATE books
         SET title = ?1, author = ?2, category = ?3, total_copies = ?4, available_copies = ?5
         WHERE title = ?6",
        params![new_title, author, category, total_copies, available_copies, old_title],
    )
    .map_err(|err| map_duplicate_title(err, new_title))
}

/// Take one copy off the shelf. Returns `false` when none was available.
pub fn take_copy(conn: &Connection, title: &str) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE books SET available_copies = available_copies - 1
             WHERE title = ?1 AND available_copies > 0",
            [title],
        )
        .storage("failed to decrement available copies")?;
    Ok(updated == 1)
}

/// Put one copy back on the shelf, never exceeding the total.
pub fn restore_copy(conn: &Connection, title: &str) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE books SET available_copies = available_copies + 1
             WHERE title = ?1 AND available_copies < total_copies",
            [title],
        )
        .storage("failed to increment available copies")?;
    Ok(updated == 1)
}

pub fn delete_book(conn: &Connection, title: &str) -> Result<usize> {
    conn.execute("DELETE FROM books WHERE title = ?1", [title])
        .storage("failed to delete book")
}

/// Reference categories in alphabetical order.
pub fn fetch_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, category_name, description FROM book_categories
             ORDER BY category_name COLLATE NOCASE",
        )
        .storage("failed to prepare category query")?;

    let categories = stmt
        .query_map([], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
            })
        })
        .storage("failed to load categories")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect categories")?;

    Ok(categories)
}

/// Turn a UNIQUE(title) violation into a readable conflict; CHECK failures
/// and everything else stay storage errors.
fn map_duplicate_title(err: rusqlite::Error, title: &str) -> LibraryError {
    if is_constraint_violation(&err) && err.to_string().contains("books.title") {
        LibraryError::DuplicateTitle(title.to_string())
    } else {
        LibraryError::Storage {
            operation: "failed to write book",
            source: err,
        }
    }
}
