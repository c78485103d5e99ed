use std::fs;

use chrono::NaiveDate;
use library_circulation::transfer::{export_tables, import_tables, TransferError};
use library_circulation::*;
use rusqlite::Connection;

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

fn populated_library() -> Library {
    let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let mut library = Library::with_clock(
        open_memory().unwrap(),
        LoanPolicy::default(),
        Box::new(FixedClock::on(start)),
    );
    library
        .add_new_book("Dune", Some("Frank Herbert"), Some("Fiction"), 2)
        .unwrap();
    library.add_new_book("Emma", None, None, 1).unwrap();
    library
        .register_user("alice", "Alice Smith", Some("10"), None)
        .unwrap();
    library.borrow_book("alice", "Dune").unwrap();
    library.borrow_book("alice", "Emma").unwrap();

    let late = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
    library.set_clock(Box::new(FixedClock::on(late)));
    library.return_book("alice", "Emma").unwrap();
    library.add_book_review("alice", "Emma", 4, Some("Witty")).unwrap();
    library
}

#[test]
fn export_then_import_into_fresh_database() {
    let dir = tempfile::tempdir().unwrap();
    let source = populated_library();

    let exported = export_tables(source.connection(), dir.path()).unwrap();
    assert_eq!(exported["books"], 2);
    assert_eq!(exported["borrowed_books"], 2);
    assert!(dir.path().join("users.csv").exists());

    let mut conn = open_memory().unwrap();
    let imported = import_tables(&mut conn, dir.path()).unwrap();
    assert_eq!(imported, exported);
    for table in ["books", "users", "borrowed_books", "book_reviews", "book_categories"] {
        assert_eq!(count(&conn, table), count(source.connection(), table), "{table}");
    }

    let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
    let copy = Library::with_clock(conn, LoanPolicy::default(), Box::new(FixedClock::on(today)));
    let dune = copy.find_book("Dune").unwrap().unwrap();
    assert_eq!(dune.available_copies, 1);
    assert_eq!(dune.author.as_deref(), Some("Frank Herbert"));

    let log = copy.borrow_logs().unwrap();
    assert_eq!(log.total_fines, 10.0);
    let overdue = copy.overdue_books().unwrap();
    assert_eq!(overdue.loans.len(), 1);
    assert_eq!(overdue.loans[0].days_overdue, 2);
}

#[test]
fn reimporting_updates_rows_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let mut library = populated_library();
    export_tables(library.connection(), dir.path()).unwrap();

    let mut conn = open_memory().unwrap();
    import_tables(&mut conn, dir.path()).unwrap();
    import_tables(&mut conn, dir.path()).unwrap();
    assert_eq!(count(&conn, "books"), 2);
    assert_eq!(count(&conn, "borrowed_books"), 2);

    library.add_new_book("Dune", None, None, 1).unwrap();
    export_tables(library.connection(), dir.path()).unwrap();
    import_tables(&mut conn, dir.path()).unwrap();
    let total: i64 = conn
        .query_row(
            "SELECT total_copies FROM books WHERE title = 'Dune'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(total, 3);
}

#[test]
fn rows_without_ids_match_on_natural_key() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("users.csv"),
        "username,full_name,status\nalice,Alice Cooper,suspended\nbob,Bob Jones,active\n",
    )
    .unwrap();

    let mut conn = open_memory().unwrap();
    conn.execute(
        "INSERT INTO users (username, full_name) VALUES ('alice', 'Alice Smith')",
        [],
    )
    .unwrap();

    let imported = import_tables(&mut conn, dir.path()).unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported["users"], 2);
    assert_eq!(count(&conn, "users"), 2);

    let (name, status): (String, String) = conn
        .query_row(
            "SELECT full_name, status FROM users WHERE username = 'alice'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(name, "Alice Cooper");
    assert_eq!(status, "suspended");
}

#[test]
fn unknown_columns_abort_the_import() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("books.csv"),
        "title,author,shelf\nDune,Frank Herbert,A3\n",
    )
    .unwrap();

    let mut conn = open_memory().unwrap();
    let err = import_tables(&mut conn, dir.path()).unwrap_err();
    assert!(matches!(
        err,
        TransferError::UnknownColumn { ref table, ref column } if table == "books" && column == "shelf"
    ));
    assert_eq!(count(&conn, "books"), 0);
}

#[test]
fn bad_row_reports_its_position() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("book_reviews.csv"),
        "book_title,rating\nNowhere,4\n",
    )
    .unwrap();

    let mut conn = open_memory().unwrap();
    let err = import_tables(&mut conn, dir.path()).unwrap_err();
    assert!(matches!(err, TransferError::Row { row: 1, .. }));
    assert_eq!(count(&conn, "book_reviews"), 0);
}

#[test]
fn row_with_new_id_updates_existing_title() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("books.csv"),
        "id,title,author,category,total_copies,available_copies\n7,Dune,Herbert,Fiction,4,4\n",
    )
    .unwrap();

    let mut conn = open_memory().unwrap();
    conn.execute(
        "INSERT INTO books (id, title, total_copies, available_copies) VALUES (1, 'Dune', 1, 1)",
        [],
    )
    .unwrap();

    let imported = import_tables(&mut conn, dir.path()).unwrap();
    assert_eq!(imported["books"], 1);
    assert_eq!(count(&conn, "books"), 1);

    let (id, author, total): (i64, String, i64) = conn
        .query_row(
            "SELECT id, author, total_copies FROM books WHERE title = 'Dune'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(id, 1);
    assert_eq!(author, "Herbert");
    assert_eq!(total, 4);
}
