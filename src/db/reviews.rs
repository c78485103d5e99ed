use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::error::{Result, StorageContext};
use crate::models::{Review, TopRatedBook};

pub fn insert_review(
    conn: &Connection,
    title: &str,
    username: &str,
    rating: i64,
    text: Option<&str>,
    reviewed_at: NaiveDateTime,
) -> Result<Review> {
    conn.execute(
        "INSERT INTO book_reviews (book_title, username, rating, review_text, review_date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![title, username, rating, text, reviewed_at],
    )
    .storage("failed to insert review")?;

    Ok(Review {
        id: conn.last_insert_rowid(),
        title: title.to_string(),
        username: Some(username.to_string()),
        rating,
        text: text.map(str::to_string),
        review_date: reviewed_at,
    })
}

/// Reviews of one title, newest first.
pub fn fetch_reviews_for_book(conn: &Connection, title: &str) -> Result<Vec<Review>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, book_title, username, rating, review_text, review_date
             FROM book_reviews
             WHERE book_title = ?1
             ORDER BY review_date DESC, id DESC",
        )
        .storage("failed to prepare review query")?;

    let reviews = stmt
        .query_map([title], |row| {
            Ok(Review {
                id: row.get(0)?,
                title: row.get(1)?,
                username: row.get(2)?,
                rating: row.get(3)?,
                text: row.get(4)?,
                review_date: row.get(5)?,
            })
        })
        .storage("failed to load reviews")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect reviews")?;

    Ok(reviews)
}

pub fn delete_reviews_for_book(conn: &Connection, title: &str) -> Result<usize> {
    conn.execute("DELETE FROM book_reviews WHERE book_title = ?1", [title])
        .storage("failed to delete reviews")
}

/// Books ranked by average rating, ties broken by number of reviews. Books
/// nobody reviewed are left out.
pub fn fetch_top_rated(conn: &Connection, limit: usize) -> Result<Vec<TopRatedBook>> {
    let mut stmt = conn
        .prepare(
            "SELECT b.title, b.author, b.category,
                    AVG(r.rating) AS avg_rating,
                    COUNT(r.id) AS num_reviews
             FROM books b
             INNER JOIN book_reviews r ON r.book_title = b.title
             GROUP BY b.id
             ORDER BY avg_rating DESC, num_reviews DESC, b.title COLLATE NOCASE
             LIMIT ?1",
        )
        .storage("failed to prepare top rated query")?;

    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let books = stmt
        .query_map([limit], |row| {
            Ok(TopRatedBook {
                title: row.get(0)?,
                author: row.get(1)?,
                category: row.get(2)?,
                average_rating: row.get(3)?,
                review_count: row.get(4)?,
            })
        })
        .storage("failed to load top rated books")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage("failed to collect top rated books")?;

    Ok(books)
}
