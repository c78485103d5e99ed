//! Offline export/import of every table as CSV, one file per table.
//!
//! Export writes the rows verbatim with a header of column names. Import
//! upserts each file into the table of the same name: rows are matched on
//! `id` when the file carries it, otherwise on the table's natural key, and the
//! key column itself is never rewritten.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rusqlite::types::{Value, ValueRef};
use rusqlite::Connection;
use thiserror::Error;

use crate::db::TABLES;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("SQLite error on table '{table}': {source}")]
    Sqlite {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("CSV error in '{file}': {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to import sheet '{table}': unknown column '{column}'")]
    UnknownColumn { table: String, column: String },
    #[error("Failed to import sheet '{table}', row {row}: {source}")]
    Row {
        table: String,
        row: usize,
        #[source]
        source: rusqlite::Error,
    },
}

/// Rows written or upserted per table.
pub type TransferStats = BTreeMap<String, usize>;

/// Write `<table>.csv` for every library table into `dir`.
pub fn export_tables(conn: &Connection, dir: &Path) -> Result<TransferStats, TransferError> {
    fs::create_dir_all(dir).map_err(|source| TransferError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut stats = TransferStats::new();
    for table in TABLES {
        let path = dir.join(format!("{table}.csv"));
        let rows = export_table(conn, table, &path)?;
        log::info!("exported {rows} rows from {table} to {}", path.display());
        stats.insert(table.to_string(), rows);
    }
    Ok(stats)
}

fn export_table(conn: &Connection, table: &str, path: &Path) -> Result<usize, TransferError> {
    let sqlite_err = |source| TransferError::Sqlite {
        table: table.to_string(),
        source,
    };
    let csv_err = |source| TransferError::Csv {
        file: path.display().to_string(),
        source,
    };

    let mut stmt = conn
        .prepare(&format!("SELECT * FROM {table} ORDER BY id"))
        .map_err(sqlite_err)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(&columns).map_err(csv_err)?;

    let mut rows = stmt.query([]).map_err(sqlite_err)?;
    let mut count = 0;
    while let Some(row) = rows.next().map_err(sqlite_err)? {
        let mut record = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            record.push(cell_text(row.get_ref(idx).map_err(sqlite_err)?));
        }
        writer.write_record(&record).map_err(csv_err)?;
        count += 1;
    }
    writer.flush().map_err(|source| TransferError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(count)
}

fn cell_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Import every `<table>.csv` found in `dir`, parents before children. Each
/// file is one transaction; the first failing file aborts the import and
/// leaves the files before it applied.
pub fn import_tables(conn: &mut Connection, dir: &Path) -> Result<TransferStats, TransferError> {
    let mut stats = TransferStats::new();
    for table in TABLES {
        let path = dir.join(format!("{table}.csv"));
        if !path.exists() {
            log::debug!("no {} to import", path.display());
            continue;
        }
        let rows = import_table(conn, table, &path)?;
        log::info!("imported {rows} rows into {table} from {}", path.display());
        stats.insert(table.to_string(), rows);
    }
    Ok(stats)
}

fn import_table(conn: &mut Connection, table: &str, path: &Path) -> Result<usize, TransferError> {
    let sqlite_err = |source| TransferError::Sqlite {
        table: table.to_string(),
        source,
    };
    let csv_err = |source| TransferError::Csv {
        file: path.display().to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(csv_err)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() {
        return Ok(0);
    }

    let known = table_columns(conn, table).map_err(sqlite_err)?;
    if let Some(column) = headers.iter().find(|h| !known.contains(h)) {
        return Err(TransferError::UnknownColumn {
            table: table.to_string(),
            column: column.clone(),
        });
    }

    let sql = upsert_sql(table, &headers);
    let tx = conn.transaction().map_err(sqlite_err)?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(&sql).map_err(sqlite_err)?;
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            let values: Vec<Value> = (0..headers.len())
                .map(|i| match record.get(i).map(str::trim) {
                    None | Some("") => Value::Null,
                    Some(text) => Value::Text(text.to_string()),
                })
                .collect();
            stmt.execute(rusqlite::params_from_iter(values))
                .map_err(|source| TransferError::Row {
                    table: table.to_string(),
                    row: idx + 1,
                    source,
                })?;
            count += 1;
        }
    }
    tx.commit().map_err(sqlite_err)?;
    Ok(count)
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// Natural unique key of a table, matched alongside `id` on import.
fn natural_key(table: &str) -> Option<&'static str> {
    match table {
        "books" => Some("title"),
        "users" => Some("username"),
        "book_categories" => Some("category_name"),
        _ => None,
    }
}

fn upsert_sql(table: &str, headers: &[String]) -> String {
    let columns = headers
        .iter()
        .map(|h| format!("\"{h}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=headers.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let insert = format!("INSERT INTO {table} ({columns}) VALUES ({placeholders})");

    // Any unique key may match an existing row: `id` first, then the natural key.
    let has = |column: &str| headers.iter().any(|h| h == column);
    let mut keys = Vec::new();
    if has("id") {
        keys.push("id");
    }
    if let Some(key) = natural_key(table).filter(|key| has(key)) {
        keys.push(key);
    }
    if keys.is_empty() {
        return insert;
    }

    let clauses: Vec<String> = keys
        .iter()
        .map(|key| {
            let updates: Vec<String> = headers
                .iter()
                .filter(|h| h.as_str() != *key && h.as_str() != "id")
                .map(|h| format!("\"{h}\" = excluded.\"{h}\""))
                .collect();
            if updates.is_empty() {
                format!("ON CONFLICT(\"{key}\") DO NOTHING")
            } else {
                format!("ON CONFLICT(\"{key}\") DO UPDATE SET {}", updates.join(", "))
            }
        })
        .collect();
    format!("{insert} {}", clauses.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_skips_the_key_column() {
        let headers = vec!["id".to_string(), "title".to_string()];
        assert_eq!(
            upsert_sql("books", &headers),
            "INSERT INTO books (\"id\", \"title\") VALUES (?1, ?2) \
             ON CONFLICT(\"id\") DO UPDATE SET \"title\" = excluded.\"title\" \
             ON CONFLICT(\"title\") DO NOTHING"
        );
    }

    #[test]
    fn id_and_title_both_resolve_conflicts() {
        let headers = vec!["id".to_string(), "title".to_string(), "author".to_string()];
        assert_eq!(
            upsert_sql("books", &headers),
            "INSERT INTO books (\"id\", \"title\", \"author\") VALUES (?1, ?2, ?3) \
             ON CONFLICT(\"id\") DO UPDATE SET \"title\" = excluded.\"title\", \"author\" = excluded.\"author\" \
             ON CONFLICT(\"title\") DO UPDATE SET \"author\" = excluded.\"author\""
        );
    }

    #[test]
    fn natural_key_used_without_id() {
        let headers = vec!["username".to_string(), "full_name".to_string()];
        assert!(upsert_sql("users", &headers).contains("ON CONFLICT(\"username\")"));
        let headers = vec!["book_title".to_string(), "rating".to_string()];
        assert!(!upsert_sql("book_reviews", &headers).contains("ON CONFLICT"));
    }
}
