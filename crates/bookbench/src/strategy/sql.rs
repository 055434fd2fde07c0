//! Hand-written statements shared by the raw strategies.

use std::fmt::Write;

use crate::model::BOOK_COLUMNS;

pub const INSERT: &str = "INSERT INTO books (isbn, title, author, genre, quantity, publicized_at) \
     VALUES ($1, $2, $3, $4, $5, $6)";

pub const UPDATE: &str = "UPDATE books SET isbn = $1, title = $2, author = $3, genre = $4, \
     quantity = $5, publicized_at = $6 WHERE id = $7";

pub const DELETE: &str = "DELETE FROM books WHERE id = $1";

pub const SELECT_BY_ID: &str = "SELECT id, isbn, title, author, genre, quantity, publicized_at \
     FROM books WHERE id = $1";

pub const SELECT_PAGE: &str = "SELECT id, isbn, title, author, genre, quantity, publicized_at \
     FROM books ORDER BY id LIMIT $1 OFFSET $2";

pub const COPY_IN: &str =
    "COPY books (isbn, title, author, genre, quantity, publicized_at) FROM STDIN BINARY";

/// Bind parameters per book row.
pub const PARAMS_PER_BOOK: usize = 6;

/// Multi-row insert with numbered placeholders for `rows` books.
pub fn bulk_insert(rows: usize, returning_id: bool) -> String {
    let mut sql = String::with_capacity(64 + rows * 32);
    let _ = write!(sql, "INSERT INTO books ({}) VALUES ", BOOK_COLUMNS);
    for row in 0..rows {
        if row > 0 {
            sql.push(',');
        }
        sql.push('(');
        for col in 0..PARAMS_PER_BOOK {
            if col > 0 {
                sql.push(',');
            }
            let _ = write!(sql, "${}", row * PARAMS_PER_BOOK + col + 1);
        }
        sql.push(')');
    }
    if returning_id {
        sql.push_str(" RETURNING id");
    }
    sql
}
