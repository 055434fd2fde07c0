//! The benchmarked entity.

use chrono::{DateTime, Utc};

/// Column list shared by every hand-written statement, in bind order.
pub const BOOK_COLUMNS: &str = "isbn, title, author, genre, quantity, publicized_at";

/// A book from a bookstore catalogue.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Book {
    /// Primary key. Zero until the row has been persisted.
    pub id: i64,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub quantity: i32,
    pub publicized_at: DateTime<Utc>,
}

impl Book {
    /// Whether the book has been assigned a database identity.
    pub fn is_persisted(&self) -> bool {
        self.id != 0
    }

    /// Forget the database identity so the next save inserts a new row.
    pub fn reset_id(&mut self) {
        self.id = 0;
    }
}
