//! sqlx `QueryBuilder` strategy.
//!
//! Every statement is assembled at call time with bound parameters and rows
//! are mapped through `FromRow`, so builder and mapping costs are part of
//! the measurement. Pagination is keyset based.

use std::hint::black_box;
use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool, Postgres, QueryBuilder};
use tokio::runtime::Runtime;

use crate::bencher::Bencher;
use crate::config::{BenchConfig, SEED_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::fixtures::{generate_books, new_book, paginated_seed_count};
use crate::model::{Book, BOOK_COLUMNS};
use crate::pagination::KeysetCursor;

use super::{current_thread_runtime, not_initialized, single_id, Strategy, Workload};

type SqlxResult<T> = std::result::Result<T, sqlx::Error>;

const SELECT_BOOKS: &str = "SELECT id, isbn, title, author, genre, quantity, publicized_at FROM books";

fn insert_builder<'a>(books: &'a [Book]) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!("INSERT INTO books ({}) ", BOOK_COLUMNS));
    builder.push_values(books, |mut row, book| {
        row.push_bind(&book.isbn)
            .push_bind(&book.title)
            .push_bind(&book.author)
            .push_bind(&book.genre)
            .push_bind(book.quantity)
            .push_bind(book.publicized_at);
    });
    builder
}

async fn insert_books(pool: &PgPool, books: &[Book]) -> SqlxResult<u64> {
    let mut builder = insert_builder(books);
    let done = builder.build().execute(pool).await?;
    Ok(done.rows_affected())
}

async fn insert_books_returning(pool: &PgPool, books: &[Book]) -> SqlxResult<Vec<i64>> {
    let mut builder = insert_builder(books);
    builder.push(" RETURNING id");
    builder.build_query_scalar::<i64>().fetch_all(pool).await
}

async fn update_book(pool: &PgPool, id: i64, book: &Book) -> SqlxResult<u64> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE books SET ");
    let mut set = builder.separated(", ");
    set.push("isbn = ").push_bind_unseparated(&book.isbn);
    set.push("title = ").push_bind_unseparated(&book.title);
    set.push("author = ").push_bind_unseparated(&book.author);
    set.push("genre = ").push_bind_unseparated(&book.genre);
    set.push("quantity = ").push_bind_unseparated(book.quantity);
    set.push("publicized_at = ").push_bind_unseparated(book.publicized_at);
    builder.push(" WHERE id = ").push_bind(id);
    let done = builder.build().execute(pool).await?;
    Ok(done.rows_affected())
}

async fn delete_book(pool: &PgPool, id: i64) -> SqlxResult<u64> {
    let mut builder = QueryBuilder::<Postgres>::new("DELETE FROM books WHERE id = ");
    builder.push_bind(id);
    let done = builder.build().execute(pool).await?;
    Ok(done.rows_affected())
}

async fn find_book(pool: &PgPool, id: i64) -> SqlxResult<Option<Book>> {
    let mut builder = QueryBuilder::<Postgres>::new(SELECT_BOOKS);
    builder.push(" WHERE id = ").push_bind(id);
    builder.build_query_as::<Book>().fetch_optional(pool).await
}

/// `SELECT` for the next page after `cursor`, ordered by key.
pub fn page_builder(cursor: &KeysetCursor) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(SELECT_BOOKS);
    builder
        .push(" WHERE id > ")
        .push_bind(cursor.after())
        .push(" ORDER BY id LIMIT ")
        .push_bind(cursor.limit());
    builder
}

async fn find_page(pool: &PgPool, cursor: &KeysetCursor) -> SqlxResult<Vec<Book>> {
    let mut builder = page_builder(cursor);
    builder.build_query_as::<Book>().fetch_all(pool).await
}

struct Session {
    rt: Runtime,
    pool: PgPool,
}

impl Session {
    fn seed(&self, count: usize) -> Result<Vec<i64>> {
        let books = generate_books(count);
        let mut ids = Vec::with_capacity(count);
        for chunk in books.chunks(SEED_BATCH_SIZE) {
            let chunk_ids = self
                .rt
                .block_on(insert_books_returning(&self.pool, chunk))
                .map_err(Error::setup)?;
            ids.extend(chunk_ids);
        }
        Ok(ids)
    }
}

/// Strategy building statements with `sqlx::QueryBuilder`.
pub struct QueryBuilderStrategy {
    config: BenchConfig,
    workload: Workload,
    session: Option<Session>,
}

impl QueryBuilderStrategy {
    pub const NAME: &'static str = "sqlx-builder";

    pub fn new(config: BenchConfig, workload: Workload) -> Self {
        Self {
            config,
            workload,
            session: None,
        }
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or_else(|| not_initialized(Self::NAME))
    }
}

impl Strategy for QueryBuilderStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self) -> Result<()> {
        let rt = current_thread_runtime()?;
        let options = PgConnectOptions::from_str(&self.config.dsn)
            .map_err(Error::connection)?
            .disable_statement_logging();
        let pool = rt
            .block_on(
                PgPoolOptions::new()
                    .max_connections(self.config.max_open_conns)
                    .min_connections(self.config.max_idle_conns)
                    .acquire_timeout(self.config.connect_timeout)
                    .connect_with(options),
            )
            .map_err(Error::connection)?;
        self.session = Some(Session { rt, pool });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            session.rt.block_on(session.pool.close());
        }
        Ok(())
    }

    fn insert(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session()?;
        let book = [new_book()];
        b.reset_timer();

        for _ in 0..b.iterations() {
            let result = s.rt.block_on(insert_books(&s.pool, &book));
            b.check(result);
        }
        Ok(())
    }

    fn insert_bulk(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session()?;
        let books = generate_books(self.workload.bulk_size);
        b.reset_timer();

        for _ in 0..b.iterations() {
            let result = s.rt.block_on(insert_books(&s.pool, &books));
            if let Some(inserted) = b.check(result) {
                if inserted != books.len() as u64 {
                    b.record_error(format!("inserted {} of {} books", inserted, books.len()));
                }
            }
        }
        Ok(())
    }

    fn update(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session()?;
        let book = new_book();
        let id = single_id(s.seed(1)?)?;
        b.reset_timer();

        for _ in 0..b.iterations() {
            let result = s.rt.block_on(update_book(&s.pool, id, &book));
            if let Some(updated) = b.check(result) {
                if updated != 1 {
                    b.record_error(format!("book {} was not updated", id));
                }
            }
        }
        Ok(())
    }

    fn delete(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session()?;
        let ids = s.seed(b.iterations() as usize)?;
        b.reset_timer();

        for id in ids {
            let result = s.rt.block_on(delete_book(&s.pool, id));
            if let Some(deleted) = b.check(result) {
                if deleted != 1 {
                    b.record_error(format!("book {} not found", id));
                }
            }
        }
        Ok(())
    }

    fn find_one(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session()?;
        let ids = s.seed(b.iterations() as usize)?;
        b.reset_timer();

        for id in ids {
            let result = s.rt.block_on(find_book(&s.pool, id));
            match b.check(result) {
                Some(Some(book)) => {
                    black_box(book);
                }
                Some(None) => b.record_error(format!("book {} not found", id)),
                None => {}
            }
        }
        Ok(())
    }

    fn find_paginating(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session()?;
        let n = b.iterations() as usize;
        s.seed(paginated_seed_count(n, self.workload.page_size))?;
        let mut cursor = KeysetCursor::new(self.workload.page_size);
        b.reset_timer();

        for _ in 0..n {
            let result = s.rt.block_on(find_page(&s.pool, &cursor));
            if let Some(page) = b.check(result) {
                cursor.advance(page.iter().map(|book| book.id));
                black_box(page);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Execute;

    #[test]
    fn test_insert_builder_binds_every_column() {
        let books = generate_books(3);
        let mut builder = insert_builder(&books);
        let query = builder.build();
        assert_eq!(
            query.sql(),
            "INSERT INTO books (isbn, title, author, genre, quantity, publicized_at) \
             VALUES ($1, $2, $3, $4, $5, $6), ($7, $8, $9, $10, $11, $12), \
             ($13, $14, $15, $16, $17, $18)"
        );
    }

    #[test]
    fn test_page_query_is_keyset() {
        let mut builder = page_builder(&KeysetCursor::new(10));
        let query = builder.build();
        assert!(query.sql().ends_with("WHERE id > $1 ORDER BY id LIMIT $2"));
        assert!(!query.sql().contains("OFFSET"));
    }
}
