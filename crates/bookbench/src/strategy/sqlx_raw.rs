//! Raw SQL through an sqlx pool.
//!
//! Statements are hand-written and rows are decoded column by column, the
//! way plain driver code looks without any mapping layer.

use std::hint::black_box;
use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{ConnectOptions, PgPool, Row};
use tokio::runtime::Runtime;

use crate::bencher::Bencher;
use crate::config::{BenchConfig, SEED_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::fixtures::{generate_books, new_book, paginated_seed_count};
use crate::model::Book;
use crate::pagination::OffsetCursor;

use super::{current_thread_runtime, not_initialized, single_id, sql, Strategy, Workload};

struct Session {
    rt: Runtime,
    pool: PgPool,
}

/// Raw SQL strategy backed by `sqlx::PgPool`.
pub struct SqlxStrategy {
    config: BenchConfig,
    workload: Workload,
    session: Option<Session>,
}

impl SqlxStrategy {
    pub const NAME: &'static str = "sqlx";

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

fn book_from_row(row: &PgRow) -> std::result::Result<Book, sqlx::Error> {
    Ok(Book {
        id: row.try_get("id")?,
        isbn: row.try_get("isbn")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        genre: row.try_get("genre")?,
        quantity: row.try_get("quantity")?,
        publicized_at: row.try_get("publicized_at")?,
    })
}

async fn insert_many(
    pool: &PgPool,
    books: &[Book],
    returning_id: bool,
) -> std::result::Result<Vec<i64>, sqlx::Error> {
    let statement = sql::bulk_insert(books.len(), returning_id);
    let mut query = sqlx::query(&statement);
    for book in books {
        query = query
            .bind(&book.isbn)
            .bind(&book.title)
            .bind(&book.author)
            .bind(&book.genre)
            .bind(book.quantity)
            .bind(book.publicized_at);
    }
    if returning_id {
        let rows = query.fetch_all(pool).await?;
        rows.iter().map(|row| row.try_get::<i64, _>(0)).collect()
    } else {
        query.execute(pool).await?;
        Ok(Vec::new())
    }
}

impl Session {
    /// Persist `count` books outside the measured region and return their keys.
    fn seed(&self, count: usize) -> Result<Vec<i64>> {
        let books = generate_books(count);
        let mut ids = Vec::with_capacity(count);
        for chunk in books.chunks(SEED_BATCH_SIZE) {
            let chunk_ids = self
                .rt
                .block_on(insert_many(&self.pool, chunk, true))
                .map_err(Error::setup)?;
            ids.extend(chunk_ids);
        }
        Ok(ids)
    }
}

impl Strategy for SqlxStrategy {
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
        let book = new_book();
        b.reset_timer();

        for _ in 0..b.iterations() {
            let result = s.rt.block_on(
                sqlx::query(sql::INSERT)
                    .bind(&book.isbn)
                    .bind(&book.title)
                    .bind(&book.author)
                    .bind(&book.genre)
                    .bind(book.quantity)
                    .bind(book.publicized_at)
                    .execute(&s.pool),
            );
            b.check(result);
        }
        Ok(())
    }

    fn insert_bulk(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session()?;
        let books = generate_books(self.workload.bulk_size);
        b.reset_timer();

        for _ in 0..b.iterations() {
            let result = s.rt.block_on(insert_many(&s.pool, &books, false));
            b.check(result);
        }
        Ok(())
    }

    fn update(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session()?;
        let book = new_book();
        let id = single_id(s.seed(1)?)?;
        b.reset_timer();

        for _ in 0..b.iterations() {
            let result = s.rt.block_on(
                sqlx::query(sql::UPDATE)
                    .bind(&book.isbn)
                    .bind(&book.title)
                    .bind(&book.author)
                    .bind(&book.genre)
                    .bind(book.quantity)
                    .bind(book.publicized_at)
                    .bind(id)
                    .execute(&s.pool),
            );
            if let Some(done) = b.check(result) {
                if done.rows_affected() != 1 {
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
            let result = s
                .rt
                .block_on(sqlx::query(sql::DELETE).bind(id).execute(&s.pool));
            if let Some(done) = b.check(result) {
                if done.rows_affected() != 1 {
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
            let result = s.rt.block_on(
                sqlx::query(sql::SELECT_BY_ID)
                    .bind(id)
                    .fetch_optional(&s.pool),
            );
            match b.check(result) {
                Some(Some(row)) => {
                    if let Some(book) = b.check(book_from_row(&row)) {
                        black_box(book);
                    }
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
        let mut cursor = OffsetCursor::new(self.workload.page_size);
        b.reset_timer();

        for _ in 0..n {
            let result = s.rt.block_on(
                sqlx::query(sql::SELECT_PAGE)
                    .bind(cursor.limit())
                    .bind(cursor.offset())
                    .fetch_all(&s.pool),
            );
            let Some(rows) = b.check(result) else {
                continue;
            };
            let page: std::result::Result<Vec<Book>, _> = rows.iter().map(book_from_row).collect();
            if let Some(page) = b.check(page) {
                cursor.advance(page.len());
                black_box(page);
            }
        }
        Ok(())
    }
}
