//! Diesel strategy.
//!
//! Queries are built with Diesel's typed DSL over a `table!` schema and run
//! through `diesel-async` on a single connection. Writes go through
//! `Insertable`/`AsChangeset` structs, reads through `Queryable`, and
//! pagination is keyset based like the other mapping layers.

use std::hint::black_box;

use chrono::{DateTime, Utc};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tokio::runtime::Runtime;

use crate::bencher::Bencher;
use crate::config::{BenchConfig, SEED_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::fixtures::{generate_books, new_book, paginated_seed_count};
use crate::model::Book;
use crate::pagination::KeysetCursor;

use super::{
    connect_timed_out, current_thread_runtime, not_initialized, single_id, Strategy, Workload,
};

/// The `books` table as a Diesel schema.
pub mod schema {
    diesel::table! {
        books (id) {
            id -> Int8,
            isbn -> Text,
            title -> Text,
            author -> Text,
            genre -> Text,
            quantity -> Int4,
            publicized_at -> Timestamptz,
        }
    }
}

use self::schema::books;

/// A `books` row, fields in column order.
#[derive(Debug, Queryable)]
#[diesel(check_for_backend(Pg))]
pub struct BookRecord {
    pub id: i64,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub quantity: i32,
    pub publicized_at: DateTime<Utc>,
}

impl From<BookRecord> for Book {
    fn from(record: BookRecord) -> Self {
        Self {
            id: record.id,
            isbn: record.isbn,
            title: record.title,
            author: record.author,
            genre: record.genre,
            quantity: record.quantity,
            publicized_at: record.publicized_at,
        }
    }
}

/// Column values of a book, without the key.
#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = books)]
struct NewBook<'a> {
    isbn: &'a str,
    title: &'a str,
    author: &'a str,
    genre: &'a str,
    quantity: i32,
    publicized_at: DateTime<Utc>,
}

impl<'a> From<&'a Book> for NewBook<'a> {
    fn from(book: &'a Book) -> Self {
        Self {
            isbn: &book.isbn,
            title: &book.title,
            author: &book.author,
            genre: &book.genre,
            quantity: book.quantity,
            publicized_at: book.publicized_at,
        }
    }
}

/// The next page after `cursor`, ordered by key.
pub fn page_query(cursor: &KeysetCursor) -> books::BoxedQuery<'static, Pg> {
    books::table
        .filter(books::id.gt(cursor.after()))
        .order(books::id.asc())
        .limit(cursor.limit())
        .into_boxed()
}

struct Session {
    rt: Runtime,
    conn: AsyncPgConnection,
}

impl Session {
    fn seed(&mut self, count: usize) -> Result<Vec<i64>> {
        let books = generate_books(count);
        let mut ids = Vec::with_capacity(count);
        for chunk in books.chunks(SEED_BATCH_SIZE) {
            let batch: Vec<NewBook<'_>> = chunk.iter().map(NewBook::from).collect();
            let chunk_ids = self
                .rt
                .block_on(
                    diesel::insert_into(books::table)
                        .values(&batch)
                        .returning(books::id)
                        .get_results::<i64>(&mut self.conn),
                )
                .map_err(Error::setup)?;
            ids.extend(chunk_ids);
        }
        Ok(ids)
    }
}

/// Strategy going through the Diesel query DSL.
pub struct DieselStrategy {
    config: BenchConfig,
    workload: Workload,
    session: Option<Session>,
}

impl DieselStrategy {
    pub const NAME: &'static str = "diesel";

    pub fn new(config: BenchConfig, workload: Workload) -> Self {
        Self {
            config,
            workload,
            session: None,
        }
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or_else(|| not_initialized(Self::NAME))
    }
}

impl Strategy for DieselStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self) -> Result<()> {
        let rt = current_thread_runtime()?;
        let limit = self.config.connect_timeout;
        let dsn = self.config.dsn.as_str();
        let conn = rt
            .block_on(async {
                tokio::time::timeout(limit, AsyncPgConnection::establish(dsn)).await
            })
            .map_err(|_| connect_timed_out(limit))?
            .map_err(Error::connection)?;
        self.session = Some(Session { rt, conn });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the connection ends its background task.
        drop(self.session.take());
        Ok(())
    }

    fn insert(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session_mut()?;
        let book = new_book();
        let new = NewBook::from(&book);
        b.reset_timer();

        for _ in 0..b.iterations() {
            let result = s.rt.block_on(
                diesel::insert_into(books::table)
                    .values(&new)
                    .execute(&mut s.conn),
            );
            b.check(result);
        }
        Ok(())
    }

    fn insert_bulk(&mut self, b: &mut Bencher) -> Result<()> {
        let bulk_size = self.workload.bulk_size;
        let s = self.session_mut()?;
        let books = generate_books(bulk_size);
        let batch: Vec<NewBook<'_>> = books.iter().map(NewBook::from).collect();
        b.reset_timer();

        for _ in 0..b.iterations() {
            let result = s.rt.block_on(
                diesel::insert_into(books::table)
                    .values(&batch)
                    .execute(&mut s.conn),
            );
            if let Some(inserted) = b.check(result) {
                if inserted != batch.len() {
                    b.record_error(format!("inserted {} of {} books", inserted, batch.len()));
                }
            }
        }
        Ok(())
    }

    fn update(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session_mut()?;
        let book = new_book();
        let changes = NewBook::from(&book);
        let id = single_id(s.seed(1)?)?;
        b.reset_timer();

        for _ in 0..b.iterations() {
            let result = s.rt.block_on(
                diesel::update(books::table.find(id))
                    .set(&changes)
                    .execute(&mut s.conn),
            );
            if let Some(updated) = b.check(result) {
                if updated != 1 {
                    b.record_error(format!("book {} was not updated", id));
                }
            }
        }
        Ok(())
    }

    fn delete(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session_mut()?;
        let ids = s.seed(b.iterations() as usize)?;
        b.reset_timer();

        for id in ids {
            let result = s
                .rt
                .block_on(diesel::delete(books::table.find(id)).execute(&mut s.conn));
            if let Some(deleted) = b.check(result) {
                if deleted != 1 {
                    b.record_error(format!("book {} not found", id));
                }
            }
        }
        Ok(())
    }

    fn find_one(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session_mut()?;
        let ids = s.seed(b.iterations() as usize)?;
        b.reset_timer();

        for id in ids {
            let result = s
                .rt
                .block_on(books::table.find(id).first::<BookRecord>(&mut s.conn))
                .optional();
            match b.check(result) {
                Some(Some(record)) => {
                    black_box(Book::from(record));
                }
                Some(None) => b.record_error(format!("book {} not found", id)),
                None => {}
            }
        }
        Ok(())
    }

    fn find_paginating(&mut self, b: &mut Bencher) -> Result<()> {
        let page_size = self.workload.page_size;
        let s = self.session_mut()?;
        let n = b.iterations() as usize;
        s.seed(paginated_seed_count(n, page_size))?;
        let mut cursor = KeysetCursor::new(page_size);
        b.reset_timer();

        for _ in 0..n {
            let result = s
                .rt
                .block_on(page_query(&cursor).load::<BookRecord>(&mut s.conn));
            if let Some(records) = b.check(result) {
                cursor.advance(records.iter().map(|record| record.id));
                black_box(records);
            }
        }
        Ok(())
    }
}
