//! Plain `tokio-postgres` client.
//!
//! Statements are prepared once at init and reused for every call. Bulk
//! inserts stream rows through `COPY ... FROM STDIN BINARY`. The client is a
//! single connection, so the pool sizes in [`BenchConfig`] do not apply.

use std::hint::black_box;

use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row, Statement};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::bencher::Bencher;
use crate::config::{BenchConfig, SEED_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::fixtures::{generate_books, new_book, paginated_seed_count};
use crate::model::Book;
use crate::pagination::OffsetCursor;

use super::{
    connect_timed_out, current_thread_runtime, not_initialized, single_id, sql, Strategy, Workload,
};

type PgResult<T> = std::result::Result<T, tokio_postgres::Error>;

/// Column types of [`sql::COPY_IN`], in column order.
const COPY_TYPES: [Type; 6] = [
    Type::TEXT,
    Type::TEXT,
    Type::TEXT,
    Type::TEXT,
    Type::INT4,
    Type::TIMESTAMPTZ,
];

struct Statements {
    insert: Statement,
    update: Statement,
    delete: Statement,
    select_by_id: Statement,
    select_page: Statement,
}

impl Statements {
    async fn prepare(client: &Client) -> PgResult<Self> {
        Ok(Self {
            insert: client.prepare(sql::INSERT).await?,
            update: client.prepare(sql::UPDATE).await?,
            delete: client.prepare(sql::DELETE).await?,
            select_by_id: client.prepare(sql::SELECT_BY_ID).await?,
            select_page: client.prepare(sql::SELECT_PAGE).await?,
        })
    }
}

struct Session {
    rt: Runtime,
    client: Client,
    connection: JoinHandle<PgResult<()>>,
    statements: Statements,
}

/// Strategy driving a single `tokio_postgres::Client`.
pub struct TokioPostgresStrategy {
    config: BenchConfig,
    workload: Workload,
    session: Option<Session>,
}

impl TokioPostgresStrategy {
    pub const NAME: &'static str = "tokio-postgres";

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

fn book_from_row(row: &Row) -> PgResult<Book> {
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

fn book_params(book: &Book) -> [&(dyn ToSql + Sync); 6] {
    [
        &book.isbn,
        &book.title,
        &book.author,
        &book.genre,
        &book.quantity,
        &book.publicized_at,
    ]
}

async fn copy_books(client: &Client, books: &[Book]) -> PgResult<u64> {
    let sink = client.copy_in(sql::COPY_IN).await?;
    let writer = BinaryCopyInWriter::new(sink, &COPY_TYPES);
    tokio::pin!(writer);
    for book in books {
        writer.as_mut().write(&book_params(book)).await?;
    }
    writer.as_mut().finish().await
}

impl Session {
    fn seed(&self, count: usize) -> Result<Vec<i64>> {
        let books = generate_books(count);
        let mut ids = Vec::with_capacity(count);
        for chunk in books.chunks(SEED_BATCH_SIZE) {
            let statement = sql::bulk_insert(chunk.len(), true);
            let params: Vec<&(dyn ToSql + Sync)> = chunk.iter().flat_map(book_params).collect();
            let rows = self
                .rt
                .block_on(self.client.query(statement.as_str(), &params))
                .map_err(Error::setup)?;
            for row in rows {
                ids.push(row.try_get::<_, i64>(0).map_err(Error::setup)?);
            }
        }
        Ok(ids)
    }
}

impl Strategy for TokioPostgresStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self) -> Result<()> {
        let rt = current_thread_runtime()?;
        let mut pg_config: Config = self.config.dsn.parse().map_err(Error::connection)?;
        pg_config.connect_timeout(self.config.connect_timeout);

        // connect_timeout only covers the TCP connect, not the handshake.
        let limit = self.config.connect_timeout;
        let (client, connection) = rt
            .block_on(async { tokio::time::timeout(limit, pg_config.connect(NoTls)).await })
            .map_err(|_| connect_timed_out(limit))?
            .map_err(Error::connection)?;
        let connection = rt.spawn(connection);
        let statements = rt
            .block_on(Statements::prepare(&client))
            .map_err(Error::connection)?;

        self.session = Some(Session {
            rt,
            client,
            connection,
            statements,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        let Session {
            rt,
            client,
            connection,
            statements,
        } = session;
        drop(statements);
        // The connection task finishes once the last client handle is gone.
        drop(client);
        rt.block_on(connection)
            .map_err(Error::connection)?
            .map_err(Error::connection)
    }

    fn insert(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session()?;
        let book = new_book();
        let params = book_params(&book);
        b.reset_timer();

        for _ in 0..b.iterations() {
            let result = s
                .rt
                .block_on(s.client.execute(&s.statements.insert, &params));
            b.check(result);
        }
        Ok(())
    }

    fn insert_bulk(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session()?;
        let books = generate_books(self.workload.bulk_size);
        b.reset_timer();

        for _ in 0..b.iterations() {
            let result = s.rt.block_on(copy_books(&s.client, &books));
            if let Some(copied) = b.check(result) {
                if copied != books.len() as u64 {
                    b.record_error(format!("copied {} of {} books", copied, books.len()));
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
            let result = s.rt.block_on(s.client.execute(
                &s.statements.update,
                &[
                    &book.isbn,
                    &book.title,
                    &book.author,
                    &book.genre,
                    &book.quantity,
                    &book.publicized_at,
                    &id,
                ],
            ));
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
            let result = s
                .rt
                .block_on(s.client.execute(&s.statements.delete, &[&id]));
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
            let result = s
                .rt
                .block_on(s.client.query_opt(&s.statements.select_by_id, &[&id]));
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
            let limit = cursor.limit();
            let offset = cursor.offset();
            let result = s
                .rt
                .block_on(s.client.query(&s.statements.select_page, &[&limit, &offset]));
            let Some(rows) = b.check(result) else {
                continue;
            };
            let page: PgResult<Vec<Book>> = rows.iter().map(book_from_row).collect();
            if let Some(page) = b.check(page) {
                cursor.advance(page.len());
                black_box(page);
            }
        }
        Ok(())
    }
}
