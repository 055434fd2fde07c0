//! SeaORM strategy.
//!
//! Rows go through the entity layer: active models for writes, typed
//! `find` queries for reads, keyset pagination on the primary key.

use std::hint::black_box;

use sea_orm::ActiveValue::{NotSet, Set, Unchanged};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Select,
};
use tokio::runtime::Runtime;

use crate::bencher::Bencher;
use crate::config::{BenchConfig, SEED_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::fixtures::{generate_books, new_book, paginated_seed_count};
use crate::model::Book;
use crate::pagination::KeysetCursor;

use super::{current_thread_runtime, not_initialized, single_id, Strategy, Workload};

/// The `books` table as a SeaORM entity.
pub mod book {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
    #[sea_orm(table_name = "books")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        #[sea_orm(column_type = "Text")]
        pub isbn: String,
        #[sea_orm(column_type = "Text")]
        pub title: String,
        #[sea_orm(column_type = "Text")]
        pub author: String,
        #[sea_orm(column_type = "Text")]
        pub genre: String,
        pub quantity: i32,
        pub publicized_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

impl From<book::Model> for Book {
    fn from(model: book::Model) -> Self {
        Self {
            id: model.id,
            isbn: model.isbn,
            title: model.title,
            author: model.author,
            genre: model.genre,
            quantity: model.quantity,
            publicized_at: model.publicized_at,
        }
    }
}

/// Active model for `book`. Unsaved books leave the key to the database.
fn active_model(book: &Book) -> book::ActiveModel {
    book::ActiveModel {
        id: if book.is_persisted() {
            Unchanged(book.id)
        } else {
            NotSet
        },
        isbn: Set(book.isbn.clone()),
        title: Set(book.title.clone()),
        author: Set(book.author.clone()),
        genre: Set(book.genre.clone()),
        quantity: Set(book.quantity),
        publicized_at: Set(book.publicized_at),
    }
}

/// The next page after `cursor`, ordered by key.
pub fn page_query(cursor: &KeysetCursor) -> Select<book::Entity> {
    book::Entity::find()
        .filter(book::Column::Id.gt(cursor.after()))
        .order_by_asc(book::Column::Id)
        .limit(cursor.limit() as u64)
}

struct Session {
    rt: Runtime,
    db: DatabaseConnection,
}

impl Session {
    fn seed(&self, count: usize) -> Result<Vec<i64>> {
        let books = generate_books(count);
        let mut ids = Vec::with_capacity(count);
        for chunk in books.chunks(SEED_BATCH_SIZE) {
            let saved = self
                .rt
                .block_on(
                    book::Entity::insert_many(chunk.iter().map(active_model))
                        .exec_with_returning_many(&self.db),
                )
                .map_err(Error::setup)?;
            ids.extend(saved.into_iter().map(|model| model.id));
        }
        Ok(ids)
    }
}

/// Strategy going through SeaORM entities.
pub struct SeaOrmStrategy {
    config: BenchConfig,
    workload: Workload,
    session: Option<Session>,
}

impl SeaOrmStrategy {
    pub const NAME: &'static str = "sea-orm";

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

impl Strategy for SeaOrmStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init(&mut self) -> Result<()> {
        let rt = current_thread_runtime()?;
        let mut options = ConnectOptions::new(self.config.dsn.clone());
        options
            .max_connections(self.config.max_open_conns)
            .min_connections(self.config.max_idle_conns)
            .connect_timeout(self.config.connect_timeout)
            .acquire_timeout(self.config.connect_timeout)
            .sqlx_logging(false);
        let db = rt
            .block_on(Database::connect(options))
            .map_err(Error::connection)?;
        self.session = Some(Session { rt, db });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => session
                .rt
                .block_on(session.db.close())
                .map_err(Error::connection),
            None => Ok(()),
        }
    }

    fn insert(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session()?;
        let mut book = new_book();
        b.reset_timer();

        for _ in 0..b.iterations() {
            // A saved book would turn the next save into an update.
            b.paused(|| book.reset_id());
            let result = s.rt.block_on(active_model(&book).insert(&s.db));
            if let Some(saved) = b.check(result) {
                book.id = saved.id;
            }
        }
        Ok(())
    }

    fn insert_bulk(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session()?;
        let books = generate_books(self.workload.bulk_size);
        b.reset_timer();

        for _ in 0..b.iterations() {
            let result = s.rt.block_on(
                book::Entity::insert_many(books.iter().map(active_model))
                    .exec_without_returning(&s.db),
            );
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
        let mut book = new_book();
        book.id = single_id(s.seed(1)?)?;
        b.reset_timer();

        for _ in 0..b.iterations() {
            let result = s.rt.block_on(active_model(&book).update(&s.db));
            b.check(result);
        }
        Ok(())
    }

    fn delete(&mut self, b: &mut Bencher) -> Result<()> {
        let s = self.session()?;
        let ids = s.seed(b.iterations() as usize)?;
        b.reset_timer();

        for id in ids {
            let result = s.rt.block_on(book::Entity::delete_by_id(id).exec(&s.db));
            if let Some(deleted) = b.check(result) {
                if deleted.rows_affected != 1 {
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
            let result = s.rt.block_on(book::Entity::find_by_id(id).one(&s.db));
            match b.check(result) {
                Some(Some(model)) => {
                    black_box(Book::from(model));
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
            let result = s.rt.block_on(page_query(&cursor).all(&s.db));
            if let Some(models) = b.check(result) {
                cursor.advance(models.iter().map(|model| model.id));
                black_box(models);
            }
        }
        Ok(())
    }
}
