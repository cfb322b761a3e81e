//! # Relational Repository
//!
//! Boundary between the facades and the relational store.
//!
//! Records cross this boundary as [`Row`]s: an ordered list of `(column, value)` pairs.
//! Each record type provides explicit conversion hooks through the [`Record`] trait,
//! so backends never need to know the concrete type they are storing.
//!
//! Two backends are provided: [`PgBackend`] talks to PostgreSQL through `sqlx`, while
//! [`MemRelational`] keeps tables in memory and is used to exercise the facades.

use async_trait::async_trait;
use std::sync::Arc;

use crate::query::{self, QuerySpec, Value, ValueKind};

pub mod facades;
pub use facades::*;

mod mem;
pub use mem::*;

mod pg;
pub use pg::*;

mod tx;
pub use tx::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sql error :: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("no matching record")]
    NotFound,
    #[error("constraint violation :: {0}")]
    Constraint(String),
    #[error("connection error :: {0}")]
    Connection(String),
    #[error("query error :: {0}")]
    Query(#[from] query::Error),
    #[error("unsupported query :: {0}")]
    Unsupported(String),
    #[error("transaction already {0}")]
    TransactionClosed(TxState),
    #[error("missing column `{0}`")]
    MissingColumn(String),
    #[error("column `{column}` holds {found:?}, expected {expected:?}")]
    ColumnType {
        column: String,
        expected: ValueKind,
        found: ValueKind,
    },
}

impl Error {
    /// Returns `true` if the backend signaled that no record matched.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound | Self::Sqlx(sqlx::Error::RowNotFound))
    }
}

/// Describes a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ValueKind,
}

impl Column {
    pub const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self { name, kind }
    }
}

/// An ordered set of `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(&'static str, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets `column`, replacing any previous value.
    pub fn set(&mut self, column: &'static str, value: impl Into<Value>) {
        let value = value.into();
        match self.cells.iter_mut().find(|(c, _)| *c == column) {
            Some(cell) => cell.1 = value,
            None => self.cells.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.iter().find(|(c, _)| *c == column).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.cells.iter().map(|(c, v)| (*c, v))
    }

    /// Keeps only the given columns, in the given order.
    pub fn project(&self, columns: &[Column]) -> Row {
        Row {
            cells: columns
                .iter()
                .filter_map(|c| self.get(c.name).map(|v| (c.name, v.clone())))
                .collect(),
        }
    }

    fn require(&self, column: &str) -> Result<&Value, Error> {
        self.get(column)
            .ok_or_else(|| Error::MissingColumn(column.to_owned()))
    }

    fn mismatch(column: &str, expected: ValueKind, found: &Value) -> Error {
        Error::ColumnType {
            column: column.to_owned(),
            expected,
            found: found.kind(),
        }
    }

    pub fn integer(&self, column: &str) -> Result<i64, Error> {
        match self.require(column)? {
            Value::Integer(v) => Ok(*v),
            other => Err(Self::mismatch(column, ValueKind::Integer, other)),
        }
    }

    pub fn float(&self, column: &str) -> Result<f64, Error> {
        match self.require(column)? {
            Value::Float(v) => Ok(*v),
            Value::Integer(v) => Ok(*v as f64),
            other => Err(Self::mismatch(column, ValueKind::Float, other)),
        }
    }

    pub fn text(&self, column: &str) -> Result<String, Error> {
        match self.require(column)? {
            Value::Text(v) => Ok(v.clone()),
            other => Err(Self::mismatch(column, ValueKind::Text, other)),
        }
    }

    pub fn boolean(&self, column: &str) -> Result<bool, Error> {
        match self.require(column)? {
            Value::Boolean(v) => Ok(*v),
            other => Err(Self::mismatch(column, ValueKind::Boolean, other)),
        }
    }
}

/// A type persisted as a row of a relational table.
pub trait Record: Sized + Send + Sync {
    const TABLE: &'static str;
    /// Primary key column, always an integer.
    const KEY: &'static str = "id";
    const COLUMNS: &'static [Column];

    fn id(&self) -> i64;

    fn to_row(&self) -> Row;

    fn from_row(row: &Row) -> Result<Self, Error>;
}

/// A single mutation applied inside a [`Transaction`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Insert(Row),
    Update { id: i64, row: Row },
    Delete { id: i64 },
}

#[async_trait]
pub trait RelationalBackend: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn RelationalTx>, Error>;

    /// Direct lookup by primary key, outside any transaction.
    async fn find_by_key(
        &self,
        table: &str,
        key: &str,
        id: i64,
        columns: &[Column],
    ) -> Result<Row, Error>;

    /// Rows of `table` matching `spec`, projected on `columns`.
    async fn select(
        &self,
        table: &str,
        columns: &[Column],
        spec: &QuerySpec,
    ) -> Result<Vec<Row>, Error>;
}

/// A live transaction on a relational backend.
///
/// `commit` and `rollback` consume the handle, so a finished transaction can't be reused.
#[async_trait]
pub trait RelationalTx: Send {
    /// `key` names the primary key column, whose value is carried by `row`.
    async fn insert(&mut self, table: &str, key: &str, row: &Row) -> Result<(), Error>;

    /// Fails with [`Error::NotFound`] if no row has the given key.
    async fn update(&mut self, table: &str, key: &str, id: i64, row: &Row) -> Result<(), Error>;

    /// Fails with [`Error::NotFound`] if no row has the given key.
    async fn delete(&mut self, table: &str, key: &str, id: i64) -> Result<(), Error>;

    async fn commit(self: Box<Self>) -> Result<(), Error>;

    async fn rollback(self: Box<Self>) -> Result<(), Error>;
}

pub type Repository = Arc<dyn RelationalBackend>;
