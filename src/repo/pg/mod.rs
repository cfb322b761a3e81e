//! PostgreSQL backend built on `sqlx`.
use async_trait::async_trait;
use log::trace;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row as _};

use super::{Column, Error, RelationalBackend, RelationalTx, Row};
use crate::query::{self, QuerySpec, Value, ValueKind};

pub mod statements;

#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(dsn)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn bind_values(
    mut q: Query<'_, Postgres, PgArguments>,
    values: Vec<Value>,
) -> Query<'_, Postgres, PgArguments> {
    for v in values {
        q = match v {
            Value::Integer(v) => q.bind(v),
            Value::Float(v) => q.bind(v),
            Value::Text(v) => q.bind(v),
            Value::Boolean(v) => q.bind(v),
        };
    }
    q
}

fn decode_row(row: &PgRow, columns: &[Column]) -> Result<Row, Error> {
    let mut ret = Row::new();
    for c in columns {
        let value = match c.kind {
            ValueKind::Integer => Value::Integer(row.try_get::<i64, _>(c.name)?),
            ValueKind::Float => Value::Float(row.try_get::<f64, _>(c.name)?),
            ValueKind::Text => Value::Text(row.try_get::<String, _>(c.name)?),
            ValueKind::Boolean => Value::Boolean(row.try_get::<bool, _>(c.name)?),
        };
        ret.set(c.name, value);
    }
    Ok(ret)
}

#[async_trait]
impl RelationalBackend for PgBackend {
    async fn begin(&self) -> Result<Box<dyn RelationalTx>, Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn find_by_key(
        &self,
        table: &str,
        key: &str,
        id: i64,
        columns: &[Column],
    ) -> Result<Row, Error> {
        let sql = statements::select_by_key(table, key, columns);
        trace!("{sql}");

        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound)?;

        decode_row(&row, columns)
    }

    async fn select(
        &self,
        table: &str,
        columns: &[Column],
        spec: &QuerySpec,
    ) -> Result<Vec<Row>, Error> {
        let clause = query::to_sql(spec)?;
        let sql = statements::select(table, columns, &clause);
        trace!("{sql}");

        let rows = bind_values(sqlx::query(&sql), clause.values)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|r| decode_row(r, columns)).collect()
    }
}

struct PgTx {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl PgTx {
    async fn execute(&mut self, sql: String, values: Vec<Value>) -> Result<u64, Error> {
        trace!("{sql}");
        let res = bind_values(sqlx::query(&sql), values)
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;
        Ok(res.rows_affected())
    }
}

fn classify(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db)
            if db.is_unique_violation()
                || db.is_foreign_key_violation()
                || db.is_check_violation() =>
        {
            Error::Constraint(db.message().to_owned())
        }
        _ => Error::Sqlx(err),
    }
}

#[async_trait]
impl RelationalTx for PgTx {
    async fn insert(&mut self, table: &str, _key: &str, row: &Row) -> Result<(), Error> {
        let (sql, values) = statements::insert(table, row);
        self.execute(sql, values).await?;
        Ok(())
    }

    async fn update(&mut self, table: &str, key: &str, id: i64, row: &Row) -> Result<(), Error> {
        let Some((sql, values)) = statements::update(table, key, id, row) else {
            // nothing to set, only check that the row is there
            let sql = statements::exists(table, key);
            trace!("{sql}");
            let found = sqlx::query(&sql)
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
            return found.map(|_| ()).ok_or(Error::NotFound);
        };
        match self.execute(sql, values).await? {
            0 => Err(Error::NotFound),
            _ => Ok(()),
        }
    }

    async fn delete(&mut self, table: &str, key: &str, id: i64) -> Result<(), Error> {
        let (sql, values) = statements::delete(table, key, id);
        match self.execute(sql, values).await? {
            0 => Err(Error::NotFound),
            _ => Ok(()),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), Error> {
        self.tx.rollback().await?;
        Ok(())
    }
}
