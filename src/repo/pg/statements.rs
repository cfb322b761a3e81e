//! SQL statement text for the PostgreSQL backend.
//!
//! Table and column names come from [`Record`](crate::repo::Record) definitions and
//! validated query specs; values are always bound through `$N` placeholders.
use crate::query::{CompiledClause, Value};
use crate::repo::{Column, Row};

fn column_list<S: AsRef<str>>(columns: &[S]) -> String {
    if columns.is_empty() {
        return "*".to_owned();
    }
    columns
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn select(table: &str, columns: &[Column], clause: &CompiledClause) -> String {
    let names: Vec<&str> = columns.iter().map(|c| c.name).collect();
    select_fields(table, &names, clause)
}

/// Like [`select`], for field names that are not bound to a [`Column`] definition.
/// An empty field list selects every column.
pub fn select_fields<S: AsRef<str>>(table: &str, fields: &[S], clause: &CompiledClause) -> String {
    let mut sql = format!("SELECT {} FROM {table}", column_list(fields));
    if !clause.is_empty() {
        sql.push(' ');
        sql.push_str(&clause.clause);
    }
    sql
}

pub fn select_by_key(table: &str, key: &str, columns: &[Column]) -> String {
    let names: Vec<&str> = columns.iter().map(|c| c.name).collect();
    format!("SELECT {} FROM {table} WHERE {key} = $1", column_list(&names))
}

pub fn exists(table: &str, key: &str) -> String {
    format!("SELECT 1 FROM {table} WHERE {key} = $1")
}

pub fn insert(table: &str, row: &Row) -> (String, Vec<Value>) {
    let mut columns = Vec::with_capacity(row.len());
    let mut placeholders = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (i, (column, value)) in row.iter().enumerate() {
        columns.push(column);
        placeholders.push(format!("${}", i + 1));
        values.push(value.clone());
    }

    (
        format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        ),
        values,
    )
}

/// The key column is never part of the `SET` list.
///
/// Returns `None` when `row` holds nothing but the key, since there is nothing to set.
pub fn update(table: &str, key: &str, id: i64, row: &Row) -> Option<(String, Vec<Value>)> {
    let mut assignments = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len() + 1);

    for (column, value) in row.iter().filter(|(c, _)| *c != key) {
        values.push(value.clone());
        assignments.push(format!("{column} = ${}", values.len()));
    }
    if assignments.is_empty() {
        return None;
    }
    values.push(Value::Integer(id));

    Some((
        format!(
            "UPDATE {table} SET {} WHERE {key} = ${}",
            assignments.join(", "),
            values.len()
        ),
        values,
    ))
}

pub fn delete(table: &str, key: &str, id: i64) -> (String, Vec<Value>) {
    (
        format!("DELETE FROM {table} WHERE {key} = $1"),
        vec![Value::Integer(id)],
    )
}
