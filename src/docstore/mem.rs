//! In-memory document store.
//!
//! Evaluates the operator subset produced by the document translator: plain equality,
//! `$eq`, `$in`, `$gt`, `$gte`, `$lt`, `$lte` and `$regex` with `$options`. Dotted field
//! names address nested documents.

use async_trait::async_trait;
use bson::{Bson, Document};
use regex::RegexBuilder;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use super::{DocumentBackend, Error};
use crate::query::CompiledDocumentQuery;

#[derive(Default)]
pub struct MemDocumentStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    unavailable: AtomicBool,
}

impl MemDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    fn check_available(&self) -> Result<(), Error> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(Error::Connection("document store unavailable".into()));
        }
        Ok(())
    }

    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .map(|c| c.get(collection).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> Error {
    Error::Connection(e.to_string())
}

#[async_trait]
impl DocumentBackend for MemDocumentStore {
    async fn insert(&self, collection: &str, doc: Document) -> Result<(), Error> {
        self.check_available()?;
        self.collections
            .write()
            .map_err(poisoned)?
            .entry(collection.to_owned())
            .or_default()
            .push(doc);
        Ok(())
    }

    async fn find_one(&self, collection: &str, filter: &Document) -> Result<Document, Error> {
        self.check_available()?;
        let collections = self.collections.read().map_err(poisoned)?;
        for doc in collections.get(collection).into_iter().flatten() {
            if matches(doc, filter)? {
                return Ok(doc.clone());
            }
        }
        Err(Error::NoDocuments)
    }

    async fn find(
        &self,
        collection: &str,
        query: &CompiledDocumentQuery,
    ) -> Result<Vec<Document>, Error> {
        self.check_available()?;
        let mut found = Vec::new();
        {
            let collections = self.collections.read().map_err(poisoned)?;
            for doc in collections.get(collection).into_iter().flatten() {
                if matches(doc, &query.filter)? {
                    found.push(doc.clone());
                }
            }
        }

        sort_documents(&mut found, &query.sort);

        let skip = query.skip.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);

        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| match &query.projection {
                Some(projection) => project(&doc, projection),
                None => doc,
            })
            .collect())
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Document,
        changes: Document,
    ) -> Result<(), Error> {
        self.check_available()?;
        let mut collections = self.collections.write().map_err(poisoned)?;
        for doc in collections.get_mut(collection).into_iter().flatten() {
            if matches(doc, filter)? {
                for (field, value) in changes {
                    doc.insert(field, value);
                }
                return Ok(());
            }
        }
        Err(Error::NoDocuments)
    }

    async fn delete(&self, collection: &str, filter: &Document) -> Result<(), Error> {
        self.check_available()?;
        let mut collections = self.collections.write().map_err(poisoned)?;
        let docs = collections
            .get_mut(collection)
            .ok_or(Error::NoDocuments)?;

        let mut position = None;
        for (i, doc) in docs.iter().enumerate() {
            if matches(doc, filter)? {
                position = Some(i);
                break;
            }
        }

        let i = position.ok_or(Error::NoDocuments)?;
        docs.remove(i);
        Ok(())
    }
}

fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_document()?.get(part)?;
    }
    Some(current)
}

fn numeric(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn integer(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        _ => None,
    }
}

/// Integers compare exactly; floats are involved only when one side is a double.
fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (integer(a), integer(b)) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (numeric(a), numeric(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn equals(a: &Bson, b: &Bson) -> bool {
    compare(a, b) == Some(Ordering::Equal) || a == b
}

fn is_operator_document(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|k| k.starts_with('$'))
}

pub(crate) fn matches(doc: &Document, filter: &Document) -> Result<bool, Error> {
    for (field, expected) in filter {
        let actual = lookup(doc, field);
        let ok = match expected {
            Bson::Document(ops) if is_operator_document(ops) => eval_operators(actual, ops)?,
            other => actual.is_some_and(|a| equals(a, other)),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn eval_operators(actual: Option<&Bson>, ops: &Document) -> Result<bool, Error> {
    let options = ops.get_str("$options").unwrap_or_default();

    for (op, operand) in ops {
        let ordering = || actual.and_then(|a| compare(a, operand));
        let ok = match op.as_str() {
            "$eq" => actual.is_some_and(|a| equals(a, operand)),
            "$in" => {
                let Bson::Array(items) = operand else {
                    return Err(Error::UnsupportedOperator(format!("{op} on {operand}")));
                };
                actual.is_some_and(|a| items.iter().any(|i| equals(a, i)))
            }
            "$gt" => ordering() == Some(Ordering::Greater),
            "$gte" => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
            "$lt" => ordering() == Some(Ordering::Less),
            "$lte" => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
            "$regex" => {
                let pattern = operand
                    .as_str()
                    .ok_or_else(|| Error::UnsupportedOperator(format!("{op} on {operand}")))?;
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(options.contains('i'))
                    .multi_line(options.contains('m'))
                    .build()?;
                actual
                    .and_then(Bson::as_str)
                    .is_some_and(|s| re.is_match(s))
            }
            "$options" => true,
            other => return Err(Error::UnsupportedOperator(other.to_owned())),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Orders two documents by a `{field: 1 | -1}` sort document.
/// Missing fields sort first, as in MongoDB.
pub(crate) fn compare_documents(a: &Document, b: &Document, sort: &Document) -> Ordering {
    for (field, direction) in sort {
        let descending = numeric(direction).is_some_and(|d| d < 0.0);
        let ord = match (lookup(a, field), lookup(b, field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
        };
        let ord = if descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn sort_documents(docs: &mut [Document], sort: &Document) {
    if !sort.is_empty() {
        docs.sort_by(|a, b| compare_documents(a, b, sort));
    }
}

fn project(doc: &Document, projection: &Document) -> Document {
    let mut ret = Document::new();
    for field in projection.keys() {
        if let Some(value) = doc.get(field) {
            ret.insert(field.clone(), value.clone());
        }
    }
    ret
}
