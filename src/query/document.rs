//! Document-store translation of a [`QuerySpec`].
//!
//! The same condition set used for relational clauses is rendered as a MongoDB style
//! filter document, plus sort, projection and pagination settings.
use bson::{Bson, Document, doc};

use super::{Error, Op, QuerySpec};

/// Options passed to regex matches produced from `Like` conditions.
pub const LIKE_REGEX_OPTIONS: &str = "i";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledDocumentQuery {
    pub filter: Document,
    pub sort: Document,
    pub projection: Option<Document>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

/// Translates a query spec into a document filter and its find options.
pub fn to_document_query(spec: &QuerySpec) -> Result<CompiledDocumentQuery, Error> {
    spec.validate()?;

    let projection = if spec.projection.is_empty() {
        None
    } else {
        let mut projection = Document::new();
        for field in &spec.projection {
            projection.insert(field.as_str(), 1_i32);
        }
        Some(projection)
    };

    Ok(CompiledDocumentQuery {
        filter: filter_document(spec),
        sort: sort_document(spec),
        projection,
        limit: (spec.limit > 0).then_some(spec.limit),
        // offset was validated as non-negative
        skip: (spec.offset > 0).then_some(spec.offset as u64),
    })
}

/// Renders only the condition set of `spec` as a filter document.
pub fn filter_document(spec: &QuerySpec) -> Document {
    let mut filter = Document::new();

    for condition in &spec.conditions {
        let value: Bson = match condition.op() {
            Op::Eq(v) => v.clone().into(),
            Op::In(items) => {
                let items: Vec<Bson> = items.iter().cloned().map(Bson::from).collect();
                Bson::Document(doc! { "$in": items })
            }
            Op::Between(range) => Bson::Document(doc! {
                "$gte": Bson::from(range.min.clone()),
                "$lte": Bson::from(range.max.clone()),
            }),
            Op::Like(pattern) => Bson::Document(doc! {
                "$regex": pattern.as_str(),
                "$options": LIKE_REGEX_OPTIONS,
            }),
        };
        filter.insert(condition.field(), value);
    }

    filter
}

/// Renders sort keys as `{field: 1 | -1}`, keeping append order; repeated fields overwrite.
pub fn sort_document(spec: &QuerySpec) -> Document {
    let mut sort = Document::new();
    for key in &spec.sort {
        let direction: i32 = if key.is_descending() { -1 } else { 1 };
        sort.insert(key.field.as_str(), direction);
    }
    sort
}
