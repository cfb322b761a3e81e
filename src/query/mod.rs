//! Backend-neutral query model and its translators.
//!
//! * [`filter`] holds the condition model and the [`QuerySpec`] builder.
//! * [`builder`] renders a spec as a relational clause with positional parameters.
//! * [`document`] renders the same spec as a document-store filter and sort.

mod builder;
pub use builder::*;

mod document;
pub use document::*;

mod filter;
pub use filter::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("empty field name")]
    EmptyField,
    #[error("invalid field name `{field}`")]
    BadField { field: String },
    #[error("empty value list for `{field}`")]
    EmptyInList { field: String },
    #[error("negative limit {0}")]
    NegativeLimit(i64),
    #[error("negative offset {0}")]
    NegativeOffset(i64),
    #[error("unknown column `{column}` for `{table}`")]
    UnknownColumn { table: String, column: String },
}
