//! # Query Primitives
//!
//! This module provides the backend-neutral building blocks used to describe a read:
//! which records to match, in which order and how many of them.
//!
//! The model is built hierarchically using four core concepts:
//!
//! -   _Value_: the unit of data.
//!     A wrapper ([`Value`]) that allows heterogeneous types (Integers, Floats, Strings, Booleans)
//!     to be treated uniformly within dynamic containers.
//!
//! -   _Operation_ ([`Op`]): the logical predicate.
//!     An [`Op`] defines *how* to compare data: equality (`Eq`), set membership (`In`),
//!     pattern matching (`Like`) or an inclusive range (`Between`).
//!
//! -   _Condition_ ([`Condition`]): the single constraint.
//!     A condition binds a field name to an [`Op`] (e.g., *"status = active"*).
//!
//! -   _Query spec_ ([`QuerySpec`]): the complete read description.
//!     Holds an ordered [`ConditionSet`], the sort keys, the projection and the pagination bounds.
//!
//! Building a [`QuerySpec`] never fails. Malformed specs are rejected by [`QuerySpec::validate`],
//! which both translators call before producing any output.

use super::Error;

/// Floating point value type alias
pub type Float = f64;
/// Integer value type alias
pub type Integer = i64;
/// Literal type alias
pub type Text = String;

/// Marker used in sort keys to request a descending order.
pub const DESCENDING_MARKER: char = '-';

/// A wrapper enum to allow heterogeneous values (Numbers and Strings)
/// to coexist in dynamic containers like [`Condition`] operands and rows.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum Value {
    Integer(Integer),
    Float(Float),
    Text(Text),
    Boolean(bool),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Integer(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Float,
            Self::Text(_) => ValueKind::Text,
            Self::Boolean(_) => ValueKind::Boolean,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Boolean(v) => write!(f, "{v}"),
        }
    }
}

/// Type tag of a [`Value`], used to describe columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Float,
    Text,
    Boolean,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Value> for bson::Bson {
    fn from(v: Value) -> Self {
        match v {
            Value::Integer(v) => bson::Bson::Int64(v),
            Value::Float(v) => bson::Bson::Double(v),
            Value::Text(v) => bson::Bson::String(v),
            Value::Boolean(v) => bson::Bson::Boolean(v),
        }
    }
}

/// Inclusive range `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Range<T> {
    pub min: T,
    pub max: T,
}

impl<T> Range<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

/// Represents the logical operator to apply to a field for filtering.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Equal
    Eq(Value),
    /// Found in a set
    In(Vec<Value>),
    /// Matches a pattern, `LIKE` on relational stores and a case-insensitive
    /// regex on document stores.
    Like(Text),
    /// In between a two value range [a, b]
    Between(Range<Value>),
}

/// A single constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    field: String,
    op: Op,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Op) -> Self {
        Self {
            field: field.into(),
            op,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn into_parts(self) -> (String, Op) {
        (self.field, self.op)
    }
}

/// An ordered collection of conditions with at most one condition per field.
///
/// Conditions are kept in insertion order so that every translation of the same set
/// produces the same output. Inserting a condition for a field that is already present
/// replaces the previous condition in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.field == condition.field)
        {
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Op> {
        self.conditions
            .iter()
            .find(|c| c.field == field)
            .map(|c| &c.op)
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.conditions.iter()
    }
}

impl<'a> IntoIterator for &'a ConditionSet {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.iter()
    }
}

impl IntoIterator for ConditionSet {
    type Item = Condition;
    type IntoIter = std::vec::IntoIter<Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.into_iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A field to sort by, parsed from its textual form (`"name"` or `"-name"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

impl SortKey {
    pub fn parse(key: &str) -> Self {
        match key.strip_prefix(DESCENDING_MARKER) {
            Some(field) => Self {
                field: field.to_owned(),
                direction: Direction::Descending,
            },
            None => Self {
                field: key.to_owned(),
                direction: Direction::Ascending,
            },
        }
    }

    pub fn is_descending(&self) -> bool {
        self.direction == Direction::Descending
    }
}

/// Full backend-neutral description of a read.
///
/// A `limit` of `0` means unbounded and an `offset` of `0` means no offset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub projection: Vec<String>,
    pub conditions: ConditionSet,
    pub sort: Vec<SortKey>,
    pub limit: i64,
    pub offset: i64,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the returned fields. An empty projection selects everything.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.insert(condition);
        self
    }

    pub fn where_eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::new(field, Op::Eq(value.into())))
    }

    pub fn where_in<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(Condition::new(field, Op::In(values)))
    }

    pub fn where_like(self, field: &str, pattern: &str) -> Self {
        self.filter(Condition::new(field, Op::Like(pattern.to_owned())))
    }

    pub fn where_between(self, field: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.filter(Condition::new(
            field,
            Op::Between(Range::new(low.into(), high.into())),
        ))
    }

    /// Appends sort keys; a leading `-` requests descending order.
    pub fn sort<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.sort
            .extend(keys.into_iter().map(|k| SortKey::parse(k.as_ref())));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Checks field names and pagination bounds before translation.
    pub fn validate(&self) -> Result<(), Error> {
        for field in &self.projection {
            validate_field(field)?;
        }

        for condition in &self.conditions {
            validate_field(condition.field())?;
            if let Op::In(values) = condition.op()
                && values.is_empty()
            {
                return Err(Error::EmptyInList {
                    field: condition.field().to_owned(),
                });
            }
        }

        for key in &self.sort {
            validate_field(&key.field)?;
        }

        if self.limit < 0 {
            return Err(Error::NegativeLimit(self.limit));
        }
        if self.offset < 0 {
            return Err(Error::NegativeOffset(self.offset));
        }

        Ok(())
    }
}

/// Field names are spliced verbatim into clauses, so only dotted identifiers are accepted.
fn validate_field(field: &str) -> Result<(), Error> {
    if field.is_empty() {
        return Err(Error::EmptyField);
    }

    let valid = field.split('.').all(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    });

    if !valid {
        return Err(Error::BadField {
            field: field.to_owned(),
        });
    }

    Ok(())
}
