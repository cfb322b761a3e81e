//! Relational clause compiler.
//!
//! Turns a [`QuerySpec`] into a `WHERE ... ORDER BY ... LIMIT ... OFFSET ...` fragment
//! using `$N` positional placeholders, together with the ordered list of values to bind.
use super::{Error, Op, QuerySpec, SortKey, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledClause {
    pub clause: String,
    pub values: Vec<Value>,
}

impl CompiledClause {
    pub fn new(clause: String, values: Vec<Value>) -> Self {
        Self { clause, values }
    }

    pub fn empty() -> Self {
        Self {
            clause: String::new(),
            values: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clause.is_empty()
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.clause, self.values)
    }
}

/// Specify how a single condition is rendered.
///
/// `first_placeholder` is the 1-based index of the first placeholder the fragment may use.
pub trait CompileClause {
    fn compile_clause(&self, field: &str, op: &Op, first_placeholder: usize) -> CompiledClause;
}

/// Renders conditions with PostgreSQL style `$N` placeholders.
#[derive(Debug, Default, Clone, Copy)]
pub struct PositionalFmt;

impl CompileClause for PositionalFmt {
    fn compile_clause(&self, field: &str, op: &Op, first_placeholder: usize) -> CompiledClause {
        let n = first_placeholder;
        match op {
            Op::Eq(v) => CompiledClause::new(format!("{field} = ${n}"), vec![v.clone()]),
            Op::In(items) => {
                let placeholders: Vec<String> =
                    (n..n + items.len()).map(|i| format!("${i}")).collect();
                CompiledClause::new(
                    format!("{field} IN ({})", placeholders.join(", ")),
                    items.clone(),
                )
            }
            Op::Like(pattern) => CompiledClause::new(
                format!("{field} LIKE ${n}"),
                vec![Value::Text(pattern.clone())],
            ),
            Op::Between(range) => CompiledClause::new(
                format!("{field} BETWEEN ${n} AND ${}", n + 1),
                vec![range.min.clone(), range.max.clone()],
            ),
        }
    }
}

#[derive(Debug)]
pub struct CompilerResult {
    pub clauses: Vec<String>,
    pub values: Vec<Value>,
}

impl CompilerResult {
    fn new() -> Self {
        Self {
            clauses: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// Accumulates condition fragments, numbering placeholders without gaps.
pub struct ClausesCompiler {
    result: CompilerResult,
}

impl Default for ClausesCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ClausesCompiler {
    pub fn new() -> Self {
        Self {
            result: CompilerResult::new(),
        }
    }

    pub fn expr<F>(mut self, field: &str, op: &Op, mapper: &F) -> Self
    where
        F: CompileClause,
    {
        let next = self.result.values.len() + 1;
        let (clause, mut values) = mapper.compile_clause(field, op, next).into_parts();

        self.result.clauses.push(clause);
        self.result.values.append(&mut values);

        self
    }

    pub fn filter<F>(mut self, spec: &QuerySpec, mapper: &F) -> Self
    where
        F: CompileClause,
    {
        for condition in &spec.conditions {
            self = self.expr(condition.field(), condition.op(), mapper);
        }
        self
    }

    pub fn compile(self) -> CompilerResult {
        self.result
    }
}

/// Translates a query spec into a relational clause and its positional parameters.
pub fn to_sql(spec: &QuerySpec) -> Result<CompiledClause, Error> {
    spec.validate()?;

    let result = ClausesCompiler::new()
        .filter(spec, &PositionalFmt)
        .compile();

    let mut parts: Vec<String> = Vec::with_capacity(4);

    if !result.is_unfiltered() {
        parts.push(format!("WHERE {}", result.clauses.join(" AND ")));
    }

    if !spec.sort.is_empty() {
        parts.push(format!("ORDER BY {}", order_by(&spec.sort)));
    }

    if spec.limit > 0 {
        parts.push(format!("LIMIT {}", spec.limit));
    }

    if spec.offset > 0 {
        parts.push(format!("OFFSET {}", spec.offset));
    }

    Ok(CompiledClause::new(parts.join(" "), result.values))
}

fn order_by(keys: &[SortKey]) -> String {
    keys.iter()
        .map(|k| {
            if k.is_descending() {
                format!("{} DESC", k.field)
            } else {
                format!("{} ASC", k.field)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
