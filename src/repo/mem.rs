//! In-memory relational backend.
//!
//! Each transaction keeps the list of writes it performed and replays them against the
//! shared tables on commit, checking keys again at that point. Faults can be injected to
//! simulate backend failures, and the final outcome of every transaction is recorded so
//! callers can check how it ended.
//!
//! `select` evaluates the query spec with the document-store matcher. `Like` patterns
//! keep their SQL meaning: `%` and `_` wildcards, anchored and case-sensitive.

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{Column, Error, RelationalBackend, RelationalTx, Row};
use crate::docstore;
use crate::query::{self, CompiledClause, Op, QuerySpec};

type Table = BTreeMap<i64, Row>;
type Tables = HashMap<String, Table>;

/// Failure points that can be injected in [`MemRelational`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Begin,
    Write,
    Commit,
    Rollback,
    Read,
}

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Committed,
    RolledBack,
    /// Released without an explicit commit or rollback.
    Dropped,
}

#[derive(Default)]
struct MemState {
    tables: Tables,
    faults: HashSet<Fault>,
    outcomes: Vec<TxOutcome>,
    statements: Vec<(String, CompiledClause)>,
}

#[derive(Clone, Default)]
pub struct MemRelational {
    state: Arc<Mutex<MemState>>,
}

fn lock(state: &Mutex<MemState>) -> MutexGuard<'_, MemState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn fault(state: &Mutex<MemState>, fault: Fault) -> Result<(), Error> {
    if lock(state).faults.contains(&fault) {
        return Err(Error::Connection(format!("injected {fault:?} failure")));
    }
    Ok(())
}

impl MemRelational {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, fault: Fault) {
        lock(&self.state).faults.insert(fault);
    }

    pub fn clear_faults(&self) {
        lock(&self.state).faults.clear();
    }

    /// Stores a row outside any transaction.
    pub fn seed(&self, table: &str, key: &str, row: Row) {
        if let Ok(id) = row.integer(key) {
            lock(&self.state)
                .tables
                .entry(table.to_owned())
                .or_default()
                .insert(id, row);
        }
    }

    /// Committed rows of `table`, ordered by key.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        lock(&self.state)
            .tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn outcomes(&self) -> Vec<TxOutcome> {
        lock(&self.state).outcomes.clone()
    }

    /// Clauses compiled by `select`, with their table.
    pub fn statements(&self) -> Vec<(String, CompiledClause)> {
        lock(&self.state).statements.clone()
    }
}

/// `LIKE` pattern as an anchored regex.
fn like_regex(pattern: &str) -> String {
    let mut re = String::from("(?s)^");
    let mut buf = [0_u8; 4];
    for ch in pattern.chars() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    re.push('$');
    re
}

fn row_filter(spec: &QuerySpec) -> Document {
    let mut filter = query::filter_document(spec);
    for condition in &spec.conditions {
        if let Op::Like(pattern) = condition.op() {
            filter.insert(condition.field(), doc! { "$regex": like_regex(pattern) });
        }
    }
    filter
}

fn row_document(row: &Row) -> Document {
    let mut doc = Document::new();
    for (column, value) in row.iter() {
        doc.insert(column, Bson::from(value.clone()));
    }
    doc
}

#[async_trait]
impl RelationalBackend for MemRelational {
    async fn begin(&self) -> Result<Box<dyn RelationalTx>, Error> {
        fault(&self.state, Fault::Begin)?;
        Ok(Box::new(MemTx {
            state: self.state.clone(),
            staged: Vec::new(),
            finished: false,
        }))
    }

    async fn find_by_key(
        &self,
        table: &str,
        _key: &str,
        id: i64,
        columns: &[Column],
    ) -> Result<Row, Error> {
        fault(&self.state, Fault::Read)?;
        lock(&self.state)
            .tables
            .get(table)
            .and_then(|t| t.get(&id))
            .map(|row| row.project(columns))
            .ok_or(Error::NotFound)
    }

    async fn select(
        &self,
        table: &str,
        columns: &[Column],
        spec: &QuerySpec,
    ) -> Result<Vec<Row>, Error> {
        fault(&self.state, Fault::Read)?;
        let clause = query::to_sql(spec)?;
        let filter = row_filter(spec);
        let sort = query::sort_document(spec);

        let mut state = lock(&self.state);
        state.statements.push((table.to_owned(), clause));

        let mut found = Vec::new();
        for row in state.tables.get(table).into_iter().flat_map(|t| t.values()) {
            let doc = row_document(row);
            if docstore::matches(&doc, &filter).map_err(|e| Error::Unsupported(e.to_string()))? {
                found.push((doc, row));
            }
        }
        found.sort_by(|(a, _), (b, _)| docstore::compare_documents(a, b, &sort));

        // limit and offset were validated as non-negative
        let skip = spec.offset as usize;
        let take = if spec.limit > 0 {
            spec.limit as usize
        } else {
            usize::MAX
        };

        Ok(found
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|(_, row)| row.project(columns))
            .collect())
    }
}

/// A write performed inside a [`MemTx`], replayed on commit.
#[derive(Debug, Clone)]
enum Staged {
    Insert {
        table: String,
        key: String,
        id: i64,
        row: Row,
    },
    Update {
        table: String,
        key: String,
        id: i64,
        row: Row,
    },
    Delete {
        table: String,
        id: i64,
    },
}

impl Staged {
    fn table(&self) -> &str {
        match self {
            Self::Insert { table, .. } | Self::Update { table, .. } | Self::Delete { table, .. } => {
                table
            }
        }
    }

    fn apply(&self, tables: &mut Tables) -> Result<(), Error> {
        let rows = tables.entry(self.table().to_owned()).or_default();
        match self {
            Self::Insert { table, key, id, row } => {
                if rows.contains_key(id) {
                    return Err(Error::Constraint(format!(
                        "duplicate key {key}={id} in `{table}`"
                    )));
                }
                rows.insert(*id, row.clone());
            }
            Self::Update { key, id, row, .. } => {
                let existing = rows.get_mut(id).ok_or(Error::NotFound)?;
                for (column, value) in row.iter() {
                    if column != key {
                        existing.set(column, value.clone());
                    }
                }
            }
            Self::Delete { id, .. } => {
                rows.remove(id).ok_or(Error::NotFound)?;
            }
        }
        Ok(())
    }
}

/// Transaction recording its own writes.
struct MemTx {
    state: Arc<Mutex<MemState>>,
    staged: Vec<Staged>,
    finished: bool,
}

impl MemTx {
    /// Checks `write` against the committed rows plus the writes staged so far, then
    /// keeps it for commit.
    fn stage(&mut self, write: Staged) -> Result<(), Error> {
        fault(&self.state, Fault::Write)?;

        let mut scratch = Tables::new();
        if let Some(rows) = lock(&self.state).tables.get(write.table()) {
            scratch.insert(write.table().to_owned(), rows.clone());
        }
        for earlier in self.staged.iter().filter(|s| s.table() == write.table()) {
            // conflicts with rows committed meanwhile are reported by commit
            let _ = earlier.apply(&mut scratch);
        }

        write.apply(&mut scratch)?;
        self.staged.push(write);
        Ok(())
    }

    fn finish(&mut self, outcome: TxOutcome) {
        self.finished = true;
        lock(&self.state).outcomes.push(outcome);
    }

    /// Replays the staged writes on the live tables, all or nothing.
    fn replay(&self) -> Result<(), Error> {
        let mut state = lock(&self.state);

        let mut scratch = Tables::new();
        for write in &self.staged {
            let table = write.table();
            if !scratch.contains_key(table) {
                let rows = state.tables.get(table).cloned().unwrap_or_default();
                scratch.insert(table.to_owned(), rows);
            }
        }

        for write in &self.staged {
            write.apply(&mut scratch)?;
        }

        state.tables.extend(scratch);
        Ok(())
    }
}

#[async_trait]
impl RelationalTx for MemTx {
    async fn insert(&mut self, table: &str, key: &str, row: &Row) -> Result<(), Error> {
        let id = row.integer(key)?;
        self.stage(Staged::Insert {
            table: table.to_owned(),
            key: key.to_owned(),
            id,
            row: row.clone(),
        })
    }

    async fn update(&mut self, table: &str, key: &str, id: i64, row: &Row) -> Result<(), Error> {
        self.stage(Staged::Update {
            table: table.to_owned(),
            key: key.to_owned(),
            id,
            row: row.clone(),
        })
    }

    async fn delete(&mut self, table: &str, _key: &str, id: i64) -> Result<(), Error> {
        self.stage(Staged::Delete {
            table: table.to_owned(),
            id,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), Error> {
        let mut tx = self;
        let result = fault(&tx.state, Fault::Commit).and_then(|()| tx.replay());
        match result {
            Ok(()) => {
                tx.finish(TxOutcome::Committed);
                Ok(())
            }
            Err(e) => {
                tx.finish(TxOutcome::RolledBack);
                Err(e)
            }
        }
    }

    async fn rollback(self: Box<Self>) -> Result<(), Error> {
        let mut tx = self;
        tx.finish(TxOutcome::RolledBack);
        fault(&tx.state, Fault::Rollback)
    }
}

impl Drop for MemTx {
    fn drop(&mut self) {
        if !self.finished {
            lock(&self.state).outcomes.push(TxOutcome::Dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ValueKind;

    const COLUMNS: &[Column] = &[
        Column::new("id", ValueKind::Integer),
        Column::new("name", ValueKind::Text),
    ];

    fn row(id: i64, name: &str) -> Row {
        Row::new().with("id", id).with("name", name)
    }

    #[tokio::test]
    async fn writes_are_invisible_until_commit() {
        let backend = MemRelational::new();
        let mut tx = backend.begin().await.unwrap();
        tx.insert("t", "id", &row(1, "a")).await.unwrap();

        assert!(matches!(
            backend.find_by_key("t", "id", 1, COLUMNS).await,
            Err(Error::NotFound)
        ));

        tx.commit().await.unwrap();
        assert_eq!(
            backend.find_by_key("t", "id", 1, COLUMNS).await.unwrap(),
            row(1, "a")
        );
    }

    #[tokio::test]
    async fn update_and_delete_missing_rows() {
        let backend = MemRelational::new();
        backend.seed("t", "id", row(1, "a"));

        let mut tx = backend.begin().await.unwrap();
        tx.update("t", "id", 1, &row(1, "b")).await.unwrap();
        assert!(matches!(
            tx.update("t", "id", 2, &row(2, "c")).await,
            Err(Error::NotFound)
        ));
        assert!(matches!(
            tx.delete("t", "id", 3).await,
            Err(Error::NotFound)
        ));
        tx.commit().await.unwrap();

        assert_eq!(backend.rows("t"), vec![row(1, "b")]);
    }

    #[tokio::test]
    async fn select_records_clause() {
        let backend = MemRelational::new();
        backend.seed("t", "id", row(2, "b"));
        backend.seed("t", "id", row(1, "a"));
        let spec = QuerySpec::new().where_eq("name", "a");

        let rows = backend.select("t", &COLUMNS[1..], &spec).await.unwrap();

        assert_eq!(rows, vec![Row::new().with("name", "a")]);
        assert_eq!(
            backend.statements(),
            vec![(
                "t".to_owned(),
                CompiledClause::new("WHERE name = $1".into(), vec!["a".into()])
            )]
        );
    }

    fn member(id: i64, name: &str, status: &str, age: i64) -> Row {
        Row::new()
            .with("id", id)
            .with("name", name)
            .with("status", status)
            .with("age", age)
    }

    async fn members() -> MemRelational {
        let backend = MemRelational::new();
        backend.seed("m", "id", member(1, "Ada", "active", 36));
        backend.seed("m", "id", member(2, "Grace", "banned", 24));
        backend.seed("m", "id", member(3, "Linus", "active", 25));
        backend.seed("m", "id", member(4, "adam", "active", 19));
        backend
    }

    fn ids(rows: &[Row]) -> Vec<i64> {
        rows.iter().map(|r| r.integer("id").unwrap()).collect()
    }

    #[tokio::test]
    async fn select_filters_rows() {
        let backend = members().await;
        let all = &[
            Column::new("id", ValueKind::Integer),
            Column::new("status", ValueKind::Text),
        ];

        let spec = QuerySpec::new().where_eq("status", "active").limit(1);
        let rows = backend.select("m", all, &spec).await.unwrap();
        assert_eq!(ids(&rows), vec![1]);

        let spec = QuerySpec::new()
            .where_in("status", ["active", "banned"])
            .where_between("age", 20, 30)
            .sort(["-age"]);
        let rows = backend.select("m", all, &spec).await.unwrap();
        assert_eq!(ids(&rows), vec![3, 2]);

        let spec = QuerySpec::new()
            .where_eq("status", "active")
            .sort(["age"])
            .offset(1)
            .limit(5);
        let rows = backend.select("m", all, &spec).await.unwrap();
        assert_eq!(ids(&rows), vec![3, 1]);
    }

    #[tokio::test]
    async fn select_like_is_sql_like() {
        let backend = members().await;
        let id = &[Column::new("id", ValueKind::Integer)];

        let rows = backend
            .select("m", id, &QuerySpec::new().where_like("name", "Ad%"))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![1]);

        let rows = backend
            .select("m", id, &QuerySpec::new().where_like("name", "_inu_"))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![3]);

        let rows = backend
            .select("m", id, &QuerySpec::new().where_like("name", "a.%"))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn interleaved_transactions_keep_both_commits() {
        let backend = MemRelational::new();
        let mut a = backend.begin().await.unwrap();
        let mut b = backend.begin().await.unwrap();

        a.insert("t", "id", &row(1, "a")).await.unwrap();
        b.insert("t", "id", &row(2, "b")).await.unwrap();
        a.commit().await.unwrap();
        b.commit().await.unwrap();

        assert_eq!(backend.rows("t"), vec![row(1, "a"), row(2, "b")]);
        assert_eq!(
            backend.outcomes(),
            vec![TxOutcome::Committed, TxOutcome::Committed]
        );
    }

    #[tokio::test]
    async fn conflicting_commit_is_rejected_whole() {
        let backend = MemRelational::new();
        let mut a = backend.begin().await.unwrap();
        let mut b = backend.begin().await.unwrap();

        a.insert("t", "id", &row(1, "a")).await.unwrap();
        b.insert("t", "id", &row(2, "b")).await.unwrap();
        b.insert("t", "id", &row(1, "b")).await.unwrap();
        a.commit().await.unwrap();

        assert!(matches!(b.commit().await, Err(Error::Constraint(_))));
        assert_eq!(backend.rows("t"), vec![row(1, "a")]);
        assert_eq!(
            backend.outcomes(),
            vec![TxOutcome::Committed, TxOutcome::RolledBack]
        );
    }

    #[tokio::test]
    async fn staged_writes_see_each_other() {
        let backend = MemRelational::new();
        let mut tx = backend.begin().await.unwrap();

        tx.insert("t", "id", &row(1, "a")).await.unwrap();
        assert!(matches!(
            tx.insert("t", "id", &row(1, "again")).await,
            Err(Error::Constraint(_))
        ));
        tx.update("t", "id", 1, &row(1, "b")).await.unwrap();
        tx.delete("t", "id", 1).await.unwrap();
        assert!(matches!(tx.delete("t", "id", 1).await, Err(Error::NotFound)));
        tx.commit().await.unwrap();

        assert!(backend.rows("t").is_empty());
    }

    #[tokio::test]
    async fn injected_faults() {
        let backend = MemRelational::new();
        backend.inject(Fault::Begin);
        assert!(matches!(backend.begin().await, Err(Error::Connection(_))));

        backend.clear_faults();
        backend.inject(Fault::Rollback);
        let tx = backend.begin().await.unwrap();
        assert!(tx.rollback().await.is_err());
        assert_eq!(backend.outcomes(), vec![TxOutcome::RolledBack]);
    }
}
