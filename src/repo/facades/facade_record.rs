use log::trace;

use super::{ErrorNormalizer, FacadeError, SqlNormalizer};
use crate::query::{self, QuerySpec};
use crate::repo::{self, Column, Record, Transaction, Write};
use crate::utils::oplog::{OpContext, OpLogRef};

/// Facade over the relational store.
///
/// Every mutation runs in its own transaction: begin, apply a single write, commit.
/// The transaction is released on every exit path; after a successful commit the
/// release is a no-op. Reads go straight to the backend.
#[derive(Clone)]
pub struct FacadeRecord {
    repo: repo::Repository,
    normalizer: SqlNormalizer,
    log: OpLogRef,
}

impl FacadeRecord {
    pub fn new(repo: repo::Repository, log: OpLogRef) -> Self {
        Self {
            repo,
            normalizer: SqlNormalizer::new(log.clone()),
            log,
        }
    }

    pub async fn create<R: Record>(&self, record: &R) -> Result<(), FacadeError> {
        let ctx = OpContext::new("create", R::TABLE).with_id(record.id());
        self.write::<R>(&ctx, Write::Insert(record.to_row())).await?;
        self.log.success(&ctx, "record created");
        Ok(())
    }

    pub async fn update<R: Record>(&self, record: &R) -> Result<(), FacadeError> {
        let ctx = OpContext::new("update", R::TABLE).with_id(record.id());
        let write = Write::Update {
            id: record.id(),
            row: record.to_row(),
        };
        self.write::<R>(&ctx, write).await?;
        self.log.success(&ctx, "record updated");
        Ok(())
    }

    pub async fn delete<R: Record>(&self, id: i64) -> Result<(), FacadeError> {
        let ctx = OpContext::new("delete", R::TABLE).with_id(id);
        self.write::<R>(&ctx, Write::Delete { id }).await?;
        self.log.success(&ctx, "record deleted");
        Ok(())
    }

    /// Direct lookup by primary key, without a transaction.
    pub async fn read<R: Record>(&self, id: i64) -> Result<R, FacadeError> {
        let ctx = OpContext::new("read", R::TABLE).with_id(id);

        let row = self
            .repo
            .find_by_key(R::TABLE, R::KEY, id, R::COLUMNS)
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;

        let record = R::from_row(&row).map_err(|e| self.normalizer.normalize(&ctx, e))?;

        self.log.success(&ctx, "record retrieved");
        Ok(record)
    }

    /// Runs `spec` against the table of `R`.
    ///
    /// With a projection only the selected columns are fetched, so `R::from_row` must
    /// be able to build a record from them.
    pub async fn search<R: Record>(&self, spec: &QuerySpec) -> Result<Vec<R>, FacadeError> {
        let ctx = OpContext::new("search", R::TABLE);

        spec.validate()?;
        let columns = projected_columns::<R>(spec)?;
        trace!("{ctx} {} conditions", spec.conditions.len());

        let rows = self
            .repo
            .select(R::TABLE, &columns, spec)
            .await
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;

        let records = rows
            .iter()
            .map(R::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.normalizer.normalize(&ctx, e))?;

        self.log.success(&ctx, "search executed");
        Ok(records)
    }

    async fn write<R: Record>(&self, ctx: &OpContext, write: Write) -> Result<(), FacadeError> {
        let mut tx = Transaction::begin(self.repo.as_ref()).await.map_err(|e| {
            self.log.failure(ctx, &e);
            FacadeError::backend(e)
        })?;

        let result = self.apply_and_commit::<R>(ctx, &mut tx, &write).await;

        if let Err(e) = tx.rollback().await {
            self.log.suppressed(ctx, &e);
        }

        result
    }

    async fn apply_and_commit<R: Record>(
        &self,
        ctx: &OpContext,
        tx: &mut Transaction,
        write: &Write,
    ) -> Result<(), FacadeError> {
        if let Err(e) = tx.apply(R::TABLE, R::KEY, write).await {
            // released by the caller before the error is returned
            return Err(self.normalizer.normalize(ctx, e));
        }

        tx.commit().await.map_err(|e| {
            self.log.failure(ctx, &e);
            FacadeError::backend(e)
        })
    }
}

fn projected_columns<R: Record>(spec: &QuerySpec) -> Result<Vec<Column>, query::Error> {
    if spec.projection.is_empty() {
        return Ok(R::COLUMNS.to_vec());
    }

    spec.projection
        .iter()
        .map(|field| {
            R::COLUMNS
                .iter()
                .find(|c| c.name == field)
                .copied()
                .ok_or_else(|| query::Error::UnknownColumn {
                    table: R::TABLE.to_owned(),
                    column: field.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Value, ValueKind};
    use crate::repo::{Fault, MemRelational, Row, TxOutcome};
    use crate::utils::oplog::testing::{Entry, RecordingLog};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct User {
        id: i64,
        name: String,
        status: String,
        age: i64,
    }

    impl Record for User {
        const TABLE: &'static str = "users";
        const COLUMNS: &'static [Column] = &[
            Column::new("id", ValueKind::Integer),
            Column::new("name", ValueKind::Text),
            Column::new("status", ValueKind::Text),
            Column::new("age", ValueKind::Integer),
        ];

        fn id(&self) -> i64 {
            self.id
        }

        fn to_row(&self) -> Row {
            Row::new()
                .with("id", self.id)
                .with("name", self.name.as_str())
                .with("status", self.status.as_str())
                .with("age", self.age)
        }

        fn from_row(row: &Row) -> Result<Self, repo::Error> {
            Ok(Self {
                id: row.integer("id")?,
                name: row.text("name")?,
                status: row.text("status")?,
                age: row.integer("age")?,
            })
        }
    }

    fn user(id: i64, name: &str) -> User {
        User {
            id,
            name: name.to_owned(),
            status: "active".to_owned(),
            age: 30,
        }
    }

    fn facade() -> (FacadeRecord, MemRelational, Arc<RecordingLog>) {
        let backend = MemRelational::new();
        let log = Arc::new(RecordingLog::default());
        let facade = FacadeRecord::new(Arc::new(backend.clone()), log.clone());
        (facade, backend, log)
    }

    #[tokio::test]
    async fn create_read_update_delete() {
        let (facade, backend, _) = facade();

        facade.create(&user(1, "ada")).await.unwrap();
        assert_eq!(facade.read::<User>(1).await.unwrap(), user(1, "ada"));

        let mut changed = user(1, "ada");
        changed.status = "inactive".to_owned();
        facade.update(&changed).await.unwrap();
        assert_eq!(facade.read::<User>(1).await.unwrap().status, "inactive");

        facade.delete::<User>(1).await.unwrap();
        assert!(facade.read::<User>(1).await.unwrap_err().is_not_found());

        assert_eq!(
            backend.outcomes(),
            vec![
                TxOutcome::Committed,
                TxOutcome::Committed,
                TxOutcome::Committed
            ]
        );
    }

    #[tokio::test]
    async fn constraint_violation_rolls_back() {
        let (facade, backend, log) = facade();
        facade.create(&user(1, "ada")).await.unwrap();

        let err = facade.create(&user(1, "grace")).await.unwrap_err();

        assert!(err.is_backend());
        assert_eq!(
            backend.outcomes(),
            vec![TxOutcome::Committed, TxOutcome::RolledBack]
        );
        assert_eq!(facade.read::<User>(1).await.unwrap().name, "ada");
        assert_eq!(log.failures(), 1);
    }

    #[tokio::test]
    async fn failed_create_leaves_no_partial_row() {
        let (facade, backend, _) = facade();
        backend.inject(Fault::Write);

        let err = facade.create(&user(7, "linus")).await.unwrap_err();
        assert!(err.is_backend());
        assert_eq!(backend.outcomes(), vec![TxOutcome::RolledBack]);

        backend.clear_faults();
        assert!(facade.read::<User>(7).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let (facade, backend, log) = facade();

        assert!(facade.update(&user(3, "x")).await.unwrap_err().is_not_found());
        assert!(facade.delete::<User>(3).await.unwrap_err().is_not_found());
        assert_eq!(
            backend.outcomes(),
            vec![TxOutcome::RolledBack, TxOutcome::RolledBack]
        );
        assert_eq!(log.failures(), 0);
    }

    #[tokio::test]
    async fn begin_failure_short_circuits() {
        let (facade, backend, _) = facade();
        backend.inject(Fault::Begin);

        let err = facade.create(&user(1, "ada")).await.unwrap_err();

        assert!(err.is_backend());
        assert!(backend.outcomes().is_empty());
    }

    #[tokio::test]
    async fn commit_failure_is_reported() {
        let (facade, backend, _) = facade();
        backend.inject(Fault::Commit);

        let err = facade.create(&user(1, "ada")).await.unwrap_err();

        assert!(err.is_backend());
        assert!(err.to_string().contains("injected Commit failure"));
        assert_eq!(backend.outcomes(), vec![TxOutcome::RolledBack]);
        assert!(backend.rows(User::TABLE).is_empty());
    }

    #[tokio::test]
    async fn rollback_failure_does_not_mask_original_error() {
        let (facade, backend, log) = facade();
        facade.create(&user(1, "ada")).await.unwrap();
        backend.inject(Fault::Rollback);

        let err = facade.create(&user(1, "ada")).await.unwrap_err();

        assert!(err.is_backend());
        assert!(err.to_string().contains("constraint violation"));
        assert!(
            log.entries()
                .iter()
                .any(|e| matches!(e, Entry::Suppressed(_)))
        );
    }

    #[tokio::test]
    async fn successful_write_logs_no_rollback_failure() {
        let (facade, backend, log) = facade();
        backend.inject(Fault::Rollback);

        facade.create(&user(1, "ada")).await.unwrap();

        assert_eq!(backend.outcomes(), vec![TxOutcome::Committed]);
        assert_eq!(
            log.entries(),
            vec![Entry::Success("[create] users#1".into())]
        );
    }

    #[tokio::test]
    async fn search_translates_spec() {
        let (facade, backend, _) = facade();
        facade.create(&user(1, "ada")).await.unwrap();
        facade.create(&user(2, "grace")).await.unwrap();
        facade
            .create(&User {
                status: "banned".to_owned(),
                ..user(3, "linus")
            })
            .await
            .unwrap();
        facade
            .create(&User {
                age: 45,
                ..user(4, "barbara")
            })
            .await
            .unwrap();

        let spec = QuerySpec::new()
            .where_eq("status", "active")
            .where_between("age", 18, 30)
            .sort(["-id"])
            .limit(10);

        let found: Vec<User> = facade.search(&spec).await.unwrap();
        assert_eq!(found, vec![user(2, "grace"), user(1, "ada")]);

        let (table, clause) = backend.statements().pop().unwrap();
        assert_eq!(table, "users");
        assert_eq!(
            clause.clause,
            "WHERE status = $1 AND age BETWEEN $2 AND $3 ORDER BY id DESC LIMIT 10"
        );
        assert_eq!(
            clause.values,
            vec![Value::from("active"), Value::Integer(18), Value::Integer(30)]
        );

        let first: Vec<User> = facade
            .search(&QuerySpec::new().sort(["name"]).limit(1))
            .await
            .unwrap();
        assert_eq!(first, vec![user(1, "ada")]);
    }

    #[tokio::test]
    async fn search_rejects_invalid_spec_before_backend() {
        let (facade, backend, _) = facade();

        let err = facade
            .search::<User>(&QuerySpec::new().limit(-1))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = facade
            .search::<User>(&QuerySpec::new().select(["password"]))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        assert!(backend.statements().is_empty());
    }
}
