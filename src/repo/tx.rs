use log::warn;
use std::fmt;

use super::{Error, RelationalBackend, RelationalTx, Write};

/// Lifecycle of a [`Transaction`]. `Committed` and `RolledBack` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Owns a backend transaction for the duration of a single write call.
///
/// Once committed or rolled back no further operation is accepted, while calling
/// [`Transaction::rollback`] on a finished transaction is a successful no-op. This lets
/// callers release the transaction unconditionally on every exit path.
pub struct Transaction {
    conn: Option<Box<dyn RelationalTx>>,
    state: TxState,
}

impl Transaction {
    pub async fn begin(backend: &dyn RelationalBackend) -> Result<Self, Error> {
        let conn = backend.begin().await?;
        Ok(Self {
            conn: Some(conn),
            state: TxState::Active,
        })
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    fn conn(&mut self) -> Result<&mut Box<dyn RelationalTx>, Error> {
        let state = self.state;
        self.conn.as_mut().ok_or(Error::TransactionClosed(state))
    }

    pub async fn apply(&mut self, table: &str, key: &str, write: &Write) -> Result<(), Error> {
        let conn = self.conn()?;
        match write {
            Write::Insert(row) => conn.insert(table, key, row).await,
            Write::Update { id, row } => conn.update(table, key, *id, row).await,
            Write::Delete { id } => conn.delete(table, key, *id).await,
        }
    }

    /// Commits pending writes.
    ///
    /// A failed commit leaves the transaction `RolledBack`: the backend discards the
    /// pending writes together with the connection.
    pub async fn commit(&mut self) -> Result<(), Error> {
        let state = self.state;
        let conn = self.conn.take().ok_or(Error::TransactionClosed(state))?;
        match conn.commit().await {
            Ok(()) => {
                self.state = TxState::Committed;
                Ok(())
            }
            Err(e) => {
                self.state = TxState::RolledBack;
                Err(e)
            }
        }
    }

    /// Discards pending writes. No-op on a finished transaction.
    pub async fn rollback(&mut self) -> Result<(), Error> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        self.state = TxState::RolledBack;
        conn.rollback().await
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.conn.is_some() {
            warn!("transaction dropped while active, pending writes are discarded by the backend");
        }
    }
}
