//! Operation logging handle.
//!
//! Facades and normalizers receive an [`OpLogRef`] at construction instead of logging
//! through process-wide state. [`LogSink`] forwards to the [`log`] facade, [`NoopLog`]
//! discards everything.
use log::{debug, error, info, warn};
use std::fmt;
use std::sync::Arc;

pub type OpLogRef = Arc<dyn OpLog>;

/// Describes the operation a log entry refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpContext {
    pub operation: &'static str,
    pub target: String,
    pub id: Option<String>,
}

impl OpContext {
    pub fn new(operation: &'static str, target: impl Into<String>) -> Self {
        Self {
            operation,
            target: target.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl fmt::Display) -> Self {
        self.id = Some(id.to_string());
        self
    }
}

impl fmt::Display for OpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "[{}] {}#{}", self.operation, self.target, id),
            None => write!(f, "[{}] {}", self.operation, self.target),
        }
    }
}

pub trait OpLog: Send + Sync {
    /// The operation completed.
    fn success(&self, ctx: &OpContext, msg: &str);

    /// The operation found nothing. This is an expected outcome, not an error.
    fn not_found(&self, ctx: &OpContext);

    /// The operation failed.
    fn failure(&self, ctx: &OpContext, err: &(dyn std::error::Error + 'static));

    /// A secondary failure that does not change the outcome returned to the caller.
    fn suppressed(&self, ctx: &OpContext, err: &(dyn std::error::Error + 'static));
}

/// Forwards entries to the [`log`] crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl LogSink {
    pub fn shared() -> OpLogRef {
        Arc::new(Self)
    }
}

impl OpLog for LogSink {
    fn success(&self, ctx: &OpContext, msg: &str) {
        info!("{ctx} {msg}");
    }

    fn not_found(&self, ctx: &OpContext) {
        debug!("{ctx} no matching data");
    }

    fn failure(&self, ctx: &OpContext, err: &(dyn std::error::Error + 'static)) {
        error!("{ctx} failed :: {err}");
    }

    fn suppressed(&self, ctx: &OpContext, err: &(dyn std::error::Error + 'static)) {
        warn!("{ctx} {err}");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLog;

impl NoopLog {
    pub fn shared() -> OpLogRef {
        Arc::new(Self)
    }
}

impl OpLog for NoopLog {
    fn success(&self, _ctx: &OpContext, _msg: &str) {}
    fn not_found(&self, _ctx: &OpContext) {}
    fn failure(&self, _ctx: &OpContext, _err: &(dyn std::error::Error + 'static)) {}
    fn suppressed(&self, _ctx: &OpContext, _err: &(dyn std::error::Error + 'static)) {}
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_display() {
        assert_eq!(OpContext::new("read", "users").to_string(), "[read] users");
        assert_eq!(
            OpContext::new("delete", "users").with_id(42).to_string(),
            "[delete] users#42"
        );
    }
}
