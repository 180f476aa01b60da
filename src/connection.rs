//! The driver seam: what a cursor session needs from a database connection.

use crate::row::Row;
use crate::value::SqlValue;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Transaction nesting depth of one connection.
///
/// Cloning yields another handle to the same counter. Only
/// [`TransactionGuard`](crate::transaction::TransactionGuard) changes it;
/// everything else can only read it.
///
/// The counter also remembers whether an owning guard was dropped without
/// ending its transaction. The next guard entered on the connection rolls
/// that transaction back before doing anything else.
#[derive(Debug, Clone, Default)]
pub struct TransactionDepth {
    depth: Arc<AtomicUsize>,
    abandoned: Arc<AtomicBool>,
}

impl TransactionDepth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Whether an abandoned transaction is waiting to be rolled back.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    pub(crate) fn increment(&self) -> usize {
        self.depth.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn decrement(&self) -> usize {
        let prev = self
            .depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| Some(d.saturating_sub(1)))
            .unwrap_or(0);
        prev.saturating_sub(1)
    }

    pub(crate) fn mark_abandoned(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }

    /// Clear the abandoned flag, returning whether it was set.
    pub(crate) fn take_abandoned(&self) -> bool {
        self.abandoned.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.depth.store(0, Ordering::SeqCst);
    }
}

/// A single database connection able to run cursor statements.
///
/// Implementations execute exactly the SQL they are given, binding
/// `params` positionally. They do not track transactions themselves beyond
/// exposing the [`TransactionDepth`] counter.
pub trait CursorConnection: Send {
    type Error: std::fmt::Display + Send;

    /// Execute a statement that returns no rows.
    fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Execute a statement and decode every returned row.
    fn select(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> impl Future<Output = Result<Vec<Row>, Self::Error>> + Send;

    fn begin(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn commit(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn rollback(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn transaction_depth(&self) -> &TransactionDepth;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_is_shared_between_handles() {
        let depth = TransactionDepth::new();
        let other = depth.clone();
        assert_eq!(depth.increment(), 1);
        assert_eq!(other.get(), 1);
        assert_eq!(other.decrement(), 0);
        assert_eq!(depth.get(), 0);
    }

    #[test]
    fn test_abandoned_flag_is_taken_once() {
        let depth = TransactionDepth::new();
        let other = depth.clone();
        depth.increment();
        depth.mark_abandoned();
        assert!(other.is_abandoned());
        assert!(other.take_abandoned());
        assert!(!depth.take_abandoned());
        other.reset();
        assert_eq!(depth.get(), 0);
    }

    #[test]
    fn test_depth_never_underflows() {
        let depth = TransactionDepth::new();
        assert_eq!(depth.decrement(), 0);
        assert_eq!(depth.get(), 0);
    }
}
