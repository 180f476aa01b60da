//! Transaction ownership for cursor sessions.
//!
//! Only the guard that moved a connection's depth from 0 to 1 talks to the
//! database: it issues `begin` on enter and `commit` or `rollback` on exit.
//! Guards entered while a transaction is already open join it silently and
//! leave its fate to the owner.

use crate::connection::{CursorConnection, TransactionDepth};
use crate::error::{CursorError, CursorResult, TransactionOp};

pub struct TransactionGuard {
    depth: TransactionDepth,
    owns: bool,
    finished: bool,
}

impl TransactionGuard {
    /// Begin a transaction if none is open, otherwise join the open one.
    ///
    /// A transaction left behind by a dropped owning guard is rolled back
    /// first, so it is never joined.
    pub async fn enter<C: CursorConnection>(conn: &mut C) -> CursorResult<Self> {
        let depth = conn.transaction_depth().clone();
        if depth.take_abandoned() {
            tracing::warn!("rolling back transaction abandoned by a dropped guard");
            let result = conn.rollback().await;
            depth.reset();
            result.map_err(|e| CursorError::transaction(TransactionOp::Rollback, e.to_string()))?;
        }
        let owns = depth.get() == 0;
        if owns {
            conn.begin()
                .await
                .map_err(|e| CursorError::transaction(TransactionOp::Begin, e.to_string()))?;
            depth.increment();
            tracing::debug!("began transaction");
        } else {
            tracing::debug!(depth = depth.get(), "joined open transaction");
        }
        Ok(Self {
            depth,
            owns,
            finished: false,
        })
    }

    /// Whether this guard started, and so must end, the transaction.
    pub fn owns_transaction(&self) -> bool {
        self.owns
    }

    /// Commit if owned, otherwise do nothing.
    ///
    /// The depth returns to its prior value even when `commit` fails, since
    /// PostgreSQL ends the transaction either way.
    pub async fn succeed<C: CursorConnection>(mut self, conn: &mut C) -> CursorResult<()> {
        self.finished = true;
        if !self.owns {
            return Ok(());
        }
        let result = conn.commit().await;
        self.depth.decrement();
        result.map_err(|e| CursorError::transaction(TransactionOp::Commit, e.to_string()))?;
        tracing::debug!("committed transaction");
        Ok(())
    }

    /// Roll back if owned, otherwise do nothing.
    pub async fn fail<C: CursorConnection>(mut self, conn: &mut C) -> CursorResult<()> {
        self.finished = true;
        if !self.owns {
            return Ok(());
        }
        let result = conn.rollback().await;
        self.depth.decrement();
        result.map_err(|e| CursorError::transaction(TransactionOp::Rollback, e.to_string()))?;
        tracing::debug!("rolled back transaction");
        Ok(())
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if self.owns && !self.finished {
            tracing::warn!("transaction guard dropped without commit or rollback; rolling back on next use");
            self.depth.mark_abandoned();
        }
    }
}
