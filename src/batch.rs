//! Forward-only batch sequence over a declared cursor.

use crate::connection::CursorConnection;
use crate::error::CursorResult;
use crate::name::CursorName;
use crate::protocol::CursorProtocol;
use crate::row::Row;
use std::num::NonZeroUsize;

/// Pulls `fetch forward <batch_size>` batches until a short batch.
///
/// Finite and not restartable: once a fetch returns fewer rows than the
/// batch size, no further fetch is ever issued.
#[derive(Debug)]
pub struct BatchSequence {
    name: CursorName,
    batch_size: NonZeroUsize,
    terminated: bool,
}

impl BatchSequence {
    pub fn new(name: CursorName, batch_size: NonZeroUsize) -> Self {
        Self {
            name,
            batch_size,
            terminated: false,
        }
    }

    pub fn name(&self) -> &CursorName {
        &self.name
    }

    pub fn batch_size(&self) -> NonZeroUsize {
        self.batch_size
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Next non-empty batch, or `None` once the cursor is exhausted.
    pub async fn next<C: CursorConnection>(&mut self, conn: &mut C) -> CursorResult<Option<Vec<Row>>> {
        if self.terminated {
            return Ok(None);
        }
        let rows = CursorProtocol::fetch_forward(conn, &self.name, self.batch_size).await?;
        if rows.len() < self.batch_size.get() {
            self.terminated = true;
        }
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows))
    }
}
