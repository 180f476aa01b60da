//! Cursor sessions: the entry points that tie naming, the cursor
//! statements, transaction ownership and batching together.
//!
//! A session is a reusable description (statement + mapper + config). Each
//! run opens a [`Cursor`], a scoped resource over one declared cursor:
//!
//! - acquire: enter the transaction, then `declare`
//! - natural end: `close`, then commit (if this session owns the transaction)
//! - any failure or early stop: roll back (if owned), skipping `close`
//!
//! ```rust,ignore
//! let session = Statement::new("select * from events where kind = $1")
//!     .bind("signup")
//!     .cursor_with(JsonMapper::<Event>::new());
//!
//! session
//!     .each_batch(&mut conn, 500, async |_conn, events| {
//!         export(&events).await?;
//!         Ok::<_, anyhow::Error>(())
//!     })
//!     .await?;
//! ```

use crate::batch::BatchSequence;
use crate::config::{CursorConfig, validate_batch_size};
use crate::connection::CursorConnection;
use crate::error::{CursorError, CursorResult, RecordError};
use crate::name::{CursorName, CursorNameGenerator};
use crate::protocol::CursorProtocol;
use crate::row::{RecordMapper, Row};
use crate::statement::Statement;
use crate::transaction::TransactionGuard;
use std::collections::VecDeque;
use std::sync::OnceLock;

pub struct CursorSession<M> {
    statement: Statement,
    mapper: M,
    config: CursorConfig,
    generator: CursorNameGenerator,
    name: OnceLock<CursorName>,
}

impl<M: RecordMapper> CursorSession<M> {
    /// Create a session over a private copy of `statement`.
    pub fn new(statement: &Statement, mapper: M) -> Self {
        let config = CursorConfig::default();
        Self {
            statement: statement.clone(),
            mapper,
            generator: CursorNameGenerator::new(&config),
            config,
            name: OnceLock::new(),
        }
    }

    /// Replace the configuration. Fails on invalid options.
    pub fn with_config(mut self, config: CursorConfig) -> CursorResult<Self> {
        config.validate()?;
        self.generator = CursorNameGenerator::new(&config);
        self.config = config;
        Ok(self)
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    pub fn config(&self) -> &CursorConfig {
        &self.config
    }

    /// The cursor name, generated on first use and fixed afterwards.
    pub fn cursor_name(&self) -> &CursorName {
        self.name.get_or_init(|| self.generator.new_name())
    }

    /// Enter the transaction and declare the cursor.
    ///
    /// `batch_size` below 1 fails with [`CursorError::InvalidBatchSize`]
    /// before anything is sent to the connection.
    pub async fn open<'a, C: CursorConnection>(
        &'a self,
        conn: &'a mut C,
        batch_size: i64,
    ) -> CursorResult<Cursor<'a, C, M>> {
        let batch_size = validate_batch_size(batch_size)?;
        let guard = TransactionGuard::enter(&mut *conn).await?;
        let name = self.cursor_name().clone();

        if let Err(err) = CursorProtocol::declare(&mut *conn, &name, &self.statement).await {
            rollback_quietly(guard, &mut *conn, &name).await;
            return Err(err);
        }

        Ok(Cursor {
            conn,
            session: self,
            sequence: BatchSequence::new(name, batch_size),
            guard: Some(guard),
            pending: VecDeque::new(),
        })
    }

    /// Single-record streaming: `fetch forward 1` per record.
    pub async fn stream<'a, C: CursorConnection>(
        &'a self,
        conn: &'a mut C,
    ) -> CursorResult<Cursor<'a, C, M>> {
        self.open(conn, 1).await
    }

    /// Open with the configured batch size.
    pub async fn batches<'a, C: CursorConnection>(
        &'a self,
        conn: &'a mut C,
    ) -> CursorResult<Cursor<'a, C, M>> {
        self.open(conn, self.config.batch_size).await
    }

    /// Call `f` for every record, in cursor order.
    ///
    /// `f` receives the connection so it can open nested sessions; they join
    /// this session's transaction. An error from `f` or from the mapper rolls
    /// back (when this session owns the transaction) and is returned as is:
    /// mapper errors go through `E::from`, never through [`CursorError`].
    pub async fn each_record<C, E, F>(&self, conn: &mut C, mut f: F) -> Result<(), E>
    where
        C: CursorConnection,
        E: From<CursorError> + From<M::Error>,
        F: AsyncFnMut(&mut C, M::Record) -> Result<(), E>,
    {
        let mut cursor = match self.stream(conn).await {
            Ok(cursor) => cursor,
            Err(err) => return Err(<E as From<CursorError>>::from(err)),
        };
        loop {
            let record = match cursor.next_record().await {
                Ok(Some(record)) => record,
                Ok(None) => return Ok(()),
                Err(err) => return Err(err.into_error()),
            };
            if let Err(err) = f(cursor.connection(), record).await {
                cursor.abort_quietly().await;
                return Err(err);
            }
        }
    }

    /// Call `f` once per non-empty batch of at most `batch_size` records.
    ///
    /// Batches are contiguous: concatenated, they are exactly the result set.
    pub async fn each_batch<C, E, F>(&self, conn: &mut C, batch_size: i64, mut f: F) -> Result<(), E>
    where
        C: CursorConnection,
        E: From<CursorError> + From<M::Error>,
        F: AsyncFnMut(&mut C, Vec<M::Record>) -> Result<(), E>,
    {
        let mut cursor = match self.open(conn, batch_size).await {
            Ok(cursor) => cursor,
            Err(err) => return Err(<E as From<CursorError>>::from(err)),
        };
        loop {
            let batch = match cursor.next_batch().await {
                Ok(Some(batch)) => batch,
                Ok(None) => return Ok(()),
                Err(err) => return Err(err.into_error()),
            };
            if let Err(err) = f(cursor.connection(), batch).await {
                cursor.abort_quietly().await;
                return Err(err);
            }
        }
    }
}

/// One declared cursor, borrowed from its session and connection.
///
/// Reaching the end through [`next_record`](Cursor::next_record) or
/// [`next_batch`](Cursor::next_batch) closes the cursor and commits. Any
/// error returned by them has already rolled back. A cursor abandoned
/// early should be released with [`abort`](Cursor::abort) or
/// [`finish`](Cursor::finish). Dropping it instead leaves the transaction
/// open until the next session on the connection rolls it back.
pub struct Cursor<'a, C: CursorConnection, M: RecordMapper> {
    conn: &'a mut C,
    session: &'a CursorSession<M>,
    sequence: BatchSequence,
    guard: Option<TransactionGuard>,
    pending: VecDeque<Row>,
}

impl<'a, C: CursorConnection, M: RecordMapper> Cursor<'a, C, M> {
    pub fn name(&self) -> &CursorName {
        self.sequence.name()
    }

    /// Whether the cursor has been closed (or discarded) and the transaction
    /// finalized.
    pub fn is_released(&self) -> bool {
        self.guard.is_none()
    }

    /// The connection, for nested sessions between fetches.
    pub fn connection(&mut self) -> &mut C {
        &mut *self.conn
    }

    /// Next record, fetching a new batch when the buffered one is used up.
    pub async fn next_record(&mut self) -> Result<Option<M::Record>, RecordError<M::Error>> {
        if self.pending.is_empty() {
            match self.fetch().await? {
                Some(rows) => self.pending.extend(rows),
                None => return Ok(None),
            }
        }
        match self.pending.pop_front() {
            Some(row) => self.map_row(row).await.map(Some),
            None => Ok(None),
        }
    }

    /// Next batch of records. Records already buffered by
    /// [`next_record`](Cursor::next_record) are returned first.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<M::Record>>, RecordError<M::Error>> {
        let rows: Vec<Row> = if self.pending.is_empty() {
            match self.fetch().await? {
                Some(rows) => rows,
                None => return Ok(None),
            }
        } else {
            self.pending.drain(..).collect()
        };

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(self.map_row(row).await?);
        }
        Ok(Some(records))
    }

    /// Release the cursor. Commits when the cursor was fully consumed,
    /// otherwise rolls back like [`abort`](Cursor::abort).
    pub async fn finish(mut self) -> CursorResult<()> {
        if self.sequence.is_terminated() && self.pending.is_empty() {
            self.complete().await
        } else {
            self.abort_inner().await
        }
    }

    /// Stop early: roll back (when owned) without closing the cursor.
    pub async fn abort(mut self) -> CursorResult<()> {
        self.abort_inner().await
    }

    async fn abort_inner(&mut self) -> CursorResult<()> {
        match self.guard.take() {
            Some(guard) => {
                tracing::debug!(cursor = %self.sequence.name(), "aborting cursor");
                guard.fail(&mut *self.conn).await
            }
            None => Ok(()),
        }
    }

    async fn abort_quietly(mut self) {
        if let Err(err) = self.abort_inner().await {
            tracing::error!(cursor = %self.sequence.name(), error = %err, "rollback failed");
        }
    }

    async fn fetch(&mut self) -> CursorResult<Option<Vec<Row>>> {
        if self.guard.is_none() {
            return Ok(None);
        }
        match self.sequence.next(&mut *self.conn).await {
            Ok(Some(rows)) => Ok(Some(rows)),
            Ok(None) => {
                self.complete().await?;
                Ok(None)
            }
            Err(err) => {
                self.release_on_failure().await;
                Err(err)
            }
        }
    }

    async fn map_row(&mut self, row: Row) -> Result<M::Record, RecordError<M::Error>> {
        match self.session.mapper.map(row) {
            Ok(record) => Ok(record),
            Err(err) => {
                self.release_on_failure().await;
                Err(RecordError::Mapper(err))
            }
        }
    }

    /// Close and commit. A failed close rolls back instead.
    async fn complete(&mut self) -> CursorResult<()> {
        let Some(guard) = self.guard.take() else {
            return Ok(());
        };
        let name = self.sequence.name();
        if let Err(err) = CursorProtocol::close(&mut *self.conn, name).await {
            rollback_quietly(guard, &mut *self.conn, name).await;
            return Err(err);
        }
        guard.succeed(&mut *self.conn).await
    }

    async fn release_on_failure(&mut self) {
        self.pending.clear();
        if let Some(guard) = self.guard.take() {
            rollback_quietly(guard, &mut *self.conn, self.sequence.name()).await;
        }
    }
}

impl<C: CursorConnection, M: RecordMapper> Drop for Cursor<'_, C, M> {
    fn drop(&mut self) {
        if self.guard.is_some() {
            tracing::warn!(
                cursor = %self.sequence.name(),
                "cursor dropped without finish or abort; rolling back on next use"
            );
        }
    }
}

/// Roll back on behalf of an error that is already being returned.
async fn rollback_quietly<C: CursorConnection>(
    guard: TransactionGuard,
    conn: &mut C,
    name: &CursorName,
) {
    if let Err(err) = guard.fail(conn).await {
        tracing::error!(cursor = %name, error = %err, "rollback failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnection;
    use crate::row::RowMapper;
    use crate::value::SqlValue;
    use pretty_assertions::assert_eq;

    fn numbers(n: i64) -> MemoryConnection {
        let mut conn = MemoryConnection::new();
        for sql in ["select * from numbers", "select * from numbers order by n"] {
            conn.add_result(sql, &["n"], (1..=n).map(|i| vec![SqlValue::Int(i)]));
        }
        conn
    }

    fn session() -> CursorSession<RowMapper> {
        Statement::new("select * from numbers order by n").cursor()
    }

    fn n(row: &Row) -> i64 {
        row.get("n").and_then(SqlValue::as_i64).unwrap()
    }

    #[test]
    fn test_cursor_name_is_stable() {
        let session = session();
        let first = session.cursor_name().clone();
        assert_eq!(session.cursor_name(), &first);
    }

    #[tokio::test]
    async fn test_manual_iteration_commits_on_exhaustion() {
        let mut conn = numbers(3);
        let session = session();
        let mut cursor = session.stream(&mut conn).await.unwrap();
        let mut seen = Vec::new();
        while let Some(row) = cursor.next_record().await.unwrap() {
            seen.push(n(&row));
        }
        assert!(cursor.is_released());
        cursor.finish().await.unwrap();

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(conn.query_log().count("commit"), 1);
        assert_eq!(conn.transaction_depth().get(), 0);
    }

    #[tokio::test]
    async fn test_records_from_larger_batches() {
        let mut conn = numbers(5);
        let session = session();
        let mut cursor = session.open(&mut conn, 2).await.unwrap();
        let mut seen = Vec::new();
        while let Some(row) = cursor.next_record().await.unwrap() {
            seen.push(n(&row));
        }
        drop(cursor);
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert_eq!(conn.query_log().count("fetch forward 2"), 3);
    }

    #[tokio::test]
    async fn test_abort_rolls_back_without_close() {
        let mut conn = numbers(3);
        let session = session();
        let mut cursor = session.stream(&mut conn).await.unwrap();
        cursor.next_record().await.unwrap();
        cursor.abort().await.unwrap();

        assert_eq!(conn.query_log().count("close"), 0);
        assert_eq!(conn.query_log().count("rollback"), 1);
        assert_eq!(conn.transaction_depth().get(), 0);
        assert!(!conn.in_transaction());
    }

    #[tokio::test]
    async fn test_finish_before_exhaustion_rolls_back() {
        let mut conn = numbers(3);
        let session = session();
        let mut cursor = session.open(&mut conn, 2).await.unwrap();
        cursor.next_batch().await.unwrap();
        cursor.finish().await.unwrap();
        assert_eq!(conn.query_log().count("rollback"), 1);
        assert_eq!(conn.query_log().count("commit"), 0);
    }

    #[tokio::test]
    async fn test_close_failure_rolls_back() {
        let mut conn = numbers(2);
        conn.fail_on("close", "connection reset by peer");
        let session = session();
        let mut cursor = session.open(&mut conn, 5).await.unwrap();
        assert_eq!(cursor.next_batch().await.unwrap().unwrap().len(), 2);
        let err = cursor.next_batch().await.unwrap_err();
        assert!(matches!(
            err,
            RecordError::Cursor(CursorError::Protocol {
                op: crate::error::CursorOp::Close,
                ..
            })
        ));
        drop(cursor);
        assert_eq!(conn.query_log().count("commit"), 0);
        assert_eq!(conn.query_log().count("rollback"), 1);
        assert_eq!(conn.transaction_depth().get(), 0);
    }

    #[tokio::test]
    async fn test_mapper_error_rolls_back() {
        let mut conn = numbers(3);
        let session = Statement::new("select * from numbers").cursor_with(|row: Row| {
            if n(&row) == 2 {
                Err(std::io::Error::other("bad row"))
            } else {
                Ok(n(&row))
            }
        });
        let mut cursor = session.stream(&mut conn).await.unwrap();
        assert_eq!(cursor.next_record().await.unwrap(), Some(1));
        let err = cursor.next_record().await.unwrap_err();
        assert_eq!(err.mapper_error().map(|e| e.to_string()), Some("bad row".to_string()));
        assert!(cursor.is_released());
        drop(cursor);
        assert_eq!(conn.query_log().count("rollback"), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let result = session().with_config(CursorConfig::default().name_prefix("1bad"));
        assert!(matches!(result, Err(CursorError::Config(_))));

        let session = session()
            .with_config(CursorConfig::default().name_prefix("export_").batch_size(4))
            .unwrap();
        assert!(session.cursor_name().as_str().starts_with("export_"));

        let mut conn = numbers(4);
        let mut cursor = session.batches(&mut conn).await.unwrap();
        assert_eq!(cursor.next_batch().await.unwrap().unwrap().len(), 4);
        assert!(cursor.next_batch().await.unwrap().is_none());
    }
}
