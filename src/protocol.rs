//! The declare / fetch forward / close statements.

use crate::connection::CursorConnection;
use crate::error::{CursorError, CursorOp, CursorResult};
use crate::name::CursorName;
use crate::row::Row;
use crate::statement::Statement;
use std::num::NonZeroUsize;

/// `declare <name> cursor for <sql>`
pub fn declare_sql(name: &CursorName, sql: &str) -> String {
    format!("declare {} cursor for {}", name, sql)
}

/// `fetch forward <count> from <name>`
pub fn fetch_sql(name: &CursorName, count: NonZeroUsize) -> String {
    format!("fetch forward {} from {}", count, name)
}

/// `close <name>`
pub fn close_sql(name: &CursorName) -> String {
    format!("close {}", name)
}

/// Issues cursor statements on a connection. Every failure is a
/// [`CursorError::Protocol`]; nothing is retried.
pub struct CursorProtocol;

impl CursorProtocol {
    /// Declare `name` over the statement, passing its bindings positionally.
    pub async fn declare<C: CursorConnection>(
        conn: &mut C,
        name: &CursorName,
        statement: &Statement,
    ) -> CursorResult<()> {
        let sql = declare_sql(name, statement.sql());
        tracing::debug!(cursor = %name, bindings = statement.bindings().len(), "declare cursor");
        conn.execute(&sql, statement.bindings())
            .await
            .map_err(|e| CursorError::protocol(CursorOp::Declare, e.to_string()))
    }

    /// Fetch up to `count` rows. A short (or empty) result is the only
    /// end-of-cursor signal.
    pub async fn fetch_forward<C: CursorConnection>(
        conn: &mut C,
        name: &CursorName,
        count: NonZeroUsize,
    ) -> CursorResult<Vec<Row>> {
        let rows = conn
            .select(&fetch_sql(name, count), &[])
            .await
            .map_err(|e| CursorError::protocol(CursorOp::Fetch, e.to_string()))?;
        if rows.len() > count.get() {
            return Err(CursorError::protocol(
                CursorOp::Fetch,
                format!("requested {} rows, connection returned {}", count, rows.len()),
            ));
        }
        tracing::debug!(cursor = %name, count = count.get(), rows = rows.len(), "fetch forward");
        Ok(rows)
    }

    /// The legacy single-row form, `fetch forward 1`.
    pub async fn fetch_next<C: CursorConnection>(
        conn: &mut C,
        name: &CursorName,
    ) -> CursorResult<Option<Row>> {
        let rows = Self::fetch_forward(conn, name, NonZeroUsize::MIN).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn close<C: CursorConnection>(conn: &mut C, name: &CursorName) -> CursorResult<()> {
        tracing::debug!(cursor = %name, "close cursor");
        conn.execute(&close_sql(name), &[])
            .await
            .map_err(|e| CursorError::protocol(CursorOp::Close, e.to_string()))
    }
}
