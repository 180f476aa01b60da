//! In-process connection for tests.
//!
//! `MemoryConnection` does not evaluate SQL. Queries are answered from
//! result sets registered up front, keyed by their SQL text (and optionally
//! their bindings). On top of that it runs the statements the cursor engine
//! generates, with PostgreSQL's rules:
//!
//! - `declare <name> cursor for <query>` (only inside a transaction)
//! - `fetch forward <n> from <name>`
//! - `close <name>`
//! - `begin` / `commit` / `rollback`, where ending a transaction drops its
//!   cursors and an error inside a transaction aborts it until rollback.
//!
//! Every statement, including transaction control, is appended to a
//! [`QueryLog`].

use crate::connection::{CursorConnection, TransactionDepth};
use crate::row::Row;
use crate::value::SqlValue;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MemoryError(pub String);

impl MemoryError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// One executed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedQuery {
    pub sql: String,
    pub bindings: Vec<SqlValue>,
}

/// Statements in execution order.
#[derive(Debug, Clone, Default)]
pub struct QueryLog(Vec<LoggedQuery>);

impl QueryLog {
    pub fn entries(&self) -> &[LoggedQuery] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LoggedQuery> {
        self.0.get(index)
    }

    pub fn sql(&self) -> Vec<String> {
        self.0.iter().map(|q| q.sql.clone()).collect()
    }

    /// Number of statements starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.0.iter().filter(|q| q.sql.starts_with(prefix)).count()
    }
}

#[derive(Debug, Clone)]
struct ResultSet {
    sql: String,
    bindings: Option<Vec<SqlValue>>,
    columns: Arc<[String]>,
    rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    fn to_rows(&self) -> Vec<Row> {
        self.rows
            .iter()
            .map(|values| Row::new(self.columns.clone(), values.clone()))
            .collect()
    }
}

#[derive(Debug)]
struct OpenCursor {
    columns: Arc<[String]>,
    rows: VecDeque<Vec<SqlValue>>,
}

#[derive(Debug, Default)]
pub struct MemoryConnection {
    results: Vec<ResultSet>,
    cursors: HashMap<String, OpenCursor>,
    in_transaction: bool,
    aborted: bool,
    failures: Vec<(String, String)>,
    log: QueryLog,
    depth: TransactionDepth,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with `rows`, whatever it is bound to.
    ///
    /// # Panics
    ///
    /// If a row does not have one value per column.
    pub fn add_result<I>(&mut self, sql: &str, columns: &[&str], rows: I)
    where
        I: IntoIterator<Item = Vec<SqlValue>>,
    {
        self.register(sql, None, columns, rows);
    }

    /// Answer `sql` with `rows` when it is bound to exactly `bindings`.
    /// Takes precedence over [`add_result`](Self::add_result).
    ///
    /// # Panics
    ///
    /// If a row does not have one value per column.
    pub fn add_result_for<I>(&mut self, sql: &str, bindings: &[SqlValue], columns: &[&str], rows: I)
    where
        I: IntoIterator<Item = Vec<SqlValue>>,
    {
        self.register(sql, Some(bindings.to_vec()), columns, rows);
    }

    fn register<I>(&mut self, sql: &str, bindings: Option<Vec<SqlValue>>, columns: &[&str], rows: I)
    where
        I: IntoIterator<Item = Vec<SqlValue>>,
    {
        let columns: Arc<[String]> = columns.iter().map(|c| c.to_string()).collect();
        let rows: Vec<Vec<SqlValue>> = rows.into_iter().collect();
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(
                row.len(),
                columns.len(),
                "row {} of {:?} has {} values for {} columns",
                i,
                sql,
                row.len(),
                columns.len()
            );
        }
        self.results.retain(|r| !(r.sql == sql && r.bindings == bindings));
        self.results.push(ResultSet {
            sql: sql.to_string(),
            bindings,
            columns,
            rows,
        });
    }

    /// Make every statement starting with `prefix` fail with `message`.
    pub fn fail_on(&mut self, prefix: &str, message: &str) {
        self.failures.push((prefix.to_string(), message.to_string()));
    }

    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    pub fn query_log(&self) -> &QueryLog {
        &self.log
    }

    pub fn flush_query_log(&mut self) {
        self.log = QueryLog::default();
    }

    /// Whether a transaction is open at the database level.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.len()
    }

    fn record(&mut self, sql: &str, params: &[SqlValue]) -> Result<(), MemoryError> {
        self.log.0.push(LoggedQuery {
            sql: sql.to_string(),
            bindings: params.to_vec(),
        });
        if let Some((_, message)) = self.failures.iter().find(|(p, _)| sql.starts_with(p.as_str())) {
            return Err(MemoryError::new(message.clone()));
        }
        Ok(())
    }

    /// Run a statement inside the transaction rules: an error marks an open
    /// transaction aborted, and an aborted transaction rejects everything.
    fn run<T>(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        f: impl FnOnce(&mut Self) -> Result<T, MemoryError>,
    ) -> Result<T, MemoryError> {
        let result = self.record(sql, params).and_then(|_| {
            if self.aborted {
                Err(MemoryError::new(
                    "current transaction is aborted, commands ignored until end of transaction block",
                ))
            } else {
                f(self)
            }
        });
        if result.is_err() && self.in_transaction {
            self.aborted = true;
        }
        result
    }

    fn end_transaction(&mut self) {
        self.in_transaction = false;
        self.aborted = false;
        self.cursors.clear();
    }

    fn lookup(&self, sql: &str, params: &[SqlValue]) -> Result<&ResultSet, MemoryError> {
        let exact = self
            .results
            .iter()
            .find(|r| r.sql == sql && r.bindings.as_deref() == Some(params));
        exact
            .or_else(|| self.results.iter().find(|r| r.sql == sql && r.bindings.is_none()))
            .ok_or_else(|| MemoryError::new(format!("no result set registered for \"{}\"", sql)))
    }

    fn declare(&mut self, name: &str, query: &str, params: &[SqlValue]) -> Result<(), MemoryError> {
        if !self.in_transaction {
            return Err(MemoryError::new(
                "DECLARE CURSOR can only be used in transaction blocks",
            ));
        }
        let name = name.to_lowercase();
        if self.cursors.contains_key(&name) {
            return Err(MemoryError::new(format!("cursor \"{}\" already exists", name)));
        }
        let result = self.lookup(query, params)?;
        let cursor = OpenCursor {
            columns: result.columns.clone(),
            rows: result.rows.iter().cloned().collect(),
        };
        self.cursors.insert(name, cursor);
        Ok(())
    }

    fn fetch(&mut self, count: &str, name: &str) -> Result<Vec<Row>, MemoryError> {
        let count: usize = count
            .parse()
            .map_err(|_| MemoryError::new(format!("invalid fetch count \"{}\"", count)))?;
        let name = name.to_lowercase();
        let cursor = self
            .cursors
            .get_mut(&name)
            .ok_or_else(|| MemoryError::new(format!("cursor \"{}\" does not exist", name)))?;
        let take = count.min(cursor.rows.len());
        Ok(cursor
            .rows
            .drain(..take)
            .map(|values| Row::new(cursor.columns.clone(), values))
            .collect())
    }

    fn close(&mut self, name: &str) -> Result<(), MemoryError> {
        let name = name.to_lowercase();
        self.cursors
            .remove(&name)
            .map(|_| ())
            .ok_or_else(|| MemoryError::new(format!("cursor \"{}\" does not exist", name)))
    }
}

impl CursorConnection for MemoryConnection {
    type Error = MemoryError;

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<(), MemoryError> {
        self.run(sql, params, |conn| {
            if let Some((name, query)) = sql
                .strip_prefix("declare ")
                .and_then(|rest| rest.split_once(" cursor for "))
            {
                conn.declare(name, query, params)
            } else if let Some(name) = sql.strip_prefix("close ") {
                conn.close(name)
            } else {
                Err(MemoryError::new(format!("unsupported statement: {}", sql)))
            }
        })
    }

    async fn select(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, MemoryError> {
        self.run(sql, params, |conn| {
            match sql
                .strip_prefix("fetch forward ")
                .and_then(|rest| rest.split_once(" from "))
            {
                Some((count, name)) => conn.fetch(count, name),
                None => conn.lookup(sql, params).map(ResultSet::to_rows),
            }
        })
    }

    async fn begin(&mut self) -> Result<(), MemoryError> {
        self.record("begin", &[])?;
        if self.in_transaction {
            return Err(MemoryError::new("there is already a transaction in progress"));
        }
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), MemoryError> {
        self.record("commit", &[])?;
        if !self.in_transaction {
            return Err(MemoryError::new("there is no transaction in progress"));
        }
        let aborted = self.aborted;
        self.end_transaction();
        if aborted {
            // PostgreSQL answers COMMIT of a failed transaction with ROLLBACK.
            return Err(MemoryError::new("transaction was rolled back"));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), MemoryError> {
        self.record("rollback", &[])?;
        if !self.in_transaction {
            return Err(MemoryError::new("there is no transaction in progress"));
        }
        self.end_transaction();
        Ok(())
    }

    fn transaction_depth(&self) -> &TransactionDepth {
        &self.depth
    }
}
