//! Compiled statements: SQL text plus positional bindings.

use crate::row::{RecordMapper, RowMapper};
use crate::session::CursorSession;
use crate::value::SqlValue;

/// A parameterized SQL statement.
///
/// The SQL is passed through to `declare ... cursor for` untouched, so
/// placeholders must use the driver's positional syntax (`$1`, `$2`, ...).
///
/// # Example
///
/// ```
/// use pgcursors::Statement;
///
/// let stmt = Statement::new("select * from cursor_models where name = $1").bind("Foo");
/// assert_eq!(stmt.bindings().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    sql: String,
    bindings: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    /// Bind a value (auto-detect type from common types).
    pub fn bind<T: Into<SqlValue>>(mut self, value: T) -> Self {
        self.bindings.push(value.into());
        self
    }

    /// Bind a boolean value.
    pub fn bind_bool(self, value: bool) -> Self {
        self.bind(value)
    }

    /// Bind an integer value.
    pub fn bind_int(self, value: i64) -> Self {
        self.bind(value)
    }

    /// Bind a float value.
    pub fn bind_float(self, value: f64) -> Self {
        self.bind(value)
    }

    /// Bind a string value.
    pub fn bind_str(self, value: &str) -> Self {
        self.bind(value)
    }

    /// Bind SQL `NULL`.
    pub fn bind_null(mut self) -> Self {
        self.bindings.push(SqlValue::Null);
        self
    }

    /// Append a binding in place, for builders that hold a `&mut Statement`.
    pub fn push_binding(&mut self, value: impl Into<SqlValue>) {
        self.bindings.push(value.into());
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bindings(&self) -> &[SqlValue] {
        &self.bindings
    }

    /// Build a cursor session yielding raw rows.
    pub fn cursor(&self) -> CursorSession<RowMapper> {
        CursorSession::new(self, RowMapper)
    }

    /// Build a cursor session yielding records produced by `mapper`.
    pub fn cursor_with<M: RecordMapper>(&self, mapper: M) -> CursorSession<M> {
        CursorSession::new(self, mapper)
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Statement::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::new(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_keep_order() {
        let stmt = Statement::new("select * from t where a = $1 and b = $2 and c = $3")
            .bind_int(1)
            .bind_str("two")
            .bind_null();
        assert_eq!(
            stmt.bindings(),
            &[
                SqlValue::Int(1),
                SqlValue::String("two".into()),
                SqlValue::Null
            ]
        );
    }

    #[test]
    fn test_session_takes_private_copy() {
        let mut stmt = Statement::new("select * from t where a = $1").bind(1);
        let session = stmt.cursor();
        stmt.push_binding(2);
        assert_eq!(session.statement().bindings(), &[SqlValue::Int(1)]);
    }
}
