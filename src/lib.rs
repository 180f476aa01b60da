//! # pgcursors: server-side cursor streaming
//!
//! > **Walk huge result sets without holding them in memory.**
//!
//! `pgcursors` drives a PostgreSQL cursor (`declare` / `fetch forward` /
//! `close`) inside a transaction and hands you one record or one batch at a
//! time. The cursor always runs inside a transaction, it is closed when
//! consumption finishes, and the transaction is rolled back if anything
//! fails on the way.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use pgcursors::prelude::*;
//!
//! let mut conn = PgCursorConnection::connect("postgres://localhost/app").await?;
//! let users = Statement::new("select * from users where active = $1")
//!     .bind(true)
//!     .cursor();
//!
//! users
//!     .each_batch(&mut conn, 1000, async |_conn, rows| {
//!         println!("{} rows", rows.len());
//!         Ok::<_, anyhow::Error>(())
//!     })
//!     .await?;
//! ```
//!
//! ## Nesting
//!
//! Callbacks get the connection back, so a second cursor can be opened
//! while the first is being read. The inner session joins the outer
//! transaction; only the outermost session commits or rolls back.
//!
//! ## Statements
//!
//! | Step        | SQL                                |
//! |-------------|------------------------------------|
//! | acquire     | `begin` (outermost only)           |
//! | declare     | `declare <name> cursor for <sql>`  |
//! | fetch       | `fetch forward <n> from <name>`    |
//! | release     | `close <name>` + `commit`          |
//! | on failure  | `rollback` (outermost only)        |

pub mod batch;
pub mod config;
pub mod connection;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod name;
pub mod postgres;
pub mod protocol;
pub mod row;
pub mod session;
pub mod statement;
pub mod transaction;
pub mod value;

pub use config::CursorConfig;
pub use connection::{CursorConnection, TransactionDepth};
pub use error::{CursorError, CursorResult, RecordError};
pub use row::{JsonMapper, RecordMapper, Row, RowMapper};
pub use session::{Cursor, CursorSession};
pub use statement::Statement;
pub use value::SqlValue;

pub mod prelude {
    pub use crate::batch::BatchSequence;
    pub use crate::config::CursorConfig;
    pub use crate::connection::{CursorConnection, TransactionDepth};
    pub use crate::error::*;
    #[cfg(any(test, feature = "testing"))]
    pub use crate::memory::MemoryConnection;
    pub use crate::name::{CursorName, CursorNameGenerator};
    pub use crate::postgres::PgCursorConnection;
    pub use crate::protocol::CursorProtocol;
    pub use crate::row::{JsonMapper, RecordMapper, Row, RowMapper};
    pub use crate::session::{Cursor, CursorSession};
    pub use crate::statement::Statement;
    pub use crate::transaction::TransactionGuard;
    pub use crate::value::SqlValue;
}
