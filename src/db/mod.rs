//! Database access for PostgreSQL
//!
//! Connection handling and statement execution. Schema introspection lives in
//! [`crate::catalog`].

pub mod connection;
pub mod executor;

pub use connection::ConnectionFactory;
pub use executor::{PgExecutor, StatementExecutor};
