//! ADBC-RTDB: Arrow Database Connectivity driver for the RTDB time-series
//! database.
//!
//! The driver talks to the server through the native RTDB client library
//! (`libtsdb`). It offers two surfaces over the same connection machinery:
//!
//! - the ADBC Core API (`RtdbDriver` -> `RtdbDatabase` -> `RtdbConnection` ->
//!   `RtdbStatement`), streaming results as Arrow record batches
//! - a row API (`open`, `RtdbConnection::query`, `Rows::next`) returning typed
//!   [`Value`]s one row at a time
//!
//! The native client has no parameter binding. Positional `?` arguments are
//! rendered as SQL literals and substituted into the query text.
//!
//! # Quick Start
//!
//! ```ignore
//! use adbc_core::{Connection, Database, Driver, Statement};
//! use adbc_core::options::{OptionDatabase, OptionValue};
//!
//! let mut driver = adbc_rtdb::RtdbDriver::default();
//! let mut db = driver.new_database()?;
//! db.set_option(
//!     OptionDatabase::Uri,
//!     OptionValue::String("root:secret@tcp(127.0.0.1:9000)/plant".to_string()),
//! )?;
//!
//! let mut conn = db.new_connection()?;
//! let mut stmt = conn.new_statement()?;
//! stmt.set_sql_query("SELECT name, value FROM sensors")?;
//! for batch in stmt.execute()? {
//!     println!("Got {} rows", batch?.num_rows());
//! }
//! ```
//!
//! # Row API
//!
//! ```ignore
//! let conn = adbc_rtdb::open("root:secret@tcp(127.0.0.1:9000)/plant?loc=Asia%2FShanghai")?;
//! let mut rows = conn.query("SELECT name FROM sensors WHERE site = ?", &["north".into()])?;
//! while let Ok(row) = rows.next_row() {
//!     println!("{:?}", row);
//! }
//! conn.close()?;
//! ```
//!
//! # Module Structure
//!
//! - [`driver`]: Entry points for creating databases and connections
//! - [`database`]: DSN and credential options, client factory
//! - [`connection`]: Session state, query dispatch, cancellation
//! - [`statement`]: ADBC statements with single-row parameter binding
//! - [`reader`]: Arrow RecordBatch streaming
//! - [`rows`]: Row cursor over one result set
//! - [`dsn`]: Connection string parsing
//! - [`format`]: Literal rendering and placeholder substitution
//! - [`row`]: Row span layout and decoding
//! - [`adapter`]: Native call sequencing and lifecycle state
//! - [`native`]: The native client seam, FFI bindings and a scripted mock
//! - [`error`]: Error types

pub mod adapter;
pub mod connection;
pub mod context;
pub mod database;
pub mod driver;
pub mod dsn;
pub mod error;
pub mod format;
pub mod native;
pub mod reader;
pub mod row;
pub mod rows;
pub mod statement;
pub mod types;

// Re-export main types for convenience
pub use adapter::{ExecResult, Status};
pub use connection::RtdbConnection;
pub use context::{CancelReason, Context};
pub use database::{ClientFactory, RtdbDatabase};
pub use driver::{RtdbDriver, open};
pub use dsn::{Config, Location, parse_dsn};
pub use error::{ErrorKind, NativeError, Result, RtdbError};
pub use rows::Rows;
pub use statement::RtdbStatement;
pub use types::{FieldDescriptor, FieldType, Value};
