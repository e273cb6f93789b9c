//! The call surface of the native RTDB client library.
//!
//! The driver never touches native memory directly. Everything it needs goes
//! through [`NativeClient`], which hands back owned copies of field metadata
//! and rows. `ffi::FfiClient` binds the real library and `mock::MockClient`
//! is an in-memory stand-in for tests.

#[cfg(feature = "ffi")]
pub mod ffi;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

use crate::row::RowBuf;
use crate::types::FieldDescriptor;

/// Status returned by a successful native call.
pub const STATUS_OK: i32 = 0;
/// Invalid arguments.
pub const EINVAL: i32 = 22;
/// Access denied.
pub const EACCES: i32 = 13;
/// Allocation failure.
pub const ENOMEM: i32 = 12;
/// Protocol failure.
pub const EPROTO: i32 = 71;

/// Opaque handle to a result set stored by the native client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultHandle(usize);

impl ResultHandle {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> usize {
        self.0
    }
}

/// Opaque handle to one link of a native row list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowLink(usize);

impl RowLink {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> usize {
        self.0
    }
}

/// Shape of a stored result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultSummary {
    pub row_count: u64,
    pub field_count: u32,
    /// First link of the row list, `None` when the result has no rows.
    pub first_row: Option<RowLink>,
}

/// Field metadata as reported by the native client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    pub name: String,
    pub data_type: u8,
    pub is_null: u8,
    pub length: u8,
    pub real_length: u8,
}

/// One row copied out of the native row list.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeRow {
    pub row: RowBuf,
    /// Next link, `None` when this was the last row.
    pub next: Option<RowLink>,
}

/// Blocking calls into the native client library.
///
/// Status-returning methods return the raw native code, [`STATUS_OK`] on
/// success. Implementations own the underlying client handle until
/// [`release`](NativeClient::release) is called.
pub trait NativeClient: Send {
    /// Opens a session using a native connection string.
    fn connect(&mut self, conn_str: &str) -> i32;

    fn disconnect(&mut self) -> i32;

    /// Sends query text to the server.
    fn query(&mut self, sql: &str, charset: &str, database: &str) -> i32;

    /// Stores the result of the last query. `None` means there is no result.
    fn store_result(&mut self) -> Option<(ResultHandle, ResultSummary)>;

    /// Fetches field metadata for the last query. `None` or an empty vector
    /// means no metadata is available.
    fn fetch_fields(&mut self) -> Option<Vec<RawField>>;

    /// Copies the row at `link` out of `result`.
    fn read_row(
        &mut self,
        result: ResultHandle,
        link: RowLink,
        fields: &[FieldDescriptor],
    ) -> Option<NativeRow>;

    /// Rows affected by the last statement.
    fn affected_rows(&mut self) -> u64;

    fn free_result(&mut self, result: ResultHandle) -> i32;

    /// Destroys the native client handle. Must be called at most once.
    fn release(&mut self);

    /// Character set the native client is configured with.
    fn charset(&mut self) -> String;
}
