//! Connection state machine over a [`NativeClient`].
//!
//! ```text
//! Disconnected -> Connected -> FetchingResult -> Exhausted
//!        \            \              \              \
//!         +------------+--------------+--------------+--> Closed
//! ```
//!
//! Lifecycle flags live in atomics so a `close` from one caller is visible to
//! an in-flight operation of another without taking the client lock. The
//! client itself, the retained result handle and the row cursor sit behind a
//! mutex; only one logical caller is expected to drive a connection at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::context::CancelReason;
use crate::error::{NativeError, Result, RtdbError};
use crate::native::{NativeClient, ResultHandle, RowLink};
use crate::row::decode_row;
use crate::types::{FieldDescriptor, Value};

/// Lifecycle status of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Disconnected = 1,
    Connected = 2,
    FetchingResult = 3,
    Exhausted = 4,
    Closed = 5,
}

impl Status {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Status::Disconnected,
            2 => Status::Connected,
            3 => Status::FetchingResult,
            4 => Status::Exhausted,
            _ => Status::Closed,
        }
    }
}

fn check(code: i32, wrap: fn(NativeError) -> RtdbError) -> Result<()> {
    match NativeError::from_code(code) {
        Some(err) => Err(wrap(err)),
        None => Ok(()),
    }
}

/// Owns the native client handle and the retained result handle.
///
/// Both releases are idempotent, and dropping the guard releases whatever is
/// still held.
pub struct ClientGuard {
    client: Option<Box<dyn NativeClient>>,
    result: Option<ResultHandle>,
}

impl ClientGuard {
    pub fn new(client: Box<dyn NativeClient>) -> Self {
        Self {
            client: Some(client),
            result: None,
        }
    }

    /// The native client, or a bad connection error once released.
    pub fn client(&mut self) -> Result<&mut dyn NativeClient> {
        match self.client.as_mut() {
            Some(client) => Ok(client.as_mut()),
            None => Err(RtdbError::bad_connection()),
        }
    }

    /// Takes ownership of a stored result. Any previously retained result is
    /// freed first.
    pub fn retain(&mut self, result: ResultHandle) -> Result<()> {
        let freed = self.free_result();
        self.result = Some(result);
        freed
    }

    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    /// Frees the retained result, if any. A second call is a no-op.
    pub fn free_result(&mut self) -> Result<()> {
        let Some(result) = self.result.take() else {
            return Ok(());
        };
        let Some(client) = self.client.as_mut() else {
            return Ok(());
        };
        check(client.free_result(result), RtdbError::query)
    }

    /// Frees the retained result and destroys the native client. A second
    /// call is a no-op.
    pub fn release(&mut self) {
        if let Err(e) = self.free_result() {
            warn!("Failed to free result during release: {}", e);
        }
        if let Some(mut client) = self.client.take() {
            client.release();
            debug!("Released native client handle");
        }
    }

    pub fn is_released(&self) -> bool {
        self.client.is_none()
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Position in the row list of the active result set.
struct Cursor {
    result: ResultHandle,
    next: Option<RowLink>,
    row_count: u64,
    generation: u64,
}

struct Inner {
    guard: ClientGuard,
    cursor: Option<Cursor>,
    fields: Option<Arc<[FieldDescriptor]>>,
    affected_rows: u64,
    insert_id: u64,
}

/// Outcome of a statement run without a result cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecResult {
    last_insert_id: i64,
    rows_affected: i64,
}

impl ExecResult {
    /// Always 0, the native client does not report generated ids.
    pub fn last_insert_id(&self) -> i64 {
        self.last_insert_id
    }

    pub fn rows_affected(&self) -> i64 {
        self.rows_affected
    }
}

/// State machine driving one native client.
pub struct Adapter {
    status: AtomicU8,
    closed: AtomicBool,
    // 0 = none, 1 = cancelled, 2 = deadline exceeded
    ctx_err: AtomicU8,
    generation: AtomicU64,
    inner: Mutex<Inner>,
}

impl Adapter {
    pub fn new(client: Box<dyn NativeClient>) -> Self {
        Self {
            status: AtomicU8::new(Status::Disconnected as u8),
            closed: AtomicBool::new(false),
            ctx_err: AtomicU8::new(0),
            generation: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                guard: ClientGuard::new(client),
                cursor: None,
                fields: None,
                affected_rows: 0,
                insert_id: 0,
            }),
        }
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: Status) {
        let previous = Status::from_u8(self.status.swap(status as u8, Ordering::AcqRel));
        if previous != status {
            debug!("Connection status {:?} -> {:?}", previous, status);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The cancellation observed on this connection, if any.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self.ctx_err.load(Ordering::Acquire) {
            1 => Some(CancelReason::Cancelled),
            2 => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Records an observed cancellation. Later operations fail with a bad
    /// connection error.
    pub fn record_cancel(&self, reason: CancelReason) {
        let code = match reason {
            CancelReason::Cancelled => 1,
            CancelReason::DeadlineExceeded => 2,
        };
        let _ = self
            .ctx_err
            .compare_exchange(0, code, Ordering::AcqRel, Ordering::Acquire);
        debug!("Connection observed cancellation: {}", reason);
    }

    /// Fails once the connection is closed or has observed a cancellation.
    pub fn check_usable(&self) -> Result<()> {
        if self.is_closed() || self.cancel_reason().is_some() {
            return Err(RtdbError::bad_connection());
        }
        Ok(())
    }

    /// Opens the native session.
    pub fn connect(&self, conn_str: &str) -> Result<()> {
        self.check_usable()?;
        let status = self.status();
        if status != Status::Disconnected {
            return Err(RtdbError::invalid_transition("connect", status));
        }
        let mut inner = self.inner.lock();
        check(inner.guard.client()?.connect(conn_str), RtdbError::connection)?;
        self.set_status(Status::Connected);
        Ok(())
    }

    /// Closes the native session, keeping the client handle for reuse.
    pub fn disconnect(&self) -> Result<()> {
        self.check_usable()?;
        let status = self.status();
        if status == Status::Disconnected {
            return Err(RtdbError::invalid_transition("disconnect", status));
        }
        let mut inner = self.inner.lock();
        self.reset_result(&mut inner);
        check(inner.guard.client()?.disconnect(), RtdbError::connection)?;
        self.set_status(Status::Disconnected);
        Ok(())
    }

    /// Drops the active result set, freeing its native handle.
    fn reset_result(&self, inner: &mut Inner) {
        inner.cursor = None;
        inner.fields = None;
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Err(e) = inner.guard.free_result() {
            warn!("Failed to free previous result: {}", e);
        }
    }

    fn run_query_locked(&self, inner: &mut Inner, sql: &str, charset: &str, database: &str) -> Result<()> {
        let status = self.status();
        match status {
            Status::Connected | Status::FetchingResult | Status::Exhausted => {}
            _ => return Err(RtdbError::invalid_transition("query", status)),
        }
        self.reset_result(inner);
        self.set_status(Status::Connected);
        debug!("Executing SQL: {}", sql);
        check(inner.guard.client()?.query(sql, charset, database), RtdbError::query)
    }

    /// Sends query text to the native client, superseding any active result.
    pub fn run_query(&self, sql: &str, charset: &str, database: &str) -> Result<()> {
        self.check_usable()?;
        let mut inner = self.inner.lock();
        self.run_query_locked(&mut inner, sql, charset, database)
    }

    /// Stores the result of the last query and positions a cursor on its
    /// first row.
    ///
    /// Returns the cursor generation, or `None` when the query produced no
    /// result set.
    pub fn fetch_result(&self) -> Result<Option<u64>> {
        self.check_usable()?;
        let status = self.status();
        match status {
            Status::Connected | Status::FetchingResult => {}
            _ => return Err(RtdbError::invalid_transition("fetch result", status)),
        }
        let mut inner = self.inner.lock();
        let Some((handle, summary)) = inner.guard.client()?.store_result() else {
            return Ok(None);
        };
        inner.guard.retain(handle)?;
        inner.affected_rows = summary.row_count;

        let generation = self.generation.load(Ordering::Acquire);
        inner.cursor = Some(Cursor {
            result: handle,
            next: summary.first_row,
            row_count: summary.row_count,
            generation,
        });
        self.set_status(if summary.first_row.is_some() {
            Status::FetchingResult
        } else {
            Status::Exhausted
        });
        debug!(
            "Stored result with {} rows and {} fields",
            summary.row_count, summary.field_count
        );
        Ok(Some(generation))
    }

    /// Runs a statement that produces no cursor and reports its row count.
    pub fn exec(&self, sql: &str, charset: &str, database: &str) -> Result<ExecResult> {
        self.check_usable()?;
        let mut inner = self.inner.lock();
        self.run_query_locked(&mut inner, sql, charset, database)?;
        if let Some((handle, _)) = inner.guard.client()?.store_result() {
            inner.guard.retain(handle)?;
        }
        let affected = inner.guard.client()?.affected_rows();
        inner.affected_rows = affected;
        Ok(ExecResult {
            last_insert_id: inner.insert_id as i64,
            rows_affected: affected as i64,
        })
    }

    fn fields_locked(inner: &mut Inner) -> Result<Arc<[FieldDescriptor]>> {
        if let Some(fields) = &inner.fields {
            return Ok(Arc::clone(fields));
        }
        let fields: Arc<[FieldDescriptor]> = inner
            .guard
            .client()?
            .fetch_fields()
            .unwrap_or_default()
            .into_iter()
            .map(FieldDescriptor::from)
            .collect();
        inner.fields = Some(Arc::clone(&fields));
        Ok(fields)
    }

    /// Field metadata of the active result set, fetched once per query.
    pub fn fields(&self, generation: u64) -> Result<Arc<[FieldDescriptor]>> {
        self.check_usable()?;
        let mut inner = self.inner.lock();
        Self::current_cursor(&inner, generation)?;
        Self::fields_locked(&mut inner)
    }

    /// Row count reported for the active result set.
    pub fn row_count(&self, generation: u64) -> Result<u64> {
        let inner = self.inner.lock();
        Ok(Self::current_cursor(&inner, generation)?.row_count)
    }

    fn current_cursor(inner: &Inner, generation: u64) -> Result<&Cursor> {
        match &inner.cursor {
            Some(cursor) if cursor.generation == generation => Ok(cursor),
            _ => Err(RtdbError::not_fetching()),
        }
    }

    /// Decodes the current row and moves the cursor to the next one.
    pub fn advance(&self, generation: u64) -> Result<Vec<Value>> {
        self.check_usable()?;
        let mut inner = self.inner.lock();
        let (result, link) = {
            let cursor = Self::current_cursor(&inner, generation)?;
            match cursor.next {
                Some(link) => (cursor.result, link),
                None => return Err(RtdbError::end_of_data()),
            }
        };
        let fields = Self::fields_locked(&mut inner)?;
        let row = inner
            .guard
            .client()?
            .read_row(result, link, &fields)
            .ok_or_else(|| RtdbError::query(NativeError::ProtocolError))?;
        let values = decode_row(&row.row, &fields)?;

        if let Some(cursor) = inner.cursor.as_mut() {
            cursor.next = row.next;
        }
        if row.next.is_none() {
            self.set_status(Status::Exhausted);
        }
        Ok(values)
    }

    /// Character set reported by the native client.
    pub fn charset(&self) -> Result<String> {
        self.check_usable()?;
        let mut inner = self.inner.lock();
        Ok(inner.guard.client()?.charset())
    }

    pub fn affected_rows(&self) -> u64 {
        self.inner.lock().affected_rows
    }

    /// Closes the connection for good.
    ///
    /// Disconnects an open session, frees the retained result and destroys
    /// the native client. Every step is attempted even if an earlier one
    /// fails; the first failure is returned. Later calls do nothing.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let previous = Status::from_u8(self.status.swap(Status::Closed as u8, Ordering::AcqRel));
        debug!("Closing connection (was {:?})", previous);

        let mut inner = self.inner.lock();
        inner.cursor = None;
        inner.fields = None;
        let mut first_err = None;

        if previous != Status::Disconnected
            && let Ok(client) = inner.guard.client()
            && let Err(e) = check(client.disconnect(), RtdbError::connection)
        {
            warn!("Native disconnect failed during close: {}", e);
            first_err = Some(e);
        }
        if let Err(e) = inner.guard.free_result() {
            warn!("Failed to free result during close: {}", e);
            first_err.get_or_insert(e);
        }
        inner.guard.release();

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mock::{CallLog, MockClient, raw_field};
    use crate::native::{EACCES, EINVAL, EPROTO};
    use crate::row::RowBuilder;
    use crate::types::FieldType;

    const SELECT: &str = "select id, name from t";

    fn scripted(rows: usize) -> MockClient {
        let rows = (0..rows)
            .map(|i| RowBuilder::new().push_i64(i as i64).push_text(&format!("n{}", i)).finish())
            .collect();
        MockClient::new().with_result(
            SELECT,
            vec![
                raw_field("id", FieldType::Int64, false),
                raw_field("name", FieldType::String, true),
            ],
            rows,
        )
    }

    fn connected(client: MockClient) -> (Adapter, Arc<CallLog>) {
        let log = client.call_log();
        let adapter = Adapter::new(Box::new(client));
        adapter.connect("user=u;passwd=p;servers=tcp://127.0.0.1:9000").unwrap();
        (adapter, log)
    }

    #[test]
    fn test_connect_transitions() {
        let (adapter, log) = connected(MockClient::new());
        assert_eq!(adapter.status(), Status::Connected);
        assert_eq!(log.count("connect"), 1);

        let err = adapter.connect("x").unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::error::ErrorKind::InvalidTransition { operation: "connect", status: Status::Connected }
        ));
    }

    #[test]
    fn test_connect_failure_stays_disconnected() {
        let adapter = Adapter::new(Box::new(MockClient::new().with_connect_status(EACCES)));
        let err = adapter.connect("x").unwrap_err();
        assert!(err.is_connection());
        assert_eq!(err.kind(), &crate::error::ErrorKind::Connection(NativeError::NoAccess));
        assert_eq!(adapter.status(), Status::Disconnected);
    }

    #[test]
    fn test_disconnect() {
        let (adapter, log) = connected(MockClient::new());
        adapter.disconnect().unwrap();
        assert_eq!(adapter.status(), Status::Disconnected);
        assert!(adapter.disconnect().is_err());
        assert_eq!(log.count("disconnect"), 1);
    }

    #[test]
    fn test_query_requires_connection() {
        let adapter = Adapter::new(Box::new(MockClient::new()));
        let err = adapter.run_query(SELECT, "", "").unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::error::ErrorKind::InvalidTransition { operation: "query", .. }
        ));
    }

    #[test]
    fn test_query_failure_is_query_error() {
        let (adapter, _) = connected(MockClient::new().with_query_error("bad", EINVAL));
        let err = adapter.run_query("bad", "", "").unwrap_err();
        assert!(err.is_query());
        assert_eq!(adapter.status(), Status::Connected);
    }

    #[test]
    fn test_fetch_cycle_until_exhausted() {
        let (adapter, log) = connected(scripted(3));
        adapter.run_query(SELECT, "utf-8", "db").unwrap();
        let generation = adapter.fetch_result().unwrap().unwrap();
        assert_eq!(adapter.status(), Status::FetchingResult);
        assert_eq!(adapter.row_count(generation).unwrap(), 3);

        for i in 0..3 {
            let row = adapter.advance(generation).unwrap();
            assert_eq!(row, vec![Value::Int64(i), Value::String(format!("n{}", i))]);
        }
        assert_eq!(adapter.status(), Status::Exhausted);
        assert!(adapter.advance(generation).unwrap_err().is_end_of_data());
        assert!(adapter.advance(generation).unwrap_err().is_end_of_data());

        // metadata is fetched once per query
        assert_eq!(log.count("fetch_fields"), 1);
        assert_eq!(log.count("read_row"), 3);
    }

    #[test]
    fn test_fetch_result_requires_connection() {
        let (adapter, log) = connected(scripted(1));
        adapter.run_query(SELECT, "", "").unwrap();
        adapter.disconnect().unwrap();
        let err = adapter.fetch_result().unwrap_err();
        assert!(matches!(
            err.kind(),
            crate::error::ErrorKind::InvalidTransition { status: Status::Disconnected, .. }
        ));
        assert_eq!(log.count("store_result"), 0);

        let fresh = Adapter::new(Box::new(scripted(1)));
        assert!(fresh.fetch_result().is_err());
    }

    #[test]
    fn test_fetch_without_result() {
        let (adapter, _) = connected(MockClient::new());
        adapter.run_query("select nothing", "", "").unwrap();
        assert_eq!(adapter.fetch_result().unwrap(), None);
        assert_eq!(adapter.status(), Status::Connected);
    }

    #[test]
    fn test_empty_result_is_exhausted() {
        let (adapter, _) = connected(scripted(0));
        adapter.run_query(SELECT, "", "").unwrap();
        let generation = adapter.fetch_result().unwrap().unwrap();
        assert_eq!(adapter.status(), Status::Exhausted);
        assert!(adapter.advance(generation).unwrap_err().is_end_of_data());
        assert_eq!(adapter.fields(generation).unwrap().len(), 2);
    }

    #[test]
    fn test_advance_before_fetch_is_not_fetching() {
        let (adapter, _) = connected(scripted(1));
        let err = adapter.advance(0).unwrap_err();
        assert_eq!(err.kind(), &crate::error::ErrorKind::NotFetching);
    }

    #[test]
    fn test_new_query_supersedes_result() {
        let (adapter, log) = connected(scripted(2));
        adapter.run_query(SELECT, "", "").unwrap();
        let first = adapter.fetch_result().unwrap().unwrap();
        adapter.advance(first).unwrap();

        adapter.run_query(SELECT, "", "").unwrap();
        assert_eq!(log.count("free_result"), 1);
        assert_eq!(adapter.status(), Status::Connected);
        let second = adapter.fetch_result().unwrap().unwrap();
        assert_ne!(first, second);
        assert_eq!(adapter.advance(first).unwrap_err().kind(), &crate::error::ErrorKind::NotFetching);
        assert_eq!(adapter.advance(second).unwrap()[0], Value::Int64(0));
        assert_eq!(log.count("fetch_fields"), 2);
    }

    #[test]
    fn test_exec_reports_affected_rows() {
        let (adapter, log) = connected(MockClient::new().with_affected_rows(7));
        let result = adapter.exec("insert into t values (1)", "", "").unwrap();
        assert_eq!(result.rows_affected(), 7);
        assert_eq!(result.last_insert_id(), 0);
        assert_eq!(adapter.status(), Status::Connected);
        assert_eq!(log.count("store_result"), 1);
        assert_eq!(log.count("fetch_fields"), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (adapter, log) = connected(scripted(2));
        adapter.run_query(SELECT, "", "").unwrap();
        let generation = adapter.fetch_result().unwrap().unwrap();

        adapter.close().unwrap();
        adapter.close().unwrap();
        assert_eq!(adapter.status(), Status::Closed);
        assert_eq!(log.count("disconnect"), 1);
        assert_eq!(log.count("free_result"), 1);
        assert_eq!(log.count("release"), 1);

        let calls = log.total();
        assert!(adapter.advance(generation).unwrap_err().is_bad_connection());
        assert!(adapter.run_query(SELECT, "", "").unwrap_err().is_bad_connection());
        assert!(adapter.connect("x").unwrap_err().is_bad_connection());
        assert_eq!(log.total(), calls);
    }

    #[test]
    fn test_close_releases_even_when_disconnect_fails() {
        let (adapter, log) = connected(scripted(1).with_disconnect_status(EPROTO));
        adapter.run_query(SELECT, "", "").unwrap();
        adapter.fetch_result().unwrap();

        let err = adapter.close().unwrap_err();
        assert!(err.is_connection());
        assert_eq!(log.count("free_result"), 1);
        assert_eq!(log.count("release"), 1);
        assert!(adapter.close().is_ok());
        assert_eq!(log.count("release"), 1);
    }

    #[test]
    fn test_close_never_connected_skips_disconnect() {
        let client = MockClient::new();
        let log = client.call_log();
        let adapter = Adapter::new(Box::new(client));
        adapter.close().unwrap();
        assert_eq!(log.names(), vec!["release"]);
    }

    #[test]
    fn test_recorded_cancel_rejects_operations() {
        let (adapter, log) = connected(scripted(1));
        adapter.record_cancel(CancelReason::DeadlineExceeded);
        adapter.record_cancel(CancelReason::Cancelled);
        assert_eq!(adapter.cancel_reason(), Some(CancelReason::DeadlineExceeded));
        let calls = log.total();
        assert!(adapter.run_query(SELECT, "", "").unwrap_err().is_bad_connection());
        assert_eq!(log.total(), calls);
    }

    #[test]
    fn test_client_guard_release_is_idempotent() {
        let client = MockClient::new();
        let log = client.call_log();
        let mut guard = ClientGuard::new(Box::new(client));
        guard.release();
        guard.release();
        drop(guard);
        assert_eq!(log.count("release"), 1);
    }

    #[test]
    fn test_client_guard_drop_frees_result() {
        let mut client = scripted(1);
        let log = client.call_log();
        client.query(SELECT, "", "");
        let (handle, _) = client.store_result().unwrap();
        let mut guard = ClientGuard::new(Box::new(client));
        guard.retain(handle).unwrap();
        assert!(guard.has_result());
        drop(guard);
        assert_eq!(log.count("free_result"), 1);
        assert_eq!(log.count("release"), 1);
    }

    #[test]
    fn test_client_guard_free_unknown_result() {
        let mut guard = ClientGuard::new(Box::new(MockClient::new()));
        guard.retain(ResultHandle::from_raw(99)).unwrap();
        let err = guard.free_result().unwrap_err();
        assert_eq!(err.kind(), &crate::error::ErrorKind::Query(NativeError::InvalidArgs));
        assert!(guard.free_result().is_ok());
        assert!(!guard.is_released());
    }
}
