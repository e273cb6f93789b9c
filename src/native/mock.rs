//! Scripted in-memory native client.
//!
//! `MockClient` answers queries from a table of canned results and records
//! every native call in a shared [`CallLog`], so tests can assert exactly
//! which native calls a driver operation made.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{EINVAL, NativeClient, NativeRow, RawField, ResultHandle, ResultSummary, RowLink, STATUS_OK};
use crate::row::RowBuf;
use crate::types::{FieldDescriptor, FieldType};

/// Shared record of native calls, in call order.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<&'static str>>,
    queries: Mutex<Vec<String>>,
}

impl CallLog {
    fn record(&self, name: &'static str) {
        self.calls.lock().push(name);
    }

    /// Number of calls to the named native function.
    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == name).count()
    }

    /// Total number of native calls.
    pub fn total(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// Query texts exactly as they reached the native layer.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

/// A canned result set.
#[derive(Debug, Clone, Default)]
pub struct MockResult {
    pub fields: Vec<RawField>,
    pub rows: Vec<RowBuf>,
}

impl MockResult {
    pub fn new(fields: Vec<RawField>, rows: Vec<RowBuf>) -> Self {
        Self { fields, rows }
    }
}

/// Builds native field metadata for a mock result.
pub fn raw_field(name: &str, field_type: FieldType, nullable: bool) -> RawField {
    RawField {
        name: name.to_string(),
        data_type: field_type as u8,
        is_null: u8::from(nullable),
        length: 8,
        real_length: 0,
    }
}

type QueryHook = Box<dyn FnMut(&str) + Send>;

/// In-memory [`NativeClient`] driven by canned results.
#[derive(Default)]
pub struct MockClient {
    results: HashMap<String, MockResult>,
    query_errors: HashMap<String, i32>,
    connect_status: i32,
    disconnect_status: i32,
    affected_rows: u64,
    fields_unavailable: bool,
    charset: String,
    hook: Option<QueryHook>,
    log: Arc<CallLog>,

    last_query: Option<String>,
    stored: HashMap<usize, MockResult>,
    next_handle: usize,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            charset: "iso-8859-1".to_string(),
            next_handle: 1,
            ..Self::default()
        }
    }

    /// Answers `sql` with the given fields and rows.
    pub fn with_result(mut self, sql: &str, fields: Vec<RawField>, rows: Vec<RowBuf>) -> Self {
        self.results.insert(sql.to_string(), MockResult::new(fields, rows));
        self
    }

    /// Fails `sql` with a native status code.
    pub fn with_query_error(mut self, sql: &str, code: i32) -> Self {
        self.query_errors.insert(sql.to_string(), code);
        self
    }

    pub fn with_connect_status(mut self, code: i32) -> Self {
        self.connect_status = code;
        self
    }

    pub fn with_disconnect_status(mut self, code: i32) -> Self {
        self.disconnect_status = code;
        self
    }

    pub fn with_affected_rows(mut self, rows: u64) -> Self {
        self.affected_rows = rows;
        self
    }

    /// Makes `fetch_fields` report no metadata, even for scripted results.
    pub fn with_fields_unavailable(mut self) -> Self {
        self.fields_unavailable = true;
        self
    }

    pub fn with_charset(mut self, charset: &str) -> Self {
        self.charset = charset.to_string();
        self
    }

    /// Runs `hook` inside every `query` call, after the call is logged.
    pub fn on_query(mut self, hook: impl FnMut(&str) + Send + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Shared handle to this client's call log.
    pub fn call_log(&self) -> Arc<CallLog> {
        Arc::clone(&self.log)
    }
}

impl NativeClient for MockClient {
    fn connect(&mut self, _conn_str: &str) -> i32 {
        self.log.record("connect");
        self.connect_status
    }

    fn disconnect(&mut self) -> i32 {
        self.log.record("disconnect");
        self.disconnect_status
    }

    fn query(&mut self, sql: &str, _charset: &str, _database: &str) -> i32 {
        self.log.record("query");
        self.log.queries.lock().push(sql.to_string());
        if let Some(hook) = self.hook.as_mut() {
            hook(sql);
        }
        if let Some(code) = self.query_errors.get(sql) {
            self.last_query = None;
            return *code;
        }
        self.last_query = Some(sql.to_string());
        STATUS_OK
    }

    fn store_result(&mut self) -> Option<(ResultHandle, ResultSummary)> {
        self.log.record("store_result");
        let result = self.results.get(self.last_query.as_ref()?)?.clone();
        let handle = self.next_handle;
        self.next_handle += 1;
        let summary = ResultSummary {
            row_count: result.rows.len() as u64,
            field_count: result.fields.len() as u32,
            first_row: (!result.rows.is_empty()).then(|| RowLink::from_raw(0)),
        };
        self.stored.insert(handle, result);
        Some((ResultHandle::from_raw(handle), summary))
    }

    fn fetch_fields(&mut self) -> Option<Vec<RawField>> {
        self.log.record("fetch_fields");
        if self.fields_unavailable {
            return None;
        }
        let result = self.results.get(self.last_query.as_ref()?)?;
        Some(result.fields.clone())
    }

    fn read_row(
        &mut self,
        result: ResultHandle,
        link: RowLink,
        _fields: &[FieldDescriptor],
    ) -> Option<NativeRow> {
        self.log.record("read_row");
        let stored = self.stored.get(&result.as_raw())?;
        let index = link.as_raw();
        let row = stored.rows.get(index)?.clone();
        let next = (index + 1 < stored.rows.len()).then(|| RowLink::from_raw(index + 1));
        Some(NativeRow { row, next })
    }

    fn affected_rows(&mut self) -> u64 {
        self.log.record("affected_rows");
        self.affected_rows
    }

    fn free_result(&mut self, result: ResultHandle) -> i32 {
        self.log.record("free_result");
        match self.stored.remove(&result.as_raw()) {
            Some(_) => STATUS_OK,
            None => EINVAL,
        }
    }

    fn release(&mut self) {
        self.log.record("release");
    }

    fn charset(&mut self) -> String {
        self.log.record("charset");
        self.charset.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowBuilder;

    #[test]
    fn test_mock_result_walk() {
        let rows = vec![
            RowBuilder::new().push_i32(1).finish(),
            RowBuilder::new().push_i32(2).finish(),
        ];
        let mut client = MockClient::new().with_result(
            "select v from t",
            vec![raw_field("v", FieldType::Int32, false)],
            rows,
        );
        let log = client.call_log();

        assert_eq!(client.query("select v from t", "utf-8", "db"), STATUS_OK);
        let (handle, summary) = client.store_result().unwrap();
        assert_eq!(summary.row_count, 2);
        assert_eq!(summary.field_count, 1);

        let first = client.read_row(handle, summary.first_row.unwrap(), &[]).unwrap();
        let second = client.read_row(handle, first.next.unwrap(), &[]).unwrap();
        assert!(second.next.is_none());

        assert_eq!(client.free_result(handle), STATUS_OK);
        assert_eq!(client.free_result(handle), EINVAL);
        assert_eq!(log.count("read_row"), 2);
        assert_eq!(log.queries(), vec!["select v from t".to_string()]);
    }

    #[test]
    fn test_mock_unscripted_query_has_no_result() {
        let mut client = MockClient::new();
        assert_eq!(client.query("insert into t values (1)", "", ""), STATUS_OK);
        assert!(client.store_result().is_none());
        assert!(client.fetch_fields().is_none());
    }

    #[test]
    fn test_mock_fields_unavailable() {
        let mut client = MockClient::new()
            .with_result("select v from t", vec![raw_field("v", FieldType::Int32, false)], vec![])
            .with_fields_unavailable();
        client.query("select v from t", "", "");
        assert!(client.store_result().is_some());
        assert!(client.fetch_fields().is_none());
    }

    #[test]
    fn test_mock_query_error_and_hook() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut client = MockClient::new()
            .with_query_error("bad", EINVAL)
            .on_query(move |sql| sink.lock().push(sql.to_string()));
        assert_eq!(client.query("bad", "", ""), EINVAL);
        assert_eq!(seen.lock().as_slice(), ["bad".to_string()]);
    }
}
