//! Row cursor returned by [`RtdbConnection::query`](crate::RtdbConnection::query).

use std::sync::Arc;

use arrow_schema::{DataType, Schema};

use crate::adapter::Adapter;
use crate::error::{Result, RtdbError};
use crate::types::{FieldDescriptor, Value, fields_to_schema, rtdb_type_to_arrow};

/// Lazily iterates the rows of one result set.
///
/// A `Rows` is tied to the query that produced it. Running another query on
/// the same connection supersedes it, after which [`next`](Rows::next) fails
/// with a not-fetching error.
pub struct Rows {
    adapter: Option<Arc<Adapter>>,
    generation: u64,
    fields: Arc<[FieldDescriptor]>,
    columns: Vec<String>,
    closed: bool,
}

impl Rows {
    pub(crate) fn new(adapter: Arc<Adapter>, generation: u64) -> Result<Self> {
        let fields = adapter.fields(generation)?;
        let columns = fields.iter().map(|f| f.name.clone()).collect();
        Ok(Self {
            adapter: Some(adapter),
            generation,
            fields,
            columns,
            closed: false,
        })
    }

    /// A cursor for a query that produced no result set.
    pub(crate) fn empty() -> Self {
        Self {
            adapter: None,
            generation: 0,
            fields: Arc::from(Vec::new()),
            columns: Vec::new(),
            closed: false,
        }
    }

    /// Column names in result order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Fills `dest` with the next row.
    ///
    /// Fails with an end-of-data error once the rows are exhausted. `dest`
    /// must have one slot per column.
    pub fn next(&mut self, dest: &mut [Value]) -> Result<()> {
        let values = self.next_row()?;
        if values.len() != dest.len() {
            return Err(RtdbError::conversion(format!(
                "destination has {} slots for {} columns",
                dest.len(),
                values.len()
            )));
        }
        for (slot, value) in dest.iter_mut().zip(values) {
            *slot = value;
        }
        Ok(())
    }

    /// Returns the next row as an owned vector.
    pub fn next_row(&mut self) -> Result<Vec<Value>> {
        if self.closed {
            return Err(RtdbError::end_of_data());
        }
        match &self.adapter {
            Some(adapter) => adapter.advance(self.generation),
            None => Err(RtdbError::end_of_data()),
        }
    }

    /// Database type name of column `index`, e.g. `INT64`.
    pub fn column_type_database_type_name(&self, index: usize) -> Option<&'static str> {
        self.fields.get(index).map(|f| f.field_type.database_type_name())
    }

    /// Arrow type values of column `index` are scanned into.
    pub fn column_scan_type(&self, index: usize) -> Option<DataType> {
        self.fields.get(index).map(|f| rtdb_type_to_arrow(f.field_type))
    }

    pub fn column_nullable(&self, index: usize) -> Option<bool> {
        self.fields.get(index).map(|f| f.nullable)
    }

    /// Precision and scale are not reported for any column type.
    pub fn column_precision_scale(&self, _index: usize) -> Option<(i64, i64)> {
        None
    }

    /// Always false, multiple result sets are not supported.
    pub fn has_next_result_set(&self) -> bool {
        false
    }

    /// Arrow schema of the result set.
    pub fn schema(&self) -> Schema {
        fields_to_schema(&self.fields)
    }

    /// Stops iteration. The result set itself is released by the connection
    /// when the next query runs or the connection closes.
    pub fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
