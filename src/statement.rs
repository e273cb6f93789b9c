//! Statement implementation for ADBC-RTDB driver.
//!
//! The `RtdbStatement` runs SQL over its connection's session. Parameters are
//! bound as a single-row record batch and substituted into the query text as
//! literals when the statement executes.

#![allow(refining_impl_trait)]

use std::sync::Arc;

use adbc_core::{Optionable, Statement, options::{OptionStatement, OptionValue}};
use arrow_array::RecordBatch;
use arrow_array::{Array, BinaryArray, BooleanArray, Float32Array, Float64Array, Int8Array, Int16Array,
                  Int32Array, Int64Array, LargeBinaryArray, LargeStringArray, StringArray,
                  TimestampMicrosecondArray, TimestampMillisecondArray, TimestampNanosecondArray,
                  TimestampSecondArray, UInt8Array, UInt16Array, UInt32Array, UInt64Array};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::connection::RtdbConnection;
use crate::format::count_placeholders;
use crate::reader::RowsRecordBatchReader;
use crate::types::Value;

/// SQL statement for RTDB.
///
/// Holds the query text and the parameters bound to it. Executing the
/// statement supersedes any result still being read on the same connection.
pub struct RtdbStatement {
    conn: RtdbConnection,
    query: Option<String>,
    params: Vec<Value>,
}

impl RtdbStatement {
    /// Creates a new statement over `conn`'s session.
    pub fn new(conn: RtdbConnection) -> Self {
        Self {
            conn,
            query: None,
            params: Vec::new(),
        }
    }

    /// Returns the current query string.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Parameters bound by the last call to `bind`.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    fn require_query(&self) -> adbc_core::error::Result<&str> {
        self.query.as_deref().ok_or_else(|| {
            adbc_core::error::Error::with_message_and_status(
                "No query set",
                adbc_core::error::Status::InvalidState,
            )
        })
    }

    /// Reads the value at `row` of an Arrow array as a driver value.
    ///
    /// Returns `None` for Arrow types that have no literal form.
    fn arrow_value(array: &Arc<dyn Array>, row: usize) -> Option<Value> {
        if array.is_null(row) {
            return Some(Value::Null);
        }

        let any = array.as_any();
        Some(match array.data_type() {
            DataType::Null => Value::Null,
            DataType::Boolean => Value::Bool(any.downcast_ref::<BooleanArray>()?.value(row)),
            DataType::Int8 => Value::from(any.downcast_ref::<Int8Array>()?.value(row)),
            DataType::Int16 => Value::from(any.downcast_ref::<Int16Array>()?.value(row)),
            DataType::Int32 => Value::from(any.downcast_ref::<Int32Array>()?.value(row)),
            DataType::Int64 => Value::from(any.downcast_ref::<Int64Array>()?.value(row)),
            DataType::UInt8 => Value::from(any.downcast_ref::<UInt8Array>()?.value(row)),
            DataType::UInt16 => Value::from(any.downcast_ref::<UInt16Array>()?.value(row)),
            DataType::UInt32 => Value::from(any.downcast_ref::<UInt32Array>()?.value(row)),
            DataType::UInt64 => Value::from(any.downcast_ref::<UInt64Array>()?.value(row)),
            DataType::Float32 => Value::from(any.downcast_ref::<Float32Array>()?.value(row)),
            DataType::Float64 => Value::from(any.downcast_ref::<Float64Array>()?.value(row)),
            DataType::Utf8 => Value::from(any.downcast_ref::<StringArray>()?.value(row)),
            DataType::LargeUtf8 => Value::from(any.downcast_ref::<LargeStringArray>()?.value(row)),
            DataType::Binary => Value::from(any.downcast_ref::<BinaryArray>()?.value(row)),
            DataType::LargeBinary => Value::from(any.downcast_ref::<LargeBinaryArray>()?.value(row)),
            DataType::Timestamp(TimeUnit::Second, _) => {
                let secs = any.downcast_ref::<TimestampSecondArray>()?.value(row);
                Value::DateTime(DateTime::<Utc>::from_timestamp(secs, 0)?)
            }
            DataType::Timestamp(TimeUnit::Millisecond, _) => {
                let millis = any.downcast_ref::<TimestampMillisecondArray>()?.value(row);
                Value::DateTime(DateTime::<Utc>::from_timestamp_millis(millis)?)
            }
            DataType::Timestamp(TimeUnit::Microsecond, _) => {
                let micros = any.downcast_ref::<TimestampMicrosecondArray>()?.value(row);
                Value::DateTime(DateTime::<Utc>::from_timestamp_micros(micros)?)
            }
            DataType::Timestamp(TimeUnit::Nanosecond, _) => {
                let nanos = any.downcast_ref::<TimestampNanosecondArray>()?.value(row);
                Value::DateTime(DateTime::<Utc>::from_timestamp_nanos(nanos))
            }
            _ => return None,
        })
    }
}

fn not_implemented(what: &str) -> adbc_core::error::Error {
    adbc_core::error::Error::with_message_and_status(
        format!("{} not supported", what),
        adbc_core::error::Status::NotImplemented,
    )
}

impl Optionable for RtdbStatement {
    type Option = OptionStatement;

    fn set_option(&mut self, _key: Self::Option, _value: OptionValue) -> adbc_core::error::Result<()> {
        Err(not_implemented("Statement options"))
    }

    fn get_option_string(&self, _key: Self::Option) -> adbc_core::error::Result<String> {
        Err(not_implemented("Statement options"))
    }

    fn get_option_bytes(&self, _key: Self::Option) -> adbc_core::error::Result<Vec<u8>> {
        Err(not_implemented("Statement options"))
    }

    fn get_option_double(&self, _key: Self::Option) -> adbc_core::error::Result<f64> {
        Err(not_implemented("Statement options"))
    }

    fn get_option_int(&self, _key: Self::Option) -> adbc_core::error::Result<i64> {
        Err(not_implemented("Statement options"))
    }
}

impl Statement for RtdbStatement {
    fn bind(&mut self, batch: RecordBatch) -> adbc_core::error::Result<()> {
        if batch.num_rows() != 1 {
            return Err(adbc_core::error::Error::with_message_and_status(
                format!("Cannot bind {} rows: exactly one parameter row is required", batch.num_rows()),
                adbc_core::error::Status::InvalidArguments,
            ));
        }

        let mut params = Vec::with_capacity(batch.num_columns());
        for (col_idx, array) in batch.columns().iter().enumerate() {
            match Self::arrow_value(array, 0) {
                Some(value) => params.push(value),
                None => {
                    return Err(adbc_core::error::Error::with_message_and_status(
                        format!("Cannot bind column {}: unsupported Arrow type {:?}",
                                col_idx, array.data_type()),
                        adbc_core::error::Status::NotImplemented,
                    ));
                }
            }
        }

        debug!("Bound {} parameters", params.len());
        self.params = params;
        Ok(())
    }

    fn bind_stream(
        &mut self,
        _reader: Box<dyn arrow_array::RecordBatchReader + Send>,
    ) -> adbc_core::error::Result<()> {
        Err(not_implemented("Stream bind"))
    }

    fn execute(&mut self) -> adbc_core::error::Result<Box<dyn arrow_array::RecordBatchReader + Send>> {
        let query = self.require_query()?;
        let rows = self.conn.query(query, &self.params)?;
        Ok(Box::new(RowsRecordBatchReader::new(rows)))
    }

    fn execute_update(&mut self) -> adbc_core::error::Result<Option<i64>> {
        let query = self.require_query()?;
        let result = self.conn.execute(query, &self.params)?;
        Ok(Some(result.rows_affected()))
    }

    fn execute_schema(&mut self) -> adbc_core::error::Result<Schema> {
        let query = self.require_query()?;
        let mut rows = self.conn.query(query, &self.params)?;
        let schema = rows.schema();
        rows.close()?;
        Ok(schema)
    }

    fn execute_partitions(&mut self) -> adbc_core::error::Result<adbc_core::PartitionedResult> {
        Err(not_implemented("Partitioned execution"))
    }

    /// One untyped, nullable field per `?` placeholder, named by position.
    fn get_parameter_schema(&self) -> adbc_core::error::Result<Schema> {
        let query = self.require_query()?;
        let fields: Vec<Field> = (0..count_placeholders(query))
            .map(|i| Field::new(i.to_string(), DataType::Null, true))
            .collect();
        Ok(Schema::new(fields))
    }

    fn prepare(&mut self) -> adbc_core::error::Result<()> {
        Err(not_implemented("Prepared statements"))
    }

    fn set_sql_query(&mut self, query: impl AsRef<str>) -> adbc_core::error::Result<()> {
        self.query = Some(query.as_ref().to_string());
        self.params.clear();
        Ok(())
    }

    fn set_substrait_plan(&mut self, _plan: impl AsRef<[u8]>) -> adbc_core::error::Result<()> {
        Err(not_implemented("Substrait"))
    }

    fn cancel(&mut self) -> adbc_core::error::Result<()> {
        self.conn.context().cancel();
        Ok(())
    }
}
