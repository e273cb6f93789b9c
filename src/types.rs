//! Type mapping between RTDB fields, driver values and Apache Arrow.
//!
//! This module defines the field type tags reported by the native client,
//! the per-column [`FieldDescriptor`], the decoded [`Value`] union and the
//! column buffers used to assemble Arrow arrays.

use std::sync::Arc;

use arrow_array::{Array, BinaryArray, BooleanArray, Float32Array, Float64Array, NullArray};
use arrow_array::{Int32Array, Int64Array, StringArray, TimestampMillisecondArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::native::RawField;

/// RTDB field type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
    Unknown = 0,
    Bool = 1,
    Int32 = 2,
    Int64 = 3,
    Float32 = 4,
    Float64 = 5,
    Binary = 6,
    String = 7,
    DateTime = 8,
    Null = 9,
}

impl From<u8> for FieldType {
    fn from(tag: u8) -> Self {
        match tag {
            1 => FieldType::Bool,
            2 => FieldType::Int32,
            3 => FieldType::Int64,
            4 => FieldType::Float32,
            5 => FieldType::Float64,
            6 => FieldType::Binary,
            7 => FieldType::String,
            8 => FieldType::DateTime,
            9 => FieldType::Null,
            _ => FieldType::Unknown,
        }
    }
}

impl FieldType {
    /// Database type name reported for a column, empty for unknown types.
    pub fn database_type_name(&self) -> &'static str {
        match self {
            FieldType::Unknown => "",
            FieldType::Bool => "BOOL",
            FieldType::Int32 => "INT",
            FieldType::Int64 => "INT64",
            FieldType::Float32 => "FLOAT",
            FieldType::Float64 => "DOUBLE",
            FieldType::Binary => "BINARY",
            FieldType::String => "STRING",
            FieldType::DateTime => "DATETIME",
            FieldType::Null => "NULL",
        }
    }
}

/// Converts an RTDB field type to the Arrow data type used for the column.
pub fn rtdb_type_to_arrow(field_type: FieldType) -> DataType {
    match field_type {
        FieldType::Bool => DataType::Boolean,
        FieldType::Int32 => DataType::Int32,
        FieldType::Int64 => DataType::Int64,
        FieldType::Float32 => DataType::Float32,
        FieldType::Float64 => DataType::Float64,
        FieldType::Binary => DataType::Binary,
        FieldType::String => DataType::Utf8,
        FieldType::DateTime => DataType::Timestamp(TimeUnit::Millisecond, None),
        FieldType::Null | FieldType::Unknown => DataType::Null,
    }
}

/// Per-column metadata of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    /// Fixed width of the column in bytes.
    pub length: u8,
    /// Actual width of a variable-length column.
    pub var_length: u8,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            length: 0,
            var_length: 0,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Arrow field for this column.
    pub fn to_arrow_field(&self) -> Field {
        let data_type = rtdb_type_to_arrow(self.field_type);
        // Arrow requires Null-typed fields to be nullable.
        let nullable = self.nullable || data_type == DataType::Null;
        Field::new(&self.name, data_type, nullable)
    }
}

impl From<RawField> for FieldDescriptor {
    fn from(raw: RawField) -> Self {
        Self {
            name: raw.name,
            field_type: FieldType::from(raw.data_type),
            nullable: raw.is_null == 1,
            length: raw.length,
            var_length: raw.real_length,
        }
    }
}

/// Builds the Arrow schema of a result set.
pub fn fields_to_schema(fields: &[FieldDescriptor]) -> Schema {
    Schema::new(
        fields
            .iter()
            .map(FieldDescriptor::to_arrow_field)
            .collect::<Vec<_>>(),
    )
}

/// A single decoded column value or query argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    /// A column whose type tag the driver does not understand.
    Undecodable,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value's variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::UInt64(_) => "uint64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::DateTime(_) => "datetime",
            Value::Undecodable => "undecodable",
        }
    }
}

/// Returns true for the zero instant, `0001-01-01T00:00:00Z`.
pub fn is_zero_time(instant: &DateTime<Utc>) -> bool {
    instant.year() == 1
        && instant.ordinal() == 1
        && instant.num_seconds_from_midnight() == 0
        && instant.nanosecond() == 0
}

macro_rules! impl_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_value_from! {
    bool => Bool,
    i8 => Int32,
    i16 => Int32,
    i32 => Int32,
    u8 => Int32,
    u16 => Int32,
    i64 => Int64,
    u32 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
    DateTime<Utc> => DateTime,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Column buffer for constructing Arrow arrays from decoded rows.
pub enum ColumnData {
    Bool(Vec<Option<bool>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    UInt64(Vec<Option<u64>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    Binary(Vec<Option<Vec<u8>>>),
    Utf8(Vec<Option<String>>),
    TimestampMillisecond(Vec<Option<i64>>),
    Null(usize),
}

impl ColumnData {
    /// Creates an empty buffer for the given Arrow type.
    pub fn for_data_type(data_type: &DataType, capacity: usize) -> Self {
        match data_type {
            DataType::Boolean => ColumnData::Bool(Vec::with_capacity(capacity)),
            DataType::Int32 => ColumnData::Int32(Vec::with_capacity(capacity)),
            DataType::Int64 => ColumnData::Int64(Vec::with_capacity(capacity)),
            DataType::UInt64 => ColumnData::UInt64(Vec::with_capacity(capacity)),
            DataType::Float32 => ColumnData::Float32(Vec::with_capacity(capacity)),
            DataType::Float64 => ColumnData::Float64(Vec::with_capacity(capacity)),
            DataType::Binary => ColumnData::Binary(Vec::with_capacity(capacity)),
            DataType::Utf8 => ColumnData::Utf8(Vec::with_capacity(capacity)),
            DataType::Timestamp(TimeUnit::Millisecond, _) => {
                ColumnData::TimestampMillisecond(Vec::with_capacity(capacity))
            }
            _ => ColumnData::Null(0),
        }
    }

    /// Appends a value. Values that do not fit the column become nulls.
    pub fn push(&mut self, value: &Value) {
        match self {
            ColumnData::Bool(v) => v.push(match value {
                Value::Bool(b) => Some(*b),
                _ => None,
            }),
            ColumnData::Int32(v) => v.push(match value {
                Value::Int32(i) => Some(*i),
                _ => None,
            }),
            ColumnData::Int64(v) => v.push(match value {
                Value::Int64(i) => Some(*i),
                Value::Int32(i) => Some(i64::from(*i)),
                _ => None,
            }),
            ColumnData::UInt64(v) => v.push(match value {
                Value::UInt64(u) => Some(*u),
                _ => None,
            }),
            ColumnData::Float32(v) => v.push(match value {
                Value::Float32(f) => Some(*f),
                _ => None,
            }),
            ColumnData::Float64(v) => v.push(match value {
                Value::Float64(f) => Some(*f),
                Value::Float32(f) => Some(f64::from(*f)),
                _ => None,
            }),
            ColumnData::Binary(v) => v.push(match value {
                Value::Bytes(b) => Some(b.clone()),
                Value::String(s) => Some(s.as_bytes().to_vec()),
                _ => None,
            }),
            ColumnData::Utf8(v) => v.push(match value {
                Value::String(s) => Some(s.clone()),
                _ => None,
            }),
            ColumnData::TimestampMillisecond(v) => v.push(match value {
                Value::DateTime(dt) => Some(dt.timestamp_millis()),
                Value::Int64(ms) => Some(*ms),
                _ => None,
            }),
            ColumnData::Null(n) => *n += 1,
        }
    }

    /// Returns the number of rows in this column.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Bool(v) => v.len(),
            ColumnData::Int32(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::UInt64(v) => v.len(),
            ColumnData::Float32(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Binary(v) => v.len(),
            ColumnData::Utf8(v) => v.len(),
            ColumnData::TimestampMillisecond(v) => v.len(),
            ColumnData::Null(n) => *n,
        }
    }

    /// Returns true if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts this column data to an Arrow array.
    pub fn to_arrow_array(&self) -> Arc<dyn Array> {
        match self {
            ColumnData::Bool(v) => Arc::new(BooleanArray::from_iter(v.iter().copied())),
            ColumnData::Int32(v) => Arc::new(Int32Array::from_iter(v.iter().copied())),
            ColumnData::Int64(v) => Arc::new(Int64Array::from_iter(v.iter().copied())),
            ColumnData::UInt64(v) => Arc::new(UInt64Array::from_iter(v.iter().copied())),
            ColumnData::Float32(v) => Arc::new(Float32Array::from_iter(v.iter().copied())),
            ColumnData::Float64(v) => Arc::new(Float64Array::from_iter(v.iter().copied())),
            ColumnData::Binary(v) => Arc::new(BinaryArray::from_iter(v.iter().map(|x| x.as_deref()))),
            ColumnData::Utf8(v) => Arc::new(StringArray::from_iter(v.iter().map(|x| x.as_deref()))),
            ColumnData::TimestampMillisecond(v) => {
                Arc::new(TimestampMillisecondArray::from_iter(v.iter().copied()))
            }
            ColumnData::Null(n) => Arc::new(NullArray::new(*n)),
        }
    }

    /// Gets the corresponding Arrow data type for this column.
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnData::Bool(_) => DataType::Boolean,
            ColumnData::Int32(_) => DataType::Int32,
            ColumnData::Int64(_) => DataType::Int64,
            ColumnData::UInt64(_) => DataType::UInt64,
            ColumnData::Float32(_) => DataType::Float32,
            ColumnData::Float64(_) => DataType::Float64,
            ColumnData::Binary(_) => DataType::Binary,
            ColumnData::Utf8(_) => DataType::Utf8,
            ColumnData::TimestampMillisecond(_) => DataType::Timestamp(TimeUnit::Millisecond, None),
            ColumnData::Null(_) => DataType::Null,
        }
    }
}
