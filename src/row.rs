//! Owned row spans and the row decoder.
//!
//! A row copied out of the native client is laid out as `field_count` fixed
//! 8-byte slots followed by a heap area:
//!
//! | field type            | slot contents (little-endian)               |
//! |-----------------------|---------------------------------------------|
//! | bool                  | byte 0, nonzero is true                     |
//! | int32, float32        | first 4 bytes                               |
//! | int64, float64        | all 8 bytes                                 |
//! | datetime              | epoch milliseconds as i64                   |
//! | string, binary        | u32 heap offset, u32 length                 |
//!
//! Heap offsets are absolute within the span. Null columns are flagged
//! separately and their slot is ignored.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{Result, RtdbError};
use crate::types::{FieldDescriptor, FieldType, Value};

/// Width of one fixed slot in bytes.
pub const SLOT_WIDTH: usize = 8;

/// One row as an owned byte span plus per-column null flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowBuf {
    span: Vec<u8>,
    nulls: Vec<bool>,
}

impl RowBuf {
    pub fn span(&self) -> &[u8] {
        &self.span
    }

    /// Number of slots in the row.
    pub fn width(&self) -> usize {
        self.nulls.len()
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.nulls.get(index).copied().unwrap_or(false)
    }
}

/// Incrementally builds a [`RowBuf`], one column at a time.
#[derive(Debug, Default)]
pub struct RowBuilder {
    slots: Vec<[u8; SLOT_WIDTH]>,
    nulls: Vec<bool>,
    heap: Vec<u8>,
    // (slot index, heap-relative offset) pairs rebased in `finish`
    heap_refs: Vec<(usize, u32)>,
}

impl RowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(fields: usize) -> Self {
        Self {
            slots: Vec::with_capacity(fields),
            nulls: Vec::with_capacity(fields),
            ..Self::default()
        }
    }

    fn push_slot(&mut self, slot: [u8; SLOT_WIDTH]) -> &mut Self {
        self.slots.push(slot);
        self.nulls.push(false);
        self
    }

    fn push_heap(&mut self, data: &[u8]) -> &mut Self {
        let offset = self.heap.len() as u32;
        self.heap.extend_from_slice(data);
        self.heap_refs.push((self.slots.len(), offset));
        let mut slot = [0u8; SLOT_WIDTH];
        slot[4..].copy_from_slice(&(data.len() as u32).to_le_bytes());
        self.push_slot(slot)
    }

    pub fn push_bool(&mut self, v: bool) -> &mut Self {
        let mut slot = [0u8; SLOT_WIDTH];
        slot[0] = u8::from(v);
        self.push_slot(slot)
    }

    pub fn push_i32(&mut self, v: i32) -> &mut Self {
        let mut slot = [0u8; SLOT_WIDTH];
        slot[..4].copy_from_slice(&v.to_le_bytes());
        self.push_slot(slot)
    }

    /// Pushes a 64-bit integer, also used for datetime milliseconds.
    pub fn push_i64(&mut self, v: i64) -> &mut Self {
        self.push_slot(v.to_le_bytes())
    }

    pub fn push_f32(&mut self, v: f32) -> &mut Self {
        let mut slot = [0u8; SLOT_WIDTH];
        slot[..4].copy_from_slice(&v.to_le_bytes());
        self.push_slot(slot)
    }

    pub fn push_f64(&mut self, v: f64) -> &mut Self {
        self.push_slot(v.to_le_bytes())
    }

    pub fn push_text(&mut self, v: &str) -> &mut Self {
        self.push_heap(v.as_bytes())
    }

    /// Pushes raw text bytes, which need not be UTF-8.
    pub fn push_bytes(&mut self, v: &[u8]) -> &mut Self {
        self.push_heap(v)
    }

    pub fn push_null(&mut self) -> &mut Self {
        self.slots.push([0u8; SLOT_WIDTH]);
        self.nulls.push(true);
        self
    }

    /// Pushes a zeroed slot for a column that carries no data.
    pub fn push_empty(&mut self) -> &mut Self {
        self.push_slot([0u8; SLOT_WIDTH])
    }

    pub fn finish(&mut self) -> RowBuf {
        let heap_start = (self.slots.len() * SLOT_WIDTH) as u32;
        for (index, offset) in self.heap_refs.drain(..) {
            self.slots[index][..4].copy_from_slice(&(heap_start + offset).to_le_bytes());
        }
        let mut span = Vec::with_capacity(self.slots.len() * SLOT_WIDTH + self.heap.len());
        for slot in self.slots.drain(..) {
            span.extend_from_slice(&slot);
        }
        span.append(&mut self.heap);
        RowBuf {
            span,
            nulls: std::mem::take(&mut self.nulls),
        }
    }
}

/// Decodes one row into exactly one [`Value`] per field.
///
/// # Arguments
/// * `row` - Row span copied out of the native client
/// * `fields` - Field metadata of the result set, in column order
pub fn decode_row(row: &RowBuf, fields: &[FieldDescriptor]) -> Result<Vec<Value>> {
    let span = row.span();
    let slots_len = fields.len() * SLOT_WIDTH;
    if span.len() < slots_len {
        return Err(RtdbError::conversion(format!(
            "row span of {} bytes is too short for {} fields",
            span.len(),
            fields.len()
        )));
    }

    let mut values = Vec::with_capacity(fields.len());
    for (index, field) in fields.iter().enumerate() {
        if row.is_null(index) {
            values.push(Value::Null);
            continue;
        }
        let start = index * SLOT_WIDTH;
        let slot: [u8; SLOT_WIDTH] = span[start..start + SLOT_WIDTH]
            .try_into()
            .map_err(|_| RtdbError::conversion("slot out of range"))?;
        values.push(decode_slot(span, slot, field)?);
    }
    Ok(values)
}

fn decode_slot(span: &[u8], slot: [u8; SLOT_WIDTH], field: &FieldDescriptor) -> Result<Value> {
    let lo = [slot[0], slot[1], slot[2], slot[3]];
    let hi = [slot[4], slot[5], slot[6], slot[7]];
    let value = match field.field_type {
        FieldType::Bool => Value::Bool(slot[0] != 0),
        FieldType::Int32 => Value::Int32(i32::from_le_bytes(lo)),
        FieldType::Int64 => Value::Int64(i64::from_le_bytes(slot)),
        FieldType::Float32 => Value::Float32(f32::from_le_bytes(lo)),
        FieldType::Float64 => Value::Float64(f64::from_le_bytes(slot)),
        FieldType::DateTime => Value::DateTime(datetime_from_millis(i64::from_le_bytes(slot))?),
        FieldType::String => {
            let bytes = heap_slice(span, u32::from_le_bytes(lo), u32::from_le_bytes(hi), field)?;
            Value::String(decode_text(bytes))
        }
        FieldType::Binary => {
            let bytes = heap_slice(span, u32::from_le_bytes(lo), u32::from_le_bytes(hi), field)?;
            Value::Bytes(bytes.to_vec())
        }
        FieldType::Null => Value::Null,
        FieldType::Unknown => {
            warn!(field = %field.name, "unknown field type, column left undecoded");
            Value::Undecodable
        }
    };
    Ok(value)
}

fn heap_slice<'a>(span: &'a [u8], offset: u32, len: u32, field: &FieldDescriptor) -> Result<&'a [u8]> {
    let start = offset as usize;
    start
        .checked_add(len as usize)
        .and_then(|end| span.get(start..end))
        .ok_or_else(|| {
            RtdbError::conversion(format!(
                "field '{}' references bytes {}..{}+{} outside a {}-byte row",
                field.name,
                offset,
                offset,
                len,
                span.len()
            ))
        })
}

/// Epoch milliseconds to an instant truncated to whole seconds, toward
/// zero for instants before 1970.
fn datetime_from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ms / 1000, 0)
        .ok_or_else(|| RtdbError::conversion(format!("datetime {}ms is out of range", ms)))
}

/// UTF-8 text as is, anything else as ISO-8859-1.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}
