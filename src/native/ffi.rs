//! Bindings to the native RTDB client library (`libtsdb`).
//!
//! Rows in the native result list are arrays of pointers, one per column,
//! each pointing at the column value. [`FfiClient::read_row`] copies every
//! value into an owned [`RowBuf`] so nothing outlives the native result.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::ptr;

use tracing::{debug, warn};

use super::{EINVAL, NativeClient, NativeRow, RawField, ResultHandle, ResultSummary, RowLink};
use crate::error::{NativeError, Result, RtdbError};
use crate::row::{RowBuf, RowBuilder};
use crate::types::{FieldDescriptor, FieldType};

#[repr(C)]
#[allow(dead_code)]
struct TsdbMlField {
    name: *const c_char,
    field_index: u16,
    data_type: u8,
    unique: u8,
    has_index: u8,
    is_ref: u8,
    is_null: u8,
    length: u8,
    field_id: u8,
    real_length: u8,
    _reserved: [c_char; 2],
}

#[repr(C)]
#[allow(dead_code)]
struct TsdbRows {
    next: *mut TsdbRows,
    row: *mut *mut c_void,
    len: u64,
}

#[repr(C)]
#[allow(dead_code)]
struct TsdbResultSet {
    row_count: u64,
    field_count: u32,
    fields: *mut *mut c_void,
    data: *mut TsdbRows,
}

#[link(name = "tsdb")]
unsafe extern "C" {
    fn tsdb_new() -> *mut c_void;
    fn tsdb_kill_me(client: *mut c_void);
    fn tsdb_connect(conn_str: *const c_char) -> c_int;
    fn tsdb_disconnect() -> c_int;
    fn tsdb_charset_get() -> *const c_char;
    fn tsdb_query(
        client: *mut c_void,
        sql: *const c_char,
        sql_len: c_int,
        charset: *const c_char,
        database: *const c_char,
    ) -> c_int;
    fn tsdb_affected_rows(client: *mut c_void) -> u64;
    fn tsdb_fetch_ml_fields(client: *mut c_void, field_count: *mut c_int) -> *mut *mut TsdbMlField;
    fn tsdb_store_result_v2(client: *mut c_void) -> *mut TsdbResultSet;
    fn tsdb_free_result(client: *mut c_void, result: *mut c_void) -> c_int;
}

/// [`NativeClient`] backed by the native library.
pub struct FfiClient {
    raw: *mut c_void,
}

// The native handle is only used by the thread currently driving the
// connection, which holds the connection mutex.
unsafe impl Send for FfiClient {}

impl FfiClient {
    /// Allocates a native client handle.
    pub fn new() -> Result<Self> {
        let raw = unsafe { tsdb_new() };
        if raw.is_null() {
            return Err(RtdbError::connection(NativeError::OutOfMemory));
        }
        debug!("Allocated native client handle");
        Ok(Self { raw })
    }
}

impl NativeClient for FfiClient {
    fn connect(&mut self, conn_str: &str) -> i32 {
        let Ok(conn_str) = CString::new(conn_str) else {
            return EINVAL;
        };
        unsafe { tsdb_connect(conn_str.as_ptr()) }
    }

    fn disconnect(&mut self) -> i32 {
        unsafe { tsdb_disconnect() }
    }

    fn query(&mut self, sql: &str, charset: &str, database: &str) -> i32 {
        let (Ok(c_sql), Ok(c_charset), Ok(c_db)) =
            (CString::new(sql), CString::new(charset), CString::new(database))
        else {
            return EINVAL;
        };
        let Ok(len) = c_int::try_from(sql.len()) else {
            return EINVAL;
        };
        unsafe { tsdb_query(self.raw, c_sql.as_ptr(), len, c_charset.as_ptr(), c_db.as_ptr()) }
    }

    fn store_result(&mut self) -> Option<(ResultHandle, ResultSummary)> {
        let result = unsafe { tsdb_store_result_v2(self.raw) };
        if result.is_null() {
            return None;
        }
        let (row_count, field_count, data) =
            unsafe { ((*result).row_count, (*result).field_count, (*result).data) };
        let first_row = (row_count > 0 && !data.is_null()).then(|| RowLink::from_raw(data as usize));
        Some((
            ResultHandle::from_raw(result as usize),
            ResultSummary {
                row_count,
                field_count,
                first_row,
            },
        ))
    }

    fn fetch_fields(&mut self) -> Option<Vec<RawField>> {
        let mut count: c_int = 0;
        let array = unsafe { tsdb_fetch_ml_fields(self.raw, &mut count) };
        if array.is_null() || count <= 0 {
            return None;
        }
        let count = count as usize;
        let mut fields = Vec::with_capacity(count);
        for i in 0..count {
            let field = unsafe { *array.add(i) };
            if field.is_null() {
                continue;
            }
            let field = unsafe { &*field };
            let name = if field.name.is_null() {
                String::new()
            } else {
                unsafe { CStr::from_ptr(field.name) }.to_string_lossy().into_owned()
            };
            fields.push(RawField {
                name,
                data_type: field.data_type,
                is_null: field.is_null,
                length: field.length,
                real_length: field.real_length,
            });
        }
        // The array stays owned by the client handle; tsdb_ml.h documents no
        // transfer and the native driver never frees it.
        Some(fields)
    }

    fn read_row(
        &mut self,
        _result: ResultHandle,
        link: RowLink,
        fields: &[FieldDescriptor],
    ) -> Option<NativeRow> {
        let link = link.as_raw() as *const TsdbRows;
        if link.is_null() {
            return None;
        }
        let (slots, next) = unsafe { ((*link).row, (*link).next) };
        if slots.is_null() {
            return None;
        }
        let row = unsafe { copy_row(slots, fields) };
        let next = (!next.is_null()).then(|| RowLink::from_raw(next as usize));
        Some(NativeRow { row, next })
    }

    fn affected_rows(&mut self) -> u64 {
        unsafe { tsdb_affected_rows(self.raw) }
    }

    fn free_result(&mut self, result: ResultHandle) -> i32 {
        unsafe { tsdb_free_result(self.raw, result.as_raw() as *mut c_void) }
    }

    fn release(&mut self) {
        if self.raw.is_null() {
            return;
        }
        unsafe { tsdb_kill_me(self.raw) };
        self.raw = ptr::null_mut();
    }

    fn charset(&mut self) -> String {
        let charset = unsafe { tsdb_charset_get() };
        if charset.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(charset) }.to_string_lossy().into_owned()
    }
}

/// Copies one native row into an owned span.
///
/// # Safety
/// `slots` must point at one value pointer per entry of `fields`, each
/// either null or pointing at a value of the field's type.
unsafe fn copy_row(slots: *mut *mut c_void, fields: &[FieldDescriptor]) -> RowBuf {
    let mut builder = RowBuilder::with_capacity(fields.len());
    for (i, field) in fields.iter().enumerate() {
        let value = unsafe { *slots.add(i) };
        if value.is_null() {
            builder.push_null();
            continue;
        }
        unsafe {
            match field.field_type {
                FieldType::Bool => builder.push_bool(*(value as *const u8) != 0),
                FieldType::Int32 => builder.push_i32(ptr::read_unaligned(value as *const i32)),
                FieldType::Int64 | FieldType::DateTime => {
                    builder.push_i64(ptr::read_unaligned(value as *const i64))
                }
                FieldType::Float32 => builder.push_f32(ptr::read_unaligned(value as *const f32)),
                FieldType::Float64 => builder.push_f64(ptr::read_unaligned(value as *const f64)),
                FieldType::String => builder.push_bytes(CStr::from_ptr(value as *const c_char).to_bytes()),
                FieldType::Binary => builder.push_bytes(std::slice::from_raw_parts(
                    value as *const u8,
                    usize::from(field.var_length),
                )),
                FieldType::Null => builder.push_null(),
                FieldType::Unknown => {
                    warn!(field = %field.name, "unknown field type in native row");
                    builder.push_empty()
                }
            };
        }
    }
    builder.finish()
}

impl Drop for FfiClient {
    fn drop(&mut self) {
        self.release();
    }
}
