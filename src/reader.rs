//! RecordBatchReader implementations for query results.
//!
//! `RowsRecordBatchReader` drains a [`Rows`] cursor into Arrow record batches,
//! decoding up to `batch_size` rows per batch.

use std::sync::Arc;

use arrow_array::{RecordBatch, RecordBatchOptions};
use arrow_schema::{ArrowError, Schema, SchemaRef};

use crate::rows::Rows;
use crate::types::ColumnData;

/// Iterator-based RecordBatchReader for pre-loaded record batches.
pub struct VecRecordBatchReader {
    batches: std::vec::IntoIter<RecordBatch>,
    schema: SchemaRef,
}

impl VecRecordBatchReader {
    pub fn new(batches: Vec<RecordBatch>, schema: Schema) -> Self {
        Self {
            batches: batches.into_iter(),
            schema: Arc::new(schema),
        }
    }

    pub fn empty(schema: Schema) -> Self {
        Self::new(Vec::new(), schema)
    }
}

impl arrow_array::RecordBatchReader for VecRecordBatchReader {
    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }
}

impl Iterator for VecRecordBatchReader {
    type Item = std::result::Result<RecordBatch, ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.batches.next().map(Ok)
    }
}

/// Streams the rows of a result set as Arrow RecordBatches.
pub struct RowsRecordBatchReader {
    rows: Option<Rows>,
    schema: SchemaRef,
    batch_size: usize,
}

impl RowsRecordBatchReader {
    const DEFAULT_BATCH_SIZE: usize = 8192;

    pub fn new(rows: Rows) -> Self {
        let schema = Arc::new(rows.schema());
        Self {
            rows: Some(rows),
            schema,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Decodes up to `batch_size` rows into one batch. Returns `None` once
    /// the cursor is exhausted.
    fn read_batch(&mut self) -> Option<std::result::Result<RecordBatch, ArrowError>> {
        let rows = self.rows.as_mut()?;
        let mut columns: Vec<ColumnData> = self
            .schema
            .fields()
            .iter()
            .map(|f| ColumnData::for_data_type(f.data_type(), self.batch_size))
            .collect();

        let mut num_rows = 0;
        while num_rows < self.batch_size {
            match rows.next_row() {
                Ok(values) => {
                    for (column, value) in columns.iter_mut().zip(values.iter()) {
                        column.push(value);
                    }
                    num_rows += 1;
                }
                Err(e) if e.is_end_of_data() => {
                    self.rows = None;
                    break;
                }
                Err(e) => {
                    self.rows = None;
                    return Some(Err(ArrowError::ExternalError(Box::new(e))));
                }
            }
        }

        if num_rows == 0 {
            return None;
        }

        let arrays = columns.iter().map(ColumnData::to_arrow_array).collect();
        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        Some(RecordBatch::try_new_with_options(
            Arc::clone(&self.schema),
            arrays,
            &options,
        ))
    }
}

impl arrow_array::RecordBatchReader for RowsRecordBatchReader {
    fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }
}

impl Iterator for RowsRecordBatchReader {
    type Item = std::result::Result<RecordBatch, ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Adapter;
    use crate::native::mock::{MockClient, raw_field};
    use crate::row::RowBuilder;
    use crate::types::FieldType;
    use arrow_array::{Array, Int64Array, StringArray};
    use arrow_array::RecordBatchReader;

    fn reader_for(rows: usize, batch_size: usize) -> RowsRecordBatchReader {
        let data = (0..rows)
            .map(|i| {
                let mut builder = RowBuilder::new();
                builder.push_i64(i as i64);
                if i % 2 == 0 {
                    builder.push_text("even");
                } else {
                    builder.push_null();
                }
                builder.finish()
            })
            .collect();
        let client = MockClient::new().with_result(
            "q",
            vec![
                raw_field("id", FieldType::Int64, false),
                raw_field("tag", FieldType::String, true),
            ],
            data,
        );
        let adapter = Arc::new(Adapter::new(Box::new(client)));
        adapter.connect("c").unwrap();
        adapter.run_query("q", "", "").unwrap();
        let generation = adapter.fetch_result().unwrap().unwrap();
        RowsRecordBatchReader::new(Rows::new(adapter, generation).unwrap()).with_batch_size(batch_size)
    }

    #[test]
    fn test_rows_reader_batches() {
        let reader = reader_for(5, 2);
        assert_eq!(reader.schema().fields().len(), 2);
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.iter().map(|b| b.num_rows()).collect::<Vec<_>>(), vec![2, 2, 1]);

        let ids = batches[1].column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.value(0), 2);
        let tags = batches[0].column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(tags.value(0), "even");
        assert!(tags.is_null(1));
    }

    #[test]
    fn test_rows_reader_empty_result() {
        let mut reader = reader_for(0, 8);
        assert!(reader.next().is_none());
        assert_eq!(reader.schema().fields().len(), 2);
    }

    #[test]
    fn test_rows_reader_empty_rows() {
        let mut reader = RowsRecordBatchReader::new(Rows::empty());
        assert!(reader.next().is_none());
        assert!(reader.schema().fields().is_empty());
    }

    #[test]
    fn test_vec_reader() {
        let mut reader = VecRecordBatchReader::empty(Schema::empty());
        assert!(reader.next().is_none());
    }
}
