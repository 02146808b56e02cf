//! Column-by-column table assembly and Parquet I/O.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, RecordBatch, StringArray,
    TimestampMillisecondArray, UInt32Array,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use dealscout_shared::{DealScoutError, Result};

/// Builds a [`RecordBatch`] one named column at a time.
#[derive(Default)]
pub struct TableBuilder {
    fields: Vec<Field>,
    columns: Vec<ArrayRef>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, field: Field, column: ArrayRef) -> Self {
        self.fields.push(field);
        self.columns.push(column);
        self
    }

    /// Nullable text column.
    pub fn utf8<S, I>(self, name: &str, values: I) -> Self
    where
        S: AsRef<str>,
        I: IntoIterator<Item = Option<S>>,
    {
        let array: StringArray = values.into_iter().collect();
        self.push(Field::new(name, DataType::Utf8, true), Arc::new(array))
    }

    /// Non-null boolean column.
    pub fn boolean(self, name: &str, values: Vec<bool>) -> Self {
        self.push(
            Field::new(name, DataType::Boolean, false),
            Arc::new(BooleanArray::from(values)),
        )
    }

    /// Nullable boolean column.
    pub fn opt_boolean(self, name: &str, values: Vec<Option<bool>>) -> Self {
        self.push(
            Field::new(name, DataType::Boolean, true),
            Arc::new(BooleanArray::from(values)),
        )
    }

    pub fn float64(self, name: &str, values: Vec<Option<f64>>) -> Self {
        self.push(
            Field::new(name, DataType::Float64, true),
            Arc::new(Float64Array::from(values)),
        )
    }

    pub fn int32(self, name: &str, values: Vec<Option<i32>>) -> Self {
        self.push(
            Field::new(name, DataType::Int32, true),
            Arc::new(Int32Array::from(values)),
        )
    }

    pub fn int64(self, name: &str, values: Vec<Option<i64>>) -> Self {
        self.push(
            Field::new(name, DataType::Int64, true),
            Arc::new(Int64Array::from(values)),
        )
    }

    pub fn uint32(self, name: &str, values: Vec<u32>) -> Self {
        self.push(
            Field::new(name, DataType::UInt32, false),
            Arc::new(UInt32Array::from(values)),
        )
    }

    /// Non-null UTC timestamp column at millisecond precision.
    pub fn timestamp(self, name: &str, values: Vec<DateTime<Utc>>) -> Self {
        let millis: Vec<i64> = values.iter().map(DateTime::timestamp_millis).collect();
        self.push(
            Field::new(
                name,
                DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
                false,
            ),
            Arc::new(TimestampMillisecondArray::from(millis).with_timezone("UTC")),
        )
    }

    /// Assemble the batch. Fails if column lengths disagree.
    pub fn finish(self) -> Result<RecordBatch> {
        let schema = Arc::new(Schema::new(self.fields));
        RecordBatch::try_new(schema, self.columns)
            .map_err(|e| DealScoutError::Artifact(format!("building record batch: {e}")))
    }
}

/// Write one batch to `path`, creating parent directories.
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DealScoutError::io(parent, e))?;
    }

    let file = File::create(path).map_err(|e| DealScoutError::io(path, e))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).map_err(|e| {
        DealScoutError::Artifact(format!("opening parquet writer {}: {e}", path.display()))
    })?;
    writer.write(batch).map_err(|e| {
        DealScoutError::Artifact(format!("writing record batch {}: {e}", path.display()))
    })?;
    writer.close().map_err(|e| {
        DealScoutError::Artifact(format!("closing parquet writer {}: {e}", path.display()))
    })?;

    tracing::info!(path = %path.display(), rows = batch.num_rows(), "wrote parquet table");
    Ok(())
}

/// Read every batch back from a Parquet file.
pub fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = File::open(path).map_err(|e| DealScoutError::io(path, e))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|builder| builder.build())
        .map_err(|e| DealScoutError::Artifact(format!("reading {}: {e}", path.display())))?;
    reader
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| DealScoutError::Artifact(format!("reading {}: {e}", path.display())))
}
