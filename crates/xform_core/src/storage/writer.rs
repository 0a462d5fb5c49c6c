use std::fmt::Debug;
use std::sync::Arc;

use tracing::debug;
use xform_error::{DbError, Result};

use super::column::{BinaryValue, ColumnStorage, EnumColumn, PrimitiveColumn, StringColumn};
use super::provider::StreamProvider;
use super::reader::NULLS_PREFIX;
use super::schema::{ColumnEncoding, SchemaColumn, TableSchema};
use crate::arrays::array::Array;
use crate::arrays::datatype::{DataType, PhysicalType};
use crate::execution::cancel::CancellationToken;
use crate::execution::column::{ArrayGetter, Column};
use crate::execution::table::{BoxedTable, Table};

/// Writes every batch pulled through it to a binary table.
///
/// Rows pass through unchanged. Nothing touches the provider until the first
/// pull, when any previous copy of the table is removed. The schema manifest
/// is written once the source is exhausted, so a table is only readable after
/// it has been pulled to the end.
#[derive(Debug)]
pub struct BinaryTableWriter {
    source: BoxedTable,
    provider: Arc<dyn StreamProvider>,
    table_path: String,
    writers: Vec<ColumnWriter>,
    rows: usize,
    started: bool,
    finished: bool,
}

#[derive(Debug)]
struct ColumnWriter {
    schema: SchemaColumn,
    folder: String,
    getter: ArrayGetter,
    batch: Box<dyn BatchWriter>,
}

impl BinaryTableWriter {
    pub fn try_new(
        source: BoxedTable,
        provider: Arc<dyn StreamProvider>,
        table_path: impl Into<String>,
    ) -> Result<Self> {
        let table_path = table_path.into();

        let writers = source
            .columns()
            .iter()
            .map(|col| ColumnWriter::try_new(col.as_ref(), &table_path))
            .collect::<Result<Vec<_>>>()?;

        Ok(BinaryTableWriter {
            source,
            provider,
            table_path,
            writers,
            rows: 0,
            started: false,
            finished: false,
        })
    }

    fn start(&mut self) -> Result<()> {
        self.provider.delete_folder(&self.table_path)?;
        self.started = true;
        debug!(path = %self.table_path, columns = self.writers.len(), "writing binary table");
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let schema = TableSchema {
            columns: self.writers.iter().map(|w| w.schema.clone()).collect(),
            row_count: self.rows,
        };
        schema.write(self.provider.as_ref(), &self.table_path)?;
        self.finished = true;
        debug!(path = %self.table_path, rows = self.rows, "finished binary table");
        Ok(())
    }
}

impl ColumnWriter {
    fn try_new(column: &dyn Column, table_path: &str) -> Result<Self> {
        let details = column.details().clone();

        // Dictionary columns keep their encoding. Enum rows can't be null.
        let encoding = if column.indices_type().is_some()
            && details.datatype == DataType::Utf8
            && !details.nullable
        {
            ColumnEncoding::Enum
        } else {
            ColumnEncoding::Plain
        };

        let nullable = details.nullable;
        let batch: Box<dyn BatchWriter> = match (encoding, details.datatype.physical_type()) {
            (ColumnEncoding::Enum, _) => Box::new(EnumBatchWriter {
                values: EnumColumn::new(),
            }),
            (_, PhysicalType::Boolean) => PrimitiveBatchWriter::<bool>::boxed(nullable),
            (_, PhysicalType::Int8) => PrimitiveBatchWriter::<i8>::boxed(nullable),
            (_, PhysicalType::Int16) => PrimitiveBatchWriter::<i16>::boxed(nullable),
            (_, PhysicalType::Int32) => PrimitiveBatchWriter::<i32>::boxed(nullable),
            (_, PhysicalType::Int64) => PrimitiveBatchWriter::<i64>::boxed(nullable),
            (_, PhysicalType::UInt8) => PrimitiveBatchWriter::<u8>::boxed(nullable),
            (_, PhysicalType::UInt16) => PrimitiveBatchWriter::<u16>::boxed(nullable),
            (_, PhysicalType::UInt32) => PrimitiveBatchWriter::<u32>::boxed(nullable),
            (_, PhysicalType::UInt64) => PrimitiveBatchWriter::<u64>::boxed(nullable),
            (_, PhysicalType::Float32) => PrimitiveBatchWriter::<f32>::boxed(nullable),
            (_, PhysicalType::Float64) => PrimitiveBatchWriter::<f64>::boxed(nullable),
            (_, PhysicalType::Utf8) => Box::new(StringBatchWriter {
                values: StringColumn::new(),
                nulls: null_column(nullable),
            }),
        };

        Ok(ColumnWriter {
            folder: format!("{table_path}/{}", details.name),
            schema: SchemaColumn { details, encoding },
            getter: column.current_getter()?,
            batch,
        })
    }

    fn write(&mut self, provider: &dyn StreamProvider) -> Result<()> {
        let array = self.getter.get()?;
        self.batch.write(&array, provider, &self.folder).map_err(|e| {
            DbError::io("Failed to write column")
                .with_field("column", &self.schema.details.name)
                .with_source(Box::new(e))
        })
    }
}

impl Table for BinaryTableWriter {
    fn columns(&self) -> &[Arc<dyn Column>] {
        self.source.columns()
    }

    fn current_row_count(&self) -> usize {
        self.source.current_row_count()
    }

    /// Always unknown so counting pulls the rows through and writes them.
    fn count(&self) -> Option<usize> {
        None
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        if !self.started {
            self.start()?;
        }

        let count = self.source.next(desired, cancel)?;
        if count == 0 {
            if !self.finished {
                self.finish()?;
            }
            return Ok(0);
        }

        for writer in &mut self.writers {
            writer.write(self.provider.as_ref())?;
        }
        self.rows += count;

        Ok(count)
    }

    /// Restart the source. The table is rewritten from the next pull.
    fn reset(&mut self) -> Result<()> {
        self.source.reset()?;
        self.rows = 0;
        self.started = false;
        self.finished = false;
        Ok(())
    }
}

fn null_column(nullable: bool) -> Option<PrimitiveColumn<bool>> {
    nullable.then(|| PrimitiveColumn::with_prefix(NULLS_PREFIX))
}

/// Appends one batch of a column to its files.
trait BatchWriter: Debug + Send {
    fn write(&mut self, array: &Array, provider: &dyn StreamProvider, folder: &str) -> Result<()>;
}

fn write_nulls(
    nulls: &mut Option<PrimitiveColumn<bool>>,
    array: &Array,
    provider: &dyn StreamProvider,
    folder: &str,
) -> Result<()> {
    if let Some(nulls) = nulls {
        nulls.clear()?;
        for idx in array.selector().iter() {
            nulls.push(array.is_null_physical(idx))?;
        }
        nulls.write_binary(provider, folder)?;
    }
    Ok(())
}

#[derive(Debug)]
struct PrimitiveBatchWriter<T> {
    values: PrimitiveColumn<T>,
    nulls: Option<PrimitiveColumn<bool>>,
}

impl<T: BinaryValue> PrimitiveBatchWriter<T> {
    fn boxed(nullable: bool) -> Box<dyn BatchWriter> {
        Box::new(PrimitiveBatchWriter::<T> {
            values: PrimitiveColumn::new(),
            nulls: null_column(nullable),
        })
    }
}

impl<T: BinaryValue> BatchWriter for PrimitiveBatchWriter<T> {
    fn write(&mut self, array: &Array, provider: &dyn StreamProvider, folder: &str) -> Result<()> {
        self.values.clear()?;
        for v in array.iter::<T>()? {
            self.values.push(v.copied().unwrap_or_default())?;
        }
        self.values.write_binary(provider, folder)?;
        write_nulls(&mut self.nulls, array, provider, folder)
    }
}

#[derive(Debug)]
struct StringBatchWriter {
    values: StringColumn,
    nulls: Option<PrimitiveColumn<bool>>,
}

impl BatchWriter for StringBatchWriter {
    fn write(&mut self, array: &Array, provider: &dyn StreamProvider, folder: &str) -> Result<()> {
        self.values.clear()?;
        for v in array.iter::<String>()? {
            self.values.push(v.map(|s| s.as_str()).unwrap_or_default())?;
        }
        self.values.write_binary(provider, folder)?;
        write_nulls(&mut self.nulls, array, provider, folder)
    }
}

#[derive(Debug)]
struct EnumBatchWriter {
    values: EnumColumn,
}

impl BatchWriter for EnumBatchWriter {
    fn write(&mut self, array: &Array, provider: &dyn StreamProvider, folder: &str) -> Result<()> {
        self.values.clear()?;
        for v in array.iter::<String>()? {
            self.values.push(v.map(|s| s.as_str()).unwrap_or_default())?;
        }
        self.values.write_binary(provider, folder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::array_table::ArrayTable;
    use crate::execution::column::ColumnDetails;
    use crate::execution::run::run_to_end;
    use crate::storage::provider::LocalFileStreamProvider;
    use crate::storage::reader::BinaryTableReader;
    use crate::testutil::{assert_tables_eq, collect_column};

    fn sample() -> ArrayTable {
        ArrayTable::try_new([
            ("ID", Array::from_iter(0..25)),
            (
                "Title",
                Array::from_options((0..25).map(|i| (i % 5 != 0).then(|| format!("Bug ñ{i}")))),
            ),
            ("Score", Array::from_iter((0..25).map(|i| i as f64 / 2.0))),
            ("Open", Array::from_iter((0..25).map(|i| i % 2 == 0))),
        ])
        .unwrap()
    }

    #[test]
    fn write_then_read_matches_source() {
        let dir = tempfile::tempdir().unwrap();
        let provider: Arc<dyn StreamProvider> = Arc::new(LocalFileStreamProvider::new(dir.path()));

        let mut writer = BinaryTableWriter::try_new(Box::new(sample()), provider.clone(), "Out").unwrap();
        let result = run_to_end(&mut writer, 7, &CancellationToken::new()).unwrap();
        assert_eq!(25, result.rows);

        let mut reader = BinaryTableReader::try_new(provider, "Out").unwrap();
        assert_eq!(Some(25), reader.count());
        assert_tables_eq(&mut sample(), &mut reader, 10);
    }

    #[test]
    fn schema_written_only_when_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let provider: Arc<dyn StreamProvider> = Arc::new(LocalFileStreamProvider::new(dir.path()));

        let mut writer = BinaryTableWriter::try_new(Box::new(sample()), provider.clone(), "Out").unwrap();
        writer.next(10, &CancellationToken::new()).unwrap();
        BinaryTableReader::try_new(provider.clone(), "Out").unwrap_err();

        run_to_end(&mut writer, 10, &CancellationToken::new()).unwrap();
        BinaryTableReader::try_new(provider, "Out").unwrap();
    }

    #[test]
    fn existing_table_kept_until_first_pull() {
        let dir = tempfile::tempdir().unwrap();
        let provider: Arc<dyn StreamProvider> = Arc::new(LocalFileStreamProvider::new(dir.path()));

        let mut writer = BinaryTableWriter::try_new(Box::new(sample()), provider.clone(), "Out").unwrap();
        run_to_end(&mut writer, 10, &CancellationToken::new()).unwrap();

        let unused = BinaryTableWriter::try_new(Box::new(sample()), provider.clone(), "Out").unwrap();
        assert_eq!(None, unused.count());
        drop(unused);

        let mut reader = BinaryTableReader::try_new(provider, "Out").unwrap();
        assert_eq!(Some(25), reader.count());
        assert_tables_eq(&mut sample(), &mut reader, 10);
    }

    #[test]
    fn rewrite_after_reset() {
        let dir = tempfile::tempdir().unwrap();
        let provider: Arc<dyn StreamProvider> = Arc::new(LocalFileStreamProvider::new(dir.path()));

        let mut writer = BinaryTableWriter::try_new(Box::new(sample()), provider.clone(), "Out").unwrap();
        run_to_end(&mut writer, 10, &CancellationToken::new()).unwrap();
        writer.reset().unwrap();
        run_to_end(&mut writer, 10, &CancellationToken::new()).unwrap();

        let mut reader = BinaryTableReader::try_new(provider, "Out").unwrap();
        let ids = collect_column::<i32>(&mut reader, "ID", 100).unwrap();
        assert_eq!(25, ids.len());
    }

    #[test]
    fn enum_encoding_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let provider: Arc<dyn StreamProvider> = Arc::new(LocalFileStreamProvider::new(dir.path()));

        // Write an enum table directly, then copy it through the writer.
        let mut states = EnumColumn::new();
        for s in ["New", "Done", "New", "New"] {
            states.push(s).unwrap();
        }
        states.write_binary(provider.as_ref(), "In/State").unwrap();
        TableSchema {
            columns: vec![SchemaColumn {
                details: ColumnDetails::new("State", DataType::Utf8, false),
                encoding: ColumnEncoding::Enum,
            }],
            row_count: 4,
        }
        .write(provider.as_ref(), "In")
        .unwrap();

        let source = BinaryTableReader::try_new(provider.clone(), "In").unwrap();
        let mut writer = BinaryTableWriter::try_new(Box::new(source), provider.clone(), "Out").unwrap();
        run_to_end(&mut writer, 3, &CancellationToken::new()).unwrap();

        let schema = TableSchema::read(provider.as_ref(), "Out").unwrap();
        assert_eq!(ColumnEncoding::Enum, schema.columns[0].encoding);

        let mut reader = BinaryTableReader::try_new(provider, "Out").unwrap();
        let states = collect_column::<String>(&mut reader, "State", 10).unwrap();
        let states: Vec<_> = states.into_iter().map(|s| s.unwrap()).collect();
        assert_eq!(vec!["New", "Done", "New", "New"], states);
    }
}
