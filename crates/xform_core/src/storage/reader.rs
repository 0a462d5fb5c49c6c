use std::fmt::Debug;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use xform_error::{DbError, Result};

use super::column::{
    decode_str, file_name, read_values_range, BinaryValue, ColumnStorage, StringColumn,
    ENUM_INDICES_PREFIX, ENUM_VALUES_FOLDER, STRING_BYTES_FILE, STRING_POSITIONS_FILE,
};
use super::provider::{resolve_table_version, ReadStream, StreamProvider, FULL_CRAWL};
use super::schema::{ColumnEncoding, SchemaColumn, TableSchema};
use crate::arrays::array::Array;
use crate::arrays::datatype::{DataType, PhysicalType};
use crate::arrays::executor::ArrayBuffer;
use crate::arrays::selector::Selector;
use crate::execution::cancel::CancellationToken;
use crate::execution::column::{ArrayGetter, Column, ColumnDetails, GetArray, SeekArray, SeekGetter};
use crate::execution::table::Table;

pub const NULLS_PREFIX: &str = "Vn";

/// Streams a table stored in the binary columnar format.
///
/// Columns read only the rows of the current batch, and only when a getter
/// for them is used.
#[derive(Debug)]
pub struct BinaryTableReader {
    path: String,
    row_count: usize,
    columns: Vec<Arc<dyn Column>>,
    current: Arc<Mutex<Selector>>,
}

impl BinaryTableReader {
    /// Open the table stored at `table_path`.
    pub fn try_new(provider: Arc<dyn StreamProvider>, table_path: impl Into<String>) -> Result<Self> {
        let path = table_path.into();
        let schema = TableSchema::read(provider.as_ref(), &path)?;
        let current = Arc::new(Mutex::new(Selector::empty()));

        let columns = schema
            .columns
            .into_iter()
            .map(|col| {
                Arc::new(BinaryColumn {
                    folder: format!("{path}/{}", col.details.name),
                    schema: col,
                    provider: provider.clone(),
                    current: current.clone(),
                }) as Arc<dyn Column>
            })
            .collect();

        debug!(%path, rows = schema.row_count, "opened binary table");

        Ok(BinaryTableReader {
            path,
            row_count: schema.row_count,
            columns,
            current,
        })
    }

    /// Open the latest full version of a named table at or before `as_of`.
    pub fn open_as_of(provider: Arc<dyn StreamProvider>, name: &str, as_of: i64) -> Result<Self> {
        let path = resolve_table_version(provider.as_ref(), name, FULL_CRAWL, as_of)?;
        Self::try_new(provider, path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Table for BinaryTableReader {
    fn columns(&self) -> &[Arc<dyn Column>] {
        &self.columns
    }

    fn current_row_count(&self) -> usize {
        self.current.lock().len()
    }

    fn count(&self) -> Option<usize> {
        Some(self.row_count)
    }

    fn next(&mut self, desired: usize, _cancel: &CancellationToken) -> Result<usize> {
        let mut current = self.current.lock();
        *current = current.next_page(self.row_count, desired);
        Ok(current.len())
    }

    fn reset(&mut self) -> Result<()> {
        *self.current.lock() = Selector::empty();
        Ok(())
    }
}

#[derive(Debug)]
struct BinaryColumn {
    schema: SchemaColumn,
    folder: String,
    provider: Arc<dyn StreamProvider>,
    current: Arc<Mutex<Selector>>,
}

impl BinaryColumn {
    fn open_reader(&self) -> Result<Box<dyn RangeReader>> {
        let details = &self.schema.details;
        let provider = self.provider.as_ref();
        let folder = self.folder.as_str();

        if self.schema.encoding == ColumnEncoding::Enum {
            return Ok(Box::new(EnumReader::try_new(provider, folder)?));
        }

        let nulls = match details.nullable {
            true => open_if_exists(provider, &format!("{folder}/{}", file_name::<bool>(NULLS_PREFIX)))?,
            false => None,
        };

        fn primitive<T: BinaryValue>(
            provider: &dyn StreamProvider,
            folder: &str,
            datatype: DataType,
            nulls: Option<Box<dyn ReadStream>>,
        ) -> Result<Box<dyn RangeReader>> {
            let values = provider.open_read(&format!("{folder}/{}", file_name::<T>("V")))?;
            Ok(Box::new(PrimitiveReader::<T> {
                datatype,
                values,
                nulls: NullReader::new(nulls),
                bytes: Vec::new(),
                buffer: ArrayBuffer::new(),
            }))
        }

        let datatype = details.datatype;
        match datatype.physical_type() {
            PhysicalType::Boolean => primitive::<bool>(provider, folder, datatype, nulls),
            PhysicalType::Int8 => primitive::<i8>(provider, folder, datatype, nulls),
            PhysicalType::Int16 => primitive::<i16>(provider, folder, datatype, nulls),
            PhysicalType::Int32 => primitive::<i32>(provider, folder, datatype, nulls),
            PhysicalType::Int64 => primitive::<i64>(provider, folder, datatype, nulls),
            PhysicalType::UInt8 => primitive::<u8>(provider, folder, datatype, nulls),
            PhysicalType::UInt16 => primitive::<u16>(provider, folder, datatype, nulls),
            PhysicalType::UInt32 => primitive::<u32>(provider, folder, datatype, nulls),
            PhysicalType::UInt64 => primitive::<u64>(provider, folder, datatype, nulls),
            PhysicalType::Float32 => primitive::<f32>(provider, folder, datatype, nulls),
            PhysicalType::Float64 => primitive::<f64>(provider, folder, datatype, nulls),
            PhysicalType::Utf8 => Ok(Box::new(StringReader {
                positions: provider.open_read(&format!("{folder}/{STRING_POSITIONS_FILE}"))?,
                bytes_stream: provider.open_read(&format!("{folder}/{STRING_BYTES_FILE}"))?,
                nulls: NullReader::new(nulls),
                ends: Vec::new(),
                scratch: Vec::new(),
                bytes: Vec::new(),
                buffer: ArrayBuffer::new(),
            })),
        }
    }

    fn getter(&self, part: EnumPart) -> Result<Arc<BinaryColumnGetter>> {
        Ok(Arc::new(BinaryColumnGetter {
            column: self.schema.details.name.clone(),
            current: self.current.clone(),
            part,
            reader: Mutex::new(self.open_reader()?),
        }))
    }

    fn enum_getter(&self, part: EnumPart) -> Option<ArrayGetter> {
        if self.schema.encoding != ColumnEncoding::Enum {
            return None;
        }
        // Missing dictionary files surface as an error from the row getter,
        // here the column just falls back to row-at-a-time filtering.
        match self.getter(part) {
            Ok(getter) => Some(getter),
            Err(e) => {
                debug!(column = %self.schema.details.name, %e, "failed to open enum getter");
                None
            }
        }
    }
}

impl Column for BinaryColumn {
    fn details(&self) -> &ColumnDetails {
        &self.schema.details
    }

    fn current_getter(&self) -> Result<ArrayGetter> {
        Ok(self.getter(EnumPart::Rows)?)
    }

    fn seek_getter(&self) -> Option<SeekGetter> {
        self.getter(EnumPart::Rows).ok().map(|g| g as SeekGetter)
    }

    fn indices_type(&self) -> Option<DataType> {
        match self.schema.encoding {
            ColumnEncoding::Enum => Some(DataType::UInt8),
            ColumnEncoding::Plain => None,
        }
    }

    fn indices_getter(&self) -> Option<ArrayGetter> {
        self.enum_getter(EnumPart::Indices)
    }

    fn values_getter(&self) -> Option<ArrayGetter> {
        self.enum_getter(EnumPart::Values)
    }
}

/// Which array a getter produces. Only enum columns have more than rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnumPart {
    Rows,
    Indices,
    Values,
}

#[derive(Debug)]
struct BinaryColumnGetter {
    column: String,
    current: Arc<Mutex<Selector>>,
    part: EnumPart,
    reader: Mutex<Box<dyn RangeReader>>,
}

impl BinaryColumnGetter {
    fn read(&self, rows: Range<usize>) -> Result<Array> {
        let mut reader = self.reader.lock();
        let result = match self.part {
            EnumPart::Rows => reader.read(rows),
            EnumPart::Indices => reader.read_indices(rows),
            EnumPart::Values => reader.values(),
        };
        result.map_err(|e| {
            DbError::io("Failed to read column")
                .with_field("column", &self.column)
                .with_source(Box::new(e))
        })
    }
}

impl GetArray for BinaryColumnGetter {
    fn get(&self) -> Result<Array> {
        let current = self.current.lock().clone();
        match current.as_range() {
            Some(range) => self.read(range),
            None => SeekArray::get(self, &current),
        }
    }
}

impl SeekArray for BinaryColumnGetter {
    fn get(&self, rows: &Selector) -> Result<Array> {
        if let Some(range) = rows.as_range() {
            return self.read(range);
        }
        if rows.is_empty() {
            return self.read(0..0);
        }

        // Read the covering range and select within it.
        let min = rows.iter().map(|idx| idx.0).min().unwrap_or(0);
        let max = rows.iter().map(|idx| idx.0).max().unwrap_or(0);
        let covering = self.read(min..max + 1)?;
        let shifted: Vec<usize> = rows.iter().map(|idx| idx.0 - min).collect();
        covering.select(&Selector::indices(shifted))
    }
}

/// Reads ranges of rows from a column's files into reused buffers.
trait RangeReader: Debug + Send {
    fn read(&mut self, rows: Range<usize>) -> Result<Array>;

    fn read_indices(&mut self, _rows: Range<usize>) -> Result<Array> {
        Err(DbError::new("Column is not dictionary encoded"))
    }

    fn values(&mut self) -> Result<Array> {
        Err(DbError::new("Column is not dictionary encoded"))
    }
}

fn open_if_exists(provider: &dyn StreamProvider, path: &str) -> Result<Option<Box<dyn ReadStream>>> {
    match provider.size(path)? {
        Some(_) => Ok(Some(provider.open_read(path)?)),
        None => Ok(None),
    }
}

#[derive(Debug)]
struct NullReader {
    stream: Option<Box<dyn ReadStream>>,
    bytes: Vec<u8>,
    values: Vec<bool>,
}

impl NullReader {
    fn new(stream: Option<Box<dyn ReadStream>>) -> Self {
        NullReader {
            stream,
            bytes: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Read the null flags for a range, returning None if there's no mask.
    fn read(&mut self, rows: &Range<usize>) -> Result<Option<&[bool]>> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Ok(None),
        };
        self.values.clear();
        read_values_range::<bool>(stream.as_mut(), rows.start, rows.len(), &mut self.bytes, &mut self.values)?;
        Ok(Some(&self.values))
    }
}

#[derive(Debug)]
struct PrimitiveReader<T> {
    datatype: DataType,
    values: Box<dyn ReadStream>,
    nulls: NullReader,
    bytes: Vec<u8>,
    buffer: ArrayBuffer<T>,
}

impl<T: BinaryValue> RangeReader for PrimitiveReader<T> {
    fn read(&mut self, rows: Range<usize>) -> Result<Array> {
        let (values, out_nulls) = self.buffer.reset(rows.len());
        read_values_range::<T>(self.values.as_mut(), rows.start, rows.len(), &mut self.bytes, values)?;

        let has_nulls = match self.nulls.read(&rows)? {
            Some(nulls) => {
                nulls.iter().for_each(|n| out_nulls.push(*n));
                nulls.iter().any(|n| *n)
            }
            None => false,
        };

        self.buffer.finish(self.datatype, has_nulls)
    }
}

#[derive(Debug)]
struct StringReader {
    positions: Box<dyn ReadStream>,
    bytes_stream: Box<dyn ReadStream>,
    nulls: NullReader,
    ends: Vec<i64>,
    scratch: Vec<u8>,
    bytes: Vec<u8>,
    buffer: ArrayBuffer<String>,
}

impl RangeReader for StringReader {
    fn read(&mut self, rows: Range<usize>) -> Result<Array> {
        let (values, out_nulls) = self.buffer.reset(rows.len());

        if !rows.is_empty() {
            // Include the end of the previous row, which is where this range
            // starts.
            let first = rows.start.saturating_sub(1);
            self.ends.clear();
            read_values_range::<i64>(
                self.positions.as_mut(),
                first,
                rows.end - first,
                &mut self.scratch,
                &mut self.ends,
            )?;

            let (base, ends) = if rows.start == 0 {
                (0, self.ends.as_slice())
            } else {
                (self.ends[0], &self.ends[1..])
            };
            let base = usize::try_from(base).map_err(|_| DbError::io("Negative string offset"))?;
            let last = ends.last().copied().unwrap_or(base as i64);
            let len = usize::try_from(last).map_err(|_| DbError::io("Negative string offset"))?;
            let len = len.checked_sub(base).ok_or_else(|| DbError::io("String offsets out of order"))?;

            self.bytes.clear();
            self.bytes.resize(len, 0);
            self.bytes_stream.seek(SeekFrom::Start(base as u64))?;
            self.bytes_stream.read_exact(&mut self.bytes)?;

            let mut start = 0;
            for end in ends {
                let end = end - base as i64;
                values.push(decode_str(&self.bytes, start, end)?.to_string());
                start = end as usize;
            }
        }

        let has_nulls = match self.nulls.read(&rows)? {
            Some(nulls) => {
                nulls.iter().for_each(|n| out_nulls.push(*n));
                nulls.iter().any(|n| *n)
            }
            None => false,
        };

        self.buffer.finish(DataType::Utf8, has_nulls)
    }
}

#[derive(Debug)]
struct EnumReader {
    values: Array,
    indices: PrimitiveReader<u8>,
}

impl EnumReader {
    fn try_new(provider: &dyn StreamProvider, folder: &str) -> Result<Self> {
        let mut values = StringColumn::new();
        values.read_binary(provider, &format!("{folder}/{ENUM_VALUES_FOLDER}"))?;
        let values = Array::from_iter(values.iter().map(|s| s.to_string()));

        let indices = provider.open_read(&format!("{folder}/{}", file_name::<u8>(ENUM_INDICES_PREFIX)))?;

        Ok(EnumReader {
            values,
            indices: PrimitiveReader {
                datatype: DataType::UInt8,
                values: indices,
                nulls: NullReader::new(None),
                bytes: Vec::new(),
                buffer: ArrayBuffer::new(),
            },
        })
    }
}

impl RangeReader for EnumReader {
    fn read(&mut self, rows: Range<usize>) -> Result<Array> {
        let indices = self.indices.read(rows)?;
        let selected: Vec<usize> = indices.values::<u8>()?.iter().map(|idx| *idx as usize).collect();
        if let Some(max) = selected.iter().max() {
            if *max >= self.values.len() {
                return Err(DbError::io("Enum index out of range of values")
                    .with_field("index", max)
                    .with_field("values", self.values.len()));
            }
        }
        self.values.with_selector(Selector::indices(selected))
    }

    fn read_indices(&mut self, rows: Range<usize>) -> Result<Array> {
        self.indices.read(rows)
    }

    fn values(&mut self) -> Result<Array> {
        Ok(self.values.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::scalar::ScalarValue;
    use crate::arrays::selector::LogicalIndex;
    use crate::compare::CompareOp;
    use crate::execution::operators::filter::Where;
    use crate::storage::column::{EnumColumn, PrimitiveColumn};
    use crate::storage::provider::LocalFileStreamProvider;
    use crate::storage::schema::SchemaColumn;
    use crate::testutil::{collect_column, collect_rows};

    fn write_table(provider: &dyn StreamProvider) {
        let mut ids = PrimitiveColumn::<i32>::new();
        let mut titles = StringColumn::new();
        let mut title_nulls = PrimitiveColumn::<bool>::with_prefix(NULLS_PREFIX);
        let mut states = EnumColumn::new();

        for i in 0..10 {
            ids.push(i).unwrap();
            titles.push(&format!("title {i}")).unwrap();
            title_nulls.push(i % 4 == 3).unwrap();
            states.push(["Active", "Closed", "Resolved"][i as usize % 3]).unwrap();
        }
        ids.write_binary(provider, "T/ID").unwrap();
        titles.write_binary(provider, "T/Title").unwrap();
        title_nulls.write_binary(provider, "T/Title").unwrap();
        states.write_binary(provider, "T/State").unwrap();

        let plain = |details| SchemaColumn {
            details,
            encoding: ColumnEncoding::Plain,
        };
        TableSchema {
            columns: vec![
                plain(ColumnDetails::new("ID", DataType::Int32, false)),
                plain(ColumnDetails::new("Title", DataType::Utf8, true)),
                SchemaColumn {
                    details: ColumnDetails::new("State", DataType::Utf8, false),
                    encoding: ColumnEncoding::Enum,
                },
            ],
            row_count: 10,
        }
        .write(provider, "T")
        .unwrap();
    }

    fn open() -> (tempfile::TempDir, BinaryTableReader) {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(LocalFileStreamProvider::new(dir.path()));
        write_table(provider.as_ref());
        let reader = BinaryTableReader::try_new(provider, "T").unwrap();
        (dir, reader)
    }

    #[test]
    fn reads_all_rows_in_batches() {
        let (_dir, mut reader) = open();
        assert_eq!(Some(10), reader.count());

        let ids = collect_column::<i32>(&mut reader, "ID", 3).unwrap();
        assert_eq!((0..10).map(Some).collect::<Vec<_>>(), ids);

        reader.reset().unwrap();
        let titles = collect_column::<String>(&mut reader, "Title", 4).unwrap();
        assert_eq!(Some("title 2".to_string()), titles[2]);
        assert_eq!(None, titles[3]);
        assert_eq!(None, titles[7]);
        assert_eq!(Some("title 9".to_string()), titles[9]);
    }

    #[test]
    fn enum_column_rows_and_dictionary() {
        let (_dir, mut reader) = open();
        let state = reader.columns()[2].clone();
        assert_eq!(Some(DataType::UInt8), state.indices_type());

        let values = state.values_getter().unwrap().get().unwrap();
        assert_eq!(3, values.len());

        let indices = state.indices_getter().unwrap();
        let rows = state.current_getter().unwrap();
        reader.next(4, &CancellationToken::new()).unwrap();
        assert_eq!(
            vec![Some(&0), Some(&1), Some(&2), Some(&0)],
            indices.get().unwrap().iter::<u8>().unwrap().collect::<Vec<_>>()
        );
        let rows = rows.get().unwrap();
        assert_eq!(ScalarValue::from("Resolved"), rows.scalar(LogicalIndex(2)));
    }

    #[test]
    fn where_over_enum_column() {
        let (_dir, reader) = open();
        let mut filtered =
            Where::try_new(Box::new(reader), "State", CompareOp::Equal, &ScalarValue::from("Closed")).unwrap();
        let ids = collect_column::<i32>(&mut filtered, "ID", 4).unwrap();
        assert_eq!(vec![Some(1), Some(4), Some(7)], ids);
    }

    #[test]
    fn seek_getter_reads_rows() {
        let (_dir, reader) = open();
        let seek = reader.columns()[1].seek_getter().unwrap();

        let arr = seek.get(&Selector::indices(vec![8, 2, 5])).unwrap();
        let values: Vec<_> = arr.iter::<String>().unwrap().map(|v| v.cloned()).collect();
        assert_eq!(
            vec![Some("title 8".to_string()), Some("title 2".to_string()), Some("title 5".to_string())],
            values
        );
    }

    #[test]
    fn unread_columns_stay_unread() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(LocalFileStreamProvider::new(dir.path()));
        write_table(provider.as_ref());
        // Corrupt a column nobody asks for.
        std::fs::write(dir.path().join("T/Title/V.s.bin"), b"").unwrap();

        let mut reader = BinaryTableReader::try_new(provider, "T").unwrap();
        let ids = collect_column::<i32>(&mut reader, "ID", 100).unwrap();
        assert_eq!(10, ids.len());

        reader.reset().unwrap();
        let err = collect_rows(&mut reader, 100).unwrap_err();
        assert_eq!(xform_error::ErrorKind::Io, err.kind());
    }
}
