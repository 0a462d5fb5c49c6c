//! In-memory column storage with a little-endian binary form.
//!
//! Columns are grown while mutable, then converted to an immutable form for
//! reading. Binary writes append to the column's files so a table can be
//! written one batch at a time.
use std::fmt::Debug;
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem::size_of;

use ahash::{HashMap, HashMapExt};
use xform_error::{DbError, Result};

use super::provider::{ReadStream, StreamProvider};
use crate::arrays::array::PhysicalStorage;

/// Fixed-width values with a little-endian encoding.
pub trait BinaryValue: PhysicalStorage + Copy {
    const WIDTH: usize;

    fn encode(&self, out: &mut Vec<u8>);

    /// Decode from exactly `WIDTH` bytes.
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! impl_binary_value {
    ($native:ty) => {
        impl BinaryValue for $native {
            const WIDTH: usize = size_of::<$native>();

            fn encode(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn decode(bytes: &[u8]) -> Self {
                let mut buf = [0; size_of::<$native>()];
                buf.copy_from_slice(bytes);
                <$native>::from_le_bytes(buf)
            }
        }
    };
}

impl_binary_value!(i8);
impl_binary_value!(i16);
impl_binary_value!(i32);
impl_binary_value!(i64);
impl_binary_value!(u8);
impl_binary_value!(u16);
impl_binary_value!(u32);
impl_binary_value!(u64);
impl_binary_value!(f32);
impl_binary_value!(f64);

impl BinaryValue for bool {
    const WIDTH: usize = 1;

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// Read `count` values starting at row `start` from a stream of encoded
/// values, appending them to `out`.
///
/// `bytes` is scratch space reused across calls.
pub fn read_values_range<T: BinaryValue>(
    stream: &mut dyn ReadStream,
    start: usize,
    count: usize,
    bytes: &mut Vec<u8>,
    out: &mut Vec<T>,
) -> Result<()> {
    bytes.clear();
    bytes.resize(count * T::WIDTH, 0);
    stream.seek(SeekFrom::Start((start * T::WIDTH) as u64))?;
    stream.read_exact(bytes).map_err(|e| {
        DbError::io("Column file shorter than expected")
            .with_field("start", start)
            .with_field("count", count)
            .with_source(Box::new(e))
    })?;
    out.extend(bytes.chunks_exact(T::WIDTH).map(T::decode));
    Ok(())
}

fn read_all_values<T: BinaryValue>(stream: &mut dyn ReadStream, out: &mut Vec<T>) -> Result<()> {
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes)?;
    if bytes.len() % T::WIDTH != 0 {
        return Err(DbError::io("Column file length is not a multiple of the value width")
            .with_field("len", bytes.len())
            .with_field("width", T::WIDTH));
    }
    out.extend(bytes.chunks_exact(T::WIDTH).map(T::decode));
    Ok(())
}

fn append_bytes(provider: &dyn StreamProvider, path: &str, bytes: &[u8]) -> Result<()> {
    let mut stream = provider.open_append(path)?;
    stream.write_all(bytes)?;
    stream.flush()?;
    Ok(())
}

/// Storage for a single column.
pub trait ColumnStorage: Debug + Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a row holding the default value.
    fn add(&mut self) -> Result<()>;

    fn clear(&mut self) -> Result<()>;

    /// Truncate, or pad with default values.
    fn set_len(&mut self, len: usize) -> Result<()>;

    /// Switch to the read-optimized form. Structural changes are rejected
    /// afterwards.
    fn convert_to_immutable(&mut self);

    fn is_immutable(&self) -> bool;

    /// Replace the contents with the column stored under `folder`.
    fn read_binary(&mut self, provider: &dyn StreamProvider, folder: &str) -> Result<()>;

    /// Append the rows to the column's files under `folder`.
    fn write_binary(&self, provider: &dyn StreamProvider, folder: &str) -> Result<()>;
}

fn check_mutable(immutable: bool) -> Result<()> {
    if immutable {
        return Err(DbError::new("Cannot modify an immutable column"));
    }
    Ok(())
}

/// Fixed-width values, stored as `<prefix>.<ext>.bin`.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveColumn<T> {
    prefix: &'static str,
    values: Vec<T>,
    immutable: bool,
}

impl<T: BinaryValue> PrimitiveColumn<T> {
    /// Column of values stored as `V.<ext>.bin`.
    pub fn new() -> Self {
        Self::with_prefix("V")
    }

    pub fn with_prefix(prefix: &'static str) -> Self {
        PrimitiveColumn {
            prefix,
            values: Vec::new(),
            immutable: false,
        }
    }

    pub fn file_name(&self) -> String {
        file_name::<T>(self.prefix)
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn push(&mut self, value: T) -> Result<()> {
        check_mutable(self.immutable)?;
        self.values.push(value);
        Ok(())
    }

    pub fn set(&mut self, idx: usize, value: T) -> Result<()> {
        check_mutable(self.immutable)?;
        let len = self.values.len();
        let slot = self.values.get_mut(idx).ok_or_else(|| {
            DbError::new("Row out of bounds")
                .with_field("idx", idx)
                .with_field("len", len)
        })?;
        *slot = value;
        Ok(())
    }
}

impl<T: BinaryValue> Default for PrimitiveColumn<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// File name for primitive values with a given prefix.
pub fn file_name<T: BinaryValue>(prefix: &str) -> String {
    format!("{prefix}.{}.bin", T::DATATYPE.binary_extension())
}

impl<T: BinaryValue> ColumnStorage for PrimitiveColumn<T> {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn add(&mut self) -> Result<()> {
        self.push(T::default())
    }

    fn clear(&mut self) -> Result<()> {
        check_mutable(self.immutable)?;
        self.values.clear();
        Ok(())
    }

    fn set_len(&mut self, len: usize) -> Result<()> {
        check_mutable(self.immutable)?;
        self.values.resize(len, T::default());
        Ok(())
    }

    fn convert_to_immutable(&mut self) {
        self.values.shrink_to_fit();
        self.immutable = true;
    }

    fn is_immutable(&self) -> bool {
        self.immutable
    }

    fn read_binary(&mut self, provider: &dyn StreamProvider, folder: &str) -> Result<()> {
        let mut stream = provider.open_read(&format!("{folder}/{}", self.file_name()))?;
        self.values.clear();
        read_all_values(stream.as_mut(), &mut self.values)
    }

    fn write_binary(&self, provider: &dyn StreamProvider, folder: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(self.values.len() * T::WIDTH);
        for v in &self.values {
            v.encode(&mut bytes);
        }
        append_bytes(provider, &format!("{folder}/{}", self.file_name()), &bytes)
    }
}

/// Deduplicating store of strings addressed by id.
#[derive(Debug, Clone, Default)]
pub struct StringStore {
    values: Vec<String>,
    lookup: HashMap<String, u32>,
}

impl StringStore {
    pub fn new() -> Self {
        StringStore {
            values: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Get the id for a string, adding it if it's new.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(id) = self.lookup.get(s) {
            return *id;
        }
        let id = self.values.len() as u32;
        self.values.push(s.to_string());
        self.lookup.insert(s.to_string(), id);
        id
    }

    pub fn get(&self, id: u32) -> Option<&str> {
        self.values.get(id as usize).map(|s| s.as_str())
    }

    pub fn get_id(&self, s: &str) -> Option<u32> {
        self.lookup.get(s).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Reorder the store so ids follow sorted string order.
    ///
    /// Returns the new id for each old id.
    fn sort(&mut self) -> Vec<u32> {
        let mut order: Vec<u32> = (0..self.values.len() as u32).collect();
        order.sort_by(|a, b| self.values[*a as usize].cmp(&self.values[*b as usize]));

        let mut remap = vec![0; order.len()];
        for (new_id, old_id) in order.iter().enumerate() {
            remap[*old_id as usize] = new_id as u32;
        }

        let mut old: Vec<Option<String>> = std::mem::take(&mut self.values)
            .into_iter()
            .map(Some)
            .collect();
        self.values = order
            .iter()
            .map(|id| old[*id as usize].take().unwrap_or_default())
            .collect();
        for (id, s) in self.values.iter().enumerate() {
            self.lookup.insert(s.clone(), id as u32);
        }

        remap
    }
}

/// String values stored once in a `StringStore` with an id per row.
///
/// On disk each row's bytes are concatenated in `V.s.bin` with the end
/// offset of every row in `V.pos.bin`.
#[derive(Debug, Clone, Default)]
pub struct StringColumn {
    store: StringStore,
    ids: Vec<u32>,
    immutable: bool,
}

pub const STRING_BYTES_FILE: &str = "V.s.bin";
pub const STRING_POSITIONS_FILE: &str = "V.pos.bin";

impl StringColumn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, s: &str) -> Result<()> {
        check_mutable(self.immutable)?;
        let id = self.store.intern(s);
        self.ids.push(id);
        Ok(())
    }

    pub fn get(&self, row: usize) -> Option<&str> {
        self.ids.get(row).and_then(|id| self.store.get(*id))
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn store(&self) -> &StringStore {
        &self.store
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.ids.iter().filter_map(|id| self.store.get(*id))
    }
}

impl ColumnStorage for StringColumn {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn add(&mut self) -> Result<()> {
        self.push("")
    }

    fn clear(&mut self) -> Result<()> {
        check_mutable(self.immutable)?;
        self.ids.clear();
        Ok(())
    }

    fn set_len(&mut self, len: usize) -> Result<()> {
        check_mutable(self.immutable)?;
        if len <= self.ids.len() {
            self.ids.truncate(len);
        } else {
            let empty = self.store.intern("");
            self.ids.resize(len, empty);
        }
        Ok(())
    }

    fn convert_to_immutable(&mut self) {
        if self.immutable {
            return;
        }
        let remap = self.store.sort();
        for id in &mut self.ids {
            *id = remap[*id as usize];
        }
        self.ids.shrink_to_fit();
        self.immutable = true;
    }

    fn is_immutable(&self) -> bool {
        self.immutable
    }

    fn read_binary(&mut self, provider: &dyn StreamProvider, folder: &str) -> Result<()> {
        let mut ends: Vec<i64> = Vec::new();
        let mut pos = provider.open_read(&format!("{folder}/{STRING_POSITIONS_FILE}"))?;
        read_all_values(pos.as_mut(), &mut ends)?;

        let mut bytes = Vec::new();
        provider
            .open_read(&format!("{folder}/{STRING_BYTES_FILE}"))?
            .read_to_end(&mut bytes)?;

        let immutable = self.immutable;
        self.store = StringStore::new();
        self.ids.clear();
        self.immutable = false;

        let mut start = 0;
        for end in ends {
            let s = decode_str(&bytes, start, end)?;
            self.push(s)?;
            start = end as usize;
        }

        if immutable {
            self.convert_to_immutable();
        }
        Ok(())
    }

    fn write_binary(&self, provider: &dyn StreamProvider, folder: &str) -> Result<()> {
        let bytes_path = format!("{folder}/{STRING_BYTES_FILE}");
        let mut offset = provider.size(&bytes_path)?.unwrap_or(0) as i64;

        let mut bytes = Vec::new();
        let mut ends = Vec::with_capacity(self.ids.len() * i64::WIDTH);
        for s in self.iter() {
            bytes.extend_from_slice(s.as_bytes());
            offset += s.len() as i64;
            offset.encode(&mut ends);
        }

        append_bytes(provider, &bytes_path, &bytes)?;
        append_bytes(provider, &format!("{folder}/{STRING_POSITIONS_FILE}"), &ends)
    }
}

/// Get the string for a row from concatenated bytes given its start and end
/// offsets.
pub fn decode_str(bytes: &[u8], start: usize, end: i64) -> Result<&str> {
    let end = usize::try_from(end).map_err(|_| DbError::io("Negative string offset"))?;
    let slice = bytes.get(start..end).ok_or_else(|| {
        DbError::io("String offsets out of bounds")
            .with_field("start", start)
            .with_field("end", end)
            .with_field("len", bytes.len())
    })?;
    std::str::from_utf8(slice).map_err(|e| DbError::io("Invalid UTF-8 in string column").with_source(Box::new(e)))
}

/// Dictionary encoded strings: a small table of distinct values and a
/// one-byte index per row.
///
/// Distinct values live under `Values/`, the indices in `Indices.u8.bin`.
#[derive(Debug, Clone, Default)]
pub struct EnumColumn {
    values: StringColumn,
    indices: PrimitiveColumn<u8>,
    immutable: bool,
}

pub const ENUM_VALUES_FOLDER: &str = "Values";
pub const ENUM_INDICES_PREFIX: &str = "Indices";

/// Most distinct values an enum column can hold.
pub const MAX_ENUM_VALUES: usize = 256;

impl EnumColumn {
    pub fn new() -> Self {
        EnumColumn {
            values: StringColumn::new(),
            indices: PrimitiveColumn::with_prefix(ENUM_INDICES_PREFIX),
            immutable: false,
        }
    }

    pub fn push(&mut self, s: &str) -> Result<()> {
        check_mutable(self.immutable)?;
        // Values are distinct and never sorted, so a value's id is its
        // position.
        let idx = match self.values.store().get_id(s) {
            Some(id) => id as usize,
            None => {
                if self.values.len() >= MAX_ENUM_VALUES {
                    return Err(DbError::usage(format!(
                        "Enum columns hold at most {MAX_ENUM_VALUES} distinct values"
                    ))
                    .with_field("value", s));
                }
                self.values.push(s)?;
                self.values.len() - 1
            }
        };
        self.indices.push(idx as u8)
    }

    /// Distinct values, in index order.
    pub fn values(&self) -> Vec<&str> {
        self.values.iter().collect()
    }

    pub fn indices(&self) -> &[u8] {
        self.indices.values()
    }

    pub fn get(&self, row: usize) -> Option<&str> {
        let idx = *self.indices.values().get(row)?;
        self.values.get(idx as usize)
    }
}

impl ColumnStorage for EnumColumn {
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn add(&mut self) -> Result<()> {
        self.push("")
    }

    /// Clears rows, keeping the distinct values.
    fn clear(&mut self) -> Result<()> {
        check_mutable(self.immutable)?;
        self.indices.clear()
    }

    fn set_len(&mut self, len: usize) -> Result<()> {
        check_mutable(self.immutable)?;
        while self.indices.len() < len {
            self.add()?;
        }
        self.indices.set_len(len)
    }

    fn convert_to_immutable(&mut self) {
        // Indices refer to positions in the value table, so the value table
        // keeps its order.
        self.indices.convert_to_immutable();
        self.immutable = true;
    }

    fn is_immutable(&self) -> bool {
        self.immutable
    }

    fn read_binary(&mut self, provider: &dyn StreamProvider, folder: &str) -> Result<()> {
        let mut values = StringColumn::new();
        values.read_binary(provider, &format!("{folder}/{ENUM_VALUES_FOLDER}"))?;

        let mut indices = PrimitiveColumn::with_prefix(ENUM_INDICES_PREFIX);
        indices.read_binary(provider, folder)?;
        if let Some(max) = indices.values().iter().max() {
            if *max as usize >= values.len() {
                return Err(DbError::io("Enum index out of range of values")
                    .with_field("index", max)
                    .with_field("values", values.len()));
            }
        }

        self.values = values;
        self.indices = indices;
        if self.immutable {
            self.indices.convert_to_immutable();
        }
        Ok(())
    }

    /// Replaces the value table and appends the indices.
    fn write_binary(&self, provider: &dyn StreamProvider, folder: &str) -> Result<()> {
        let values_folder = format!("{folder}/{ENUM_VALUES_FOLDER}");
        provider.delete_folder(&values_folder)?;
        self.values.write_binary(provider, &values_folder)?;
        self.indices.write_binary(provider, folder)
    }
}
