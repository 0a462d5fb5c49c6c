use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;

use xform_error::{DbError, Result};

use super::bitmap::Bitmap;
use super::datatype::{DataType, PhysicalType};
use super::scalar::ScalarValue;
use super::selector::{LogicalIndex, PhysicalIndex, Selector};

/// Shared backing storage for an array, one variant per physical type.
///
/// Cloning only bumps reference counts.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Boolean(Arc<Vec<bool>>),
    Int8(Arc<Vec<i8>>),
    Int16(Arc<Vec<i16>>),
    Int32(Arc<Vec<i32>>),
    Int64(Arc<Vec<i64>>),
    UInt8(Arc<Vec<u8>>),
    UInt16(Arc<Vec<u16>>),
    UInt32(Arc<Vec<u32>>),
    UInt64(Arc<Vec<u64>>),
    Float32(Arc<Vec<f32>>),
    Float64(Arc<Vec<f64>>),
    Utf8(Arc<Vec<String>>),
}

/// Dispatch on the storage of an `ArrayData`, binding the inner `Arc<Vec<_>>`.
macro_rules! with_array_data {
    ($data:expr, |$values:ident| $body:expr) => {
        match $data {
            ArrayData::Boolean($values) => $body,
            ArrayData::Int8($values) => $body,
            ArrayData::Int16($values) => $body,
            ArrayData::Int32($values) => $body,
            ArrayData::Int64($values) => $body,
            ArrayData::UInt8($values) => $body,
            ArrayData::UInt16($values) => $body,
            ArrayData::UInt32($values) => $body,
            ArrayData::UInt64($values) => $body,
            ArrayData::Float32($values) => $body,
            ArrayData::Float64($values) => $body,
            ArrayData::Utf8($values) => $body,
        }
    };
}

impl ArrayData {
    pub fn len(&self) -> usize {
        with_array_data!(self, |v| v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn physical_type(&self) -> PhysicalType {
        match self {
            Self::Boolean(_) => PhysicalType::Boolean,
            Self::Int8(_) => PhysicalType::Int8,
            Self::Int16(_) => PhysicalType::Int16,
            Self::Int32(_) => PhysicalType::Int32,
            Self::Int64(_) => PhysicalType::Int64,
            Self::UInt8(_) => PhysicalType::UInt8,
            Self::UInt16(_) => PhysicalType::UInt16,
            Self::UInt32(_) => PhysicalType::UInt32,
            Self::UInt64(_) => PhysicalType::UInt64,
            Self::Float32(_) => PhysicalType::Float32,
            Self::Float64(_) => PhysicalType::Float64,
            Self::Utf8(_) => PhysicalType::Utf8,
        }
    }

    /// Check if two array datas point to the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => Arc::ptr_eq(a, b),
            (Self::Int8(a), Self::Int8(b)) => Arc::ptr_eq(a, b),
            (Self::Int16(a), Self::Int16(b)) => Arc::ptr_eq(a, b),
            (Self::Int32(a), Self::Int32(b)) => Arc::ptr_eq(a, b),
            (Self::Int64(a), Self::Int64(b)) => Arc::ptr_eq(a, b),
            (Self::UInt8(a), Self::UInt8(b)) => Arc::ptr_eq(a, b),
            (Self::UInt16(a), Self::UInt16(b)) => Arc::ptr_eq(a, b),
            (Self::UInt32(a), Self::UInt32(b)) => Arc::ptr_eq(a, b),
            (Self::UInt64(a), Self::UInt64(b)) => Arc::ptr_eq(a, b),
            (Self::Float32(a), Self::Float32(b)) => Arc::ptr_eq(a, b),
            (Self::Float64(a), Self::Float64(b)) => Arc::ptr_eq(a, b),
            (Self::Utf8(a), Self::Utf8(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Create zeroed storage of some length for a physical type.
    pub fn zeroed(physical: PhysicalType, len: usize) -> Self {
        match physical {
            PhysicalType::Boolean => Self::Boolean(Arc::new(vec![false; len])),
            PhysicalType::Int8 => Self::Int8(Arc::new(vec![0; len])),
            PhysicalType::Int16 => Self::Int16(Arc::new(vec![0; len])),
            PhysicalType::Int32 => Self::Int32(Arc::new(vec![0; len])),
            PhysicalType::Int64 => Self::Int64(Arc::new(vec![0; len])),
            PhysicalType::UInt8 => Self::UInt8(Arc::new(vec![0; len])),
            PhysicalType::UInt16 => Self::UInt16(Arc::new(vec![0; len])),
            PhysicalType::UInt32 => Self::UInt32(Arc::new(vec![0; len])),
            PhysicalType::UInt64 => Self::UInt64(Arc::new(vec![0; len])),
            PhysicalType::Float32 => Self::Float32(Arc::new(vec![0.0; len])),
            PhysicalType::Float64 => Self::Float64(Arc::new(vec![0.0; len])),
            PhysicalType::Utf8 => Self::Utf8(Arc::new(vec![String::new(); len])),
        }
    }
}

/// Native types that back an `ArrayData` variant.
pub trait PhysicalStorage: Debug + Default + Clone + PartialOrd + Send + Sync + 'static {
    const PHYSICAL_TYPE: PhysicalType;
    /// Logical type used when building arrays without an explicit type.
    const DATATYPE: DataType;

    fn get_storage(data: &ArrayData) -> Result<&Arc<Vec<Self>>>;
    fn into_data(values: Arc<Vec<Self>>) -> ArrayData;
    fn from_scalar(scalar: &ScalarValue) -> Option<Self>;
    fn into_scalar(self, datatype: DataType) -> ScalarValue;
}

macro_rules! impl_physical_storage {
    ($native:ty, $variant:ident, $datatype:ident) => {
        impl PhysicalStorage for $native {
            const PHYSICAL_TYPE: PhysicalType = PhysicalType::$variant;
            const DATATYPE: DataType = DataType::$datatype;

            fn get_storage(data: &ArrayData) -> Result<&Arc<Vec<Self>>> {
                match data {
                    ArrayData::$variant(v) => Ok(v),
                    other => Err(DbError::new(format!(
                        "Expected {:?} storage, got {:?}",
                        PhysicalType::$variant,
                        other.physical_type()
                    ))),
                }
            }

            fn into_data(values: Arc<Vec<Self>>) -> ArrayData {
                ArrayData::$variant(values)
            }

            fn from_scalar(scalar: &ScalarValue) -> Option<Self> {
                match scalar {
                    ScalarValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }

            fn into_scalar(self, _datatype: DataType) -> ScalarValue {
                ScalarValue::$variant(self)
            }
        }
    };
}

impl_physical_storage!(bool, Boolean, Boolean);
impl_physical_storage!(i8, Int8, Int8);
impl_physical_storage!(i16, Int16, Int16);
impl_physical_storage!(i32, Int32, Int32);
impl_physical_storage!(u8, UInt8, UInt8);
impl_physical_storage!(u16, UInt16, UInt16);
impl_physical_storage!(u32, UInt32, UInt32);
impl_physical_storage!(u64, UInt64, UInt64);
impl_physical_storage!(f32, Float32, Float32);
impl_physical_storage!(f64, Float64, Float64);
impl_physical_storage!(String, Utf8, Utf8);

// Int64 also backs DateTime and TimeSpan.
impl PhysicalStorage for i64 {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::Int64;
    const DATATYPE: DataType = DataType::Int64;

    fn get_storage(data: &ArrayData) -> Result<&Arc<Vec<Self>>> {
        match data {
            ArrayData::Int64(v) => Ok(v),
            other => Err(DbError::new(format!(
                "Expected Int64 storage, got {:?}",
                other.physical_type()
            ))),
        }
    }

    fn into_data(values: Arc<Vec<Self>>) -> ArrayData {
        ArrayData::Int64(values)
    }

    fn from_scalar(scalar: &ScalarValue) -> Option<Self> {
        match scalar {
            ScalarValue::Int64(v) | ScalarValue::DateTime(v) | ScalarValue::TimeSpan(v) => Some(*v),
            _ => None,
        }
    }

    fn into_scalar(self, datatype: DataType) -> ScalarValue {
        match datatype {
            DataType::DateTime => ScalarValue::DateTime(self),
            DataType::TimeSpan => ScalarValue::TimeSpan(self),
            _ => ScalarValue::Int64(self),
        }
    }
}

/// An immutable batch of values.
///
/// Pairs shared backing storage with a selector describing which rows are
/// in view and an optional null mask. The null mask is indexed by physical
/// index, the same index used for the data.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    datatype: DataType,
    data: ArrayData,
    selector: Selector,
    nulls: Option<Arc<Bitmap>>,
}

impl Array {
    /// Create an array from storage, selector and null mask.
    pub fn try_new(
        datatype: DataType,
        data: ArrayData,
        selector: Selector,
        nulls: Option<Arc<Bitmap>>,
    ) -> Result<Self> {
        if datatype.physical_type() != data.physical_type() {
            return Err(DbError::new("Array storage does not match datatype")
                .with_field("datatype", datatype)
                .with_field("storage", format!("{:?}", data.physical_type())));
        }
        selector.validate(data.len())?;
        if let Some(nulls) = &nulls {
            if nulls.len() < data.len() {
                return Err(DbError::new("Null mask shorter than array storage")
                    .with_field("nulls", nulls.len())
                    .with_field("len", data.len()));
            }
        }

        Ok(Array {
            datatype,
            data,
            selector,
            nulls,
        })
    }

    /// Create an array over all rows of the given values.
    pub fn all<T: PhysicalStorage>(datatype: DataType, values: impl Into<Arc<Vec<T>>>) -> Result<Self> {
        let values = values.into();
        let len = values.len();
        Self::try_new(datatype, T::into_data(values), Selector::all(len), None)
    }

    /// Create an array from an iterator of values using the default datatype
    /// for `T`.
    pub fn from_iter<T: PhysicalStorage>(values: impl IntoIterator<Item = T>) -> Self {
        let values: Vec<T> = values.into_iter().collect();
        let len = values.len();
        Array {
            datatype: T::DATATYPE,
            data: T::into_data(Arc::new(values)),
            selector: Selector::all(len),
            nulls: None,
        }
    }

    /// Create an array from optional values, `None` producing a null row.
    pub fn from_options<T: PhysicalStorage>(values: impl IntoIterator<Item = Option<T>>) -> Self {
        let mut nulls = Bitmap::default();
        let values: Vec<T> = values
            .into_iter()
            .map(|v| {
                nulls.push(v.is_none());
                v.unwrap_or_default()
            })
            .collect();
        let len = values.len();
        let nulls = if nulls.any() { Some(Arc::new(nulls)) } else { None };

        Array {
            datatype: T::DATATYPE,
            data: T::into_data(Arc::new(values)),
            selector: Selector::all(len),
            nulls,
        }
    }

    /// Create an array repeating a single value `count` times.
    ///
    /// Only one value is stored.
    pub fn constant(value: &ScalarValue, count: usize) -> Result<Self> {
        let datatype = value.datatype().ok_or_else(|| {
            DbError::new("Cannot create an untyped constant array from a null value")
        })?;
        let data = scalar_to_data(value)?;
        Self::try_new(datatype, data, Selector::single(count), None)
    }

    /// Create an array of `count` nulls for some datatype.
    pub fn new_null(datatype: DataType, count: usize) -> Self {
        Array {
            datatype,
            data: ArrayData::zeroed(datatype.physical_type(), 1),
            selector: Selector::single(count),
            nulls: Some(Arc::new(Bitmap::new_with_all_true(1))),
        }
    }

    pub fn datatype(&self) -> DataType {
        self.datatype
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn nulls(&self) -> Option<&Arc<Bitmap>> {
        self.nulls.as_ref()
    }

    /// Number of logical rows. Always the selector's length.
    pub fn len(&self) -> usize {
        self.selector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_nulls(&self) -> bool {
        self.nulls.is_some()
    }

    /// Check if a logical row is null.
    #[inline]
    pub fn is_null(&self, idx: LogicalIndex) -> bool {
        match &self.nulls {
            Some(nulls) => nulls.value(self.selector.index(idx).0),
            None => false,
        }
    }

    #[inline]
    pub fn is_null_physical(&self, idx: PhysicalIndex) -> bool {
        match &self.nulls {
            Some(nulls) => nulls.value(idx.0),
            None => false,
        }
    }

    /// Get the full backing slice. Indices into this slice must come from the
    /// selector.
    pub fn values<T: PhysicalStorage>(&self) -> Result<&[T]> {
        Ok(T::get_storage(&self.data)?.as_slice())
    }

    /// Get the value at a logical row, None if null.
    pub fn value<T: PhysicalStorage>(&self, idx: LogicalIndex) -> Result<Option<&T>> {
        let physical = self.selector.index(idx);
        if self.is_null_physical(physical) {
            return Ok(None);
        }
        Ok(Some(&self.values::<T>()?[physical.0]))
    }

    /// Iterate the values in logical order.
    pub fn iter<T: PhysicalStorage>(&self) -> Result<impl Iterator<Item = Option<&T>> + '_> {
        let values = self.values::<T>()?;
        Ok(self.selector.iter().map(move |idx| {
            if self.is_null_physical(idx) {
                None
            } else {
                Some(&values[idx.0])
            }
        }))
    }

    /// Get the value at a logical row as a scalar.
    pub fn scalar(&self, idx: LogicalIndex) -> ScalarValue {
        let physical = self.selector.index(idx);
        if self.is_null_physical(physical) {
            return ScalarValue::Null;
        }
        let datatype = self.datatype;
        with_array_data!(&self.data, |v| v[physical.0].clone().into_scalar(datatype))
    }

    /// Replace the selector, keeping storage and nulls.
    pub fn with_selector(&self, selector: Selector) -> Result<Self> {
        selector.validate(self.data.len())?;
        Ok(Array {
            datatype: self.datatype,
            data: self.data.clone(),
            selector,
            nulls: self.nulls.clone(),
        })
    }

    /// Restrict the array to logical rows `[range.start, range.end)`.
    pub fn slice(&self, range: Range<usize>) -> Result<Self> {
        let selector = self.selector.slice(range)?;
        Ok(Array {
            datatype: self.datatype,
            data: self.data.clone(),
            selector,
            nulls: self.nulls.clone(),
        })
    }

    /// Select logical rows of this array using another selector.
    ///
    /// The result is a view over the same storage.
    pub fn select(&self, selector: &Selector) -> Result<Self> {
        if let Some(range) = selector.as_range() {
            return self.slice(range);
        }
        if selector.len() > 0 {
            let max = selector.iter().map(|idx| idx.0).max().unwrap_or(0);
            if max >= self.len() {
                return Err(DbError::new("Selection out of bounds for array")
                    .with_field("index", max)
                    .with_field("len", self.len()));
            }
        }
        let indices: Vec<usize> = selector
            .iter()
            .map(|idx| self.selector.index(LogicalIndex(idx.0)).0)
            .collect();
        self.with_selector(Selector::indices(indices))
    }

    /// Reinterpret the array as another logical type with the same physical
    /// layout.
    pub fn with_datatype(mut self, datatype: DataType) -> Result<Self> {
        if datatype.physical_type() != self.datatype.physical_type() {
            return Err(DbError::new("Cannot reinterpret array as a type with a different layout")
                .with_field("from", self.datatype)
                .with_field("to", datatype));
        }
        self.datatype = datatype;
        Ok(self)
    }

    /// Returns true if both arrays are the same view of the same storage.
    ///
    /// Used by derived columns to skip recomputing when the upstream batch
    /// hasn't changed.
    pub fn same_view(&self, other: &Array) -> bool {
        let nulls_eq = match (&self.nulls, &other.nulls) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        nulls_eq && self.data.ptr_eq(&other.data) && self.selector == other.selector
    }
}

fn scalar_to_data(value: &ScalarValue) -> Result<ArrayData> {
    Ok(match value {
        ScalarValue::Null => return Err(DbError::new("Cannot store untyped null")),
        ScalarValue::Boolean(v) => ArrayData::Boolean(Arc::new(vec![*v])),
        ScalarValue::Int8(v) => ArrayData::Int8(Arc::new(vec![*v])),
        ScalarValue::Int16(v) => ArrayData::Int16(Arc::new(vec![*v])),
        ScalarValue::Int32(v) => ArrayData::Int32(Arc::new(vec![*v])),
        ScalarValue::Int64(v) | ScalarValue::DateTime(v) | ScalarValue::TimeSpan(v) => {
            ArrayData::Int64(Arc::new(vec![*v]))
        }
        ScalarValue::UInt8(v) => ArrayData::UInt8(Arc::new(vec![*v])),
        ScalarValue::UInt16(v) => ArrayData::UInt16(Arc::new(vec![*v])),
        ScalarValue::UInt32(v) => ArrayData::UInt32(Arc::new(vec![*v])),
        ScalarValue::UInt64(v) => ArrayData::UInt64(Arc::new(vec![*v])),
        ScalarValue::Float32(v) => ArrayData::Float32(Arc::new(vec![*v])),
        ScalarValue::Float64(v) => ArrayData::Float64(Arc::new(vec![*v])),
        ScalarValue::Utf8(v) => ArrayData::Utf8(Arc::new(vec![v.clone()])),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_follows_selector() {
        let arr = Array::from_iter([1, 2, 3, 4, 5]);
        let arr = arr.with_selector(Selector::indices(vec![4, 0])).unwrap();
        assert_eq!(2, arr.len());
        assert_eq!(ScalarValue::Int32(5), arr.scalar(LogicalIndex(0)));
        assert_eq!(ScalarValue::Int32(1), arr.scalar(LogicalIndex(1)));
    }

    #[test]
    fn nulls_use_physical_index() {
        let arr = Array::from_options([Some(1), None, Some(3)]);
        let arr = arr.with_selector(Selector::indices(vec![2, 1])).unwrap();

        assert!(!arr.is_null(LogicalIndex(0)));
        assert!(arr.is_null(LogicalIndex(1)));
        let vals: Vec<_> = arr.iter::<i32>().unwrap().map(|v| v.copied()).collect();
        assert_eq!(vec![Some(3), None], vals);
    }

    #[test]
    fn constant_stores_one_value() {
        let arr = Array::constant(&ScalarValue::from("a"), 4).unwrap();
        assert_eq!(4, arr.len());
        assert_eq!(1, arr.data().len());
        assert_eq!(ScalarValue::from("a"), arr.scalar(LogicalIndex(3)));
    }

    #[test]
    fn typed_null_array() {
        let arr = Array::new_null(DataType::Int32, 3);
        assert_eq!(3, arr.len());
        assert!(arr.is_null(LogicalIndex(2)));
        assert_eq!(ScalarValue::Null, arr.scalar(LogicalIndex(1)));
    }

    #[test]
    fn selector_out_of_storage_rejected() {
        let arr = Array::from_iter([1, 2]);
        arr.with_selector(Selector::range(0, 3)).unwrap_err();
    }

    #[test]
    fn datatype_mismatch_rejected() {
        Array::all::<i32>(DataType::Utf8, vec![1, 2]).unwrap_err();
    }

    #[test]
    fn zero_length_array_is_valid() {
        let arr = Array::from_iter([1, 2, 3]).slice(1..1).unwrap();
        assert!(arr.is_empty());
    }

    #[test]
    fn same_view_detects_new_selector() {
        let arr = Array::from_iter([1, 2, 3]);
        let same = arr.clone();
        let other = arr.slice(0..2).unwrap();

        assert!(arr.same_view(&same));
        assert!(!arr.same_view(&other));
        assert!(!arr.same_view(&Array::from_iter([1, 2, 3])));
    }

    #[test]
    fn datetime_reinterpret() {
        let arr = Array::from_iter([5_i64]).with_datatype(DataType::DateTime).unwrap();
        assert_eq!(ScalarValue::DateTime(5), arr.scalar(LogicalIndex(0)));
        Array::from_iter([5_i32])
            .with_datatype(DataType::DateTime)
            .unwrap_err();
    }
}
