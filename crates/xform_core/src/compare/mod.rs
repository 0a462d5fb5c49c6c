//! Row predicates comparing a column against a literal.
use std::cmp::Ordering;
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::LazyLock;

use ahash::HashMap;
use xform_error::{DbError, OptionExt, Result};

use crate::arrays::array::{Array, PhysicalStorage};
use crate::arrays::datatype::{DataType, PhysicalType};
use crate::arrays::scalar::ScalarValue;
use crate::arrays::selector::LogicalIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl CompareOp {
    /// Check if the ordering of a candidate relative to the compared value
    /// satisfies this operator.
    ///
    /// `ord` is `candidate.cmp(value)`, so `GreaterThan` matches candidates
    /// greater than the value.
    pub const fn matches(&self, ord: Ordering) -> bool {
        match self {
            Self::Equal => matches!(ord, Ordering::Equal),
            Self::NotEqual => !matches!(ord, Ordering::Equal),
            Self::LessThan => matches!(ord, Ordering::Less),
            Self::LessThanOrEqual => !matches!(ord, Ordering::Greater),
            Self::GreaterThan => matches!(ord, Ordering::Greater),
            Self::GreaterThanOrEqual => !matches!(ord, Ordering::Less),
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CompareOp {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "=" | "==" => Self::Equal,
            "!=" | "<>" => Self::NotEqual,
            "<" => Self::LessThan,
            "<=" => Self::LessThanOrEqual,
            ">" => Self::GreaterThan,
            ">=" => Self::GreaterThanOrEqual,
            other => {
                return Err(DbError::usage(format!("Unknown comparison operator '{other}'"))
                    .with_field("available", "=, !=, <, <=, >, >="));
            }
        })
    }
}

/// A predicate over a single column, bound to an operator and a value.
pub trait Comparer: Debug + Send + Sync {
    /// Append the logical rows of `array` that match to `out`.
    ///
    /// Null rows never match.
    fn select_matching(&self, array: &Array, out: &mut Vec<LogicalIndex>) -> Result<()>;
}

/// Comparer for totally ordered values: integers, DateTime and TimeSpan.
#[derive(Debug)]
pub struct OrdComparer<T> {
    op: CompareOp,
    value: T,
}

impl<T> Comparer for OrdComparer<T>
where
    T: PhysicalStorage + Ord + Copy,
{
    fn select_matching(&self, array: &Array, out: &mut Vec<LogicalIndex>) -> Result<()> {
        let v = self.value;
        match self.op {
            CompareOp::Equal => select_rows::<T>(array, out, |c| *c == v),
            CompareOp::NotEqual => select_rows::<T>(array, out, |c| *c != v),
            CompareOp::LessThan => select_rows::<T>(array, out, |c| *c < v),
            CompareOp::LessThanOrEqual => select_rows::<T>(array, out, |c| *c <= v),
            CompareOp::GreaterThan => select_rows::<T>(array, out, |c| *c > v),
            CompareOp::GreaterThanOrEqual => select_rows::<T>(array, out, |c| *c >= v),
        }
    }
}

/// Comparer for everything else (floats, strings, booleans).
///
/// Values that can't be ordered (NaN) only match `!=`.
#[derive(Debug)]
pub struct PartialOrdComparer<T> {
    op: CompareOp,
    value: T,
}

impl<T> Comparer for PartialOrdComparer<T>
where
    T: PhysicalStorage,
{
    fn select_matching(&self, array: &Array, out: &mut Vec<LogicalIndex>) -> Result<()> {
        let op = self.op;
        select_rows::<T>(array, out, |c| match c.partial_cmp(&self.value) {
            Some(ord) => op.matches(ord),
            None => op == CompareOp::NotEqual,
        })
    }
}

fn select_rows<T: PhysicalStorage>(
    array: &Array,
    out: &mut Vec<LogicalIndex>,
    pred: impl Fn(&T) -> bool,
) -> Result<()> {
    let values = array.values::<T>()?;

    if array.has_nulls() {
        for (row, idx) in array.selector().iter().enumerate() {
            if !array.is_null_physical(idx) && pred(&values[idx.0]) {
                out.push(LogicalIndex(row));
            }
        }
    } else {
        for (row, idx) in array.selector().iter().enumerate() {
            if pred(&values[idx.0]) {
                out.push(LogicalIndex(row));
            }
        }
    }

    Ok(())
}

type ComparerBuilder = fn(CompareOp, &ScalarValue) -> Result<Box<dyn Comparer>>;

fn build_ord<T: PhysicalStorage + Ord + Copy>(
    op: CompareOp,
    value: &ScalarValue,
) -> Result<Box<dyn Comparer>> {
    let value = T::from_scalar(value).required("comparison value")?;
    Ok(Box::new(OrdComparer { op, value }))
}

fn build_partial_ord<T: PhysicalStorage>(
    op: CompareOp,
    value: &ScalarValue,
) -> Result<Box<dyn Comparer>> {
    let value = T::from_scalar(value).required("comparison value")?;
    Ok(Box::new(PartialOrdComparer { op, value }))
}

/// Comparer constructors keyed by physical type.
///
/// Supporting a new type only requires an entry here.
static COMPARERS: LazyLock<HashMap<PhysicalType, ComparerBuilder>> = LazyLock::new(|| {
    let mut comparers: HashMap<PhysicalType, ComparerBuilder> = HashMap::default();
    let mut register = |physical: PhysicalType, builder: ComparerBuilder| {
        if comparers.insert(physical, builder).is_some() {
            panic!("Duplicate comparer for {physical:?}");
        }
    };

    register(PhysicalType::Int8, build_ord::<i8>);
    register(PhysicalType::Int16, build_ord::<i16>);
    register(PhysicalType::Int32, build_ord::<i32>);
    register(PhysicalType::Int64, build_ord::<i64>);
    register(PhysicalType::UInt8, build_ord::<u8>);
    register(PhysicalType::UInt16, build_ord::<u16>);
    register(PhysicalType::UInt32, build_ord::<u32>);
    register(PhysicalType::UInt64, build_ord::<u64>);
    register(PhysicalType::Float32, build_partial_ord::<f32>);
    register(PhysicalType::Float64, build_partial_ord::<f64>);
    register(PhysicalType::Boolean, build_partial_ord::<bool>);
    register(PhysicalType::Utf8, build_partial_ord::<String>);

    comparers
});

/// Build a comparer for a column of `datatype`.
///
/// The value is converted to the column's type first, failing with a usage
/// error if it can't be.
pub fn new_comparer(
    datatype: DataType,
    op: CompareOp,
    value: &ScalarValue,
) -> Result<Box<dyn Comparer>> {
    if value.is_null() {
        return Err(DbError::usage("Cannot compare against null"));
    }
    let value = value.try_cast_to(datatype)?;

    let builder = COMPARERS.get(&datatype.physical_type()).ok_or_else(|| {
        DbError::usage(format!("Values of type {datatype} cannot be compared"))
    })?;

    builder(op, &value)
}
