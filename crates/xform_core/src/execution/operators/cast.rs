use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use xform_error::Result;

use crate::arrays::array::Array;
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::convert::{CastFailBehavior, ConvertState, TypeConverter};
use crate::execution::cancel::CancellationToken;
use crate::execution::column::{ArrayGetter, Column, ColumnDetails, GetArray};
use crate::execution::table::{BoxedTable, Table};

/// Converts one or more columns to another type.
#[derive(Debug)]
pub struct Cast {
    source: BoxedTable,
    columns: Vec<Arc<dyn Column>>,
}

impl Cast {
    /// Cast the named columns.
    ///
    /// The converter for every column is resolved here, so unsupported
    /// conversions and bad defaults fail before any rows are pulled.
    pub fn try_new(
        source: BoxedTable,
        names: &[String],
        to: DataType,
        default: Option<ScalarValue>,
        behavior: CastFailBehavior,
    ) -> Result<Self> {
        let mut columns = source.columns().to_vec();
        for name in names {
            let idx = source.find_column(name)?;
            let column = CastColumn::try_new(columns[idx].clone(), to, default.clone(), behavior)?;
            debug!(column = %name, %to, ?behavior, "cast column");
            columns[idx] = Arc::new(column);
        }

        Ok(Cast { source, columns })
    }
}

impl Table for Cast {
    fn columns(&self) -> &[Arc<dyn Column>] {
        &self.columns
    }

    fn current_row_count(&self) -> usize {
        self.source.current_row_count()
    }

    fn count(&self) -> Option<usize> {
        self.source.count()
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        self.source.next(desired, cancel)
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()
    }
}

/// A column converted to another type.
///
/// Dictionary encoded sources stay dictionary encoded: only the distinct
/// values are converted and the indices pass through.
#[derive(Debug)]
pub struct CastColumn {
    details: ColumnDetails,
    source: Arc<dyn Column>,
    converter: Arc<TypeConverter>,
    current: Mutex<Option<ArrayGetter>>,
}

impl CastColumn {
    pub fn try_new(
        source: Arc<dyn Column>,
        to: DataType,
        default: Option<ScalarValue>,
        behavior: CastFailBehavior,
    ) -> Result<Self> {
        let converter = TypeConverter::try_new(source.details().datatype, to, behavior, default)?;
        let details = source.details().change_type(to);

        Ok(CastColumn {
            details,
            source,
            converter: Arc::new(converter),
            current: Mutex::new(None),
        })
    }
}

impl Column for CastColumn {
    fn details(&self) -> &ColumnDetails {
        &self.details
    }

    fn current_getter(&self) -> Result<ArrayGetter> {
        let mut current = self.current.lock();
        if let Some(getter) = current.as_ref() {
            return Ok(getter.clone());
        }

        let getter: ArrayGetter = Arc::new(ConvertGetter {
            source: self.source.current_getter()?,
            converter: self.converter.clone(),
            state: Mutex::new(ConvertState::default()),
        });
        *current = Some(getter.clone());

        Ok(getter)
    }

    fn indices_type(&self) -> Option<DataType> {
        self.source.indices_type()
    }

    fn indices_getter(&self) -> Option<ArrayGetter> {
        self.source.indices_getter()
    }

    fn values_getter(&self) -> Option<ArrayGetter> {
        let source = self.source.values_getter()?;
        Some(Arc::new(ConvertGetter {
            source,
            converter: self.converter.clone(),
            state: Mutex::new(ConvertState::default()),
        }))
    }
}

#[derive(Debug)]
struct ConvertGetter {
    source: ArrayGetter,
    converter: Arc<TypeConverter>,
    state: Mutex<ConvertState>,
}

impl GetArray for ConvertGetter {
    fn get(&self) -> Result<Array> {
        let input = self.source.get()?;
        self.converter.convert(&input, &mut self.state.lock())
    }
}

#[cfg(test)]
mod tests {
    use xform_error::ErrorKind;

    use super::*;
    use crate::execution::array_table::ArrayTable;
    use crate::testutil::collect_column;

    fn strings() -> BoxedTable {
        Box::new(
            ArrayTable::try_new([("Value", Array::from_iter(["12", "abc", "7"].map(String::from)))])
                .unwrap(),
        )
    }

    #[test]
    fn cast_or_default() {
        let mut table = Cast::try_new(
            strings(),
            &["Value".to_string()],
            DataType::Int32,
            Some(ScalarValue::Int32(0)),
            CastFailBehavior::OrDefault,
        )
        .unwrap();

        assert_eq!(DataType::Int32, table.columns()[0].details().datatype);
        let got = collect_column::<i32>(&mut table, "Value", 10).unwrap();
        assert_eq!(vec![Some(12), Some(0), Some(7)], got);
    }

    #[test]
    fn cast_strict_returns_no_rows() {
        let mut table = Cast::try_new(
            strings(),
            &["Value".to_string()],
            DataType::Int32,
            None,
            CastFailBehavior::OrThrow,
        )
        .unwrap();

        let err = collect_column::<i32>(&mut table, "Value", 10).unwrap_err();
        assert_eq!(ErrorKind::Conversion, err.kind());
    }

    #[test]
    fn unsupported_cast_fails_at_construction() {
        let source = Box::new(ArrayTable::try_new([("B", Array::from_iter([true]))]).unwrap());
        let err = Cast::try_new(
            source,
            &["B".to_string()],
            DataType::DateTime,
            None,
            CastFailBehavior::OrDefault,
        )
        .unwrap_err();
        assert!(err.is_usage());
    }
}
