use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use xform_error::Result;

use crate::arrays::array::Array;
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::arrays::selector::Selector;
use crate::execution::table::RowCount;

/// Name, type, and nullability of a column.
///
/// Immutable. Renames and retypes produce a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDetails {
    pub name: String,
    #[serde(rename = "type")]
    pub datatype: DataType,
    pub nullable: bool,
}

impl ColumnDetails {
    pub fn new(name: impl Into<String>, datatype: DataType, nullable: bool) -> Self {
        ColumnDetails {
            name: name.into(),
            datatype,
            nullable,
        }
    }

    pub fn rename(&self, name: impl Into<String>) -> Self {
        ColumnDetails {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn change_type(&self, datatype: DataType) -> Self {
        ColumnDetails {
            datatype,
            ..self.clone()
        }
    }

    pub fn with_nullable(&self, nullable: bool) -> Self {
        ColumnDetails {
            nullable,
            ..self.clone()
        }
    }

    /// Case-insensitive name comparison.
    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Produces the array for the current batch of the owning table.
///
/// Getters may hold output buffers; callers should request a getter once and
/// keep it rather than requesting one per batch.
pub trait GetArray: Debug + Send + Sync {
    fn get(&self) -> Result<Array>;
}

/// Produces the array for an arbitrary set of rows, for seekable sources.
pub trait SeekArray: Debug + Send + Sync {
    fn get(&self, rows: &Selector) -> Result<Array>;
}

pub type ArrayGetter = Arc<dyn GetArray>;
pub type SeekGetter = Arc<dyn SeekArray>;

/// A logical column exposed by a table.
pub trait Column: Debug + Send + Sync {
    fn details(&self) -> &ColumnDetails;

    /// Getter for the values of the table's current batch.
    fn current_getter(&self) -> Result<ArrayGetter>;

    /// Getter for random access by row selection, if the column supports it.
    fn seek_getter(&self) -> Option<SeekGetter> {
        None
    }

    /// Type of the per-row indices for dictionary encoded columns.
    fn indices_type(&self) -> Option<DataType> {
        None
    }

    /// Getter for the per-row dictionary indices of the current batch.
    fn indices_getter(&self) -> Option<ArrayGetter> {
        None
    }

    /// Getter for the distinct values of a dictionary encoded column.
    fn values_getter(&self) -> Option<ArrayGetter> {
        None
    }
}

/// A column with the same value for every row.
///
/// The value is materialized once. The getter hands out single-value
/// selectors sized to the owning table's current batch.
#[derive(Debug)]
pub struct ConstantColumn {
    details: ColumnDetails,
    value: Array,
    row_count: RowCount,
}

impl ConstantColumn {
    pub fn try_new(
        name: impl Into<String>,
        value: ScalarValue,
        datatype: DataType,
        row_count: RowCount,
    ) -> Result<Self> {
        let value = if value.is_null() {
            Array::new_null(datatype, 1)
        } else {
            Array::constant(&value.try_cast_to(datatype)?, 1)?
        };

        Ok(ConstantColumn {
            details: ColumnDetails::new(name, datatype, value.has_nulls()),
            value,
            row_count,
        })
    }
}

impl Column for ConstantColumn {
    fn details(&self) -> &ColumnDetails {
        &self.details
    }

    fn current_getter(&self) -> Result<ArrayGetter> {
        Ok(Arc::new(ConstantGetter {
            value: self.value.clone(),
            row_count: self.row_count.clone(),
        }))
    }

    fn seek_getter(&self) -> Option<SeekGetter> {
        Some(Arc::new(ConstantGetter {
            value: self.value.clone(),
            row_count: self.row_count.clone(),
        }))
    }
}

#[derive(Debug)]
struct ConstantGetter {
    value: Array,
    row_count: RowCount,
}

impl GetArray for ConstantGetter {
    fn get(&self) -> Result<Array> {
        self.value.with_selector(Selector::single(self.row_count.get()))
    }
}

impl SeekArray for ConstantGetter {
    fn get(&self, rows: &Selector) -> Result<Array> {
        self.value.with_selector(Selector::single(rows.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::selector::LogicalIndex;

    #[test]
    fn details_functional_update() {
        let details = ColumnDetails::new("ID", DataType::Int32, false);
        let renamed = details.rename("Identifier");

        assert_eq!("ID", details.name);
        assert_eq!("Identifier", renamed.name);
        assert_eq!(details.datatype, renamed.datatype);
        assert!(renamed.has_name("identifier"));
    }

    #[test]
    fn constant_column_sized_to_batch() {
        let count = RowCount::default();
        let col =
            ConstantColumn::try_new("Five", ScalarValue::from("5"), DataType::Int32, count.clone())
                .unwrap();
        let getter = col.current_getter().unwrap();

        count.set(3);
        let arr = getter.get().unwrap();
        assert_eq!(3, arr.len());
        assert_eq!(Some(&5), arr.value::<i32>(LogicalIndex(2)).unwrap());

        count.set(0);
        assert!(getter.get().unwrap().is_empty());
    }
}
