use std::sync::Arc;

use xform_error::Result;

use crate::arrays::array::Array;
use crate::execution::array_table::ArrayTable;
use crate::execution::cancel::CancellationToken;
use crate::execution::column::Column;
use crate::execution::table::{BoxedTable, Table};

/// Describes the source's columns as rows of (Name, Type, Nullable).
///
/// All rows are returned by the first `next` regardless of the requested
/// count. The source is never pulled.
#[derive(Debug)]
pub struct Schema {
    rows: ArrayTable,
}

impl Schema {
    pub fn try_new(source: BoxedTable) -> Result<Self> {
        let details: Vec<_> = source.columns().iter().map(|c| c.details().clone()).collect();

        let rows = ArrayTable::try_new([
            ("Name", Array::from_iter(details.iter().map(|d| d.name.clone()))),
            (
                "Type",
                Array::from_iter(details.iter().map(|d| d.datatype.to_string())),
            ),
            ("Nullable", Array::from_iter(details.iter().map(|d| d.nullable))),
        ])?;

        Ok(Schema { rows })
    }
}

impl Table for Schema {
    fn columns(&self) -> &[Arc<dyn Column>] {
        self.rows.columns()
    }

    fn current_row_count(&self) -> usize {
        self.rows.current_row_count()
    }

    fn count(&self) -> Option<usize> {
        self.rows.count()
    }

    fn next(&mut self, _desired: usize, cancel: &CancellationToken) -> Result<usize> {
        self.rows.next(usize::MAX, cancel)
    }

    fn reset(&mut self) -> Result<()> {
        self.rows.reset()
    }
}
