use std::sync::Arc;

use tracing::debug;
use xform_error::Result;

use super::rename::RenamedColumn;
use crate::execution::cancel::CancellationToken;
use crate::execution::column::Column;
use crate::execution::table::{BoxedTable, RowCount, Table};

/// Adds a computed column, or replaces an existing column of the same name.
///
/// `row_count` must be the handle the column was built with; it's updated
/// with the size of every batch pulled.
#[derive(Debug)]
pub struct Set {
    source: BoxedTable,
    columns: Vec<Arc<dyn Column>>,
    row_count: RowCount,
}

impl Set {
    pub fn new(source: BoxedTable, name: &str, column: Arc<dyn Column>, row_count: RowCount) -> Self {
        let column: Arc<dyn Column> = if column.details().name == name {
            column
        } else {
            Arc::new(RenamedColumn::new(column.details().rename(name), column))
        };

        let mut columns = source.columns().to_vec();
        match columns.iter().position(|c| c.details().has_name(name)) {
            Some(idx) => {
                debug!(%name, "replacing column");
                columns[idx] = column;
            }
            None => {
                debug!(%name, "adding column");
                columns.push(column);
            }
        }

        Set {
            source,
            columns,
            row_count,
        }
    }
}

impl Table for Set {
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
        let count = self.source.next(desired, cancel)?;
        self.row_count.set(count);
        Ok(count)
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()?;
        self.row_count.set(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::array::Array;
    use crate::arrays::datatype::DataType;
    use crate::arrays::scalar::ScalarValue;
    use crate::execution::array_table::ArrayTable;
    use crate::execution::column::ConstantColumn;
    use crate::execution::table::column_names;
    use crate::testutil::collect_rows;

    #[test]
    fn add_constant_column() {
        let source = ArrayTable::try_new([("ID", Array::from_iter([1, 2, 3]))]).unwrap();
        let row_count = RowCount::default();
        let constant = ConstantColumn::try_new(
            "Constant",
            ScalarValue::from("x"),
            DataType::Utf8,
            row_count.clone(),
        )
        .unwrap();

        let mut table = Set::new(Box::new(source), "Tag", Arc::new(constant), row_count);
        assert_eq!(vec!["ID", "Tag"], column_names(table.columns()));

        let rows = collect_rows(&mut table, 2).unwrap();
        assert_eq!(3, rows.len());
        assert!(rows.iter().all(|row| row[1] == ScalarValue::from("x")));
    }

    #[test]
    fn replace_existing_column() {
        let source = ArrayTable::try_new([
            ("ID", Array::from_iter([1, 2])),
            ("Name", Array::from_iter(["a", "b"].map(String::from))),
        ])
        .unwrap();
        let row_count = RowCount::default();
        let constant =
            ConstantColumn::try_new("Constant", ScalarValue::Int32(0), DataType::Int32, row_count.clone())
                .unwrap();

        let table = Set::new(Box::new(source), "id", Arc::new(constant), row_count);
        assert_eq!(vec!["id", "Name"], column_names(table.columns()));
    }
}
