use std::sync::Arc;

use tracing::debug;
use xform_error::{DbError, Result};

use crate::execution::cancel::CancellationToken;
use crate::execution::column::Column;
use crate::execution::table::{BoxedTable, RowCount, Table, column_names};

/// Exposes a subset of the source's columns, leaving getters untouched.
///
/// `remove` drops named columns; every name must match a source column and
/// unmatched names are reported at construction. `computed` takes already
/// built columns, which may be functions over the source.
#[derive(Debug)]
pub struct Projection {
    source: BoxedTable,
    columns: Vec<Arc<dyn Column>>,
    row_count: RowCount,
}

impl Projection {
    /// Keep every column except the named ones.
    pub fn remove(source: BoxedTable, names: &[String]) -> Result<Self> {
        check_names(source.columns(), names)?;

        let columns: Vec<_> = source
            .columns()
            .iter()
            .filter(|c| !names.iter().any(|name| c.details().has_name(name)))
            .cloned()
            .collect();
        debug!(columns = ?column_names(&columns), "remove columns");

        Ok(Projection {
            source,
            columns,
            row_count: RowCount::default(),
        })
    }

    /// Output exactly `columns`. `row_count` is the handle any computed
    /// column was built with.
    pub fn computed(
        source: BoxedTable,
        columns: Vec<Arc<dyn Column>>,
        row_count: RowCount,
    ) -> Result<Self> {
        let names = column_names(&columns);
        if let Some(dup) = names
            .iter()
            .enumerate()
            .find(|(idx, name)| names[..*idx].iter().any(|n| n.eq_ignore_ascii_case(name)))
            .map(|(_, name)| name)
        {
            return Err(DbError::usage(format!("Column '{dup}' selected more than once"))
                .with_field("columns", names.join(", ")));
        }
        debug!(columns = ?names, "select computed columns");

        Ok(Projection {
            source,
            columns,
            row_count,
        })
    }
}

fn check_names(columns: &[Arc<dyn Column>], names: &[String]) -> Result<()> {
    let unmatched: Vec<_> = names
        .iter()
        .filter(|name| !columns.iter().any(|c| c.details().has_name(name)))
        .map(|name| name.as_str())
        .collect();

    if !unmatched.is_empty() {
        return Err(DbError::usage("Columns not found")
            .with_field("unmatched", unmatched.join(", "))
            .with_field("available", column_names(columns).join(", ")));
    }

    Ok(())
}

impl Table for Projection {
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
    use crate::execution::array_table::ArrayTable;
    use crate::testutil::assert_tables_eq;

    fn source() -> BoxedTable {
        Box::new(
            ArrayTable::try_new([
                ("ID", Array::from_iter([1, 2, 3])),
                ("Title", Array::from_iter(["a", "b", "c"].map(String::from))),
                ("Score", Array::from_iter([0.5, 1.5, 2.5])),
            ])
            .unwrap(),
        )
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn select(source: BoxedTable, names: &[&str]) -> Projection {
        let columns = names
            .iter()
            .map(|name| source.column(name).unwrap().clone())
            .collect();
        Projection::computed(source, columns, RowCount::default()).unwrap()
    }

    #[test]
    fn select_orders_columns() {
        let table = select(source(), &["score", "ID"]);
        assert_eq!(vec!["Score", "ID"], column_names(table.columns()));
    }

    #[test]
    fn remove_keeps_order() {
        let table = Projection::remove(source(), &names(&["Title"])).unwrap();
        assert_eq!(vec!["ID", "Score"], column_names(table.columns()));
    }

    #[test]
    fn unmatched_names_reported() {
        let err = Projection::remove(source(), &names(&["ID", "Nope", "Missing"])).unwrap_err();
        assert!(err.is_usage());
        assert_eq!(Some("Nope, Missing"), err.get_field("unmatched"));
        assert_eq!(Some("ID, Title, Score"), err.get_field("available"));
    }

    #[test]
    fn remove_then_select_is_identity() {
        let removed = Projection::remove(source(), &names(&["Title"])).unwrap();
        let mut reselected = select(Box::new(removed), &["ID", "Score"]);
        let mut expected = select(source(), &["ID", "Score"]);

        assert_tables_eq(&mut reselected, &mut expected, 2);
    }

    #[test]
    fn computed_rejects_duplicate_names() {
        let table = source();
        let id = table.columns()[0].clone();
        let err = Projection::computed(table, vec![id.clone(), id], RowCount::default()).unwrap_err();
        assert!(err.is_usage());
        assert_eq!(Some("ID, ID"), err.get_field("columns"));
    }
}
