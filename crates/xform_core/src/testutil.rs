//! Helpers for pulling tables to completion in tests.
use xform_error::Result;

use crate::arrays::array::PhysicalStorage;
use crate::arrays::scalar::ScalarValue;
use crate::arrays::selector::LogicalIndex;
use crate::execution::cancel::CancellationToken;
use crate::execution::table::Table;

/// Pull the table to the end, collecting the values of one column.
pub fn collect_column<T: PhysicalStorage>(
    table: &mut dyn Table,
    name: &str,
    batch_size: usize,
) -> Result<Vec<Option<T>>> {
    let idx = table.find_column(name)?;
    let getter = table.columns()[idx].current_getter()?;
    let cancel = CancellationToken::new();

    let mut out = Vec::new();
    while table.next(batch_size, &cancel)? > 0 {
        let arr = getter.get()?;
        out.extend(arr.iter::<T>()?.map(|v| v.cloned()));
    }

    Ok(out)
}

/// Pull the table to the end, collecting every column as rows of scalars.
pub fn collect_rows(table: &mut dyn Table, batch_size: usize) -> Result<Vec<Vec<ScalarValue>>> {
    let getters = table
        .columns()
        .iter()
        .map(|c| c.current_getter())
        .collect::<Result<Vec<_>>>()?;
    let cancel = CancellationToken::new();

    let mut rows = Vec::new();
    loop {
        let count = table.next(batch_size, &cancel)?;
        if count == 0 {
            break;
        }

        let arrays = getters.iter().map(|g| g.get()).collect::<Result<Vec<_>>>()?;
        for row in 0..count {
            rows.push(arrays.iter().map(|a| a.scalar(LogicalIndex(row))).collect());
        }
    }

    Ok(rows)
}

/// Assert two tables produce the same rows, compared column by column.
#[track_caller]
pub fn assert_tables_eq(left: &mut dyn Table, right: &mut dyn Table, batch_size: usize) {
    let left_names: Vec<_> = left.columns().iter().map(|c| c.details().clone()).collect();
    let right_names: Vec<_> = right.columns().iter().map(|c| c.details().clone()).collect();
    assert_eq!(left_names, right_names, "column details differ");

    let left = collect_rows(left, batch_size).unwrap();
    let right = collect_rows(right, batch_size).unwrap();
    assert_eq!(left, right);
}
