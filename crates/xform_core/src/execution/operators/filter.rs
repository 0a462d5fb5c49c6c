use std::sync::Arc;

use num_traits::ToPrimitive;
use parking_lot::Mutex;
use tracing::debug;
use xform_error::{DbError, Result};

use crate::arrays::array::{Array, PhysicalStorage};
use crate::arrays::datatype::PhysicalType;
use crate::arrays::scalar::ScalarValue;
use crate::arrays::selector::LogicalIndex;
use crate::compare::{CompareOp, Comparer, new_comparer};
use crate::execution::cancel::CancellationToken;
use crate::execution::column::{ArrayGetter, Column};
use crate::execution::remapper::{RemappedColumn, RowRemapper};
use crate::execution::table::{BoxedTable, RowCount, Table};

/// Keeps rows where a column compares to a value.
///
/// The predicate runs once per batch against the filter column. Every column
/// (including the filter column) is remapped through the same row list so all
/// columns see the same subset of rows.
#[derive(Debug)]
pub struct Where {
    source: BoxedTable,
    columns: Vec<Arc<dyn Column>>,
    remapper: Arc<Mutex<RowRemapper>>,
    comparer: Box<dyn Comparer>,
    input: FilterInput,
    row_count: RowCount,
    current: usize,
}

#[derive(Debug)]
enum FilterInput {
    /// Evaluate the predicate against every row.
    Rows(ArrayGetter),
    /// Evaluate the predicate once per distinct value, then map each row's
    /// index to the result.
    Dictionary {
        values: ArrayGetter,
        indices: ArrayGetter,
        /// Distinct values the matches were computed for.
        last_values: Option<Array>,
        /// Whether each distinct value (by logical position) matches.
        matches: Vec<bool>,
    },
}

impl Where {
    pub fn try_new(
        source: BoxedTable,
        column: &str,
        op: CompareOp,
        value: &ScalarValue,
    ) -> Result<Self> {
        let idx = source.find_column(column)?;
        let filter_column = source.columns()[idx].clone();
        Self::try_from_column(source, filter_column, RowCount::default(), op, value)
    }

    /// Filter on a column computed from the source, like a function call.
    ///
    /// `row_count` is the handle the column was built with. It's set to the
    /// size of each source batch before the predicate runs. The computed
    /// column isn't added to the output.
    pub fn try_from_column(
        source: BoxedTable,
        filter_column: Arc<dyn Column>,
        row_count: RowCount,
        op: CompareOp,
        value: &ScalarValue,
    ) -> Result<Self> {
        let column = filter_column.details().name.clone();
        let datatype = filter_column.details().datatype;

        let comparer = new_comparer(datatype, op, value).map_err(|e| {
            DbError::usage(format!(
                "Cannot compare column '{column}' of type {datatype} to '{value}'"
            ))
            .with_source(Box::new(e))
        })?;

        let input = match (filter_column.values_getter(), filter_column.indices_getter()) {
            (Some(values), Some(indices)) => FilterInput::Dictionary {
                values,
                indices,
                last_values: None,
                matches: Vec::new(),
            },
            _ => FilterInput::Rows(filter_column.current_getter()?),
        };
        let dictionary = matches!(input, FilterInput::Dictionary { .. });
        debug!(%column, %op, %value, dictionary, "where");

        let remapper = Arc::new(Mutex::new(RowRemapper::new()));
        let columns = source
            .columns()
            .iter()
            .map(|c| Arc::new(RemappedColumn::new(c.clone(), remapper.clone())) as Arc<dyn Column>)
            .collect();

        Ok(Where {
            source,
            columns,
            remapper,
            comparer,
            input,
            row_count,
            current: 0,
        })
    }
}

impl Table for Where {
    fn columns(&self) -> &[Arc<dyn Column>] {
        &self.columns
    }

    fn current_row_count(&self) -> usize {
        self.current
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        loop {
            let count = self.source.next(desired, cancel)?;
            self.row_count.set(count);
            let mut remapper = self.remapper.lock();
            let rows = remapper.start_batch();

            if count == 0 {
                self.current = 0;
                return Ok(0);
            }

            self.input.select_matching(self.comparer.as_ref(), rows)?;
            if !rows.is_empty() {
                self.current = rows.len();
                return Ok(self.current);
            }
            // Nothing matched in this batch, keep pulling.
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()?;
        self.row_count.set(0);
        self.remapper.lock().start_batch();
        if let FilterInput::Dictionary { last_values, .. } = &mut self.input {
            *last_values = None;
        }
        self.current = 0;
        Ok(())
    }
}

impl FilterInput {
    fn select_matching(&mut self, comparer: &dyn Comparer, out: &mut Vec<LogicalIndex>) -> Result<()> {
        match self {
            Self::Rows(getter) => comparer.select_matching(&getter.get()?, out),
            Self::Dictionary {
                values,
                indices,
                last_values,
                matches,
            } => {
                let values = values.get()?;
                let stale = match last_values {
                    Some(last) => !last.same_view(&values),
                    None => true,
                };
                if stale {
                    let mut matching = Vec::new();
                    comparer.select_matching(&values, &mut matching)?;
                    matches.clear();
                    matches.resize(values.len(), false);
                    for row in matching {
                        matches[row.0] = true;
                    }
                    *last_values = Some(values);
                }

                let indices = indices.get()?;
                match indices.datatype().physical_type() {
                    PhysicalType::UInt8 => select_by_index::<u8>(&indices, matches, out),
                    PhysicalType::UInt16 => select_by_index::<u16>(&indices, matches, out),
                    PhysicalType::UInt32 => select_by_index::<u32>(&indices, matches, out),
                    PhysicalType::Int32 => select_by_index::<i32>(&indices, matches, out),
                    other => Err(DbError::new(format!(
                        "Unsupported dictionary index type {other:?}"
                    ))),
                }
            }
        }
    }
}

fn select_by_index<T>(indices: &Array, matches: &[bool], out: &mut Vec<LogicalIndex>) -> Result<()>
where
    T: PhysicalStorage + ToPrimitive,
{
    for (row, idx) in indices.iter::<T>()?.enumerate() {
        let Some(idx) = idx else {
            continue;
        };
        let value_idx = idx
            .to_usize()
            .filter(|v| *v < matches.len())
            .ok_or_else(|| DbError::new("Dictionary index out of range").with_field("row", row))?;
        if matches[value_idx] {
            out.push(LogicalIndex(row));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::datatype::DataType;
    use crate::execution::array_table::ArrayTable;
    use crate::execution::table::column_names;
    use crate::functions::{FunctionArg, FunctionContext};
    use crate::query::registry;
    use crate::testutil::{collect_column, collect_rows};

    fn numbers(n: i32) -> BoxedTable {
        Box::new(
            ArrayTable::try_new([
                ("N", Array::from_iter(0..n)),
                ("Label", Array::from_iter((0..n).map(|v| format!("row{v}")))),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn filters_all_columns_consistently() {
        let mut table = Where::try_new(numbers(10), "N", CompareOp::GreaterThanOrEqual, &7.into()).unwrap();
        let rows = collect_rows(&mut table, 4).unwrap();

        assert_eq!(
            vec![
                vec![ScalarValue::Int32(7), ScalarValue::from("row7")],
                vec![ScalarValue::Int32(8), ScalarValue::from("row8")],
                vec![ScalarValue::Int32(9), ScalarValue::from("row9")],
            ],
            rows
        );
    }

    #[test]
    fn skips_batches_without_matches() {
        let mut table = Where::try_new(numbers(100), "N", CompareOp::Equal, &55.into()).unwrap();
        let cancel = CancellationToken::new();

        assert_eq!(1, table.next(10, &cancel).unwrap());
        assert_eq!(0, table.next(10, &cancel).unwrap());
    }

    #[test]
    fn row_count_matches_ground_truth() {
        let values: Vec<i32> = (0..97).map(|v| (v * 37) % 11).collect();
        let expected = values.iter().filter(|v| **v < 4).count();

        let source = ArrayTable::try_new([("V", Array::from_iter(values))]).unwrap();
        let mut table = Where::try_new(Box::new(source), "V", CompareOp::LessThan, &4.into()).unwrap();
        let got = collect_column::<i32>(&mut table, "V", 8).unwrap();

        assert_eq!(expected, got.len());
        assert!(got.iter().all(|v| v.unwrap() < 4));
    }

    #[test]
    fn filters_on_computed_column() {
        let source = numbers(6);
        let ctx = FunctionContext {
            row_count: RowCount::default(),
            as_of: 0,
            available: column_names(source.columns()),
        };
        let label = FunctionArg::Column(source.columns()[1].clone());
        let upper = registry::build_function("ToUpper", vec![label], &ctx).unwrap();

        let mut table =
            Where::try_from_column(source, upper, ctx.row_count.clone(), CompareOp::Equal, &"ROW4".into())
                .unwrap();
        assert_eq!(2, table.columns().len());
        assert_eq!(
            vec![vec![ScalarValue::Int32(4), ScalarValue::from("row4")]],
            collect_rows(&mut table, 4).unwrap()
        );
    }

    #[test]
    fn null_rows_excluded() {
        let source = ArrayTable::try_new([("V", Array::from_options([Some(0), None, Some(0)]))]).unwrap();
        let mut table = Where::try_new(Box::new(source), "V", CompareOp::Equal, &0.into()).unwrap();
        assert_eq!(2, collect_column::<i32>(&mut table, "V", 10).unwrap().len());
    }

    #[test]
    fn bad_literal_fails_at_construction() {
        let err = Where::try_new(numbers(3), "N", CompareOp::Equal, &"three".into()).unwrap_err();
        assert!(err.is_usage());

        let err = Where::try_new(numbers(3), "Missing", CompareOp::Equal, &1.into()).unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn reset_reruns() {
        let mut table = Where::try_new(numbers(10), "N", CompareOp::LessThan, &3.into()).unwrap();
        let first = collect_column::<i32>(&mut table, "N", 4).unwrap();
        table.reset().unwrap();
        let second = collect_column::<i32>(&mut table, "N", 4).unwrap();
        assert_eq!(first, second);
        assert_eq!(DataType::Int32, table.columns()[0].details().datatype);
    }
}
