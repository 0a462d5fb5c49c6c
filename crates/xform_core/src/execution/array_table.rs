use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;
use xform_error::{DbError, Result};

use super::cancel::CancellationToken;
use super::column::{ArrayGetter, Column, ColumnDetails, GetArray, SeekArray, SeekGetter};
use super::table::Table;
use crate::arrays::array::Array;
use crate::arrays::selector::Selector;

/// An in-memory table over fully materialized arrays.
///
/// Pages through the arrays in batches. Optionally cycles over the arrays
/// until a fixed number of rows has been produced, which is used to generate
/// larger samples from small inputs.
#[derive(Debug)]
pub struct ArrayTable {
    columns: Vec<Arc<dyn Column>>,
    len: usize,
    current: Arc<Mutex<Selector>>,
    repeat_to: Option<usize>,
    produced: usize,
}

impl ArrayTable {
    pub fn try_new(columns: impl IntoIterator<Item = (impl Into<String>, Array)>) -> Result<Self> {
        let mut len = None;
        let current = Arc::new(Mutex::new(Selector::empty()));

        let mut out: Vec<Arc<dyn Column>> = Vec::new();
        for (name, array) in columns {
            let name = name.into();
            match len {
                None => len = Some(array.len()),
                Some(len) if len != array.len() => {
                    return Err(DbError::new("Columns have different lengths")
                        .with_field("column", name)
                        .with_field("expected", len)
                        .with_field("got", array.len()));
                }
                _ => (),
            }
            if out.iter().any(|c| c.details().has_name(&name)) {
                return Err(DbError::usage(format!("Duplicate column '{name}'")));
            }

            out.push(Arc::new(ArrayColumn {
                details: ColumnDetails::new(name, array.datatype(), array.has_nulls()),
                array,
                current: current.clone(),
            }));
        }

        Ok(ArrayTable {
            columns: out,
            len: len.unwrap_or(0),
            current,
            repeat_to: None,
            produced: 0,
        })
    }

    /// Cycle over the rows until `rows` rows have been produced in total.
    pub fn with_repeat(mut self, rows: usize) -> Self {
        self.repeat_to = Some(rows);
        self
    }
}

impl Table for ArrayTable {
    fn columns(&self) -> &[Arc<dyn Column>] {
        &self.columns
    }

    fn current_row_count(&self) -> usize {
        self.current.lock().len()
    }

    fn count(&self) -> Option<usize> {
        Some(self.repeat_to.unwrap_or(self.len))
    }

    fn next(&mut self, desired: usize, _cancel: &CancellationToken) -> Result<usize> {
        let mut current = self.current.lock();

        let desired = match self.repeat_to {
            Some(total) => usize::min(desired, total - self.produced),
            None => desired,
        };
        if desired == 0 {
            *current = Selector::range(self.len, self.len);
            return Ok(0);
        }

        let mut next = current.next_page(self.len, desired);
        if next.is_empty() && self.repeat_to.is_some() {
            trace!(len = self.len, produced = self.produced, "wrapping sample");
            next = Selector::first_page(self.len, desired);
        }

        let count = next.len();
        self.produced += count;
        *current = next;

        Ok(count)
    }

    fn reset(&mut self) -> Result<()> {
        *self.current.lock() = Selector::empty();
        self.produced = 0;
        Ok(())
    }
}

#[derive(Debug)]
struct ArrayColumn {
    details: ColumnDetails,
    array: Array,
    current: Arc<Mutex<Selector>>,
}

impl Column for ArrayColumn {
    fn details(&self) -> &ColumnDetails {
        &self.details
    }

    fn current_getter(&self) -> Result<ArrayGetter> {
        Ok(Arc::new(ArrayColumnGetter {
            array: self.array.clone(),
            current: self.current.clone(),
        }))
    }

    fn seek_getter(&self) -> Option<SeekGetter> {
        Some(Arc::new(ArrayColumnGetter {
            array: self.array.clone(),
            current: self.current.clone(),
        }))
    }
}

#[derive(Debug)]
struct ArrayColumnGetter {
    array: Array,
    current: Arc<Mutex<Selector>>,
}

impl GetArray for ArrayColumnGetter {
    fn get(&self) -> Result<Array> {
        let current = self.current.lock();
        self.array.select(&current)
    }
}

impl SeekArray for ArrayColumnGetter {
    fn get(&self, rows: &Selector) -> Result<Array> {
        self.array.select(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::collect_column;

    #[test]
    fn pages_in_batches() {
        let mut table = ArrayTable::try_new([("A", Array::from_iter(0..25))]).unwrap();
        let getter = table.columns()[0].current_getter().unwrap();
        let cancel = CancellationToken::new();

        let mut sizes = Vec::new();
        loop {
            let n = table.next(10, &cancel).unwrap();
            if n == 0 {
                break;
            }
            assert_eq!(n, getter.get().unwrap().len());
            sizes.push(n);
        }
        assert_eq!(vec![10, 10, 5], sizes);
        assert_eq!(0, table.next(10, &cancel).unwrap());
    }

    #[test]
    fn columns_available_before_pull() {
        let table = ArrayTable::try_new([
            ("A", Array::from_iter([1, 2])),
            ("B", Array::from_iter(["x", "y"].map(String::from))),
        ])
        .unwrap();

        assert_eq!("B", table.columns()[1].details().name);
        assert_eq!(0, table.current_row_count());
        assert_eq!(Some(2), table.count());
    }

    #[test]
    fn repeat_cycles_rows() {
        let mut table = ArrayTable::try_new([("A", Array::from_iter([1, 2, 3]))])
            .unwrap()
            .with_repeat(7);

        let got = collect_column::<i32>(&mut table, "A", 2).unwrap();
        assert_eq!(
            vec![Some(1), Some(2), Some(3), Some(1), Some(2), Some(3), Some(1)],
            got
        );
    }

    #[test]
    fn reset_restarts() {
        let mut table = ArrayTable::try_new([("A", Array::from_iter([1, 2, 3]))]).unwrap();
        let first = collect_column::<i32>(&mut table, "A", 2).unwrap();
        table.reset().unwrap();
        let second = collect_column::<i32>(&mut table, "A", 2).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn seek_getter_selects_rows() {
        let table = ArrayTable::try_new([("A", Array::from_iter([10, 11, 12, 13]))]).unwrap();
        let seek = table.columns()[0].seek_getter().unwrap();

        let arr = seek.get(&Selector::indices(vec![3, 1])).unwrap();
        let got: Vec<_> = arr.iter::<i32>().unwrap().map(|v| v.copied()).collect();
        assert_eq!(vec![Some(13), Some(11)], got);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        ArrayTable::try_new([
            ("A", Array::from_iter([1, 2])),
            ("B", Array::from_iter([1])),
        ])
        .unwrap_err();
    }
}
