use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use xform_error::Result;

use crate::arrays::array::Array;
use crate::arrays::datatype::DataType;
use crate::execution::cancel::CancellationToken;
use crate::execution::column::{ArrayGetter, Column, ColumnDetails, GetArray};
use crate::execution::table::{BoxedTable, Table};

/// Returns a single row holding the number of rows in the source.
///
/// Sources with a known count aren't pulled.
#[derive(Debug)]
pub struct Count {
    source: BoxedTable,
    columns: Vec<Arc<dyn Column>>,
    current: Arc<Mutex<Array>>,
    done: bool,
}

impl Count {
    pub fn new(source: BoxedTable) -> Self {
        let current = Arc::new(Mutex::new(empty()));
        let column: Arc<dyn Column> = Arc::new(CountColumn {
            details: ColumnDetails::new("Count", DataType::Int64, false),
            current: current.clone(),
        });

        Count {
            source,
            columns: vec![column],
            current,
            done: false,
        }
    }
}

fn empty() -> Array {
    Array::from_iter(std::iter::empty::<i64>())
}

impl Table for Count {
    fn columns(&self) -> &[Arc<dyn Column>] {
        &self.columns
    }

    fn current_row_count(&self) -> usize {
        self.current.lock().len()
    }

    fn count(&self) -> Option<usize> {
        Some(1)
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        if self.done {
            *self.current.lock() = empty();
            return Ok(0);
        }

        let total = match self.source.count() {
            Some(count) => count,
            None => {
                let mut total = 0;
                loop {
                    let count = self.source.next(usize::max(desired, 1), cancel)?;
                    if count == 0 {
                        break;
                    }
                    total += count;
                }
                total
            }
        };
        debug!(total, "counted rows");

        *self.current.lock() = Array::from_iter([total as i64]);
        self.done = true;

        Ok(1)
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()?;
        *self.current.lock() = empty();
        self.done = false;
        Ok(())
    }
}

#[derive(Debug)]
struct CountColumn {
    details: ColumnDetails,
    current: Arc<Mutex<Array>>,
}

impl Column for CountColumn {
    fn details(&self) -> &ColumnDetails {
        &self.details
    }

    fn current_getter(&self) -> Result<ArrayGetter> {
        Ok(Arc::new(CountGetter {
            current: self.current.clone(),
        }))
    }
}

#[derive(Debug)]
struct CountGetter {
    current: Arc<Mutex<Array>>,
}

impl GetArray for CountGetter {
    fn get(&self) -> Result<Array> {
        Ok(self.current.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::CompareOp;
    use crate::execution::array_table::ArrayTable;
    use crate::execution::operators::filter::Where;
    use crate::testutil::collect_column;

    #[test]
    fn count_known() {
        let source = ArrayTable::try_new([("A", Array::from_iter(0..42))]).unwrap();
        let mut count = Count::new(Box::new(source));
        assert_eq!(vec![Some(42)], collect_column::<i64>(&mut count, "Count", 10).unwrap());
    }

    #[test]
    fn count_pulls_unknown() {
        let source = ArrayTable::try_new([("A", Array::from_iter(0..42))]).unwrap();
        let filtered = Where::try_new(Box::new(source), "A", CompareOp::LessThan, &10.into()).unwrap();
        let mut count = Count::new(Box::new(filtered));
        assert_eq!(vec![Some(10)], collect_column::<i64>(&mut count, "Count", 4).unwrap());
    }
}
