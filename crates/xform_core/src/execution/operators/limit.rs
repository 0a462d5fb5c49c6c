use std::sync::Arc;

use xform_error::Result;

use crate::execution::cancel::CancellationToken;
use crate::execution::column::Column;
use crate::execution::table::{BoxedTable, Table};

/// Caps the total number of rows returned across all batches.
#[derive(Debug)]
pub struct Limit {
    source: BoxedTable,
    limit: usize,
    produced: usize,
    current: usize,
}

impl Limit {
    pub fn new(source: BoxedTable, limit: usize) -> Self {
        Limit {
            source,
            limit,
            produced: 0,
            current: 0,
        }
    }
}

impl Table for Limit {
    fn columns(&self) -> &[Arc<dyn Column>] {
        self.source.columns()
    }

    fn current_row_count(&self) -> usize {
        self.current
    }

    fn count(&self) -> Option<usize> {
        self.source.count().map(|count| usize::min(count, self.limit))
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        let remaining = self.limit - self.produced;
        if remaining == 0 {
            self.current = 0;
            return Ok(0);
        }

        let count = self
            .source
            .next(usize::min(desired, remaining), cancel)?;
        self.produced += count;
        self.current = count;

        Ok(count)
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()?;
        self.produced = 0;
        self.current = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::array::Array;
    use crate::execution::array_table::ArrayTable;
    use crate::testutil::collect_column;

    #[test]
    fn exact_row_count() {
        let source = ArrayTable::try_new([("A", Array::from_iter(0..20))]).unwrap();
        let mut limit = Limit::new(Box::new(source), 7);
        let cancel = CancellationToken::new();

        assert_eq!(7, limit.next(10, &cancel).unwrap());
        assert_eq!(0, limit.next(10, &cancel).unwrap());
        assert_eq!(0, limit.next(10, &cancel).unwrap());
    }

    #[test]
    fn limit_across_batches() {
        let source = ArrayTable::try_new([("A", Array::from_iter(0..20))]).unwrap();
        let mut limit = Limit::new(Box::new(source), 7);

        let got = collect_column::<i32>(&mut limit, "A", 3).unwrap();
        assert_eq!((0..7).map(Some).collect::<Vec<_>>(), got);
    }

    #[test]
    fn limit_larger_than_source() {
        let source = ArrayTable::try_new([("A", Array::from_iter(0..5))]).unwrap();
        let mut limit = Limit::new(Box::new(source), 100);

        assert_eq!(Some(5), limit.count());
        assert_eq!(5, collect_column::<i32>(&mut limit, "A", 10).unwrap().len());
    }
}
