use std::sync::Arc;

use parking_lot::Mutex;
use xform_error::Result;

use super::column::{ArrayGetter, Column, ColumnDetails, GetArray};
use crate::arrays::array::Array;
use crate::arrays::datatype::DataType;
use crate::arrays::selector::{LogicalIndex, Selector};

/// The rows of the current source batch that survived a filter.
///
/// Rows are logical positions within the source batch, not physical indices
/// into any backing array. The list is cleared and refilled in place every
/// batch.
#[derive(Debug, Default)]
pub struct RowRemapper {
    rows: Vec<LogicalIndex>,
    /// Bumped every time the rows are refilled.
    generation: u64,
}

impl RowRemapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[LogicalIndex] {
        &self.rows
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Clear the rows for a new batch, returning the buffer to fill.
    pub fn start_batch(&mut self) -> &mut Vec<LogicalIndex> {
        self.generation += 1;
        self.rows.clear();
        &mut self.rows
    }

    /// Restrict an array from the source batch to the matching rows.
    ///
    /// Only the selector changes; the backing data is shared.
    pub fn remap(&self, array: &Array) -> Result<Array> {
        let mut indices = Vec::with_capacity(self.rows.len());
        array.selector().select_into(&self.rows, &mut indices);
        array.with_selector(Selector::indices(indices))
    }
}

/// A column restricted to the rows of a shared `RowRemapper`.
///
/// The built getter is cached so that every consumer of this column shares
/// one remapped result per batch.
#[derive(Debug)]
pub struct RemappedColumn {
    source: Arc<dyn Column>,
    remapper: Arc<Mutex<RowRemapper>>,
    current: Mutex<Option<ArrayGetter>>,
    indices: Mutex<Option<ArrayGetter>>,
}

impl RemappedColumn {
    pub fn new(source: Arc<dyn Column>, remapper: Arc<Mutex<RowRemapper>>) -> Self {
        RemappedColumn {
            source,
            remapper,
            current: Mutex::new(None),
            indices: Mutex::new(None),
        }
    }
}

impl Column for RemappedColumn {
    fn details(&self) -> &ColumnDetails {
        self.source.details()
    }

    fn current_getter(&self) -> Result<ArrayGetter> {
        let mut current = self.current.lock();
        if let Some(getter) = current.as_ref() {
            return Ok(getter.clone());
        }

        let getter: ArrayGetter = Arc::new(RemappedGetter::new(
            self.source.current_getter()?,
            self.remapper.clone(),
        ));
        *current = Some(getter.clone());

        Ok(getter)
    }

    fn indices_type(&self) -> Option<DataType> {
        self.source.indices_type()
    }

    fn indices_getter(&self) -> Option<ArrayGetter> {
        let mut indices = self.indices.lock();
        if let Some(getter) = indices.as_ref() {
            return Some(getter.clone());
        }

        let getter: ArrayGetter = Arc::new(RemappedGetter::new(
            self.source.indices_getter()?,
            self.remapper.clone(),
        ));
        *indices = Some(getter.clone());

        Some(getter)
    }

    fn values_getter(&self) -> Option<ArrayGetter> {
        // Distinct values aren't per row, so they pass through untouched.
        self.source.values_getter()
    }
}

#[derive(Debug)]
struct RemappedGetter {
    source: ArrayGetter,
    remapper: Arc<Mutex<RowRemapper>>,
    cache: Mutex<Option<RemapCache>>,
}

#[derive(Debug)]
struct RemapCache {
    source: Array,
    generation: u64,
    remapped: Array,
}

impl RemappedGetter {
    fn new(source: ArrayGetter, remapper: Arc<Mutex<RowRemapper>>) -> Self {
        RemappedGetter {
            source,
            remapper,
            cache: Mutex::new(None),
        }
    }
}

impl GetArray for RemappedGetter {
    fn get(&self) -> Result<Array> {
        let source = self.source.get()?;
        let remapper = self.remapper.lock();

        let mut cache = self.cache.lock();
        if let Some(cache) = cache.as_ref() {
            if cache.generation == remapper.generation() && cache.source.same_view(&source) {
                return Ok(cache.remapped.clone());
            }
        }

        let remapped = remapper.remap(&source)?;
        *cache = Some(RemapCache {
            source,
            generation: remapper.generation(),
            remapped: remapped.clone(),
        });

        Ok(remapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::array_table::ArrayTable;
    use crate::execution::cancel::CancellationToken;
    use crate::execution::table::Table;

    #[test]
    fn remap_composes_selector() {
        let arr = Array::from_iter([10, 11, 12, 13, 14]).slice(1..5).unwrap();
        let mut remapper = RowRemapper::new();
        remapper
            .start_batch()
            .extend([LogicalIndex(0), LogicalIndex(3)]);

        let out = remapper.remap(&arr).unwrap();
        let got: Vec<_> = out.iter::<i32>().unwrap().map(|v| v.copied()).collect();
        assert_eq!(vec![Some(11), Some(14)], got);
        assert!(out.data().ptr_eq(arr.data()));
    }

    #[test]
    fn remapped_getter_is_cached() {
        let mut table = ArrayTable::try_new([("A", Array::from_iter([1, 2, 3, 4]))]).unwrap();
        let remapper = Arc::new(Mutex::new(RowRemapper::new()));
        let col = RemappedColumn::new(table.columns()[0].clone(), remapper.clone());

        let g1 = col.current_getter().unwrap();
        let g2 = col.current_getter().unwrap();
        assert!(Arc::ptr_eq(&g1, &g2));

        table.next(4, &CancellationToken::new()).unwrap();
        remapper
            .lock()
            .start_batch()
            .extend([LogicalIndex(1), LogicalIndex(2)]);

        let a = g1.get().unwrap();
        let b = g2.get().unwrap();
        assert!(a.same_view(&b));
        assert_eq!(2, a.len());

        // New rows for the same source batch invalidate the cache.
        remapper.lock().start_batch().push(LogicalIndex(3));
        let c = g1.get().unwrap();
        assert_eq!(vec![Some(&4)], c.iter::<i32>().unwrap().collect::<Vec<_>>());
    }
}
