use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use xform_error::{DbError, Result};

use super::cancel::CancellationToken;
use super::column::Column;

/// A pull-based source of row batches.
///
/// Tables are built bottom-up, each operator owning the table it wraps.
/// Column metadata is available before any rows are pulled. Calling `next`
/// advances every column's current getter to the new batch.
///
/// A single caller drives `next`; tables are not meant to be pulled
/// concurrently.
pub trait Table: Debug + Send {
    /// Columns in declaration order.
    fn columns(&self) -> &[Arc<dyn Column>];

    /// Number of rows in the current batch.
    fn current_row_count(&self) -> usize;

    /// Total row count, if known without pulling.
    fn count(&self) -> Option<usize> {
        None
    }

    /// Pull the next batch of up to `desired` rows.
    ///
    /// Returns the number of rows in the batch. Zero means the table is
    /// exhausted.
    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize>;

    /// Start over from the first row.
    fn reset(&mut self) -> Result<()>;

    /// Get a column by name, case-insensitively.
    fn column(&self, name: &str) -> Option<&Arc<dyn Column>> {
        self.columns().iter().find(|c| c.details().has_name(name))
    }

    /// Get the position of a column by name, erroring with the list of
    /// available columns if it doesn't exist.
    fn find_column(&self, name: &str) -> Result<usize> {
        self.columns()
            .iter()
            .position(|c| c.details().has_name(name))
            .ok_or_else(|| {
                DbError::usage(format!("Column '{name}' not found"))
                    .with_field("column", name)
                    .with_field("available", column_names(self.columns()).join(", "))
            })
    }
}

pub type BoxedTable = Box<dyn Table>;

pub fn column_names(columns: &[Arc<dyn Column>]) -> Vec<String> {
    columns.iter().map(|c| c.details().name.clone()).collect()
}

/// Shared handle on the row count of a table's current batch.
///
/// Lets columns that don't read from a source (constants) size their output
/// to the batch.
#[derive(Debug, Clone, Default)]
pub struct RowCount(Arc<AtomicUsize>);

impl RowCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, count: usize) {
        self.0.store(count, Ordering::Relaxed)
    }
}
