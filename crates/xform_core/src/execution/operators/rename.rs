use std::sync::Arc;

use xform_error::{DbError, Result};

use crate::arrays::datatype::DataType;
use crate::execution::cancel::CancellationToken;
use crate::execution::column::{ArrayGetter, Column, ColumnDetails, SeekGetter};
use crate::execution::table::{BoxedTable, Table};

/// Renames columns. Getters are the source's own.
#[derive(Debug)]
pub struct Rename {
    source: BoxedTable,
    columns: Vec<Arc<dyn Column>>,
}

impl Rename {
    pub fn try_new(source: BoxedTable, renames: &[(String, String)]) -> Result<Self> {
        let mut columns = source.columns().to_vec();

        for (from, to) in renames {
            let idx = source.find_column(from)?;
            if let Some(existing) = columns
                .iter()
                .position(|c| c.details().has_name(to))
                .filter(|existing| *existing != idx)
            {
                return Err(DbError::usage(format!(
                    "Cannot rename '{from}' to '{to}', a column with that name already exists"
                ))
                .with_field("column", &columns[existing].details().name));
            }

            let details = columns[idx].details().rename(to.clone());
            columns[idx] = Arc::new(RenamedColumn::new(details, columns[idx].clone()));
        }

        Ok(Rename { source, columns })
    }
}

impl Table for Rename {
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
        self.source.next(desired, cancel)
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()
    }
}

/// A column with new details that otherwise defers to another column.
#[derive(Debug)]
pub struct RenamedColumn {
    details: ColumnDetails,
    inner: Arc<dyn Column>,
}

impl RenamedColumn {
    pub fn new(details: ColumnDetails, inner: Arc<dyn Column>) -> Self {
        RenamedColumn { details, inner }
    }
}

impl Column for RenamedColumn {
    fn details(&self) -> &ColumnDetails {
        &self.details
    }

    fn current_getter(&self) -> Result<ArrayGetter> {
        self.inner.current_getter()
    }

    fn seek_getter(&self) -> Option<SeekGetter> {
        self.inner.seek_getter()
    }

    fn indices_type(&self) -> Option<DataType> {
        self.inner.indices_type()
    }

    fn indices_getter(&self) -> Option<ArrayGetter> {
        self.inner.indices_getter()
    }

    fn values_getter(&self) -> Option<ArrayGetter> {
        self.inner.values_getter()
    }
}
