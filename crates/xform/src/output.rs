//! Plain text rendering of query output.
use std::fmt;
use std::sync::Arc;

use xform_core::arrays::array::Array;
use xform_core::arrays::selector::LogicalIndex;
use xform_core::execution::column::Column;

/// Rows formatted as strings, rendered with aligned columns.
#[derive(Debug)]
pub struct PlainTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl PlainTable {
    pub fn new(columns: &[Arc<dyn Column>]) -> Self {
        PlainTable {
            header: columns.iter().map(|c| c.details().name.clone()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_batch(&mut self, arrays: &[Array], count: usize) {
        for row in 0..count {
            self.rows.push(
                arrays
                    .iter()
                    .map(|arr| arr.scalar(LogicalIndex(row)).to_string())
                    .collect(),
            );
        }
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<_> = self.header.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (width, value) in widths.iter_mut().zip(row) {
                *width = usize::max(*width, value.chars().count());
            }
        }
        widths
    }
}

impl fmt::Display for PlainTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();
        let write_row = |f: &mut fmt::Formatter<'_>, row: &[String]| {
            let line: Vec<_> = row
                .iter()
                .zip(&widths)
                .map(|(value, width)| format!("{value:<width$}"))
                .collect();
            writeln!(f, "{}", line.join("  ").trim_end())
        };

        write_row(f, &self.header)?;
        let rule: Vec<_> = widths.iter().map(|w| "-".repeat(*w)).collect();
        writeln!(f, "{}", rule.join("  "))?;
        for row in &self.rows {
            write_row(f, row)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use xform_core::execution::array_table::ArrayTable;
    use xform_core::execution::cancel::CancellationToken;
    use xform_core::execution::table::Table;

    use super::*;

    #[test]
    fn aligned_columns() {
        let mut table = ArrayTable::try_new([
            ("ID", Array::from_iter([1, 200])),
            ("Title", Array::from_options([Some("a".to_string()), None])),
        ])
        .unwrap();

        let mut output = PlainTable::new(table.columns());
        let getters: Vec<_> = table
            .columns()
            .iter()
            .map(|c| c.current_getter().unwrap())
            .collect();
        table.next(10, &CancellationToken::new()).unwrap();
        let arrays: Vec<_> = getters.iter().map(|g| g.get().unwrap()).collect();
        output.push_batch(&arrays, 2);

        let expected = "\
ID   Title
---  -----
1    a
200  NULL
";
        assert_eq!(expected, output.to_string());
    }
}
