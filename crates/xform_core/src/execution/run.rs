use std::time::{Duration, Instant};

use tracing::debug;
use xform_error::Result;

use super::cancel::CancellationToken;
use super::table::Table;

/// Outcome of driving a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    pub rows: usize,
    pub elapsed: Duration,
    /// False if the run stopped early because of a timeout or cancellation.
    pub completed: bool,
}

/// Pull every batch from a table, discarding the rows.
///
/// Stops early without error if cancelled.
pub fn run_to_end(
    table: &mut dyn Table,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<RunResult> {
    run_batches(table, batch_size, None, cancel, |_| Ok(()))
}

/// Pull batches until the table is exhausted or `timeout` has passed.
///
/// The timeout is checked between batches. Running out of time isn't an
/// error; the partial row count is reported with `completed` false.
pub fn run_until_timeout(
    table: &mut dyn Table,
    batch_size: usize,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<RunResult> {
    run_batches(table, batch_size, Some(timeout), cancel, |_| Ok(()))
}

/// Pull batches until the table is exhausted, calling `on_batch` with the
/// row count of every non-empty batch while the table's getters hold it.
///
/// Stops early without error once `timeout` has passed or `cancel` fires.
pub fn run_batches<F>(
    table: &mut dyn Table,
    batch_size: usize,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
    mut on_batch: F,
) -> Result<RunResult>
where
    F: FnMut(usize) -> Result<()>,
{
    let start = Instant::now();
    let mut rows = 0;

    loop {
        let timed_out = timeout.is_some_and(|timeout| start.elapsed() >= timeout);
        if cancel.is_cancelled() || timed_out {
            let elapsed = start.elapsed();
            debug!(rows, ?elapsed, "run stopped before completion");
            return Ok(RunResult {
                rows,
                elapsed,
                completed: false,
            });
        }

        let count = table.next(batch_size, cancel)?;
        if count == 0 {
            break;
        }
        on_batch(count)?;
        rows += count;
    }

    let elapsed = start.elapsed();
    debug!(rows, ?elapsed, "run complete");

    Ok(RunResult {
        rows,
        elapsed,
        completed: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::array::Array;
    use crate::execution::array_table::ArrayTable;

    fn table() -> ArrayTable {
        ArrayTable::try_new([("A", Array::from_iter(0..10))])
            .unwrap()
            .with_repeat(1000)
    }

    #[test]
    fn runs_to_end() {
        let result = run_to_end(&mut table(), 64, &CancellationToken::new()).unwrap();
        assert_eq!(1000, result.rows);
        assert!(result.completed);
    }

    #[test]
    fn cancelled_run_is_partial() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_to_end(&mut table(), 64, &cancel).unwrap();
        assert_eq!(0, result.rows);
        assert!(!result.completed);
    }

    #[test]
    fn zero_timeout_stops_immediately() {
        let result =
            run_until_timeout(&mut table(), 64, Duration::ZERO, &CancellationToken::new()).unwrap();
        assert!(!result.completed);
        assert_eq!(0, result.rows);
    }

    #[test]
    fn generous_timeout_completes() {
        let result =
            run_until_timeout(&mut table(), 64, Duration::from_secs(60), &CancellationToken::new())
                .unwrap();
        assert!(result.completed);
        assert_eq!(1000, result.rows);
    }

    #[test]
    fn batches_see_current_rows() {
        let mut table = table();
        let getter = table.columns()[0].current_getter().unwrap();
        let mut sum = 0i64;

        let result = run_batches(&mut table, 64, None, &CancellationToken::new(), |count| {
            let array = getter.get()?;
            assert_eq!(count, array.len());
            sum += array.iter::<i32>()?.map(|v| *v.unwrap() as i64).sum::<i64>();
            Ok(())
        })
        .unwrap();

        assert!(result.completed);
        assert_eq!(1000, result.rows);
        assert_eq!(100 * 45, sum);
    }
}
