use std::any::Any;
use std::fmt;
use std::sync::Arc;

use xform_error::Result;

use super::array::{Array, PhysicalStorage};
use super::bitmap::Bitmap;
use super::datatype::DataType;
use super::selector::Selector;

/// Output storage reused across batches.
///
/// Owned by a single getter. If the previously returned array has been
/// dropped by the consumer the allocation is reused, otherwise a fresh one is
/// made. Capacity only ever grows.
#[derive(Debug, Default)]
pub struct ArrayBuffer<T> {
    values: Arc<Vec<T>>,
    nulls: Arc<Bitmap>,
}

impl<T: PhysicalStorage> ArrayBuffer<T> {
    pub fn new() -> Self {
        ArrayBuffer {
            values: Arc::new(Vec::new()),
            nulls: Arc::new(Bitmap::default()),
        }
    }

    /// Get cleared buffers with room for at least `len` values.
    pub fn reset(&mut self, len: usize) -> (&mut Vec<T>, &mut Bitmap) {
        if Arc::get_mut(&mut self.values).is_none() {
            self.values = Arc::new(Vec::with_capacity(len));
        }
        if Arc::get_mut(&mut self.nulls).is_none() {
            self.nulls = Arc::new(Bitmap::default());
        }

        // Both checked above.
        let values = Arc::get_mut(&mut self.values).expect("values to be unique");
        let nulls = Arc::get_mut(&mut self.nulls).expect("nulls to be unique");

        values.clear();
        values.reserve(len);
        nulls.clear();

        (values, nulls)
    }

    /// Produce an array viewing the current buffer contents.
    pub fn finish(&self, datatype: DataType, has_nulls: bool) -> Result<Array> {
        let len = self.values.len();
        let nulls = if has_nulls {
            Some(self.nulls.clone())
        } else {
            None
        };
        Array::try_new(
            datatype,
            T::into_data(self.values.clone()),
            Selector::all(len),
            nulls,
        )
    }
}

/// Type-erased output buffer owned by a single consumer.
///
/// The buffer is created on first use for whatever output type the consumer
/// asks for, and replaced if the type changes.
#[derive(Default)]
pub struct OutputState {
    buffer: Option<Box<dyn Any + Send>>,
}

impl fmt::Debug for OutputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputState").finish_non_exhaustive()
    }
}

impl OutputState {
    pub fn buffer<T: PhysicalStorage>(&mut self) -> &mut ArrayBuffer<T> {
        let matches = self
            .buffer
            .as_ref()
            .is_some_and(|b| b.is::<ArrayBuffer<T>>());
        if !matches {
            self.buffer = Some(Box::new(ArrayBuffer::<T>::new()));
        }
        self.buffer
            .as_mut()
            .and_then(|b| b.downcast_mut::<ArrayBuffer<T>>())
            .expect("buffer to be initialized with the right type")
    }
}

/// Executes a per-value function over an array, producing a dense output
/// array.
#[derive(Debug, Clone, Copy)]
pub struct UnaryExecutor;

impl UnaryExecutor {
    /// Apply `op` to every non-null row of `input`.
    ///
    /// `op` returns `Ok(None)` to produce a null. Null inputs produce null
    /// outputs without calling `op`.
    pub fn execute<S, O, F>(
        input: &Array,
        out_type: DataType,
        buffer: &mut ArrayBuffer<O>,
        mut op: F,
    ) -> Result<Array>
    where
        S: PhysicalStorage,
        O: PhysicalStorage,
        F: FnMut(&S) -> Result<Option<O>>,
    {
        let values = input.values::<S>()?;
        let len = input.len();
        let (out, nulls) = buffer.reset(len);

        let mut has_nulls = false;
        for idx in input.selector().iter() {
            if input.is_null_physical(idx) {
                out.push(O::default());
                nulls.push(true);
                has_nulls = true;
                continue;
            }
            match op(&values[idx.0])? {
                Some(v) => {
                    out.push(v);
                    nulls.push(false);
                }
                None => {
                    out.push(O::default());
                    nulls.push(true);
                    has_nulls = true;
                }
            }
        }

        buffer.finish(out_type, has_nulls)
    }

    /// Apply `op` to every row including nulls, producing a non-null output.
    pub fn execute_nullable<S, O, F>(
        input: &Array,
        out_type: DataType,
        buffer: &mut ArrayBuffer<O>,
        mut op: F,
    ) -> Result<Array>
    where
        S: PhysicalStorage,
        O: PhysicalStorage,
        F: FnMut(Option<&S>) -> O,
    {
        let values = input.values::<S>()?;
        let (out, _) = buffer.reset(input.len());

        for idx in input.selector().iter() {
            let v = if input.is_null_physical(idx) {
                None
            } else {
                Some(&values[idx.0])
            };
            out.push(op(v));
        }

        buffer.finish(out_type, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::selector::LogicalIndex;

    #[test]
    fn unary_respects_selector_and_nulls() {
        let input = Array::from_options([Some(1), None, Some(3), Some(4)])
            .with_selector(Selector::indices(vec![3, 1, 0]))
            .unwrap();

        let mut buffer = ArrayBuffer::<i64>::new();
        let out = UnaryExecutor::execute::<i32, i64, _>(&input, DataType::Int64, &mut buffer, |v| {
            Ok(Some(*v as i64 * 10))
        })
        .unwrap();

        let got: Vec<_> = out.iter::<i64>().unwrap().map(|v| v.copied()).collect();
        assert_eq!(vec![Some(40), None, Some(10)], got);
    }

    #[test]
    fn buffer_reused_when_output_dropped() {
        let input = Array::from_iter([1, 2, 3]);
        let mut buffer = ArrayBuffer::<i32>::new();

        let out = UnaryExecutor::execute::<i32, i32, _>(&input, DataType::Int32, &mut buffer, |v| {
            Ok(Some(v + 1))
        })
        .unwrap();
        let first_ptr = out.values::<i32>().unwrap().as_ptr();
        drop(out);

        let out = UnaryExecutor::execute::<i32, i32, _>(&input, DataType::Int32, &mut buffer, |v| {
            Ok(Some(v + 2))
        })
        .unwrap();
        assert_eq!(first_ptr, out.values::<i32>().unwrap().as_ptr());
        assert_eq!(Some(&5), out.value::<i32>(LogicalIndex(2)).unwrap());
    }

    #[test]
    fn buffer_not_clobbered_while_held() {
        let input = Array::from_iter([1, 2, 3]);
        let mut buffer = ArrayBuffer::<i32>::new();

        let first = UnaryExecutor::execute::<i32, i32, _>(&input, DataType::Int32, &mut buffer, |v| {
            Ok(Some(*v))
        })
        .unwrap();
        let _second = UnaryExecutor::execute::<i32, i32, _>(&input, DataType::Int32, &mut buffer, |v| {
            Ok(Some(v * 100))
        })
        .unwrap();

        assert_eq!(Some(&3), first.value::<i32>(LogicalIndex(2)).unwrap());
    }
}
