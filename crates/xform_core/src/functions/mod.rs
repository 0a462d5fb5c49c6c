//! Column-producing scalar functions.
pub mod builtins;

use std::fmt::Debug;
use std::ops::RangeInclusive;
use std::sync::Arc;

use parking_lot::Mutex;
use xform_error::{DbError, Result};

use crate::arrays::array::Array;
use crate::arrays::datatype::DataType;
use crate::arrays::executor::OutputState;
use crate::arrays::scalar::ScalarValue;
use crate::execution::column::{ArrayGetter, Column, ColumnDetails, ConstantColumn, GetArray};
use crate::execution::table::RowCount;

/// An argument to a function after binding against the input table.
#[derive(Debug, Clone)]
pub enum FunctionArg {
    Column(Arc<dyn Column>),
    Literal(ScalarValue),
    /// A bare name that didn't match any column. Builders may treat it as a
    /// keyword (type names, options).
    Name(String),
}

/// What a function builder has access to besides its arguments.
#[derive(Debug, Clone)]
pub struct FunctionContext {
    /// Row count of the table the function's column is added to.
    pub row_count: RowCount,
    /// Query as-of time, microseconds since epoch.
    pub as_of: i64,
    /// Column names of the input table, for error messages.
    pub available: Vec<String>,
}

impl FunctionContext {
    /// Get an argument as a column. Literals become constant columns.
    pub fn column(&self, arg: FunctionArg) -> Result<Arc<dyn Column>> {
        match arg {
            FunctionArg::Column(col) => Ok(col),
            FunctionArg::Literal(value) => {
                let datatype = value.datatype().unwrap_or(DataType::Utf8);
                Ok(Arc::new(ConstantColumn::try_new(
                    "Constant",
                    value,
                    datatype,
                    self.row_count.clone(),
                )?))
            }
            FunctionArg::Name(name) => Err(DbError::usage(format!("Column '{name}' not found"))
                .with_field("column", name)
                .with_field("available", self.available.join(", "))),
        }
    }

    /// Get an argument as a constant value. Bare names are taken as strings.
    pub fn literal(&self, arg: FunctionArg) -> Result<ScalarValue> {
        match arg {
            FunctionArg::Literal(value) => Ok(value),
            FunctionArg::Name(name) => Ok(ScalarValue::Utf8(name)),
            FunctionArg::Column(col) => Err(DbError::usage(format!(
                "Expected a constant, got column '{}'",
                col.details().name
            ))),
        }
    }
}

/// Builds a column from a function call.
pub trait FunctionBuilder: Debug + Send + Sync {
    /// Name the function is called by, matched case-insensitively.
    fn name(&self) -> &'static str;

    fn usage(&self) -> &'static str;

    /// Accepted number of arguments.
    fn arg_count(&self) -> RangeInclusive<usize>;

    fn build(&self, args: Vec<FunctionArg>, ctx: &FunctionContext) -> Result<Arc<dyn Column>>;
}

/// Per-batch logic for a function over its already fetched inputs.
pub trait ScalarFunction: Debug + Send + Sync {
    fn execute(&self, inputs: &[Array], state: &mut OutputState) -> Result<Array>;
}

/// A column computed from other columns.
///
/// The getter is built once and shared, so every consumer of the column
/// sees the same output buffers.
#[derive(Debug)]
pub struct FunctionColumn {
    details: ColumnDetails,
    inputs: Vec<Arc<dyn Column>>,
    function: Arc<dyn ScalarFunction>,
    current: Mutex<Option<ArrayGetter>>,
}

impl FunctionColumn {
    pub fn new(
        details: ColumnDetails,
        inputs: Vec<Arc<dyn Column>>,
        function: impl ScalarFunction + 'static,
    ) -> Self {
        FunctionColumn {
            details,
            inputs,
            function: Arc::new(function),
            current: Mutex::new(None),
        }
    }
}

impl Column for FunctionColumn {
    fn details(&self) -> &ColumnDetails {
        &self.details
    }

    fn current_getter(&self) -> Result<ArrayGetter> {
        let mut current = self.current.lock();
        if let Some(getter) = current.as_ref() {
            return Ok(getter.clone());
        }

        let inputs = self
            .inputs
            .iter()
            .map(|c| c.current_getter())
            .collect::<Result<Vec<_>>>()?;
        let getter: ArrayGetter = Arc::new(FunctionGetter {
            inputs,
            function: self.function.clone(),
            state: Mutex::new(OutputState::default()),
        });
        *current = Some(getter.clone());

        Ok(getter)
    }
}

#[derive(Debug)]
struct FunctionGetter {
    inputs: Vec<ArrayGetter>,
    function: Arc<dyn ScalarFunction>,
    state: Mutex<OutputState>,
}

impl GetArray for FunctionGetter {
    fn get(&self) -> Result<Array> {
        let inputs = self
            .inputs
            .iter()
            .map(|g| g.get())
            .collect::<Result<Vec<_>>>()?;
        self.function.execute(&inputs, &mut self.state.lock())
    }
}
