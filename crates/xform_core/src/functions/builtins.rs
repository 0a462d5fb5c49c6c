use std::ops::RangeInclusive;
use std::sync::Arc;

use xform_error::{DbError, OptionExt, Result};

use super::{FunctionArg, FunctionBuilder, FunctionColumn, FunctionContext, ScalarFunction};
use crate::arrays::array::{Array, PhysicalStorage};
use crate::arrays::datatype::DataType;
use crate::arrays::executor::{OutputState, UnaryExecutor};
use crate::arrays::scalar::ScalarValue;
use crate::arrays::selector::LogicalIndex;
use crate::arrays::with_physical_type;
use crate::convert::CastFailBehavior;
use crate::execution::column::{Column, ColumnDetails, ConstantColumn};
use crate::execution::operators::cast::CastColumn;

pub const BUILTIN_FUNCTIONS: &[&dyn FunctionBuilder] = &[
    &CastBuilder,
    &IsNullBuilder,
    &CoalesceBuilder,
    &ReplaceBuilder,
    &AsOfDateBuilder,
    &StringFunctionBuilder::new("ToUpper", StringOp::Upper),
    &StringFunctionBuilder::new("ToLower", StringOp::Lower),
    &StringFunctionBuilder::new("Trim", StringOp::Trim),
];

#[derive(Debug)]
pub struct CastBuilder;

impl FunctionBuilder for CastBuilder {
    fn name(&self) -> &'static str {
        "Cast"
    }

    fn usage(&self) -> &'static str {
        "Cast({Col|Func|Const}, {ToType}, [{DefaultValue}], [strict])"
    }

    fn arg_count(&self) -> RangeInclusive<usize> {
        2..=4
    }

    fn build(&self, args: Vec<FunctionArg>, ctx: &FunctionContext) -> Result<Arc<dyn Column>> {
        let mut args = args.into_iter();
        let column = ctx.column(args.next().required("cast input")?)?;
        let to: DataType = ctx
            .literal(args.next().required("cast type")?)?
            .try_into_string()?
            .parse()?;

        let default = args.next().map(|arg| ctx.literal(arg)).transpose()?;
        let behavior = match args.next() {
            Some(arg) => parse_strict(ctx.literal(arg)?)?,
            None => CastFailBehavior::OrDefault,
        };

        Ok(Arc::new(CastColumn::try_new(column, to, default, behavior)?))
    }
}

/// Parse the trailing strictness flag of a cast.
pub fn parse_strict(value: ScalarValue) -> Result<CastFailBehavior> {
    let s = value.try_into_string()?;
    if s.eq_ignore_ascii_case("strict") {
        Ok(CastFailBehavior::OrThrow)
    } else {
        Err(DbError::usage(format!("Expected 'strict', got '{s}'")))
    }
}

#[derive(Debug)]
pub struct IsNullBuilder;

impl FunctionBuilder for IsNullBuilder {
    fn name(&self) -> &'static str {
        "IsNull"
    }

    fn usage(&self) -> &'static str {
        "IsNull({Col|Func})"
    }

    fn arg_count(&self) -> RangeInclusive<usize> {
        1..=1
    }

    fn build(&self, args: Vec<FunctionArg>, ctx: &FunctionContext) -> Result<Arc<dyn Column>> {
        let column = ctx.column(args.into_iter().next().required("argument")?)?;
        Ok(Arc::new(FunctionColumn::new(
            ColumnDetails::new("IsNull", DataType::Boolean, false),
            vec![column],
            IsNull,
        )))
    }
}

#[derive(Debug)]
struct IsNull;

impl ScalarFunction for IsNull {
    fn execute(&self, inputs: &[Array], state: &mut OutputState) -> Result<Array> {
        let input = &inputs[0];
        let buffer = state.buffer::<bool>();
        let (out, _) = buffer.reset(input.len());
        out.extend((0..input.len()).map(|row| input.is_null(LogicalIndex(row))));
        buffer.finish(DataType::Boolean, false)
    }
}

#[derive(Debug)]
pub struct CoalesceBuilder;

impl FunctionBuilder for CoalesceBuilder {
    fn name(&self) -> &'static str {
        "Coalesce"
    }

    fn usage(&self) -> &'static str {
        "Coalesce({Col|Func}, {ValueIfNull})"
    }

    fn arg_count(&self) -> RangeInclusive<usize> {
        2..=2
    }

    fn build(&self, args: Vec<FunctionArg>, ctx: &FunctionContext) -> Result<Arc<dyn Column>> {
        let mut args = args.into_iter();
        let column = ctx.column(args.next().required("argument")?)?;
        let datatype = column.details().datatype;
        let default = ctx
            .literal(args.next().required("value if null")?)?
            .try_cast_to(datatype)?;

        Ok(Arc::new(FunctionColumn::new(
            column.details().with_nullable(false),
            vec![column],
            Coalesce { default },
        )))
    }
}

#[derive(Debug)]
struct Coalesce {
    default: ScalarValue,
}

impl Coalesce {
    fn execute_typed<T: PhysicalStorage>(&self, input: &Array, state: &mut OutputState) -> Result<Array> {
        let default = T::from_scalar(&self.default).required("coalesce default")?;
        UnaryExecutor::execute_nullable::<T, T, _>(input, input.datatype(), state.buffer::<T>(), |v| {
            v.cloned().unwrap_or_else(|| default.clone())
        })
    }
}

impl ScalarFunction for Coalesce {
    fn execute(&self, inputs: &[Array], state: &mut OutputState) -> Result<Array> {
        let input = &inputs[0];
        if !input.has_nulls() {
            return Ok(input.clone());
        }
        with_physical_type!(input.datatype().physical_type(), |T| {
            self.execute_typed::<T>(input, state)
        })
    }
}

#[derive(Debug)]
pub struct ReplaceBuilder;

impl FunctionBuilder for ReplaceBuilder {
    fn name(&self) -> &'static str {
        "Replace"
    }

    fn usage(&self) -> &'static str {
        "Replace({String8 Col|Func}, {Find}, {Replace})"
    }

    fn arg_count(&self) -> RangeInclusive<usize> {
        3..=3
    }

    fn build(&self, args: Vec<FunctionArg>, ctx: &FunctionContext) -> Result<Arc<dyn Column>> {
        let mut args = args.into_iter();
        let column = string_column(ctx.column(args.next().required("argument")?)?, self.name())?;
        let find = ctx.literal(args.next().required("find")?)?.try_into_string()?;
        let replace = ctx.literal(args.next().required("replace")?)?.try_into_string()?;
        if find.is_empty() {
            return Err(DbError::usage("Replace requires a non-empty value to find"));
        }

        Ok(Arc::new(FunctionColumn::new(
            ColumnDetails::new("Replace", DataType::Utf8, column.details().nullable),
            vec![column],
            Replace { find, replace },
        )))
    }
}

#[derive(Debug)]
pub struct AsOfDateBuilder;

impl FunctionBuilder for AsOfDateBuilder {
    fn name(&self) -> &'static str {
        "AsOfDate"
    }

    fn usage(&self) -> &'static str {
        "AsOfDate()"
    }

    fn arg_count(&self) -> RangeInclusive<usize> {
        0..=0
    }

    fn build(&self, _args: Vec<FunctionArg>, ctx: &FunctionContext) -> Result<Arc<dyn Column>> {
        Ok(Arc::new(ConstantColumn::try_new(
            "AsOfDate",
            ScalarValue::DateTime(ctx.as_of),
            DataType::DateTime,
            ctx.row_count.clone(),
        )?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp {
    Upper,
    Lower,
    Trim,
}

/// Builder for single argument string functions.
#[derive(Debug)]
pub struct StringFunctionBuilder {
    name: &'static str,
    op: StringOp,
}

impl StringFunctionBuilder {
    pub const fn new(name: &'static str, op: StringOp) -> Self {
        StringFunctionBuilder { name, op }
    }
}

impl FunctionBuilder for StringFunctionBuilder {
    fn name(&self) -> &'static str {
        self.name
    }

    fn usage(&self) -> &'static str {
        "{Name}({String8 Col|Func})"
    }

    fn arg_count(&self) -> RangeInclusive<usize> {
        1..=1
    }

    fn build(&self, args: Vec<FunctionArg>, ctx: &FunctionContext) -> Result<Arc<dyn Column>> {
        let column = string_column(
            ctx.column(args.into_iter().next().required("argument")?)?,
            self.name,
        )?;

        Ok(Arc::new(FunctionColumn::new(
            ColumnDetails::new(self.name, DataType::Utf8, column.details().nullable),
            vec![column],
            StringFunction { op: self.op },
        )))
    }
}

fn string_column(column: Arc<dyn Column>, function: &str) -> Result<Arc<dyn Column>> {
    let datatype = column.details().datatype;
    if datatype != DataType::Utf8 {
        return Err(DbError::usage(format!(
            "{function} requires a String8 argument, got {datatype}"
        ))
        .with_field("column", &column.details().name));
    }
    Ok(column)
}

#[derive(Debug)]
struct StringFunction {
    op: StringOp,
}

impl ScalarFunction for StringFunction {
    fn execute(&self, inputs: &[Array], state: &mut OutputState) -> Result<Array> {
        let buffer = state.buffer::<String>();
        UnaryExecutor::execute::<String, String, _>(&inputs[0], DataType::Utf8, buffer, |v| {
            Ok(Some(match self.op {
                StringOp::Upper => v.to_uppercase(),
                StringOp::Lower => v.to_lowercase(),
                StringOp::Trim => v.trim().to_string(),
            }))
        })
    }
}

#[derive(Debug)]
struct Replace {
    find: String,
    replace: String,
}

impl ScalarFunction for Replace {
    fn execute(&self, inputs: &[Array], state: &mut OutputState) -> Result<Array> {
        let buffer = state.buffer::<String>();
        UnaryExecutor::execute::<String, String, _>(&inputs[0], DataType::Utf8, buffer, |v| {
            Ok(Some(v.replace(self.find.as_str(), &self.replace)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::array_table::ArrayTable;
    use crate::execution::cancel::CancellationToken;
    use crate::execution::table::{RowCount, Table};

    fn context() -> FunctionContext {
        FunctionContext {
            row_count: RowCount::default(),
            as_of: 1_512_508_500_000_000,
            available: Vec::new(),
        }
    }

    fn run(column: &Arc<dyn Column>) -> Vec<ScalarValue> {
        let arr = column.current_getter().unwrap().get().unwrap();
        (0..arr.len()).map(|row| arr.scalar(LogicalIndex(row))).collect()
    }

    /// Bind a single column table, positioned on its only batch.
    fn constant_input(values: Array) -> FunctionArg {
        let mut table = ArrayTable::try_new([("Input", values)]).unwrap();
        table.next(usize::MAX, &CancellationToken::new()).unwrap();
        FunctionArg::Column(table.columns()[0].clone())
    }

    #[test]
    fn string_functions() {
        let input = Array::from_options([Some(" Hello ".to_string()), None]);
        let upper = StringFunctionBuilder::new("ToUpper", StringOp::Upper)
            .build(vec![constant_input(input.clone())], &context())
            .unwrap();
        assert_eq!(vec![ScalarValue::from(" HELLO "), ScalarValue::Null], run(&upper));

        let trim = StringFunctionBuilder::new("Trim", StringOp::Trim)
            .build(vec![constant_input(input)], &context())
            .unwrap();
        assert_eq!(vec![ScalarValue::from("Hello"), ScalarValue::Null], run(&trim));
    }

    #[test]
    fn replace() {
        let input = Array::from_iter(["a-b-c".to_string()]);
        let col = ReplaceBuilder
            .build(
                vec![
                    constant_input(input),
                    FunctionArg::Literal("-".into()),
                    FunctionArg::Literal("+".into()),
                ],
                &context(),
            )
            .unwrap();
        assert_eq!(vec![ScalarValue::from("a+b+c")], run(&col));
    }

    #[test]
    fn is_null_and_coalesce() {
        let input = Array::from_options([Some("x".to_string()), None]);

        let is_null = IsNullBuilder
            .build(vec![constant_input(input.clone())], &context())
            .unwrap();
        assert_eq!(
            vec![ScalarValue::Boolean(false), ScalarValue::Boolean(true)],
            run(&is_null)
        );

        let coalesce = CoalesceBuilder
            .build(
                vec![constant_input(input), FunctionArg::Literal("none".into())],
                &context(),
            )
            .unwrap();
        assert!(!coalesce.details().nullable);
        assert_eq!(vec![ScalarValue::from("x"), ScalarValue::from("none")], run(&coalesce));
    }

    #[test]
    fn as_of_date_sized_to_batch() {
        let ctx = context();
        let col = AsOfDateBuilder.build(Vec::new(), &ctx).unwrap();
        ctx.row_count.set(2);
        assert_eq!(
            vec![ScalarValue::DateTime(ctx.as_of), ScalarValue::DateTime(ctx.as_of)],
            run(&col)
        );
    }

    #[test]
    fn cast_function() {
        let input = Array::from_iter(["1", "x"].map(String::from));
        let col = CastBuilder
            .build(
                vec![
                    constant_input(input.clone()),
                    FunctionArg::Name("Int32".to_string()),
                    FunctionArg::Literal(ScalarValue::Int32(-1)),
                ],
                &context(),
            )
            .unwrap();
        assert_eq!(vec![ScalarValue::Int32(1), ScalarValue::Int32(-1)], run(&col));

        let strict = CastBuilder
            .build(
                vec![
                    constant_input(input),
                    FunctionArg::Name("Int32".to_string()),
                    FunctionArg::Literal(ScalarValue::Int32(-1)),
                    FunctionArg::Name("strict".to_string()),
                ],
                &context(),
            )
            .unwrap();
        strict.current_getter().unwrap().get().unwrap_err();
    }

    #[test]
    fn string_function_rejects_numbers() {
        let err = StringFunctionBuilder::new("ToUpper", StringOp::Upper)
            .build(vec![FunctionArg::Literal(ScalarValue::Int32(1))], &context())
            .unwrap_err();
        assert!(err.is_usage());
    }
}
