//! Type conversion between column types.
//!
//! A `TypeConverter` is resolved once for a (source, target) pair. Each
//! consumer then keeps its own `ConvertState` holding output buffers.
pub mod format;
pub mod parse;

use num_traits::NumCast;
use xform_error::{DbError, Result};

use self::format::{DateTimeFormatter, DisplayFormatter, Formatter, TimeSpanFormatter};
use self::parse::{BoolParser, DateTimeParser, FromStrParser, Parser, TimeSpanParser};
use crate::arrays::array::{Array, PhysicalStorage};
use crate::arrays::datatype::{DataType, PhysicalType};
use crate::arrays::executor::{OutputState, UnaryExecutor};
use crate::arrays::scalar::ScalarValue;

/// What to do when a single value fails to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CastFailBehavior {
    /// Substitute the default value. The row is not marked null.
    #[default]
    OrDefault,
    /// Return a conversion error naming the value.
    OrThrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConversionKind {
    /// Same physical layout, only the logical type changes.
    Reinterpret,
    Numeric,
    ToString,
    FromString,
}

/// A resolved conversion from one type to another.
#[derive(Debug, Clone)]
pub struct TypeConverter {
    from: DataType,
    to: DataType,
    behavior: CastFailBehavior,
    default: ScalarValue,
    kind: ConversionKind,
}

/// Per-consumer output buffers for a converter.
pub type ConvertState = OutputState;

/// Bind a type alias for the native type of a numeric physical type.
macro_rules! with_numeric_type {
    ($physical:expr, |$t:ident| $body:expr, $fallback:expr) => {
        match $physical {
            PhysicalType::Int8 => {
                type $t = i8;
                $body
            }
            PhysicalType::Int16 => {
                type $t = i16;
                $body
            }
            PhysicalType::Int32 => {
                type $t = i32;
                $body
            }
            PhysicalType::Int64 => {
                type $t = i64;
                $body
            }
            PhysicalType::UInt8 => {
                type $t = u8;
                $body
            }
            PhysicalType::UInt16 => {
                type $t = u16;
                $body
            }
            PhysicalType::UInt32 => {
                type $t = u32;
                $body
            }
            PhysicalType::UInt64 => {
                type $t = u64;
                $body
            }
            PhysicalType::Float32 => {
                type $t = f32;
                $body
            }
            PhysicalType::Float64 => {
                type $t = f64;
                $body
            }
            _ => $fallback,
        }
    };
}

impl TypeConverter {
    /// Resolve a converter.
    ///
    /// Errors with a usage error if the pair isn't supported, or if the
    /// default value can't be represented in the target type.
    pub fn try_new(
        from: DataType,
        to: DataType,
        behavior: CastFailBehavior,
        default: Option<ScalarValue>,
    ) -> Result<Self> {
        let kind = match (from, to) {
            (from, to) if from.physical_type() == to.physical_type() => {
                match (from, to) {
                    // Same storage, but the values mean different things.
                    (DataType::DateTime, DataType::TimeSpan)
                    | (DataType::TimeSpan, DataType::DateTime) => {
                        return Err(unsupported(from, to));
                    }
                    _ => ConversionKind::Reinterpret,
                }
            }
            (from, to) if from.is_numeric() && to.is_numeric() => ConversionKind::Numeric,
            (DataType::DateTime | DataType::TimeSpan, to) if to.is_numeric() => {
                ConversionKind::Numeric
            }
            (from, DataType::DateTime | DataType::TimeSpan) if from.is_integer() => {
                ConversionKind::Numeric
            }
            (_, DataType::Utf8) => ConversionKind::ToString,
            (DataType::Utf8, _) => ConversionKind::FromString,
            _ => return Err(unsupported(from, to)),
        };

        let default = match default {
            Some(ScalarValue::Null) | None => ScalarValue::default_for(to),
            Some(v) if v.datatype() == Some(to) => v,
            Some(v) => {
                // Convert the default with a strict converter so that a bad
                // default fails now instead of per row.
                v.try_cast_to(to)?
            }
        };

        Ok(TypeConverter {
            from,
            to,
            behavior,
            default,
            kind,
        })
    }

    pub fn from_type(&self) -> DataType {
        self.from
    }

    pub fn to_type(&self) -> DataType {
        self.to
    }

    pub fn behavior(&self) -> CastFailBehavior {
        self.behavior
    }

    pub fn new_state(&self) -> ConvertState {
        ConvertState::default()
    }

    /// Convert a batch.
    pub fn convert(&self, input: &Array, state: &mut ConvertState) -> Result<Array> {
        if input.datatype() != self.from {
            return Err(DbError::new("Converter received unexpected input type")
                .with_field("expected", self.from)
                .with_field("got", input.datatype()));
        }

        match self.kind {
            ConversionKind::Reinterpret => input.clone().with_datatype(self.to),
            ConversionKind::Numeric => self.convert_numeric(input, state),
            ConversionKind::ToString => self.convert_to_string(input, state),
            ConversionKind::FromString => self.convert_from_string(input, state),
        }
    }

    fn convert_numeric(&self, input: &Array, state: &mut ConvertState) -> Result<Array> {
        let from = self.from.physical_type();
        let to = self.to.physical_type();
        with_numeric_type!(
            from,
            |S| with_numeric_type!(
                to,
                |O| self.execute::<S, O, _>(input, state, |v: &S| <O as NumCast>::from(*v)),
                Err(unsupported(self.from, self.to))
            ),
            Err(unsupported(self.from, self.to))
        )
    }

    fn convert_to_string(&self, input: &Array, state: &mut ConvertState) -> Result<Array> {
        let mut buf = String::new();
        match self.from {
            DataType::DateTime => self.format_with::<i64, _>(input, state, DateTimeFormatter, &mut buf),
            DataType::TimeSpan => self.format_with::<i64, _>(input, state, TimeSpanFormatter, &mut buf),
            DataType::Boolean => {
                self.format_with::<bool, _>(input, state, DisplayFormatter::<bool>::default(), &mut buf)
            }
            DataType::Utf8 => input.clone().with_datatype(DataType::Utf8),
            other => with_numeric_type!(
                other.physical_type(),
                |S| self.format_with::<S, _>(input, state, DisplayFormatter::<S>::default(), &mut buf),
                Err(unsupported(self.from, self.to))
            ),
        }
    }

    fn format_with<S, F>(
        &self,
        input: &Array,
        state: &mut ConvertState,
        mut formatter: F,
        buf: &mut String,
    ) -> Result<Array>
    where
        S: PhysicalStorage,
        F: Formatter<Type = S>,
    {
        self.execute::<S, String, _>(input, state, |v| {
            buf.clear();
            formatter.write(v, buf).ok()?;
            Some(buf.clone())
        })
    }

    fn convert_from_string(&self, input: &Array, state: &mut ConvertState) -> Result<Array> {
        match self.to {
            DataType::Boolean => self.parse_with(input, state, BoolParser),
            DataType::DateTime => self.parse_with(input, state, DateTimeParser),
            DataType::TimeSpan => self.parse_with(input, state, TimeSpanParser),
            other => with_numeric_type!(
                other.physical_type(),
                |O| self.parse_with(input, state, FromStrParser::<O>::new()),
                Err(unsupported(self.from, self.to))
            ),
        }
    }

    fn parse_with<P>(&self, input: &Array, state: &mut ConvertState, mut parser: P) -> Result<Array>
    where
        P: Parser,
        P::Type: PhysicalStorage,
    {
        self.execute::<String, P::Type, _>(input, state, |v| parser.parse(v))
    }

    /// Run a fallible per-value conversion, applying the failure behavior.
    fn execute<S, O, F>(&self, input: &Array, state: &mut ConvertState, mut op: F) -> Result<Array>
    where
        S: PhysicalStorage,
        O: PhysicalStorage,
        F: FnMut(&S) -> Option<O>,
    {
        let default = O::from_scalar(&self.default)
            .ok_or_else(|| DbError::new("Default value does not match target type"))?;
        let behavior = self.behavior;
        let to = self.to;

        UnaryExecutor::execute::<S, O, _>(input, to, state.buffer::<O>(), |v| match op(v) {
            Some(out) => Ok(Some(out)),
            None => match behavior {
                CastFailBehavior::OrDefault => Ok(Some(default.clone())),
                CastFailBehavior::OrThrow => Err(DbError::conversion(format!(
                    "Unable to convert {v:?} to {to}"
                ))
                .with_field("value", format!("{v:?}"))),
            },
        })
    }
}

fn unsupported(from: DataType, to: DataType) -> DbError {
    DbError::usage(format!("No conversion from {from} to {to}"))
        .with_field("from", from)
        .with_field("to", to)
}
