pub mod array;
pub mod bitmap;
pub mod datatype;
pub mod executor;
pub mod scalar;
pub mod selector;

/// Bind a type alias `$t` to the native type backing a physical type and
/// evaluate `$body` with it.
macro_rules! with_physical_type {
    ($physical:expr, |$t:ident| $body:expr) => {
        match $physical {
            $crate::arrays::datatype::PhysicalType::Boolean => {
                type $t = bool;
                $body
            }
            $crate::arrays::datatype::PhysicalType::Int8 => {
                type $t = i8;
                $body
            }
            $crate::arrays::datatype::PhysicalType::Int16 => {
                type $t = i16;
                $body
            }
            $crate::arrays::datatype::PhysicalType::Int32 => {
                type $t = i32;
                $body
            }
            $crate::arrays::datatype::PhysicalType::Int64 => {
                type $t = i64;
                $body
            }
            $crate::arrays::datatype::PhysicalType::UInt8 => {
                type $t = u8;
                $body
            }
            $crate::arrays::datatype::PhysicalType::UInt16 => {
                type $t = u16;
                $body
            }
            $crate::arrays::datatype::PhysicalType::UInt32 => {
                type $t = u32;
                $body
            }
            $crate::arrays::datatype::PhysicalType::UInt64 => {
                type $t = u64;
                $body
            }
            $crate::arrays::datatype::PhysicalType::Float32 => {
                type $t = f32;
                $body
            }
            $crate::arrays::datatype::PhysicalType::Float64 => {
                type $t = f64;
                $body
            }
            $crate::arrays::datatype::PhysicalType::Utf8 => {
                type $t = String;
                $body
            }
        }
    };
}
pub(crate) use with_physical_type;
