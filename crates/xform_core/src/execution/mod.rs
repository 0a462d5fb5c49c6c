pub mod array_table;
pub mod cancel;
pub mod column;
pub mod operators;
pub mod remapper;
pub mod run;
pub mod table;
