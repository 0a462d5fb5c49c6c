//! Columnar, pull-based query engine over binary column tables.
pub mod arrays;
pub mod compare;
pub mod config;
pub mod convert;
pub mod execution;
pub mod functions;
pub mod query;
pub mod storage;
pub mod testutil;
