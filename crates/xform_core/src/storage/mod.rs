//! Binary columnar table storage.
//!
//! A table is a folder holding `schema.json` and one folder per column.
//! Named tables are versioned under `Table/<name>/<crawl>/<timestamp>/`.

pub mod column;
pub mod provider;
pub mod reader;
pub mod schema;
pub mod writer;
