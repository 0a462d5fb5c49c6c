use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use xform_error::{DbError, Result};

use super::provider::StreamProvider;
use crate::arrays::datatype::DataType;
use crate::execution::column::ColumnDetails;

pub const SCHEMA_FILE: &str = "schema.json";

/// How a column's values are laid out on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnEncoding {
    #[default]
    Plain,
    /// Distinct string values plus one-byte indices.
    Enum,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    #[serde(flatten)]
    pub details: ColumnDetails,
    #[serde(default)]
    pub encoding: ColumnEncoding,
}

/// Manifest written alongside a table's column folders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in declaration order.
    pub columns: Vec<SchemaColumn>,
    pub row_count: usize,
}

impl TableSchema {
    pub fn read(provider: &dyn StreamProvider, table_path: &str) -> Result<Self> {
        let path = format!("{table_path}/{SCHEMA_FILE}");
        let mut buf = String::new();
        provider.open_read(&path)?.read_to_string(&mut buf)?;
        let schema: TableSchema = serde_json::from_str(&buf).map_err(|e| {
            DbError::io("Corrupt table schema")
                .with_field("path", &path)
                .with_source(Box::new(e))
        })?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn write(&self, provider: &dyn StreamProvider, table_path: &str) -> Result<()> {
        let mut stream = provider.create(&format!("{table_path}/{SCHEMA_FILE}"))?;
        serde_json::to_writer_pretty(&mut stream, self)?;
        stream.flush()?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (idx, col) in self.columns.iter().enumerate() {
            if self.columns[..idx]
                .iter()
                .any(|c| c.details.has_name(&col.details.name))
            {
                return Err(DbError::io(format!(
                    "Duplicate column '{}' in table schema",
                    col.details.name
                )));
            }
            if col.encoding == ColumnEncoding::Enum
                && col.details.datatype != DataType::Utf8
            {
                return Err(DbError::io(format!(
                    "Enum column '{}' must be a string column",
                    col.details.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use xform_error::ErrorKind;

    use super::*;
    use crate::storage::provider::LocalFileStreamProvider;

    #[test]
    fn schema_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalFileStreamProvider::new(dir.path());

        let schema = TableSchema {
            columns: vec![
                SchemaColumn {
                    details: ColumnDetails::new("ID", DataType::Int32, false),
                    encoding: ColumnEncoding::Plain,
                },
                SchemaColumn {
                    details: ColumnDetails::new("State", DataType::Utf8, true),
                    encoding: ColumnEncoding::Enum,
                },
            ],
            row_count: 12,
        };
        schema.write(&provider, "Table/T").unwrap();

        let json = std::fs::read_to_string(dir.path().join("Table/T/schema.json")).unwrap();
        assert!(json.contains("\"type\": \"Int32\""));

        assert_eq!(schema, TableSchema::read(&provider, "Table/T").unwrap());
    }

    #[test]
    fn encoding_defaults_to_plain() {
        let schema: TableSchema = serde_json::from_str(
            r#"{"columns": [{"name": "A", "type": "Utf8", "nullable": false}], "row_count": 0}"#,
        )
        .unwrap();
        assert_eq!(ColumnEncoding::Plain, schema.columns[0].encoding);
    }

    #[test]
    fn corrupt_schema_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("T")).unwrap();
        std::fs::write(dir.path().join("T/schema.json"), "{ not json").unwrap();

        let provider = LocalFileStreamProvider::new(dir.path());
        let err = TableSchema::read(&provider, "T").unwrap_err();
        assert_eq!(ErrorKind::Io, err.kind());
    }
}
