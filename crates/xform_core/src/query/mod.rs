//! Query text to operator tree.
//!
//! A query is a sequence of verb lines. Each verb wraps the table built by
//! the lines before it:
//!
//! ```text
//! read WorkItems
//! where [State] = "Active"
//! set Title ToUpper([Title])
//! select ID, Title, IsNull(Title) as Untitled
//! ```
pub mod expr;
pub mod parser;
pub mod registry;
pub mod scanner;
pub mod verbs;

use std::sync::Arc;

use tracing::debug;
use xform_error::{DbError, Result};

use self::parser::QueryParser;
use self::registry::VerbBuilder;
use crate::config::session::SessionConfig;
use crate::execution::table::BoxedTable;
use crate::storage::provider::StreamProvider;

/// Everything verbs need besides the query text.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub session: SessionConfig,
    pub provider: Arc<dyn StreamProvider>,
}

impl BuildContext {
    pub fn new(provider: Arc<dyn StreamProvider>, session: SessionConfig) -> Self {
        BuildContext { session, provider }
    }
}

/// Build the operator tree for a query.
///
/// `source` is the input for the first verb. It's usually None, with the
/// query starting with `read`.
pub fn parse_query(
    text: &str,
    source: Option<BoxedTable>,
    ctx: &BuildContext,
) -> Result<BoxedTable> {
    let mut parser = QueryParser::new(text)?;
    let mut table = source;
    let mut verbs = 0;

    while parser.next_line() {
        let verb = parser.next_verb()?;
        let builder = registry::verb(&verb).map_err(|e| parser.at_previous(e))?;

        let built = builder
            .build(table.take(), &mut parser, ctx)
            .and_then(|t| parser.expect_end().map(|_| t))
            .map_err(|e| with_usage(e, builder))?;
        debug!(verb = builder.verb(), columns = built.columns().len(), "built verb");

        table = Some(built);
        verbs += 1;
    }

    match table {
        Some(table) if verbs > 0 => Ok(table),
        _ => Err(DbError::usage("Query is empty")),
    }
}

fn with_usage(err: DbError, builder: &dyn VerbBuilder) -> DbError {
    if err.is_usage() && err.get_field("usage").is_none() {
        err.with_field("verb", builder.verb())
            .with_field("usage", builder.usage())
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::array::Array;
    use crate::arrays::scalar::ScalarValue;
    use crate::execution::array_table::ArrayTable;
    use crate::execution::table::column_names;
    use crate::storage::provider::LocalFileStreamProvider;
    use crate::testutil::collect_rows;

    fn context(dir: &std::path::Path) -> BuildContext {
        BuildContext::new(
            Arc::new(LocalFileStreamProvider::new(dir)),
            SessionConfig::default(),
        )
    }

    fn source() -> BoxedTable {
        Box::new(
            ArrayTable::try_new([
                ("ID", Array::from_iter([1, 2, 3, 4])),
                ("State", Array::from_iter(["Active", "Closed", "Active", "New"].map(String::from))),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn pipeline_over_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = parse_query(
            "where State = Active\nset Tag \"x\"\nselect ID, Tag",
            Some(source()),
            &context(dir.path()),
        )
        .unwrap();
        assert_eq!(vec!["ID", "Tag"], column_names(table.columns()));

        let rows = collect_rows(table.as_mut(), 2).unwrap();
        assert_eq!(
            vec![
                vec![ScalarValue::Int32(1), ScalarValue::from("x")],
                vec![ScalarValue::Int32(3), ScalarValue::from("x")],
            ],
            rows
        );
    }

    #[test]
    fn semicolon_separates_verbs() {
        let dir = tempfile::tempdir().unwrap();
        let mut table =
            parse_query("limit 3; count", Some(source()), &context(dir.path())).unwrap();
        let rows = collect_rows(table.as_mut(), 10).unwrap();
        assert_eq!(vec![vec![ScalarValue::Int64(3)]], rows);
    }

    #[test]
    fn empty_query() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_query("  # nothing\n", None, &context(dir.path())).unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn verb_without_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_query("count", None, &context(dir.path())).unwrap_err();
        assert!(err.is_usage());
        assert_eq!(Some("count"), err.get_field("verb"));
    }

    #[test]
    fn unknown_verb_located() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_query("limit 1\njoin Other", Some(source()), &context(dir.path()))
            .unwrap_err();
        assert_eq!(Some("2"), err.get_field("line"));
        assert!(err.get_field("available").unwrap().contains("where"));
    }

    #[test]
    fn extra_arguments_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_query("limit 1 2", Some(source()), &context(dir.path())).unwrap_err();
        assert!(err.get_msg().contains("too many arguments"));
        assert_eq!(Some("limit {RowCount}"), err.get_field("usage"));
    }

    #[test]
    fn cast_strict_without_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut table =
            parse_query("cast State Int32 strict", Some(source()), &context(dir.path())).unwrap();
        assert!(collect_rows(table.as_mut(), 10).is_err());
    }
}
