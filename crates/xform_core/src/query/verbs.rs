//! One builder per query verb.
use std::sync::Arc;

use xform_error::{DbError, Result};

use super::BuildContext;
use super::expr::parse_expression;
use super::parser::QueryParser;
use super::registry::VerbBuilder;
use super::scanner::Token;
use crate::arrays::scalar::ScalarValue;
use crate::convert::CastFailBehavior;
use crate::execution::column::Column;
use crate::execution::operators::cast::Cast;
use crate::execution::operators::count::Count;
use crate::execution::operators::filter::Where;
use crate::execution::operators::limit::Limit;
use crate::execution::operators::projection::Projection;
use crate::execution::operators::rename::{Rename, RenamedColumn};
use crate::execution::operators::schema::Schema;
use crate::execution::operators::set::Set;
use crate::execution::table::{BoxedTable, RowCount, Table, column_names};
use crate::functions::FunctionContext;
use crate::functions::builtins::parse_strict;
use crate::storage::provider::{FULL_CRAWL, format_version, table_folder};
use crate::storage::reader::BinaryTableReader;
use crate::storage::writer::BinaryTableWriter;

pub const BUILTIN_VERBS: &[&dyn VerbBuilder] = &[
    &ReadVerb,
    &WriteVerb,
    &SchemaVerb,
    &WhereVerb,
    &SelectVerb,
    &RemoveColumnsVerb,
    &RenameVerb,
    &CastVerb,
    &LimitVerb,
    &SetVerb,
    &CountVerb,
];

fn require_source(source: Option<BoxedTable>, verb: &str) -> Result<BoxedTable> {
    source.ok_or_else(|| {
        DbError::usage(format!("'{verb}' needs an input, start the query with 'read'"))
    })
}

#[derive(Debug)]
pub struct ReadVerb;

impl VerbBuilder for ReadVerb {
    fn verb(&self) -> &'static str {
        "read"
    }

    fn usage(&self) -> &'static str {
        "read {TableName}"
    }

    fn build(
        &self,
        source: Option<BoxedTable>,
        parser: &mut QueryParser,
        ctx: &BuildContext,
    ) -> Result<BoxedTable> {
        if source.is_some() {
            return Err(DbError::usage("'read' must be the first verb of a query"));
        }
        let name = parser.next_string("table name")?;
        let reader =
            BinaryTableReader::open_as_of(ctx.provider.clone(), &name, ctx.session.as_of)?;
        Ok(Box::new(reader))
    }
}

#[derive(Debug)]
pub struct WriteVerb;

impl VerbBuilder for WriteVerb {
    fn verb(&self) -> &'static str {
        "write"
    }

    fn usage(&self) -> &'static str {
        "write {TableName}"
    }

    fn build(
        &self,
        source: Option<BoxedTable>,
        parser: &mut QueryParser,
        ctx: &BuildContext,
    ) -> Result<BoxedTable> {
        let source = require_source(source, self.verb())?;
        let name = parser.next_string("table name")?;
        let path = format!(
            "{}/{}",
            table_folder(&name, FULL_CRAWL),
            format_version(ctx.session.as_of)?
        );
        let writer = BinaryTableWriter::try_new(source, ctx.provider.clone(), path)?;
        Ok(Box::new(writer))
    }
}

#[derive(Debug)]
pub struct SchemaVerb;

impl VerbBuilder for SchemaVerb {
    fn verb(&self) -> &'static str {
        "schema"
    }

    fn usage(&self) -> &'static str {
        "schema"
    }

    fn build(
        &self,
        source: Option<BoxedTable>,
        _parser: &mut QueryParser,
        _ctx: &BuildContext,
    ) -> Result<BoxedTable> {
        Ok(Box::new(Schema::try_new(require_source(source, self.verb())?)?))
    }
}

#[derive(Debug)]
pub struct WhereVerb;

impl VerbBuilder for WhereVerb {
    fn verb(&self) -> &'static str {
        "where"
    }

    fn usage(&self) -> &'static str {
        "where {Col|Func} {Operator} {Value}"
    }

    fn build(
        &self,
        source: Option<BoxedTable>,
        parser: &mut QueryParser,
        ctx: &BuildContext,
    ) -> Result<BoxedTable> {
        let source = require_source(source, self.verb())?;
        let fctx = function_context(source.as_ref(), ctx);
        let column = parse_expression(parser, source.as_ref(), &fctx)?;
        let op = parser.next_operator()?;
        let value = parser.next_literal()?;
        Ok(Box::new(Where::try_from_column(
            source,
            column,
            fctx.row_count,
            op,
            &value,
        )?))
    }
}

#[derive(Debug)]
pub struct SelectVerb;

impl VerbBuilder for SelectVerb {
    fn verb(&self) -> &'static str {
        "select"
    }

    fn usage(&self) -> &'static str {
        "select {Col|Func} [as {Name}], {Col|Func} [as {Name}], ..."
    }

    fn build(
        &self,
        source: Option<BoxedTable>,
        parser: &mut QueryParser,
        ctx: &BuildContext,
    ) -> Result<BoxedTable> {
        let source = require_source(source, self.verb())?;
        let fctx = function_context(source.as_ref(), ctx);

        let mut columns = Vec::new();
        loop {
            let column = parse_expression(parser, source.as_ref(), &fctx)?;
            let column: Arc<dyn Column> = match next_alias(parser)? {
                Some(alias) => Arc::new(RenamedColumn::new(column.details().rename(alias), column)),
                None => column,
            };
            columns.push(column);
            if !parser.skip_comma() && !parser.has_another_part() {
                break;
            }
        }

        Ok(Box::new(Projection::computed(source, columns, fctx.row_count)?))
    }
}

/// Parse an optional `as {Name}` after a select expression.
fn next_alias(parser: &mut QueryParser) -> Result<Option<String>> {
    let is_alias = matches!(parser.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case("as"));
    if !is_alias {
        return Ok(None);
    }
    parser.take("'as'")?;
    Ok(Some(parser.next_string("column name")?))
}

#[derive(Debug)]
pub struct RemoveColumnsVerb;

impl VerbBuilder for RemoveColumnsVerb {
    fn verb(&self) -> &'static str {
        "removecolumns"
    }

    fn usage(&self) -> &'static str {
        "removeColumns {Column}, {Column}, ..."
    }

    fn build(
        &self,
        source: Option<BoxedTable>,
        parser: &mut QueryParser,
        _ctx: &BuildContext,
    ) -> Result<BoxedTable> {
        let source = require_source(source, self.verb())?;
        let names = parser.next_column_names(source.as_ref())?;
        Ok(Box::new(Projection::remove(source, &names)?))
    }
}

#[derive(Debug)]
pub struct RenameVerb;

impl VerbBuilder for RenameVerb {
    fn verb(&self) -> &'static str {
        "rename"
    }

    fn usage(&self) -> &'static str {
        "rename {Column} {NewName}, {Column} {NewName}, ..."
    }

    fn build(
        &self,
        source: Option<BoxedTable>,
        parser: &mut QueryParser,
        _ctx: &BuildContext,
    ) -> Result<BoxedTable> {
        let source = require_source(source, self.verb())?;
        let mut renames = Vec::new();
        loop {
            let from = parser.next_column_name(source.as_ref())?;
            let to = parser.next_string("new column name")?;
            renames.push((from, to));
            if !parser.skip_comma() && !parser.has_another_part() {
                break;
            }
        }
        Ok(Box::new(Rename::try_new(source, &renames)?))
    }
}

#[derive(Debug)]
pub struct CastVerb;

impl VerbBuilder for CastVerb {
    fn verb(&self) -> &'static str {
        "cast"
    }

    fn usage(&self) -> &'static str {
        "cast {Column} {ToType} [{DefaultValue}] [strict]"
    }

    fn build(
        &self,
        source: Option<BoxedTable>,
        parser: &mut QueryParser,
        _ctx: &BuildContext,
    ) -> Result<BoxedTable> {
        let source = require_source(source, self.verb())?;
        let column = parser.next_column_name(source.as_ref())?;
        let to = parser.next_type()?;

        let mut default = None;
        let mut behavior = CastFailBehavior::OrDefault;
        if parser.has_another_part() {
            let value = parser.next_literal()?;
            if parser.has_another_part() {
                default = Some(value);
                behavior = parse_strict(parser.next_literal()?)?;
            } else if is_strict(&value) {
                behavior = CastFailBehavior::OrThrow;
            } else {
                default = Some(value);
            }
        }

        Ok(Box::new(Cast::try_new(source, &[column], to, default, behavior)?))
    }
}

fn is_strict(value: &ScalarValue) -> bool {
    matches!(value, ScalarValue::Utf8(s) if s.eq_ignore_ascii_case("strict"))
}

#[derive(Debug)]
pub struct LimitVerb;

impl VerbBuilder for LimitVerb {
    fn verb(&self) -> &'static str {
        "limit"
    }

    fn usage(&self) -> &'static str {
        "limit {RowCount}"
    }

    fn build(
        &self,
        source: Option<BoxedTable>,
        parser: &mut QueryParser,
        _ctx: &BuildContext,
    ) -> Result<BoxedTable> {
        let source = require_source(source, self.verb())?;
        let limit = parser.next_usize("row count")?;
        Ok(Box::new(Limit::new(source, limit)))
    }
}

#[derive(Debug)]
pub struct SetVerb;

impl VerbBuilder for SetVerb {
    fn verb(&self) -> &'static str {
        "set"
    }

    fn usage(&self) -> &'static str {
        "set {Column} {Col|Func|Const}"
    }

    fn build(
        &self,
        source: Option<BoxedTable>,
        parser: &mut QueryParser,
        ctx: &BuildContext,
    ) -> Result<BoxedTable> {
        let source = require_source(source, self.verb())?;
        let name = parser.next_string("column name")?;

        let fctx = function_context(source.as_ref(), ctx);
        let column = parse_expression(parser, source.as_ref(), &fctx)?;

        Ok(Box::new(Set::new(source, &name, column, fctx.row_count)))
    }
}

/// Context for expressions over `source`, with a fresh row count handle for
/// the operator that drives them.
fn function_context(source: &dyn Table, ctx: &BuildContext) -> FunctionContext {
    FunctionContext {
        row_count: RowCount::default(),
        as_of: ctx.session.as_of,
        available: column_names(source.columns()),
    }
}

#[derive(Debug)]
pub struct CountVerb;

impl VerbBuilder for CountVerb {
    fn verb(&self) -> &'static str {
        "count"
    }

    fn usage(&self) -> &'static str {
        "count"
    }

    fn build(
        &self,
        source: Option<BoxedTable>,
        _parser: &mut QueryParser,
        _ctx: &BuildContext,
    ) -> Result<BoxedTable> {
        Ok(Box::new(Count::new(require_source(source, self.verb())?)))
    }
}
