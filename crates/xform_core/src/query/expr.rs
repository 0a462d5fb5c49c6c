//! Expressions for computed columns: column references, constants, and
//! nested function calls like `Trim(ToUpper([Title]))`.
use std::sync::Arc;

use xform_error::Result;

use super::parser::{QueryParser, parse_number};
use super::registry;
use super::scanner::Token;
use crate::arrays::scalar::ScalarValue;
use crate::execution::column::Column;
use crate::execution::table::Table;
use crate::functions::{FunctionArg, FunctionContext};

/// Parse one expression from the current line into a column.
///
/// Bare words must name a column here. Constant strings need quotes.
pub fn parse_expression(
    parser: &mut QueryParser,
    source: &dyn Table,
    ctx: &FunctionContext,
) -> Result<Arc<dyn Column>> {
    let start = parser.position();
    parse_arg(parser, source, ctx)
        .and_then(|arg| ctx.column(arg))
        .map_err(|e| parser.locate_from(start, e))
}

fn parse_arg(
    parser: &mut QueryParser,
    source: &dyn Table,
    ctx: &FunctionContext,
) -> Result<FunctionArg> {
    if let Some(tok) = parser.peek().filter(|t| t.text().is_none()) {
        return Err(parser.error(format!("Expected an expression, got '{tok}'")));
    }

    let tok = parser.take("expression")?;
    match tok {
        Token::Word(name) if parser.peek() == Some(&Token::LeftParen) => {
            let column = parse_call(parser, &name, source, ctx)?;
            Ok(FunctionArg::Column(column))
        }
        Token::Word(w) if w.eq_ignore_ascii_case("null") => Ok(FunctionArg::Literal(ScalarValue::Null)),
        Token::Word(name) => match source.column(&name) {
            Some(col) => Ok(FunctionArg::Column(col.clone())),
            None => Ok(FunctionArg::Name(name)),
        },
        Token::Bracketed(name) => {
            let idx = source.find_column(&name)?;
            Ok(FunctionArg::Column(source.columns()[idx].clone()))
        }
        Token::Quoted(s) => Ok(FunctionArg::Literal(ScalarValue::Utf8(s))),
        Token::Number(n) => Ok(FunctionArg::Literal(parse_number(&n))),
        other => Err(parser.error(format!("Expected an expression, got '{other}'"))),
    }
}

fn parse_call(
    parser: &mut QueryParser,
    name: &str,
    source: &dyn Table,
    ctx: &FunctionContext,
) -> Result<Arc<dyn Column>> {
    // Opening paren, already peeked.
    parser.take("'('")?;

    let mut args = Vec::new();
    if parser.peek() == Some(&Token::RightParen) {
        parser.take("')'")?;
    } else {
        loop {
            args.push(parse_arg(parser, source, ctx)?);
            match parser.peek() {
                Some(Token::Comma) | Some(Token::RightParen) => (),
                Some(other) => {
                    return Err(parser.error(format!(
                        "Expected ',' or ')' in call to {name}, got '{other}'"
                    )));
                }
                None => return Err(parser.error(format!("Missing ')' in call to {name}"))),
            }
            if parser.take("')'")? == Token::RightParen {
                break;
            }
        }
    }

    registry::build_function(name, args, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::array::Array;
    use crate::arrays::datatype::DataType;
    use crate::execution::array_table::ArrayTable;
    use crate::execution::table::{RowCount, column_names};

    fn setup(text: &str) -> (QueryParser, ArrayTable, FunctionContext) {
        let table = ArrayTable::try_new([
            ("ID", Array::from_iter([1, 2])),
            ("Title", Array::from_iter([" a ", "b"].map(String::from))),
        ])
        .unwrap();
        let ctx = FunctionContext {
            row_count: RowCount::default(),
            as_of: 0,
            available: column_names(table.columns()),
        };
        let mut parser = QueryParser::new(text).unwrap();
        assert!(parser.next_line());
        (parser, table, ctx)
    }

    #[test]
    fn column_reference() {
        let (mut p, table, ctx) = setup("[title]");
        let col = parse_expression(&mut p, &table, &ctx).unwrap();
        assert_eq!("Title", col.details().name);
    }

    #[test]
    fn constant() {
        let (mut p, table, ctx) = setup("\"Active\"");
        let col = parse_expression(&mut p, &table, &ctx).unwrap();
        assert_eq!(DataType::Utf8, col.details().datatype);
    }

    #[test]
    fn nested_calls() {
        let (mut p, table, ctx) = setup("ToUpper(Trim(Title))");
        let col = parse_expression(&mut p, &table, &ctx).unwrap();
        assert_eq!("ToUpper", col.details().name);
        assert!(!p.has_another_part());
    }

    #[test]
    fn cast_takes_bare_type_name() {
        let (mut p, table, ctx) = setup("Cast(ID, Int64)");
        let col = parse_expression(&mut p, &table, &ctx).unwrap();
        assert_eq!(DataType::Int64, col.details().datatype);
    }

    #[test]
    fn unknown_column_is_usage_error() {
        let (mut p, table, ctx) = setup("Nope");
        let err = parse_expression(&mut p, &table, &ctx).unwrap_err();
        assert!(err.is_usage());
        assert_eq!(Some("ID, Title"), err.get_field("available"));
    }

    #[test]
    fn unterminated_call() {
        let (mut p, table, ctx) = setup("Trim(Title");
        assert!(parse_expression(&mut p, &table, &ctx).unwrap_err().is_usage());
    }

    #[test]
    fn unknown_function() {
        let (mut p, table, ctx) = setup("Explode(Title)");
        let err = parse_expression(&mut p, &table, &ctx).unwrap_err();
        assert!(err.get_msg().contains("Unknown function"));
    }
}
