use xform_error::{DbError, Result};

use super::scanner::{QueryScanner, Token, TokenWithLocation};
use crate::arrays::datatype::DataType;
use crate::arrays::scalar::ScalarValue;
use crate::compare::CompareOp;
use crate::execution::table::Table;

/// Walks the tokens of a query, one verb line at a time.
///
/// `next_*` methods consume one argument of the current line and fail with
/// a usage error if the line has ended or the token has the wrong shape.
#[derive(Debug)]
pub struct QueryParser {
    toks: Vec<TokenWithLocation>,
    /// Index of the token to process next.
    idx: usize,
}

impl QueryParser {
    pub fn new(text: &str) -> Result<Self> {
        Ok(QueryParser {
            toks: QueryScanner::new(text).scan()?,
            idx: 0,
        })
    }

    /// Move to the start of the next line. Returns false once all lines have
    /// been consumed.
    pub fn next_line(&mut self) -> bool {
        while self
            .toks
            .get(self.idx)
            .is_some_and(|t| t.token == Token::NewLine)
        {
            self.idx += 1;
        }
        self.idx < self.toks.len()
    }

    /// Check if the current line has another argument.
    pub fn has_another_part(&self) -> bool {
        self.peek().is_some()
    }

    /// Peek the next token on the current line.
    pub fn peek(&self) -> Option<&Token> {
        match self.toks.get(self.idx) {
            Some(t) if t.token != Token::NewLine => Some(&t.token),
            _ => None,
        }
    }

    /// Fail if the current line has unconsumed arguments.
    pub fn expect_end(&self) -> Result<()> {
        match self.toks.get(self.idx) {
            Some(t) if t.token != Token::NewLine => Err(self
                .error_at(t, format!("Unexpected '{}', too many arguments", t.token))),
            _ => Ok(()),
        }
    }

    fn next_token(&mut self, what: &str) -> Result<TokenWithLocation> {
        match self.toks.get(self.idx) {
            Some(t) if t.token != Token::NewLine => {
                let t = t.clone();
                self.idx += 1;
                Ok(t)
            }
            _ => Err(self.error(format!("Missing {what}"))),
        }
    }

    /// Skip a comma if one is next.
    pub fn skip_comma(&mut self) -> bool {
        if self.peek() == Some(&Token::Comma) {
            self.idx += 1;
            return true;
        }
        false
    }

    pub fn next_verb(&mut self) -> Result<String> {
        let tok = self.next_token("verb")?;
        match &tok.token {
            Token::Word(w) => Ok(w.to_ascii_lowercase()),
            other => Err(self.error_at(&tok, format!("Expected a verb, got '{other}'"))),
        }
    }

    /// Next argument as text. Accepts words, numbers, and both quoting
    /// styles.
    pub fn next_string(&mut self, what: &str) -> Result<String> {
        let tok = self.next_token(what)?;
        match tok.token.text() {
            Some(s) => Ok(s.to_string()),
            None => Err(self.error_at(&tok, format!("Expected {what}, got '{}'", tok.token))),
        }
    }

    /// Next argument as the name of an existing column of `table`.
    pub fn next_column_name(&mut self, table: &dyn Table) -> Result<String> {
        let idx = self.idx;
        let name = self.next_string("column name")?;
        match table.find_column(&name) {
            Ok(col) => Ok(table.columns()[col].details().name.clone()),
            Err(e) => Err(self.locate(e, &self.toks[idx])),
        }
    }

    /// Remaining arguments as column names, separated by optional commas.
    pub fn next_column_names(&mut self, table: &dyn Table) -> Result<Vec<String>> {
        let mut names = vec![self.next_column_name(table)?];
        while self.skip_comma() || self.has_another_part() {
            names.push(self.next_column_name(table)?);
        }
        Ok(names)
    }

    pub fn next_type(&mut self) -> Result<DataType> {
        let idx = self.idx;
        let name = self.next_string("type")?;
        name.parse().map_err(|e| self.locate(e, &self.toks[idx]))
    }

    pub fn next_usize(&mut self, what: &str) -> Result<usize> {
        let tok = self.next_token(what)?;
        match &tok.token {
            Token::Number(n) => n
                .parse()
                .map_err(|_| self.error_at(&tok, format!("Expected a non-negative integer for {what}, got '{n}'"))),
            other => Err(self.error_at(&tok, format!("Expected a number for {what}, got '{other}'"))),
        }
    }

    pub fn next_operator(&mut self) -> Result<CompareOp> {
        let tok = self.next_token("operator")?;
        match &tok.token {
            Token::Operator(op) => op.parse().map_err(|e| self.locate(e, &tok)),
            other => Err(self.error_at(&tok, format!("Expected an operator, got '{other}'"))),
        }
    }

    /// Next argument as a constant.
    ///
    /// Integers become Int32 (Int64 if needed), other numbers Float64,
    /// everything else a string. Callers convert to the type they need.
    pub fn next_literal(&mut self) -> Result<ScalarValue> {
        let tok = self.next_token("value")?;
        match &tok.token {
            Token::Number(n) => Ok(parse_number(n)),
            Token::Word(w) if w.eq_ignore_ascii_case("null") => Ok(ScalarValue::Null),
            Token::Word(s) | Token::Quoted(s) | Token::Bracketed(s) => Ok(ScalarValue::Utf8(s.clone())),
            other => Err(self.error_at(&tok, format!("Expected a value, got '{other}'"))),
        }
    }

    /// Take the next token of any kind, used by expression parsing.
    pub(crate) fn take(&mut self, what: &str) -> Result<Token> {
        Ok(self.next_token(what)?.token)
    }

    /// Create a usage error pointing at the token about to be consumed, or
    /// the end of the line.
    pub fn error(&self, msg: impl Into<String>) -> DbError {
        let at = self.toks.get(self.idx).or_else(|| self.toks.last());
        match at {
            Some(tok) => self.error_at(tok, msg),
            None => DbError::usage(msg),
        }
    }

    /// Attach the location of the last consumed token to an error.
    pub fn at_previous(&self, err: DbError) -> DbError {
        match self.idx.checked_sub(1).and_then(|idx| self.toks.get(idx)) {
            Some(tok) => self.locate(err, tok),
            None => err,
        }
    }

    /// Index of the next token, for use with `locate_from`.
    pub fn position(&self) -> usize {
        self.idx
    }

    /// Attach the location of the token at `position` to an error that
    /// doesn't have one yet.
    pub fn locate_from(&self, position: usize, err: DbError) -> DbError {
        if err.get_field("line").is_some() {
            return err;
        }
        match self.toks.get(position) {
            Some(tok) => self.locate(err, tok),
            None => err,
        }
    }

    fn error_at(&self, tok: &TokenWithLocation, msg: impl Into<String>) -> DbError {
        DbError::usage(msg)
            .with_field("line", tok.line)
            .with_field("col", tok.col)
    }

    fn locate(&self, err: DbError, tok: &TokenWithLocation) -> DbError {
        err.with_field("line", tok.line).with_field("col", tok.col)
    }
}

pub fn parse_number(n: &str) -> ScalarValue {
    if let Ok(v) = n.parse::<i32>() {
        return ScalarValue::Int32(v);
    }
    if let Ok(v) = n.parse::<i64>() {
        return ScalarValue::Int64(v);
    }
    match n.parse::<f64>() {
        Ok(v) => ScalarValue::Float64(v),
        Err(_) => ScalarValue::Utf8(n.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrays::array::Array;
    use crate::execution::array_table::ArrayTable;

    fn table() -> ArrayTable {
        ArrayTable::try_new([
            ("ID", Array::from_iter([1, 2])),
            ("Assigned To", Array::from_iter(["a", "b"].map(String::from))),
        ])
        .unwrap()
    }

    #[test]
    fn typed_arguments() {
        let mut p = QueryParser::new("where [assigned to] >= 12 ; limit 5").unwrap();
        assert!(p.next_line());
        assert_eq!("where", p.next_verb().unwrap());
        assert_eq!("Assigned To", p.next_column_name(&table()).unwrap());
        assert_eq!(CompareOp::GreaterThanOrEqual, p.next_operator().unwrap());
        assert_eq!(ScalarValue::Int32(12), p.next_literal().unwrap());
        assert!(!p.has_another_part());
        p.expect_end().unwrap();

        assert!(p.next_line());
        assert_eq!("limit", p.next_verb().unwrap());
        assert_eq!(5, p.next_usize("limit").unwrap());
        assert!(!p.next_line());
    }

    #[test]
    fn missing_argument() {
        let mut p = QueryParser::new("limit").unwrap();
        p.next_line();
        p.next_verb().unwrap();
        let err = p.next_usize("row count").unwrap_err();
        assert!(err.is_usage());
        assert_eq!("Missing row count", err.get_msg());
    }

    #[test]
    fn excess_argument() {
        let mut p = QueryParser::new("limit 5 6").unwrap();
        p.next_line();
        p.next_verb().unwrap();
        p.next_usize("row count").unwrap();
        let err = p.expect_end().unwrap_err();
        assert_eq!(Some("9"), err.get_field("col"));
    }

    #[test]
    fn unknown_column_has_location() {
        let mut p = QueryParser::new("select Nope").unwrap();
        p.next_line();
        p.next_verb().unwrap();
        let err = p.next_column_name(&table()).unwrap_err();
        assert_eq!(Some("ID, Assigned To"), err.get_field("available"));
        assert_eq!(Some("8"), err.get_field("col"));
    }

    #[test]
    fn column_lists() {
        let mut p = QueryParser::new("select [Assigned To], ID").unwrap();
        p.next_line();
        p.next_verb().unwrap();
        assert_eq!(vec!["Assigned To", "ID"], p.next_column_names(&table()).unwrap());
    }

    #[test]
    fn literals() {
        let mut p = QueryParser::new(r#"x 3000000000 2.5 "text" word null"#).unwrap();
        p.next_line();
        p.next_verb().unwrap();
        assert_eq!(ScalarValue::Int64(3_000_000_000), p.next_literal().unwrap());
        assert_eq!(ScalarValue::Float64(2.5), p.next_literal().unwrap());
        assert_eq!(ScalarValue::from("text"), p.next_literal().unwrap());
        assert_eq!(ScalarValue::from("word"), p.next_literal().unwrap());
        assert_eq!(ScalarValue::Null, p.next_literal().unwrap());
    }
}
