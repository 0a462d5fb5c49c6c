use std::fmt;

use xform_error::{DbError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A bare word: verbs, column names, type names, unquoted values.
    Word(String),
    /// `"double quoted"` string, `""` escapes a quote.
    Quoted(String),
    /// `[Bracketed Name]`, always a column name.
    Bracketed(String),
    Number(String),
    /// Comparison operator.
    Operator(String),
    LeftParen,
    RightParen,
    Comma,
    /// End of a line or `;`. Separates verbs.
    NewLine,
}

impl Token {
    /// The token's text, for words and strings.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Word(s) | Self::Quoted(s) | Self::Bracketed(s) | Self::Number(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(s) | Self::Number(s) | Self::Operator(s) => write!(f, "{s}"),
            Self::Quoted(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Self::Bracketed(s) => write!(f, "[{s}]"),
            Self::LeftParen => write!(f, "("),
            Self::RightParen => write!(f, ")"),
            Self::Comma => write!(f, ","),
            Self::NewLine => write!(f, "end of line"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenWithLocation {
    pub token: Token,
    /// Line number, starting at 1.
    pub line: usize,
    /// Column (in chars), starting at 1.
    pub col: usize,
}

/// Splits query text into tokens.
#[derive(Debug)]
pub struct QueryScanner<'a> {
    text: &'a str,
    chars: Vec<char>,
    idx: usize,
    line: usize,
    col: usize,
}

fn is_word_end(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | ',' | '"' | '[' | '#' | ';' | '=' | '!' | '<' | '>')
}

impl<'a> QueryScanner<'a> {
    pub fn new(text: &'a str) -> Self {
        QueryScanner {
            text,
            chars: text.chars().collect(),
            idx: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn scan(mut self) -> Result<Vec<TokenWithLocation>> {
        let mut toks: Vec<TokenWithLocation> = Vec::new();

        while let Some(c) = self.peek() {
            let (line, col) = (self.line, self.col);
            let token = match c {
                '\n' | ';' => {
                    self.bump();
                    // Collapse blank lines.
                    if toks.last().is_none_or(|t| t.token == Token::NewLine) {
                        continue;
                    }
                    Token::NewLine
                }
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                    continue;
                }
                '(' => {
                    self.bump();
                    Token::LeftParen
                }
                ')' => {
                    self.bump();
                    Token::RightParen
                }
                ',' => {
                    self.bump();
                    Token::Comma
                }
                '"' => Token::Quoted(self.scan_quoted()?),
                '[' => Token::Bracketed(self.scan_bracketed()?),
                '=' | '!' | '<' | '>' => Token::Operator(self.scan_operator()?),
                _ => {
                    let word = self.scan_word();
                    if is_number(&word) {
                        Token::Number(word)
                    } else {
                        Token::Word(word)
                    }
                }
            };
            toks.push(TokenWithLocation { token, line, col });
        }

        if toks.last().is_some_and(|t| t.token == Token::NewLine) {
            toks.pop();
        }

        Ok(toks)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.idx += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, msg: impl Into<String>, line: usize, col: usize) -> DbError {
        let text = self.text.lines().nth(line - 1).unwrap_or_default();
        DbError::usage(msg)
            .with_field("line", line)
            .with_field("col", col)
            .with_field("text", text)
    }

    fn scan_quoted(&mut self) -> Result<String> {
        let (line, col) = (self.line, self.col);
        self.bump();

        let mut s = String::new();
        loop {
            match self.bump() {
                Some('"') => {
                    if self.peek() == Some('"') {
                        self.bump();
                        s.push('"');
                    } else {
                        return Ok(s);
                    }
                }
                Some(c) => s.push(c),
                None => return Err(self.error("Unterminated quoted string", line, col)),
            }
        }
    }

    fn scan_bracketed(&mut self) -> Result<String> {
        let (line, col) = (self.line, self.col);
        self.bump();

        let mut s = String::new();
        loop {
            match self.bump() {
                Some(']') => return Ok(s),
                Some('\n') | None => return Err(self.error("Unterminated column name", line, col)),
                Some(c) => s.push(c),
            }
        }
    }

    fn scan_operator(&mut self) -> Result<String> {
        let (line, col) = (self.line, self.col);
        let first = self.bump().unwrap_or_default();
        let op = match (first, self.peek()) {
            ('=', Some('=')) | ('!', Some('=')) | ('<', Some('=')) | ('>', Some('=')) | ('<', Some('>')) => {
                let second = self.bump().unwrap_or_default();
                format!("{first}{second}")
            }
            ('!', _) => return Err(self.error("Expected '!='", line, col)),
            _ => first.to_string(),
        };
        Ok(op)
    }

    fn scan_word(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if is_word_end(c) {
                break;
            }
            s.push(c);
            self.bump();
        }
        s
    }
}

fn is_number(s: &str) -> bool {
    let first = s.trim_start_matches('-').chars().next();
    first.is_some_and(|c| c.is_ascii_digit()) && s.parse::<f64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<Token> {
        QueryScanner::new(text)
            .scan()
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    fn word(s: &str) -> Token {
        Token::Word(s.to_string())
    }

    #[test]
    fn verb_line() {
        assert_eq!(
            vec![
                word("where"),
                Token::Bracketed("Assigned To".to_string()),
                Token::Operator("!=".to_string()),
                Token::Quoted("say \"hi\"".to_string()),
            ],
            tokens(r#"where [Assigned To] != "say ""hi""""#)
        );
    }

    #[test]
    fn lines_and_comments() {
        assert_eq!(
            vec![
                word("read"),
                word("Bugs"),
                Token::NewLine,
                word("limit"),
                Token::Number("10".to_string()),
            ],
            tokens("# header\n\nread Bugs   # trailing\n\n limit 10\n")
        );
    }

    #[test]
    fn semicolon_separates_verbs() {
        assert_eq!(
            vec![word("count"), Token::NewLine, word("schema")],
            tokens("count; schema;")
        );
    }

    #[test]
    fn function_call() {
        assert_eq!(
            vec![
                word("Cast"),
                Token::LeftParen,
                Token::Bracketed("ID".to_string()),
                Token::Comma,
                word("Int32"),
                Token::Comma,
                Token::Number("-1".to_string()),
                Token::RightParen,
            ],
            tokens("Cast([ID], Int32, -1)")
        );
    }

    #[test]
    fn operators() {
        let ops: Vec<_> = tokens("= == != <> < <= > >=")
            .into_iter()
            .map(|t| t.to_string())
            .collect();
        assert_eq!(vec!["=", "==", "!=", "<>", "<", "<=", ">", ">="], ops);
    }

    #[test]
    fn dates_are_words() {
        assert_eq!(vec![word("2017-12-05")], tokens("2017-12-05"));
        assert_eq!(vec![Token::Number("2.5".to_string())], tokens("2.5"));
    }

    #[test]
    fn unterminated_quote() {
        let err = QueryScanner::new("where A = \"abc").scan().unwrap_err();
        assert!(err.is_usage());
        assert_eq!(Some("11"), err.get_field("col"));
    }

    #[test]
    fn locations() {
        let toks = QueryScanner::new("read T\n  limit 5").scan().unwrap();
        let limit = &toks[3];
        assert_eq!(word("limit"), limit.token);
        assert_eq!((2, 3), (limit.line, limit.col));
    }
}
