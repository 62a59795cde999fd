//! Tokenizer for query text.

use crate::common::{Error, Result};

use super::value::mjd_from_parts;

/// Words with a fixed meaning in the grammar. Matched case-insensitively.
const KEYWORDS: &[&str] = &[
    "ADD", "ALTER", "AND", "AS", "ASC", "BY", "CALC", "COLUMN", "COPY", "COUNT", "CREATE",
    "DELETE", "DESC", "DISTINCT", "DMINFO", "DROP", "EXISTS", "FALSE", "FROM", "GIVING", "GROUP",
    "GROUPBY", "HAVING", "IN", "INSERT", "INTO", "KEYWORD", "LIKE", "LIMIT", "NOT", "OFFSET",
    "OR", "ORDER", "ORDERBY", "RENAME", "ROLLUP", "ROW", "SELECT", "SET", "SHOW", "TABLE", "TO",
    "TRUE", "UNIQUE", "UPDATE", "VALUES", "WHERE",
];

/// Operators, longest first so that prefixes never win.
const OPERATORS: &[&str] = &[
    "<:>", "**", "//", "&&", "||", "==", "!=", "<>", ">=", "<=", "+", "-", "*", "/", "%", "^",
    "&", "|", "~", "!", "=", ">", "<", "(", ")", "[", "]", "{", "}", ",", ":", ";",
];

/// Qualifiers and text of a `~ pattern` literal.
#[derive(Debug, Clone, PartialEq)]
pub struct RegexLiteral {
    /// Pattern including its form marker, e.g. `p/a*/` or `'abc'`.
    pub value: String,
    pub negate: bool,
    pub case_insensitive: bool,
    pub ignore_blanks: bool,
    pub max_distance: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Keyword(String),
    Ident(String),
    Int(i64),
    Real(f64),
    Imag(f64),
    Str(String),
    /// Date/time literal as a Modified Julian Date in days.
    Time(f64),
    /// `$n` table argument.
    TableArg(u32),
    Regex(RegexLiteral),
    Op(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token in the input.
    pub offset: usize,
}

impl Token {
    pub fn is_keyword(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Keyword(k) if k == word)
    }

    pub fn is_op(&self, op: &str) -> bool {
        matches!(self.kind, TokenKind::Op(o) if o == op)
    }
}

pub(crate) fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Tokenize the whole input; the last token is always `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> Error {
        Error::Parse {
            message: message.into(),
            offset,
            scanned: self.input[..offset].to_string(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            let trimmed = self.rest().trim_start();
            self.pos = self.input.len() - trimmed.len();
            if trimmed.starts_with('#') {
                match trimmed.find('\n') {
                    Some(n) => self.pos += n,
                    None => self.pos = self.input.len(),
                }
            } else {
                return;
            }
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        self.skip_ws_and_comments();
        let start = self.pos;
        let token = |kind| Ok(Token { kind, offset: start });
        let ch = match self.peek_char() {
            Some(c) => c,
            None => return token(TokenKind::Eof),
        };

        if ch.is_ascii_alphabetic() || ch == '_' {
            let word = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
            let upper = word.to_ascii_uppercase();
            if is_keyword(&upper) {
                return token(TokenKind::Keyword(upper));
            }
            return token(TokenKind::Ident(word.to_string()));
        }
        if ch.is_ascii_digit()
            || (ch == '.' && self.rest()[1..].starts_with(|c: char| c.is_ascii_digit()))
        {
            return self.lex_number(start);
        }
        if ch == '\'' || ch == '"' {
            let s = self.lex_string(start)?;
            return token(TokenKind::Str(s));
        }
        if ch == '$' {
            self.pos += 1;
            let digits = self.take_while(|c| c.is_ascii_digit());
            let n = digits
                .parse::<u32>()
                .map_err(|_| self.error(start, "table argument needs a number after '$'"))?;
            if n == 0 {
                return Err(self.error(start, "table arguments are numbered from $1"));
            }
            return token(TokenKind::TableArg(n));
        }
        if ch == '~' || self.rest().starts_with("!~") {
            if let Some(regex) = self.try_regex()? {
                return token(TokenKind::Regex(regex));
            }
        }
        for &op in OPERATORS {
            if self.rest().starts_with(op) {
                self.pos += op.len();
                return token(TokenKind::Op(op));
            }
        }
        Err(self.error(start, format!("unexpected character '{}'", ch)))
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    fn lex_number(&mut self, start: usize) -> Result<Token> {
        if let Some(mjd) = self.try_date()? {
            return Ok(Token {
                kind: TokenKind::Time(mjd),
                offset: start,
            });
        }
        let int_part = self.take_while(|c| c.is_ascii_digit());
        let mut is_real = false;
        if self.peek_char() == Some('.') {
            is_real = true;
            self.pos += 1;
            self.take_while(|c| c.is_ascii_digit());
        }
        if let Some('e' | 'E') = self.peek_char() {
            let after = &self.rest()[1..];
            let digits = after.trim_start_matches(['+', '-']);
            if digits.starts_with(|c: char| c.is_ascii_digit()) && after.len() - digits.len() <= 1
            {
                is_real = true;
                self.pos += 1 + (after.len() - digits.len());
                self.take_while(|c| c.is_ascii_digit());
            }
        }
        let end = self.pos;
        let mut imag = false;
        if let Some('i' | 'j') = self.peek_char() {
            let next = self.rest()[1..].chars().next();
            if !next.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
                imag = true;
                self.pos += 1;
            }
        }
        let text = &self.input[start..end];
        let real = || {
            text.parse::<f64>()
                .map_err(|_| self.error(start, format!("invalid number '{}'", text)))
        };
        let kind = if imag {
            TokenKind::Imag(real()?)
        } else if is_real || int_part.is_empty() {
            TokenKind::Real(real()?)
        } else {
            match text.parse::<i64>() {
                Ok(v) => TokenKind::Int(v),
                Err(_) => TokenKind::Real(real()?),
            }
        };
        Ok(Token {
            kind,
            offset: start,
        })
    }

    /// `YYYY/MM/DD[/hh:mm[:ss[.fff]]]`
    fn try_date(&mut self) -> Result<Option<f64>> {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        let digits_at = |from: usize| {
            bytes[from.min(bytes.len())..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count()
        };
        if digits_at(0) != 4 || bytes.get(4) != Some(&b'/') {
            return Ok(None);
        }
        let month_len = digits_at(5);
        if !(1..=2).contains(&month_len) || bytes.get(5 + month_len) != Some(&b'/') {
            return Ok(None);
        }
        let day_start = 6 + month_len;
        let day_len = digits_at(day_start);
        if !(1..=2).contains(&day_len) {
            return Ok(None);
        }
        let start = self.pos;
        let year: i32 = rest[..4].parse().unwrap_or_default();
        let month: u32 = rest[5..5 + month_len].parse().unwrap_or_default();
        let day: u32 = rest[day_start..day_start + day_len]
            .parse()
            .unwrap_or_default();
        let mut end = day_start + day_len;
        let mut seconds = 0.0;
        if bytes.get(end) == Some(&b'/') && digits_at(end + 1) > 0 {
            let time_text: String = rest[end + 1..]
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == ':' || *c == '.')
                .collect();
            end += 1 + time_text.len();
            let mut parts = time_text.split(':');
            let mut field = |scale: f64| -> Result<f64> {
                match parts.next() {
                    Some("") | None => Ok(0.0),
                    Some(p) => p
                        .parse::<f64>()
                        .map(|v| v * scale)
                        .map_err(|_| self.error(start, format!("invalid time '{}'", time_text))),
                }
            };
            seconds = field(3600.0)? + field(60.0)? + field(1.0)?;
        }
        let mjd = mjd_from_parts(year, month, day, seconds)
            .ok_or_else(|| self.error(start, format!("invalid date '{}'", &rest[..end])))?;
        self.pos += end;
        Ok(Some(mjd))
    }

    fn lex_string(&mut self, start: usize) -> Result<String> {
        let quote = self.peek_char().unwrap_or('\'');
        self.pos += 1;
        let body_start = self.pos;
        match self.rest().find(quote) {
            Some(n) => {
                self.pos += n + 1;
                Ok(self.input[body_start..body_start + n].to_string())
            }
            None => Err(self.error(start, "unterminated string")),
        }
    }

    /// A regex literal after `~` or `!~`: `p/glob/`, `m/search/`,
    /// `f/full/` or a quoted string, followed by `i`, `b` and a distance.
    fn try_regex(&mut self) -> Result<Option<RegexLiteral>> {
        let start = self.pos;
        let negate = self.rest().starts_with('!');
        let after_op = start + if negate { 2 } else { 1 };
        let body = self.input[after_op..].trim_start();
        let body_start = self.input.len() - body.len();
        let value_len = if body.starts_with(['\'', '"']) {
            let quote = &body[..1];
            match body[1..].find(quote) {
                Some(n) => n + 2,
                None => return Err(self.error(body_start, "unterminated regex string")),
            }
        } else if body.len() > 2
            && body.starts_with(['p', 'm', 'f'])
            && body[1..].starts_with('/')
        {
            let mut escaped = false;
            let mut end = None;
            for (i, c) in body[2..].char_indices() {
                match c {
                    '\\' if !escaped => escaped = true,
                    '/' if !escaped => {
                        end = Some(i + 3);
                        break;
                    }
                    _ => escaped = false,
                }
            }
            match end {
                Some(n) => n,
                None => return Err(self.error(body_start, "unterminated regex")),
            }
        } else {
            return Ok(None);
        };
        let value = body[..value_len].to_string();
        self.pos = body_start + value_len;
        let mut literal = RegexLiteral {
            value,
            negate,
            case_insensitive: false,
            ignore_blanks: false,
            max_distance: None,
        };
        loop {
            match self.peek_char() {
                Some('i') => {
                    literal.case_insensitive = true;
                    self.pos += 1;
                }
                Some('b') => {
                    literal.ignore_blanks = true;
                    self.pos += 1;
                }
                Some(c) if c.is_ascii_digit() => {
                    let digits = self.take_while(|c| c.is_ascii_digit());
                    literal.max_distance = digits.parse().ok();
                }
                _ => break,
            }
        }
        if self
            .peek_char()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(self.error(self.pos, "invalid regex qualifier"));
        }
        Ok(Some(literal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        Lexer::new(text)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            kinds("select X from $1"),
            vec![
                TokenKind::Keyword("SELECT".into()),
                TokenKind::Ident("X".into()),
                TokenKind::Keyword("FROM".into()),
                TokenKind::TableArg(1),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("3 2.5 1e3 .5 4i"),
            vec![
                TokenKind::Int(3),
                TokenKind::Real(2.5),
                TokenKind::Real(1000.0),
                TokenKind::Real(0.5),
                TokenKind::Imag(4.0),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            kinds("a**2 // 3 <> 4 <:> 5"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Op("**"),
                TokenKind::Int(2),
                TokenKind::Op("//"),
                TokenKind::Int(3),
                TokenKind::Op("<>"),
                TokenKind::Int(4),
                TokenKind::Op("<:>"),
                TokenKind::Int(5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_date_literal() {
        let tokens = kinds("1858/11/17 1858/11/18/12:00");
        assert_eq!(tokens[0], TokenKind::Time(0.0));
        assert_eq!(tokens[1], TokenKind::Time(1.5));
    }

    #[test]
    fn test_regex_literal() {
        let tokens = kinds("NAME !~ p/ab*/i2");
        match &tokens[1] {
            TokenKind::Regex(r) => {
                assert_eq!(r.value, "p/ab*/");
                assert!(r.negate);
                assert!(r.case_insensitive);
                assert_eq!(r.max_distance, Some(2));
            }
            other => panic!("expected regex, got {:?}", other),
        }
        assert_eq!(kinds("~X")[0], TokenKind::Op("~"));
    }

    #[test]
    fn test_strings_and_errors() {
        assert_eq!(kinds("\"it's\"")[0], TokenKind::Str("it's".into()));
        match Lexer::new("SELECT 'abc").tokenize() {
            Err(Error::Parse { offset, .. }) => assert_eq!(offset, 7),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
