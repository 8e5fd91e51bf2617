use crate::error::{ErrorKind, Result};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    Integer(i64),
    Float(f64),
    LParen,
    RParen,
    Comma,
    Minus,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Not,
    Like,
    In,
    Is,
    Null,
    True,
    False,
}

#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub span: Range<usize>,
}

/// Longest excerpt of the input quoted back in error messages.
const CLAUSE_EXCERPT: usize = 40;

/// The part of `input` starting at `start`, trimmed to a readable length.
pub(crate) fn excerpt(input: &str, start: usize) -> String {
    let rest = input.get(start..).unwrap_or_default().trim();
    match rest.char_indices().nth(CLAUSE_EXCERPT) {
        Some((cut, _)) => format!("{}...", &rest[..cut]),
        None if rest.is_empty() => input.trim().to_string(),
        None => rest.to_string(),
    }
}

fn error(input: &str, start: usize, reason: impl Into<String>) -> crate::error::Error {
    ErrorKind::Filter { clause: excerpt(input, start), reason: reason.into() }.into()
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let token = match c {
            '(' => single(&mut chars, Token::LParen),
            ')' => single(&mut chars, Token::RParen),
            ',' => single(&mut chars, Token::Comma),
            '-' => single(&mut chars, Token::Minus),
            '=' => {
                chars.next();
                // Accept both `=` and `==`.
                chars.next_if(|&(_, c)| c == '=');
                Token::Eq
            },
            '!' => {
                chars.next();
                match chars.next_if(|&(_, c)| c == '=') {
                    Some(_) => Token::NotEq,
                    None => Token::Not,
                }
            },
            '<' => {
                chars.next();
                match chars.next_if(|&(_, c)| c == '=' || c == '>') {
                    Some((_, '=')) => Token::LtEq,
                    Some(_) => Token::NotEq,
                    None => Token::Lt,
                }
            },
            '>' => {
                chars.next();
                match chars.next_if(|&(_, c)| c == '=') {
                    Some(_) => Token::GtEq,
                    None => Token::Gt,
                }
            },
            '&' | '|' => {
                chars.next();
                if chars.next_if(|&(_, next)| next == c).is_none() {
                    return Err(error(input, start, format!("expected `{c}{c}`")));
                }
                if c == '&' { Token::And } else { Token::Or }
            },
            '\'' | '"' => Token::Str(quoted(input, &mut chars, c)?),
            '[' => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, ']')) => break,
                        Some((_, c)) => name.push(c),
                        None => return Err(error(input, start, "unterminated field name")),
                    }
                }
                if name.trim().is_empty() {
                    return Err(error(input, start, "empty field name"));
                }
                Token::Ident(name.trim().to_string())
            },
            c if c.is_ascii_digit() || c == '.' => number(input, &mut chars, start)?,
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_alphanumeric() || c == '_' || c == '.') {
                    word.push(c);
                }
                keyword(word)
            },
            other => return Err(error(input, start, format!("unexpected character `{other}`"))),
        };
        let end = chars.peek().map(|&(i, _)| i).unwrap_or(input.len());
        tokens.push(Spanned { token, span: start..end });
    }
    Ok(tokens)
}

type Chars<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn single(chars: &mut Chars<'_>, token: Token) -> Token {
    chars.next();
    token
}

/// A quoted string; the quote character is escaped by doubling it (`'it''s'`).
fn quoted(input: &str, chars: &mut Chars<'_>, quote: char) -> Result<String> {
    let Some((start, _)) = chars.next() else {
        return Err(error(input, input.len(), "unexpected end of input"));
    };
    let mut text = String::new();
    loop {
        match chars.next() {
            Some((_, c)) if c == quote => {
                if chars.next_if(|&(_, next)| next == quote).is_some() {
                    text.push(quote);
                } else {
                    return Ok(text);
                }
            },
            Some((_, c)) => text.push(c),
            None => return Err(error(input, start, "unterminated string literal")),
        }
    }
}

fn number(input: &str, chars: &mut Chars<'_>, start: usize) -> Result<Token> {
    let mut text = String::new();
    while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_ascii_digit() || c == '.' || c == '_') {
        if c != '_' {
            text.push(c);
        }
    }
    if !text.contains('.')
        && let Ok(integer) = text.parse::<i64>()
    {
        return Ok(Token::Integer(integer));
    }
    text.parse::<f64>().map(Token::Float).map_err(|_| error(input, start, format!("invalid number `{text}`")))
}

fn keyword(word: String) -> Token {
    match word.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "LIKE" => Token::Like,
        "IN" => Token::In,
        "IS" => Token::Is,
        "NULL" => Token::Null,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        _ => Token::Ident(word),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("a = 1 and b <> 'x' || c >= 2.5"),
            vec![
                Token::Ident("a".into()),
                Token::Eq,
                Token::Integer(1),
                Token::And,
                Token::Ident("b".into()),
                Token::NotEq,
                Token::Str("x".into()),
                Token::Or,
                Token::Ident("c".into()),
                Token::GtEq,
                Token::Float(2.5),
            ]
        );
    }

    #[test]
    fn test_bracketed_and_dotted_names() {
        assert_eq!(tokens("[Content Type]"), vec![Token::Ident("Content Type".into())]);
        assert_eq!(tokens("metadata.etag"), vec![Token::Ident("metadata.etag".into())]);
    }

    #[test]
    fn test_escaped_quote() {
        assert_eq!(tokens("'it''s'"), vec![Token::Str("it's".into())]);
    }

    #[test]
    fn test_errors_name_the_clause() {
        let err = tokenize("name = 'open").unwrap_err();
        assert_eq!(
            *err,
            ErrorKind::Filter { clause: "'open".to_string(), reason: "unterminated string literal".to_string() }
        );
        let err = tokenize("size # 3").unwrap_err();
        assert_eq!(err.clause(), "# 3");
    }
}
