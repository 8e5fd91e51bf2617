//! The filter expression language.
//!
//! A small DataTable-style boolean language over record fields:
//!
//! ```text
//! kind = 'file' AND (size > 1024 OR name LIKE '%.md') AND [metadata.owner] IS NOT NULL
//! ```
//!
//! Evaluation uses three-valued logic. Any comparison involving a null (or
//! two values that cannot be coerced to a common type) is *unknown*, and a
//! record only passes the filter when the whole expression is `true`.

mod lexer;
mod parser;

use crate::error::{ErrorKind, Result};
use crate::record::Record;
use crate::value::Value;
use regex::Regex;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn test(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::NotEq => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::LtEq => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::GtEq => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(String),
    Literal(Value),
}

impl Operand {
    fn resolve<R: Record + ?Sized>(&self, record: &R) -> Result<Value> {
        match self {
            Self::Field(name) => match record.field(name) {
                Some(value) => Ok(value),
                None => exn::bail!(ErrorKind::UnknownField(name.clone())),
            },
            Self::Literal(value) => Ok(value.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare { left: Operand, op: CompareOp, right: Operand },
    /// The pattern is compiled once, with the case sensitivity the
    /// expression was parsed with.
    Like { operand: Operand, pattern: Regex, negated: bool },
    In { operand: Operand, list: Vec<Operand>, negated: bool },
    IsNull { operand: Operand, negated: bool },
    Truthy(Operand),
}

impl Expr {
    pub fn parse(input: &str, case_sensitive: bool) -> Result<Self> {
        parser::Parser::new(input, case_sensitive)?.parse()
    }

    /// Whether the record passes. Unknown (null) results do not pass.
    pub fn matches<R: Record + ?Sized>(&self, record: &R, case_sensitive: bool) -> Result<bool> {
        Ok(self.evaluate(record, case_sensitive)? == Some(true))
    }

    /// Every field name the expression refers to, in order of appearance.
    pub fn fields(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_fields(&mut names);
        names
    }

    fn collect_fields<'a>(&'a self, names: &mut Vec<&'a str>) {
        fn push<'a>(names: &mut Vec<&'a str>, operand: &'a Operand) {
            if let Operand::Field(name) = operand {
                names.push(name.as_str());
            }
        }
        match self {
            Self::And(left, right) | Self::Or(left, right) => {
                left.collect_fields(names);
                right.collect_fields(names);
            },
            Self::Not(inner) => inner.collect_fields(names),
            Self::Compare { left, right, .. } => {
                push(names, left);
                push(names, right);
            },
            Self::In { operand, list, .. } => {
                push(names, operand);
                list.iter().for_each(|candidate| push(names, candidate));
            },
            Self::Like { operand, .. } | Self::IsNull { operand, .. } | Self::Truthy(operand) => push(names, operand),
        }
    }

    fn evaluate<R: Record + ?Sized>(&self, record: &R, case_sensitive: bool) -> Result<Option<bool>> {
        let result = match self {
            Self::And(left, right) => match left.evaluate(record, case_sensitive)? {
                Some(false) => Some(false),
                l => match (l, right.evaluate(record, case_sensitive)?) {
                    (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                },
            },
            Self::Or(left, right) => match left.evaluate(record, case_sensitive)? {
                Some(true) => Some(true),
                l => match (l, right.evaluate(record, case_sensitive)?) {
                    (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                },
            },
            Self::Not(inner) => inner.evaluate(record, case_sensitive)?.map(|b| !b),
            Self::Compare { left, op, right } => {
                let (left, right) = (left.resolve(record)?, right.resolve(record)?);
                left.compare(&right, case_sensitive).map(|ordering| op.test(ordering))
            },
            Self::Like { operand, pattern, negated } => {
                let value = operand.resolve(record)?;
                value.as_text().map(|text| pattern.is_match(&text) != *negated)
            },
            Self::In { operand, list, negated } => {
                let value = operand.resolve(record)?;
                if value.is_null() {
                    None
                } else {
                    let mut saw_null = false;
                    let mut found = false;
                    for candidate in list {
                        let candidate = candidate.resolve(record)?;
                        if candidate.is_null() {
                            saw_null = true;
                        } else if value.equals(&candidate, case_sensitive) {
                            found = true;
                            break;
                        }
                    }
                    match (found, saw_null) {
                        (true, _) => Some(!*negated),
                        (false, true) => None,
                        (false, false) => Some(*negated),
                    }
                }
            },
            Self::IsNull { operand, negated } => Some(operand.resolve(record)?.is_null() != *negated),
            Self::Truthy(operand) => match operand.resolve(record)? {
                Value::Bool(b) => Some(b),
                Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
                Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
                _ => None,
            },
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::borrow::Cow;
    use std::collections::BTreeMap;

    struct Row(BTreeMap<&'static str, Value>);

    impl Record for Row {
        fn field(&self, name: &str) -> Option<Value> {
            self.0.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.clone())
        }

        fn columns(&self) -> Vec<String> {
            self.0.keys().map(|k| k.to_string()).collect()
        }

        fn identity(&self) -> Cow<'_, str> {
            Cow::Borrowed("row")
        }
    }

    fn row() -> Row {
        Row(BTreeMap::from([
            ("name", Value::from("Report.MD")),
            ("kind", Value::from("file")),
            ("size", Value::from(2048i64)),
            ("hash", Value::Null),
            ("public", Value::from(true)),
        ]))
    }

    #[rstest]
    #[case("name = 'report.md'", false, true)]
    #[case("name == 'report.md'", true, false)]
    #[case("size > 1024 AND kind = 'file'", false, true)]
    #[case("size > 4096 OR kind <> 'file'", false, false)]
    #[case("NOT (size < 100)", false, true)]
    #[case("!public", false, false)]
    #[case("public && size >= 2048", false, true)]
    #[case("name LIKE '%.md'", false, true)]
    #[case("name LIKE '%.md'", true, false)]
    #[case("name LIKE 'Report.??'", true, true)]
    #[case("name NOT LIKE 'report*'", false, false)]
    #[case("kind IN ('directory', 'FILE')", false, true)]
    #[case("kind NOT IN ('directory')", false, true)]
    #[case("hash IS NULL", false, true)]
    #[case("[hash] IS NOT NULL", false, false)]
    #[case("size = '2048'", false, true)]
    #[case("size > -1.5", false, true)]
    fn test_matches(#[case] input: &str, #[case] case_sensitive: bool, #[case] expected: bool) {
        let expr = Expr::parse(input, case_sensitive).unwrap();
        assert_eq!(expr.matches(&row(), case_sensitive).unwrap(), expected, "{input}");
    }

    #[rstest]
    #[case("hash = 'abc'")]
    #[case("NOT (hash = 'abc')")]
    #[case("hash <> 'abc'")]
    #[case("kind IN ('directory', null)")]
    fn test_unknown_never_passes(#[case] input: &str) {
        let expr = Expr::parse(input, false).unwrap();
        assert!(!expr.matches(&row(), false).unwrap());
    }

    #[test]
    fn test_three_valued_short_circuit() {
        let expr = Expr::parse("hash = 'abc' OR size > 1", false).unwrap();
        assert!(expr.matches(&row(), false).unwrap());
        let expr = Expr::parse("NOT (hash = 'abc' AND size > 1000000)", false).unwrap();
        assert!(expr.matches(&row(), false).unwrap());
    }

    #[test]
    fn test_unknown_field_is_an_error() {
        let expr = Expr::parse("colour = 'red'", false).unwrap();
        let err = expr.matches(&row(), false).unwrap_err();
        assert_eq!(*err, ErrorKind::UnknownField("colour".to_string()));
    }

    #[rstest]
    #[case("size >", "size >")]
    #[case("name = 'a' AND", "name = 'a' AND")]
    #[case("(size > 1", "(size > 1")]
    #[case("size > 1 size", "size")]
    #[case("name LIKE 3", "3")]
    #[case("'text'", "'text'")]
    fn test_parse_errors_name_the_clause(#[case] input: &str, #[case] clause: &str) {
        let err = Expr::parse(input, false).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Filter { .. }), "{err:?}");
        assert_eq!(err.clause(), clause);
    }

    #[test]
    fn test_fields() {
        let expr = Expr::parse("a = 1 AND (b LIKE 'x%' OR c IN (d, 2))", false).unwrap();
        assert_eq!(expr.fields(), vec!["a", "b", "c", "d"]);
    }
}
