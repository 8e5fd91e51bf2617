//! Dynamically-typed field values.
//!
//! Entities and table rows expose their fields as [`Value`]s so that one
//! expression language can run over both. Comparison coerces the way tabular
//! engines usually do: a string literal compared against a number, boolean or
//! timestamp field is parsed into that type first.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Timestamp(OffsetDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text used for `LIKE` matching and for rendering.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null => None,
            Self::String(s) => Some(Cow::Borrowed(s)),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Self::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    fn as_timestamp(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Timestamp(t) => Some(*t),
            Self::String(s) => parse_timestamp(s),
            _ => None,
        }
    }

    /// Compare two values, returning `None` when they are not comparable
    /// (either side null, or no sensible coercion exists).
    pub fn compare(&self, other: &Value, case_sensitive: bool) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::String(a), Self::String(b)) => Some(compare_text(a, b, case_sensitive)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Integer(_) | Self::Float(_), _) | (_, Self::Integer(_) | Self::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            },
            (Self::Bool(_), _) | (_, Self::Bool(_)) => Some(self.as_bool()?.cmp(&other.as_bool()?)),
            (Self::Timestamp(_), _) | (_, Self::Timestamp(_)) => Some(self.as_timestamp()?.cmp(&other.as_timestamp()?)),
        }
    }

    /// Equality under the given case sensitivity. Null never equals anything.
    pub fn equals(&self, other: &Value, case_sensitive: bool) -> bool {
        self.compare(other, case_sensitive) == Some(Ordering::Equal)
    }

    /// Total order used for sorting. Values of different types are ordered
    /// by type alone (nulls first, strings last) and never coerced, so the
    /// order stays transitive over mixed columns. Integers and floats share a
    /// rank and compare numerically.
    pub fn sort_cmp(&self, other: &Value, case_sensitive: bool) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            // Mixed numbers: an integer sorts before a float it cannot be told
            // apart from as an f64.
            (Self::Integer(a), Self::Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Self::Float(a), Self::Integer(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => compare_text(a, b, case_sensitive),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Coerce the strings of a column into the one other type its values
    /// hold, when every string parses as that type. A column of `9` and
    /// `"10"` then sorts numerically; anything that can't be unified is left
    /// alone and sorts by type.
    pub fn unify(column: &mut [Value]) {
        let mut target = None;
        for value in column.iter() {
            let rank = match value {
                Self::Null | Self::String(_) => continue,
                other => other.rank(),
            };
            match target {
                None => target = Some(rank),
                Some(seen) if seen == rank => {},
                Some(_) => return,
            }
        }
        let Some(target) = target else {
            return;
        };
        let coerce = |value: &Value| -> Option<Value> {
            let Self::String(text) = value else {
                return Some(value.clone());
            };
            // Ranks as in `rank`.
            match target {
                1 => value.as_bool().map(Self::Bool),
                2 => text.trim().parse().ok().map(Self::Integer).or_else(|| value.as_f64().map(Self::Float)),
                _ => value.as_timestamp().map(Self::Timestamp),
            }
        };
        let Some(coerced) = column.iter().map(coerce).collect::<Option<Vec<_>>>() else {
            return;
        };
        for (slot, value) in column.iter_mut().zip(coerced) {
            *slot = value;
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Integer(_) | Self::Float(_) => 2,
            Self::Timestamp(_) => 3,
            Self::String(_) => 4,
        }
    }
}

fn compare_text(a: &str, b: &str, case_sensitive: bool) -> Ordering {
    if case_sensitive {
        return a.cmp(b);
    }
    // Ordinal comparison of the lowercased characters, without allocating.
    a.chars().flat_map(char::to_lowercase).cmp(b.chars().flat_map(char::to_lowercase))
}

/// Parse an RFC 3339 timestamp, or a plain `YYYY-MM-DD[ HH:MM:SS]` assumed UTC.
pub fn parse_timestamp(input: &str) -> Option<OffsetDateTime> {
    let input = input.trim();
    if let Ok(parsed) = OffsetDateTime::parse(input, &Rfc3339) {
        return Some(parsed);
    }
    if let Ok(parsed) = PrimitiveDateTime::parse(input, format_description!("[year]-[month]-[day] [hour]:[minute]:[second]")) {
        return Some(parsed.assume_utc());
    }
    Date::parse(input, format_description!("[year]-[month]-[day]")).ok().map(|date| date.with_time(Time::MIDNIGHT).assume_utc())
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Timestamp(t) => match t.format(&Rfc3339) {
                Ok(formatted) => f.write_str(&formatted),
                Err(_) => write!(f, "{t}"),
            },
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::String(s) => serializer.serialize_str(s),
            Self::Timestamp(_) => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            serde_json::Value::String(s) => Self::String(s),
            // Nested structures are kept as their JSON text; tabular sources
            // flatten before handing rows over.
            nested => Self::String(nested.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}
impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}
impl From<u64> for Value {
    fn from(value: u64) -> Self {
        i64::try_from(value).map(Self::Integer).unwrap_or(Self::Float(value as f64))
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}
impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    #[rstest]
    #[case(Value::from("Report"), Value::from("report"), false, Some(Ordering::Equal))]
    #[case(Value::from("Report"), Value::from("report"), true, Some(Ordering::Less))]
    #[case(Value::from(10i64), Value::from(9.5), false, Some(Ordering::Greater))]
    #[case(Value::from(10i64), Value::from("10"), false, Some(Ordering::Equal))]
    #[case(Value::from(true), Value::from("TRUE"), false, Some(Ordering::Equal))]
    #[case(Value::Null, Value::from(1i64), false, None)]
    #[case(Value::from("abc"), Value::from(1i64), false, None)]
    fn test_compare(#[case] a: Value, #[case] b: Value, #[case] case_sensitive: bool, #[case] expected: Option<Ordering>) {
        assert_eq!(a.compare(&b, case_sensitive), expected);
    }

    #[test]
    fn test_timestamp_coercion() {
        let modified = Value::from(datetime!(2024-03-01 12:00 UTC));
        assert_eq!(modified.compare(&Value::from("2024-01-01"), false), Some(Ordering::Greater));
        assert_eq!(modified.compare(&Value::from("2024-03-01T12:00:00Z"), false), Some(Ordering::Equal));
        assert_eq!(modified.compare(&Value::from("not a date"), false), None);
    }

    fn mixed() -> Vec<Value> {
        vec![
            Value::from(9i64),
            Value::from("10"),
            Value::from("9"),
            Value::from(9.5),
            Value::Null,
            Value::from("abc"),
            Value::from(true),
            Value::from(10i64),
            Value::from(datetime!(2024-01-01 0:00 UTC)),
        ]
    }

    #[test]
    fn test_sort_cmp_is_transitive_over_mixed_values() {
        let values = mixed();
        for a in &values {
            for b in &values {
                assert_eq!(a.sort_cmp(b, false), b.sort_cmp(a, false).reverse(), "{a:?} / {b:?}");
                for c in &values {
                    if a.sort_cmp(b, false).is_le() && b.sort_cmp(c, false).is_le() {
                        assert!(a.sort_cmp(c, false).is_le(), "{a:?} <= {b:?} <= {c:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_sort_is_independent_of_input_order() {
        let mut expected = mixed();
        expected.sort_by(|a, b| a.sort_cmp(b, false));
        for rotation in 1..expected.len() {
            let mut values = mixed();
            values.rotate_left(rotation);
            values.reverse();
            values.sort_by(|a, b| a.sort_cmp(b, false));
            assert_eq!(values, expected);
        }
        assert_eq!(expected[0], Value::Null);
        assert_eq!(expected.last(), Some(&Value::from("abc")));
    }

    #[rstest]
    #[case(vec![Value::from(9i64), Value::from("10"), Value::Null], vec![Value::from(9i64), Value::from(10i64), Value::Null])]
    #[case(vec![Value::from(1.5), Value::from("2.25")], vec![Value::from(1.5), Value::from(2.25)])]
    #[case(vec![Value::from(true), Value::from("FALSE")], vec![Value::from(true), Value::from(false)])]
    #[case(vec![Value::from(9i64), Value::from("ten")], vec![Value::from(9i64), Value::from("ten")])]
    #[case(vec![Value::from("10"), Value::from("9")], vec![Value::from("10"), Value::from("9")])]
    #[case(vec![Value::from(1i64), Value::from(true), Value::from("1")], vec![Value::from(1i64), Value::from(true), Value::from("1")])]
    fn test_unify(#[case] mut column: Vec<Value>, #[case] expected: Vec<Value>) {
        Value::unify(&mut column);
        assert_eq!(column, expected);
    }

    #[test]
    fn test_sort_cmp_is_total() {
        let mut values = vec![Value::from("b"), Value::Null, Value::from(2i64), Value::from(true), Value::from("A")];
        values.sort_by(|a, b| a.sort_cmp(b, false));
        assert_eq!(values, vec![Value::Null, Value::from(true), Value::from(2i64), Value::from("A"), Value::from("b")]);
    }

    #[test]
    fn test_json_round_trip_keeps_types() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 3, 1.5, "x", {"a": 1}]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Integer(3),
                Value::Float(1.5),
                Value::from("x"),
                Value::from(r#"{"a":1}"#),
            ]
        );
        assert_eq!(serde_json::to_string(&values[..5]).unwrap(), r#"[null,true,3,1.5,"x"]"#);
    }
}
