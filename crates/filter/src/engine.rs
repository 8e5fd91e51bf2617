//! The shaping pipeline: filter, then sort, then page, then project.
//!
//! Everything is parsed up front by [`FilterEngine::new`], so a bad clause is
//! reported before any record is looked at.

use crate::error::{ErrorKind, Result};
use crate::expr::Expr;
use crate::record::Record;
use crate::sort::{SortKey, sort_records};
use crate::table::Table;
use crate::value::Value;
use exn::ResultExt;
use serde::{Deserialize, Serialize};

/// Raw shaping options, as the caller wrote them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSpec {
    /// Comma separated field names, or a JSON array of names.
    pub fields: Option<String>,
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub case_sensitive: bool,
    pub limit: Option<String>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct FilterEngine {
    fields: Vec<String>,
    filter: Option<Expr>,
    sort: Vec<SortKey>,
    case_sensitive: bool,
    limit: Option<usize>,
    offset: usize,
}

impl FilterEngine {
    pub fn new(spec: &FilterSpec) -> Result<Self> {
        let filter = match non_empty(&spec.filter) {
            Some(input) => Some(Expr::parse(input, spec.case_sensitive)?),
            None => None,
        };
        let sort = match non_empty(&spec.sort) {
            Some(input) => SortKey::parse_list(input)?,
            None => Vec::new(),
        };
        let fields = match non_empty(&spec.fields) {
            Some(input) => parse_fields(input)?,
            None => Vec::new(),
        };
        let limit = match non_empty(&spec.limit) {
            Some(input) => Some(input.parse::<usize>().or_raise(|| ErrorKind::Limit(input.to_string()))?),
            None => None,
        };
        Ok(Self { fields, filter, sort, case_sensitive: spec.case_sensitive, limit, offset: spec.offset.unwrap_or(0) })
    }

    pub fn has_projection(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Filter, sort and page the records without projecting them.
    pub fn apply<R: Record>(&self, records: Vec<R>) -> Result<Vec<R>> {
        let total = records.len();
        let mut kept = Vec::with_capacity(total);
        for record in records {
            let passes = match &self.filter {
                Some(expr) => expr.matches(&record, self.case_sensitive)?,
                None => true,
            };
            if passes {
                kept.push(record);
            }
        }
        let sorted = sort_records(kept, &self.sort, self.case_sensitive)?;
        let paged: Vec<R> = sorted.into_iter().skip(self.offset).take(self.limit.unwrap_or(usize::MAX)).collect();
        tracing::debug!(total, returned = paged.len(), "shaped records");
        Ok(paged)
    }

    /// Project records onto the requested fields, or onto the first record's
    /// own columns when no fields were requested.
    pub fn project<R: Record>(&self, records: &[R]) -> Result<Table> {
        let columns = match (self.fields.is_empty(), records.first()) {
            (false, _) => self.fields.clone(),
            (true, Some(first)) => first.columns(),
            (true, None) => Vec::new(),
        };
        let mut table = Table::new(columns);
        for record in records {
            let mut row = Vec::with_capacity(table.columns.len());
            for column in &table.columns {
                match record.field(column) {
                    Some(value) => row.push(value),
                    None if self.fields.is_empty() => row.push(Value::Null),
                    None => exn::bail!(ErrorKind::UnknownField(column.clone())),
                }
            }
            table.rows.push(row);
        }
        Ok(table)
    }

    /// [`apply`](Self::apply) followed by [`project`](Self::project).
    pub fn shape<R: Record>(&self, records: Vec<R>) -> Result<Table> {
        self.project(&self.apply(records)?)
    }
}

fn non_empty(input: &Option<String>) -> Option<&str> {
    input.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// A JSON array of names (`["name", "size"]`) or a comma separated list,
/// where names may be bracketed (`[Content Type], size`).
fn parse_fields(input: &str) -> Result<Vec<String>> {
    if input.starts_with('[')
        && let Ok(names) = serde_json::from_str::<Vec<String>>(input)
    {
        return validate_fields(input, names.iter().map(String::as_str));
    }
    validate_fields(input, input.split(','))
}

fn validate_fields<'a>(input: &str, names: impl Iterator<Item = &'a str>) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    for name in names {
        let name = name.trim();
        let name = name.strip_prefix('[').and_then(|n| n.strip_suffix(']')).unwrap_or(name).trim();
        if name.is_empty() {
            exn::bail!(ErrorKind::Fields(input.to_string()));
        }
        fields.push(name.to_string());
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::borrow::Cow;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        path: &'static str,
        size: i64,
    }

    impl Record for Item {
        fn field(&self, name: &str) -> Option<Value> {
            match name.to_ascii_lowercase().as_str() {
                "path" => Some(self.path.into()),
                "size" => Some(self.size.into()),
                _ => None,
            }
        }

        fn columns(&self) -> Vec<String> {
            vec!["path".into(), "size".into()]
        }

        fn identity(&self) -> Cow<'_, str> {
            Cow::Borrowed(self.path)
        }
    }

    fn items() -> Vec<Item> {
        vec![
            Item { path: "b/2.txt", size: 20 },
            Item { path: "a/", size: 0 },
            Item { path: "b/", size: 0 },
            Item { path: "a/1.txt", size: 10 },
            Item { path: "b/1.txt", size: 10 },
        ]
    }

    fn paths(records: &[Item]) -> Vec<&str> {
        records.iter().map(|item| item.path).collect()
    }

    #[test]
    fn test_default_order_is_identity() {
        let engine = FilterEngine::new(&FilterSpec::default()).unwrap();
        assert_eq!(paths(&engine.apply(items()).unwrap()), vec!["a/", "a/1.txt", "b/", "b/1.txt", "b/2.txt"]);
    }

    #[test]
    fn test_deterministic_regardless_of_input_order() {
        let spec = FilterSpec { sort: Some("size".into()), ..Default::default() };
        let engine = FilterEngine::new(&spec).unwrap();
        let mut reversed = items();
        reversed.reverse();
        assert_eq!(engine.apply(items()).unwrap(), engine.apply(reversed).unwrap());
    }

    #[rstest]
    #[case(FilterSpec { filter: Some("size > 0".into()), sort: Some("size:desc".into()), limit: Some("2".into()), ..Default::default() }, vec!["b/2.txt", "a/1.txt"])]
    #[case(FilterSpec { sort: Some("size desc".into()), offset: Some(1), limit: Some("2".into()), ..Default::default() }, vec!["a/1.txt", "b/1.txt"])]
    #[case(FilterSpec { filter: Some("path LIKE 'B/%'".into()), ..Default::default() }, vec!["b/", "b/1.txt", "b/2.txt"])]
    #[case(FilterSpec { filter: Some("path LIKE 'B/%'".into()), case_sensitive: true, ..Default::default() }, vec![])]
    #[case(FilterSpec { limit: Some("0".into()), ..Default::default() }, vec![])]
    #[case(FilterSpec { offset: Some(10), ..Default::default() }, vec![])]
    fn test_filter_sort_page(#[case] spec: FilterSpec, #[case] expected: Vec<&str>) {
        let engine = FilterEngine::new(&spec).unwrap();
        assert_eq!(paths(&engine.apply(items()).unwrap()), expected);
    }

    #[test]
    fn test_limit_applies_after_filter() {
        let spec = FilterSpec { filter: Some("size = 10".into()), limit: Some("1".into()), ..Default::default() };
        let engine = FilterEngine::new(&spec).unwrap();
        assert_eq!(paths(&engine.apply(items()).unwrap()), vec!["a/1.txt"]);
    }

    #[rstest]
    #[case(FilterSpec { limit: Some("ten".into()), ..Default::default() }, ErrorKind::Limit("ten".into()))]
    #[case(FilterSpec { limit: Some("-1".into()), ..Default::default() }, ErrorKind::Limit("-1".into()))]
    #[case(FilterSpec { sort: Some("size:up".into()), ..Default::default() }, ErrorKind::Sort("size:up".into()))]
    #[case(FilterSpec { fields: Some("path,,size".into()), ..Default::default() }, ErrorKind::Fields("path,,size".into()))]
    fn test_invalid_options(#[case] spec: FilterSpec, #[case] expected: ErrorKind) {
        let err = FilterEngine::new(&spec).unwrap_err();
        assert_eq!(*err, expected);
    }

    #[rstest]
    #[case(FilterSpec { filter: Some("colour = 'red'".into()), ..Default::default() })]
    #[case(FilterSpec { sort: Some("colour".into()), ..Default::default() })]
    #[case(FilterSpec { fields: Some("path, colour".into()), ..Default::default() })]
    fn test_unknown_fields(#[case] spec: FilterSpec) {
        let err = FilterEngine::new(&spec).unwrap().shape(items()).unwrap_err();
        assert_eq!(*err, ErrorKind::UnknownField("colour".into()));
    }

    #[rstest]
    #[case("path, size", vec!["path", "size"])]
    #[case(r#"["size", "path"]"#, vec!["size", "path"])]
    #[case("[Content Type], size", vec!["Content Type", "size"])]
    fn test_parse_fields(#[case] input: &str, #[case] expected: Vec<&str>) {
        assert_eq!(parse_fields(input).unwrap(), expected);
    }

    #[test]
    fn test_shape_projects_requested_fields() {
        let spec = FilterSpec { fields: Some("SIZE".into()), filter: Some("size > 10".into()), ..Default::default() };
        let table = FilterEngine::new(&spec).unwrap().shape(items()).unwrap();
        assert_eq!(table.columns, vec!["SIZE"]);
        assert_eq!(table.rows, vec![vec![Value::from(20i64)]]);
    }

    #[test]
    fn test_spec_deserializes_camel_case() {
        let spec: FilterSpec = serde_json::from_str(r#"{"filter": "size > 1", "caseSensitive": true, "limit": "5"}"#).unwrap();
        assert!(spec.case_sensitive);
        assert_eq!(spec.limit.as_deref(), Some("5"));
    }
}
