use crate::engine::FilterEngine;
use crate::error::Result;
use crate::record::Record;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Row data with named columns: the projected view of a listing, or the rows
/// of a tabular source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.eq_ignore_ascii_case(name))
    }

    pub fn records(&self) -> Vec<TableRow<'_>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, values)| TableRow { columns: &self.columns, values, index })
            .collect()
    }

    /// Rewrite every value of one column in place. Does nothing when the
    /// column is not present.
    pub fn map_column(&mut self, name: &str, mut f: impl FnMut(&Value) -> Value) {
        let Some(index) = self.column_index(name) else {
            return;
        };
        for row in &mut self.rows {
            if let Some(value) = row.get_mut(index) {
                *value = f(value);
            }
        }
    }

    /// Filter, sort, page and project the rows. Ties and the default order
    /// follow the original row position.
    pub fn shape(&self, engine: &FilterEngine) -> Result<Table> {
        let rows = engine.apply(self.records())?;
        if rows.is_empty() && !engine.has_projection() {
            return Ok(Table::new(self.columns.clone()));
        }
        engine.project(&rows)
    }
}

/// One row of a [`Table`], borrowed for filtering.
#[derive(Debug, Clone, Copy)]
pub struct TableRow<'a> {
    columns: &'a [String],
    values: &'a [Value],
    index: usize,
}

impl TableRow<'_> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Record for TableRow<'_> {
    fn field(&self, name: &str) -> Option<Value> {
        let position = self.columns.iter().position(|column| column.eq_ignore_ascii_case(name))?;
        Some(self.values.get(position).cloned().unwrap_or_default())
    }

    fn columns(&self) -> Vec<String> {
        self.columns.to_vec()
    }

    fn identity(&self) -> Cow<'_, str> {
        // Zero padded so that string order is row order.
        Cow::Owned(format!("{:020}", self.index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FilterSpec;

    fn people() -> Table {
        Table {
            columns: vec!["Name".into(), "Age".into(), "City".into()],
            rows: vec![
                vec!["ann".into(), 31i64.into(), "Leeds".into()],
                vec!["Bob".into(), 25i64.into(), Value::Null],
                vec!["cat".into(), 31i64.into(), "York".into()],
                vec!["dan".into(), 19i64.into(), "leeds".into()],
            ],
        }
    }

    #[test]
    fn test_shape_filters_sorts_and_projects() {
        let spec = FilterSpec {
            fields: Some("name, city".into()),
            filter: Some("age > 20".into()),
            sort: Some("age desc".into()),
            ..Default::default()
        };
        let shaped = people().shape(&FilterEngine::new(&spec).unwrap()).unwrap();
        assert_eq!(shaped.columns, vec!["name", "city"]);
        // Ties on age keep the original row order.
        assert_eq!(
            shaped.rows,
            vec![
                vec![Value::from("ann"), Value::from("Leeds")],
                vec![Value::from("cat"), Value::from("York")],
                vec![Value::from("Bob"), Value::Null],
            ]
        );
    }

    #[test]
    fn test_shape_without_options_keeps_everything() {
        let table = people();
        let shaped = table.shape(&FilterEngine::new(&FilterSpec::default()).unwrap()).unwrap();
        assert_eq!(shaped, table);
    }

    #[test]
    fn test_shape_empty_result_keeps_columns() {
        let spec = FilterSpec { filter: Some("age > 100".into()), ..Default::default() };
        let shaped = people().shape(&FilterEngine::new(&spec).unwrap()).unwrap();
        assert_eq!(shaped.columns, people().columns);
        assert!(shaped.is_empty());
    }

    #[test]
    fn test_map_column() {
        let mut table = people();
        table.map_column("age", |v| Value::from(format!("{v} years")));
        assert_eq!(table.rows[1][1], Value::from("25 years"));
        table.map_column("missing", |_| Value::Null);
        assert_eq!(table.rows[0][0], Value::from("ann"));
    }
}
