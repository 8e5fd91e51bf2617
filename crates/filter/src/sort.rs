use crate::error::{ErrorKind, Result};
use crate::record::Record;
use crate::value::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    /// Parse a comma separated sort list. Each clause is `field`,
    /// `field:asc|desc` or `field asc|desc`.
    pub fn parse_list(input: &str) -> Result<Vec<SortKey>> {
        let mut keys = Vec::new();
        for clause in input.split(',') {
            let clause = clause.trim();
            if clause.is_empty() {
                if input.trim().is_empty() {
                    continue;
                }
                exn::bail!(ErrorKind::Sort(input.trim().to_string()));
            }
            keys.push(Self::parse(clause)?);
        }
        Ok(keys)
    }

    fn parse(clause: &str) -> Result<SortKey> {
        let (field, direction) = match clause.split_once(':') {
            Some((field, direction)) => (field.trim(), Some(direction.trim())),
            None if clause.ends_with(']') => (clause, None),
            None => match clause.rsplit_once(char::is_whitespace) {
                Some((field, direction)) => (field.trim(), Some(direction.trim())),
                None => (clause, None),
            },
        };
        let field = field.trim_start_matches('[').trim_end_matches(']').trim();
        if field.is_empty() {
            exn::bail!(ErrorKind::Sort(clause.to_string()));
        }
        let descending = match direction.map(str::to_ascii_lowercase).as_deref() {
            None | Some("asc" | "ascending") => false,
            Some("desc" | "descending") => true,
            Some(_) => exn::bail!(ErrorKind::Sort(clause.to_string())),
        };
        Ok(SortKey { field: field.to_string(), descending })
    }
}

/// Sort records by the given keys, breaking ties with each record's identity.
///
/// Key values are extracted up front so an unknown field fails the whole
/// sort instead of being silently ordered as null. Each key column is then
/// unified to a single type where its values allow it.
pub fn sort_records<R: Record>(records: Vec<R>, keys: &[SortKey], case_sensitive: bool) -> Result<Vec<R>> {
    let mut decorated = Vec::with_capacity(records.len());
    for record in records {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            match record.field(&key.field) {
                Some(value) => values.push(value),
                None => exn::bail!(ErrorKind::UnknownField(key.field.clone())),
            }
        }
        decorated.push((values, record));
    }
    for index in 0..keys.len() {
        let mut column: Vec<Value> = decorated.iter_mut().map(|(values, _)| std::mem::take(&mut values[index])).collect();
        Value::unify(&mut column);
        for ((values, _), value) in decorated.iter_mut().zip(column) {
            values[index] = value;
        }
    }
    decorated.sort_by(|(a_values, a), (b_values, b)| {
        compare_keys(keys, a_values, b_values, case_sensitive).then_with(|| a.identity().cmp(&b.identity()))
    });
    Ok(decorated.into_iter().map(|(_, record)| record).collect())
}

fn compare_keys(keys: &[SortKey], a: &[Value], b: &[Value], case_sensitive: bool) -> Ordering {
    keys.iter()
        .zip(a.iter().zip(b))
        .map(|(key, (a, b))| {
            let ordering = a.sort_cmp(b, case_sensitive);
            if key.descending { ordering.reverse() } else { ordering }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}
