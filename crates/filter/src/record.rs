use crate::value::Value;
use std::borrow::Cow;

/// Anything the filter engine can filter, sort and project.
///
/// Field names are matched case-insensitively by implementations.
pub trait Record {
    /// Look up a field by name.
    ///
    /// Returns `None` when the record has no such field (an error for the
    /// caller's expression) and `Some(Value::Null)` when the field exists but
    /// holds no value.
    fn field(&self, name: &str) -> Option<Value>;

    /// All field names in their natural order, used when projecting without
    /// an explicit field list.
    fn columns(&self) -> Vec<String>;

    /// Final sort tiebreak. Must be unique within one collection so that the
    /// resulting order never depends on input order.
    fn identity(&self) -> Cow<'_, str>;
}

impl<R: Record + ?Sized> Record for &R {
    fn field(&self, name: &str) -> Option<Value> {
        (**self).field(name)
    }

    fn columns(&self) -> Vec<String> {
        (**self).columns()
    }

    fn identity(&self) -> Cow<'_, str> {
        (**self).identity()
    }
}
