use crate::SqlValue;

/// Maximum length of the record rendering attached to diagnostics.
pub const RECORD_SNAPSHOT_LIMIT: usize = 200;

/// An ordered mapping from column name to value.
///
/// Column order is insertion order; inserting an existing column replaces
/// its value in place, so column names are always distinct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, SqlValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(columns: usize) -> Self {
        Self {
            entries: Vec::with_capacity(columns),
        }
    }

    /// Set `column` to `value`, returning the previous value if the column existed.
    pub fn insert<C, V>(&mut self, column: C, value: V) -> Option<SqlValue>
    where
        C: Into<String>,
        V: Into<SqlValue>,
    {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((column, value));
                None
            }
        }
    }

    /// Builder-style [`Record::insert`].
    pub fn with<C, V>(mut self, column: C, value: V) -> Self
    where
        C: Into<String>,
        V: Into<SqlValue>,
    {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> + '_ {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the record as `{col: value, ...}`, cut at `limit` characters.
    pub fn snapshot(&self, limit: usize) -> String {
        let mut out = String::from("{");
        for (i, (c, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(c);
            out.push_str(": ");
            out.push_str(&v.to_string());
        }
        out.push('}');
        if out.chars().count() > limit {
            let mut cut: String = out.chars().take(limit).collect();
            cut.push_str("...");
            return cut;
        }
        out
    }
}

impl<C, V> FromIterator<(C, V)> for Record
where
    C: Into<String>,
    V: Into<SqlValue>,
{
    fn from_iter<I: IntoIterator<Item = (C, V)>>(iter: I) -> Self {
        let mut r = Record::new();
        for (c, v) in iter {
            r.insert(c, v);
        }
        r
    }
}

/// Conversion of a typed value into a [`Record`].
/// Implemented via `#[derive(Batchable)]` in `sqlbatch_macros`.
pub trait IntoRecord {
    fn to_record(&self) -> Record;
}

impl IntoRecord for Record {
    fn to_record(&self) -> Record {
        self.clone()
    }
}
