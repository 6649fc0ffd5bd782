use std::fmt;

use chrono::NaiveDateTime;

/// A typed scalar read from command output.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Timestamp(NaiveDateTime),
    /// `--` or `-` placeholders, and cells absent from a row.
    Missing,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Timestamp(at) => write!(f, "{}", at.format("%Y-%m-%d %H:%M:%S")),
            Self::Missing => Ok(()),
        }
    }
}

/// One parsed line. Columns keep the order of the shape that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    /// 1-based line number in the source text.
    pub line: usize,
    fields: Vec<(String, Value)>,
}

impl ParsedRow {
    pub fn new(line: usize) -> Self {
        Self {
            line,
            fields: Vec::new(),
        }
    }

    /// Replaces the value when the column already exists.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    /// A float with an optional trailing `%`.
    Percent,
    /// Parsed with the given `chrono` format string.
    Timestamp(&'static str),
    /// `HH:MM` or `HH:MM:SS`, stored as whole seconds.
    Elapsed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    /// Tokens consumed by this column, joined with a space.
    pub span: usize,
    /// Takes the rest of the line; only meaningful for the last column.
    pub remainder: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            span: 1,
            remainder: false,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Text)
    }

    pub fn span(mut self, span: usize) -> Self {
        self.span = span.max(1);
        self
    }

    pub fn remainder(mut self) -> Self {
        self.remainder = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Whitespace,
    Delimited(char),
}

/// The column structure a parser expects from each data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordShape {
    pub columns: Vec<Column>,
    pub layout: Layout,
    /// Lines starting with any of these are headers, even if they fit.
    pub skip_prefixes: Vec<String>,
}

impl RecordShape {
    pub fn whitespace(columns: Vec<Column>) -> Self {
        Self {
            columns,
            layout: Layout::Whitespace,
            skip_prefixes: Vec::new(),
        }
    }

    pub fn delimited(delimiter: char, columns: Vec<Column>) -> Self {
        Self {
            columns,
            layout: Layout::Delimited(delimiter),
            skip_prefixes: Vec::new(),
        }
    }

    pub fn skip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.skip_prefixes.push(prefix.into());
        self
    }

    /// Number of tokens a line must have; `None` upper bound with a remainder column.
    pub fn token_count(&self) -> (usize, Option<usize>) {
        let total = self.columns.iter().map(|c| c.span).sum();
        match self.columns.last() {
            Some(last) if last.remainder => (total, None),
            _ => (total, Some(total)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, ColumnKind, ParsedRow, RecordShape, Value};

    #[test]
    fn row_keeps_order_and_replaces() {
        let mut row = ParsedRow::new(3);
        row.push("b", Value::Integer(1));
        row.push("a", Value::Text("x".to_owned()));
        row.push("b", Value::Integer(2));

        let names = row.iter().map(|(n, _)| n).collect::<Vec<_>>();
        assert_eq!(vec!["b", "a"], names);
        assert_eq!(Some(2), row.get("b").and_then(Value::as_i64));
        assert_eq!(Some("x"), row.text("a"));
        assert_eq!(None, row.text("b"));
    }

    #[test]
    fn token_counts() {
        let fixed = RecordShape::whitespace(vec![
            Column::text("a").span(2),
            Column::new("b", ColumnKind::Integer),
        ]);
        assert_eq!((3, Some(3)), fixed.token_count());

        let open = RecordShape::whitespace(vec![Column::text("a"), Column::text("rest").remainder()]);
        assert_eq!((2, None), open.token_count());
    }
}
