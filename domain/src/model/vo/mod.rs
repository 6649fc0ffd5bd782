pub mod row;

#[rustfmt::skip]
pub use self::row::{Column, ColumnKind, Layout, ParsedRow, RecordShape, Value};
