use domain::model::vo::{ParsedRow, Value};

/// Rows laid out under a shared header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    /// Columns are the union of the rows' columns in first-seen order; cells a
    /// row doesn't have are [`Value::Missing`].
    pub fn from_rows(rows: &[ParsedRow]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for (name, _) in rows.iter().flat_map(ParsedRow::iter) {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_owned());
            }
        }

        let rows = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(c).cloned().unwrap_or(Value::Missing))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }

    pub fn to_csv(&self) -> Result<String, csv::Error> {
        if self.columns.is_empty() {
            return Ok(String::new());
        }
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(ToString::to_string))?;
        }
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use domain::model::vo::{ParsedRow, Value};

    use super::Table;

    #[test]
    fn union_of_columns() {
        let mut first = ParsedRow::new(1);
        first.push("name", Value::Text("a".to_owned()));
        first.push("size", Value::Integer(3));
        let mut second = ParsedRow::new(2);
        second.push("name", Value::Text("b, c".to_owned()));
        second.push("owner", Value::Text("me".to_owned()));

        let table = Table::from_rows(&[first, second]);
        assert_eq!(vec!["name", "size", "owner"], table.columns);
        assert_eq!(Value::Missing, table.rows[0][2]);
        assert_eq!(Value::Missing, table.rows[1][1]);
        assert_eq!(
            vec![&Value::Integer(3), &Value::Missing],
            table.column("size").unwrap().collect::<Vec<_>>()
        );
        assert!(table.column("group").is_none());

        assert_eq!(
            "name,size,owner\na,3,\n\"b, c\",,me\n",
            table.to_csv().unwrap()
        );
    }

    #[test]
    fn empty_input() {
        let table = Table::from_rows(&[]);
        assert!(table.columns.is_empty());
        assert_eq!("", table.to_csv().unwrap());
    }
}
