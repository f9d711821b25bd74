//! Small row-oriented table used for the per-store result.
//!
//! Columns are ordered and every row holds one [`Value`] per column. The table
//! only offers what the export needs: building rows, the single-row cross join
//! used to broadcast metadata and CSV writing.

use std::fmt;
use std::io::Write;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Integer(i64),
    Missing,
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Number(_) => "number",
            Value::Integer(_) => "integer",
            Value::Missing => "missing",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

// NaN is written as an empty field, the same as a missing cell.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Number(v) if v.is_nan() => Ok(()),
            Value::Number(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Missing => Ok(()),
        }
    }
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("type mismatch: expected {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("index range {start}..{stop} out of range for a string of {len} characters")]
    IndexOutOfRange {
        start: usize,
        stop: usize,
        len: usize,
    },
    #[error("row has {found} cells but the table has {expected} columns")]
    RowWidth { expected: usize, found: usize },
    #[error("column '{0}' exists in both tables")]
    DuplicateColumn(String),
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Result<Vec<&Value>, TableError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Appends a column holding the same value on every row.
    pub fn with_constant(mut self, name: &str, value: Value) -> Result<Self, TableError> {
        if self.column_index(name).is_some() {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(value.clone());
        }
        Ok(self)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), TableError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|v| v.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> Result<(), TableError> {
        let file = std::fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))
    }
}

/// Returns characters `start..stop` of a text value.
pub fn selstr(value: &Value, start: usize, stop: usize) -> Result<String, TableError> {
    let Value::Text(s) = value else {
        return Err(TableError::TypeMismatch {
            expected: "text",
            found: value.type_name(),
        });
    };

    let len = s.chars().count();
    if start > stop || stop > len {
        return Err(TableError::IndexOutOfRange { start, stop, len });
    }

    Ok(s.chars().skip(start).take(stop - start).collect())
}

/// Cross product of two tables: every row of `left` followed by every row of
/// `right`. Meant to broadcast a one-row metadata table over a series.
pub fn combine(left: &Table, right: &Table) -> Result<Table, TableError> {
    if let Some(dup) = left.columns.iter().find(|c| right.columns.contains(c)) {
        return Err(TableError::DuplicateColumn(dup.clone()));
    }

    let mut out = Table::new(left.columns.iter().chain(right.columns.iter()).cloned());
    for l in &left.rows {
        for r in &right.rows {
            out.rows.push(l.iter().chain(r.iter()).cloned().collect());
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_table() -> Table {
        let mut t = Table::new(["variable", "model"]);
        t.push_row(vec!["tos".into(), "GFDL-CM4".into()]).unwrap();
        t
    }

    fn series_table(n: usize) -> Table {
        let mut t = Table::new(["year", "value"]);
        for i in 0..n {
            t.push_row(vec![format!("{}", 1850 + i).into(), (i as f64).into()])
                .unwrap();
        }
        t
    }

    #[test]
    fn test_selstr_year_prefix() {
        let year = selstr(&Value::from("20050115"), 0, 4).unwrap();
        assert_eq!(year, "2005");
    }

    #[test]
    fn test_selstr_rejects_non_text() {
        let err = selstr(&Value::Number(20050115.0), 0, 4).unwrap_err();
        assert!(matches!(err, TableError::TypeMismatch { found: "number", .. }));

        let err = selstr(&Value::Missing, 0, 4).unwrap_err();
        assert!(matches!(err, TableError::TypeMismatch { .. }));
    }

    #[test]
    fn test_selstr_out_of_range() {
        let err = selstr(&Value::from("205"), 0, 4).unwrap_err();
        assert!(matches!(err, TableError::IndexOutOfRange { len: 3, .. }));
    }

    #[test]
    fn test_combine_broadcasts_single_row() {
        let out = combine(&meta_table(), &series_table(5)).unwrap();

        assert_eq!(out.len(), 5);
        assert_eq!(out.columns(), &["variable", "model", "year", "value"]);
        for row in out.rows() {
            assert_eq!(row[0], Value::from("tos"));
            assert_eq!(row[1], Value::from("GFDL-CM4"));
        }
        assert_eq!(out.rows()[4][2], Value::from("1854"));
    }

    #[test]
    fn test_combine_rejects_shared_columns() {
        let err = combine(&meta_table(), &meta_table()).unwrap_err();
        assert!(matches!(err, TableError::DuplicateColumn(c) if c == "variable"));
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut t = Table::new(["a", "b"]);
        assert!(t.push_row(vec![Value::Missing]).is_err());
    }

    #[test]
    fn test_write_csv() {
        let table = combine(&meta_table(), &series_table(2))
            .unwrap()
            .with_constant("area", "global".into())
            .unwrap();

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert_eq!(
            text,
            "variable,model,year,value,area\n\
             tos,GFDL-CM4,1850,0,global\n\
             tos,GFDL-CM4,1851,1,global\n"
        );
    }

    #[test]
    fn test_nan_written_as_empty_field() {
        let mut t = Table::new(["year", "value"]);
        t.push_row(vec!["1850".into(), f64::NAN.into()]).unwrap();

        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "year,value\n1850,\n");
    }
}
