//! Conversion of provider-native row shapes into ordered cost records.
//!
//! Providers hand back either a column list plus positional rows (JSON query
//! APIs) or delimited text (report blobs). Both end up as [`CostRecord`]s
//! whose key order follows the upstream column order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CostProviderError;

const BOM: char = '\u{feff}';

/// One row of cost data: column name to opaque scalar, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostRecord(Map<String, Value>);

impl CostRecord {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Column names in upstream order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl FromIterator<(String, Value)> for CostRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Rows as delivered by a provider, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRows {
    /// Column names plus positional rows.
    Columnar {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// Comma-delimited text with a header line.
    Delimited(String),
}

/// Normalize either raw shape.
///
/// # Errors
///
/// Returns [`CostProviderError::Protocol`] if a row's width does not match
/// its header.
pub fn normalize(raw: RawRows) -> Result<Vec<CostRecord>, CostProviderError> {
    match raw {
        RawRows::Columnar { columns, rows } => from_columns(&columns, rows),
        RawRows::Delimited(text) => from_delimited(&text),
    }
}

/// Zip positional rows with their column names.
///
/// # Errors
///
/// Returns [`CostProviderError::Protocol`] if any row width differs from
/// the number of columns.
pub fn from_columns(
    columns: &[String],
    rows: Vec<Vec<Value>>,
) -> Result<Vec<CostRecord>, CostProviderError> {
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            if row.len() != columns.len() {
                return Err(CostProviderError::Protocol(format!(
                    "row {index} has {} values but {} columns were declared",
                    row.len(),
                    columns.len()
                )));
            }
            Ok(columns.iter().cloned().zip(row).collect())
        })
        .collect()
}

/// Parse comma-delimited text with a header line.
///
/// Quoted fields may contain commas, doubled quotes and line breaks. A
/// leading byte-order mark and blank lines are ignored. Values stay strings.
///
/// # Errors
///
/// Returns [`CostProviderError::Protocol`] if a data line's width differs
/// from the header's.
pub fn from_delimited(text: &str) -> Result<Vec<CostRecord>, CostProviderError> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut lines = split_records(text).into_iter();

    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };

    let rows = lines
        .map(|fields| fields.into_iter().map(Value::String).collect())
        .collect();
    from_columns(&header, rows)
}

/// Split delimited text into records of fields, honoring quotes.
fn split_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    // Set once the current record has any content, so blank lines are dropped.
    let mut touched = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                touched = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                touched = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                if touched {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                touched = false;
            }
            _ => {
                field.push(c);
                touched = true;
            }
        }
    }

    if touched {
        record.push(field);
        records.push(record);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_from_columns_zips_in_order() {
        let records = from_columns(
            &columns(&["cost", "date"]),
            vec![vec![json!(1.5), json!("2024-01-01")], vec![json!(2.0), json!("2024-01-02")]],
        )
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("cost"), Some(&json!(1.5)));
        assert_eq!(records[0].get("date"), Some(&json!("2024-01-01")));
        assert_eq!(records[1].get("cost"), Some(&json!(2.0)));
        assert_eq!(records[1].get("date"), Some(&json!("2024-01-02")));
        assert_eq!(records[0].columns().collect::<Vec<_>>(), vec!["cost", "date"]);
    }

    #[test]
    fn test_from_columns_service_costs() {
        let records = from_columns(
            &columns(&["service", "cost"]),
            vec![vec![json!("A"), json!(5)], vec![json!("B"), json!(7)]],
        )
        .unwrap();

        let maps: Vec<_> = records.into_iter().map(CostRecord::into_inner).collect();
        assert_eq!(
            maps,
            vec![
                json!({"service": "A", "cost": 5}).as_object().cloned().unwrap(),
                json!({"service": "B", "cost": 7}).as_object().cloned().unwrap(),
            ]
        );
    }

    #[test]
    fn test_from_columns_keeps_declared_column_order() {
        let records = from_columns(
            &columns(&["zeta", "alpha", "mid"]),
            vec![vec![json!(1), json!(2), json!(3)]],
        )
        .unwrap();
        assert_eq!(records[0].columns().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_from_columns_rejects_width_mismatch() {
        let err = from_columns(&columns(&["a", "b"]), vec![vec![json!(1)]]).unwrap_err();
        assert!(matches!(err, CostProviderError::Protocol(_)));
    }

    #[test]
    fn test_from_delimited_basic() {
        let records = from_delimited("Date,Cost\n2024-01-01,1.50\n2024-01-02,2.25\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("Cost"), Some(&json!("2.25")));
    }

    #[test]
    fn test_from_delimited_quoting() {
        let text = "Name,Note\r\n\"Storage, Hot\",\"said \"\"hi\"\"\"\r\n\"multi\nline\",x\r\n";
        let records = from_delimited(text).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("Name"), Some(&json!("Storage, Hot")));
        assert_eq!(records[0].get("Note"), Some(&json!("said \"hi\"")));
        assert_eq!(records[1].get("Name"), Some(&json!("multi\nline")));
    }

    #[test]
    fn test_from_delimited_strips_bom_and_blank_lines() {
        let records = from_delimited("\u{feff}a,b\n1,2\n\n\n").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].columns().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_from_delimited_keeps_empty_fields() {
        let records = from_delimited("a,b,c\n1,,\n").unwrap();
        assert_eq!(records[0].get("b"), Some(&json!("")));
        assert_eq!(records[0].get("c"), Some(&json!("")));
    }

    #[test]
    fn test_from_delimited_header_only() {
        assert!(from_delimited("a,b\n").unwrap().is_empty());
        assert!(from_delimited("").unwrap().is_empty());
    }
}
