//! Column-keyed log entries and their serializations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Log columns. The set is closed: every entry is a mapping from one of
/// these codes to a string value.
pub mod column {
    /// Local date, `YYYY-MM-DD`
    pub const DATE_YMD: i64 = 0;
    /// Local date and time, second precision
    pub const DATE_YMD_HMS: i64 = 1;
    /// Local date and time, nanosecond precision
    pub const DATE_YMD_HMS_NANO: i64 = 2;
    /// Unix timestamp in seconds
    pub const TIMESTAMP: i64 = 3;
    /// Service name
    pub const SERVICE: i64 = 4;
    /// Instance name
    pub const INSTANCE: i64 = 5;
    /// Logical caller the entry is attributed to
    pub const CALLER: i64 = 6;
    /// Short message type, `ERR` or `MSG`
    pub const MSG_TYPE_SHORT: i64 = 7;
    /// Integer message code
    pub const MSG_TYPE_INT: i64 = 8;
    /// Symbolic message code name
    pub const MSG_TYPE_STR: i64 = 9;
    /// Formatted message
    pub const MSG: i64 = 10;
    /// Source file of the call site
    pub const FILE: i64 = 11;
    /// Source line of the call site
    pub const LINE: i64 = 12;
}

/// All column codes in emission order
pub const COLUMNS: [i64; 13] = [
    column::DATE_YMD,
    column::DATE_YMD_HMS,
    column::DATE_YMD_HMS_NANO,
    column::TIMESTAMP,
    column::SERVICE,
    column::INSTANCE,
    column::CALLER,
    column::MSG_TYPE_SHORT,
    column::MSG_TYPE_INT,
    column::MSG_TYPE_STR,
    column::MSG,
    column::FILE,
    column::LINE,
];

/// Returns a column's display name, used for logfile headers and the
/// JSON serialization. All date variants share the `Date` name.
pub fn colname(col: i64) -> &'static str {
    match col {
        column::DATE_YMD | column::DATE_YMD_HMS | column::DATE_YMD_HMS_NANO
        | column::TIMESTAMP => "Date",
        column::SERVICE => "Service",
        column::INSTANCE => "Instance",
        column::CALLER => "Caller",
        column::MSG_TYPE_SHORT => "Type",
        column::MSG_TYPE_INT => "Type_INT",
        column::MSG_TYPE_STR => "Type_STR",
        column::MSG => "Message",
        column::FILE => "File",
        column::LINE => "Line",
        _ => "Unknown",
    }
}

/// Default column selection used when a config does not override it
pub fn default_columns() -> Vec<i64> {
    vec![
        column::DATE_YMD_HMS_NANO,
        column::SERVICE,
        column::INSTANCE,
        column::CALLER,
        column::MSG_TYPE_SHORT,
        column::MSG_TYPE_INT,
        column::MSG_TYPE_STR,
        column::MSG,
        column::FILE,
        column::LINE,
    ]
}

/// Returns the tab-joined column headers for a column selection
pub fn header_line(cols: &[i64]) -> String {
    cols.iter()
        .map(|c| colname(*c))
        .collect::<Vec<_>>()
        .join("\t")
}

const FORBIDDEN: &[char] = &['\t', '\n', '\r', '\u{8}', '\u{c}', '\u{b}'];

/// A structured log entry: an immutable mapping from column code to value.
///
/// Entries are created by the `Logger` at ingestion or arrive over the
/// wire already populated. Values are sanitized before emission: control
/// characters that would break the tab form are replaced with a single
/// space and empty values become the literal `N/A`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entry(BTreeMap<i64, String>);

impl Entry {
    /// Create an empty entry
    pub fn new() -> Self {
        Entry(BTreeMap::new())
    }

    /// Set a column value
    pub fn insert(&mut self, col: i64, value: impl Into<String>) {
        self.0.insert(col, value.into());
    }

    /// Get a column value
    pub fn get(&self, col: i64) -> Option<&str> {
        self.0.get(&col).map(String::as_str)
    }

    /// Whether a column is present
    pub fn contains(&self, col: i64) -> bool {
        self.0.contains_key(&col)
    }

    /// Replace control characters with spaces and empty values with `N/A`.
    /// The pass is idempotent.
    pub fn sanitize(&mut self) {
        for value in self.0.values_mut() {
            if value.is_empty() {
                *value = "N/A".to_string();
            } else if value.contains(FORBIDDEN) {
                *value = value
                    .chars()
                    .map(|c| if FORBIDDEN.contains(&c) { ' ' } else { c })
                    .collect();
            }
        }
    }

    /// Tab-delimited form over the given column selection. Missing
    /// columns emit as empty fields; the trailing tab is preserved.
    pub fn to_tab(&self, cols: &[i64]) -> String {
        let mut line = String::new();
        for col in cols {
            line.push_str(self.get(*col).unwrap_or(""));
            line.push('\t');
        }
        line
    }

    /// JSON object form over the given column selection, keyed by the
    /// column display names
    pub fn to_json(&self, cols: &[i64]) -> crate::Result<String> {
        let mut named = BTreeMap::new();
        for col in cols {
            named.insert(colname(*col), self.get(*col).unwrap_or(""));
        }
        Ok(serde_json::to_string(&named)?)
    }
}

impl FromIterator<(i64, String)> for Entry {
    fn from_iter<T: IntoIterator<Item = (i64, String)>>(iter: T) -> Self {
        Entry(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pairs: &[(i64, &str)]) -> Entry {
        pairs
            .iter()
            .map(|(c, v)| (*c, v.to_string()))
            .collect()
    }

    #[test]
    fn test_sanitize_replaces_control_characters() {
        let mut e = entry(&[(column::MSG, "a\tb\nc\rd\u{8}e\u{c}f\u{b}g")]);
        e.sanitize();
        assert_eq!(e.get(column::MSG), Some("a b c d e f g"));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let mut e = entry(&[
            (column::MSG, "line\nbreak"),
            (column::CALLER, ""),
            (column::SERVICE, "plain"),
        ]);
        e.sanitize();
        let once = e.clone();
        e.sanitize();
        assert_eq!(e, once);
    }

    #[test]
    fn test_sanitize_empty_value_becomes_na() {
        let mut e = entry(&[(column::SERVICE, ""), (column::MSG, "hi")]);
        e.sanitize();
        assert_eq!(e.get(column::SERVICE), Some("N/A"));
        assert_eq!(e.get(column::MSG), Some("hi"));
    }

    #[test]
    fn test_to_tab_preserves_trailing_tab() {
        let e = entry(&[(column::SERVICE, "svc"), (column::MSG, "hello")]);
        let line = e.to_tab(&[column::SERVICE, column::MSG]);
        assert_eq!(line, "svc\thello\t");
    }

    #[test]
    fn test_to_tab_missing_column_is_empty_field() {
        let e = entry(&[(column::SERVICE, "svc")]);
        let line = e.to_tab(&[column::SERVICE, column::MSG]);
        assert_eq!(line, "svc\t\t");
    }

    #[test]
    fn test_to_json_uses_display_names() {
        let e = entry(&[(column::SERVICE, "svc"), (column::MSG, "hello")]);
        let json = e.to_json(&[column::SERVICE, column::MSG]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["Service"], "svc");
        assert_eq!(parsed["Message"], "hello");
    }

    #[test]
    fn test_serde_roundtrip() {
        let e = entry(&[(column::SERVICE, "svc"), (column::LINE, "42")]);
        let bytes = serde_json::to_vec(&e).unwrap();
        let back: Entry = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(e, back);
    }

    #[test]
    fn test_header_line() {
        let cols = [column::DATE_YMD_HMS_NANO, column::SERVICE, column::MSG];
        assert_eq!(header_line(&cols), "Date\tService\tMessage");
    }

    #[test]
    fn test_colname_unknown() {
        assert_eq!(colname(99), "Unknown");
    }
}
