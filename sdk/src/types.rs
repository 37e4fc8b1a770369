//! Wire types shared between the dispatcher and its collaborators

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// A spreadsheet operation request as typed by the user after `excel:`
///
/// `op` is any string and every other field is optional. The operation gateway decides what is allowed and which
/// fields each operation needs.
///
/// ```
/// use sdk::types::OperationSpec;
///
/// let spec: OperationSpec =
///     serde_json::from_str(r#"{"op": "write_cell", "file": "d.xlsx", "cell": "A1", "value": 3}"#)
///         .unwrap();
/// assert_eq!(spec.op, "write_cell");
/// assert_eq!(spec.cell.as_deref(), Some("A1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Requested operation name
    pub op: String,

    /// Target document path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Sheet name; defaults to the first sheet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,

    /// A1-style cell reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,

    /// Value for `write_cell`; an explicit `null` is kept as `Some(Value::Null)`
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<serde_json::Value>,

    /// Values for `append_row`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<Vec<serde_json::Value>>,
}

/// Any value that is present, `null` included
fn present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl OperationSpec {
    /// Create a spec for the given operation and document
    pub fn new(op: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            op: op.into(),
            file: Some(file.into()),
            ..Default::default()
        }
    }

    /// Set the sheet name
    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    /// Set the cell reference
    pub fn with_cell(mut self, cell: impl Into<String>) -> Self {
        self.cell = Some(cell.into());
        self
    }

    /// Set the value to write
    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Set the row to append
    pub fn with_row(mut self, row: Vec<serde_json::Value>) -> Self {
        self.row = Some(row);
        self
    }
}

/// One result returned by a search provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub href: String,
}

impl SearchHit {
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spec_without_file_parses() {
        let spec: OperationSpec = serde_json::from_str(r#"{"op": "list_sheets"}"#).unwrap();
        assert_eq!(spec.op, "list_sheets");
        assert!(spec.file.is_none());
    }

    #[test]
    fn test_spec_requires_op() {
        let result = serde_json::from_str::<OperationSpec>(r#"{"file": "d.xlsx"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_null_value_differs_from_absent() {
        let cleared: OperationSpec =
            serde_json::from_str(r#"{"op": "write_cell", "cell": "A1", "value": null}"#).unwrap();
        assert_eq!(cleared.value, Some(serde_json::Value::Null));

        let absent: OperationSpec =
            serde_json::from_str(r#"{"op": "write_cell", "cell": "A1"}"#).unwrap();
        assert_eq!(absent.value, None);
    }

    #[test]
    fn test_builder() {
        let spec = OperationSpec::new("append_row", "d.xlsx")
            .with_sheet("Budget")
            .with_row(vec![json!("rent"), json!(1200)]);
        assert_eq!(spec.sheet.as_deref(), Some("Budget"));
        assert_eq!(spec.row.as_ref().map(Vec::len), Some(2));
    }
}
