//! Spreadsheet backend for the gateway, built on `umya-spreadsheet`

use super::{GatewayError, Operation, OperationOutcome};
use sdk::types::OperationSpec;
use serde_json::Value;
use std::path::Path;
use umya_spreadsheet::{Spreadsheet, Worksheet};

/// Create a fresh document with one default sheet, replacing any existing file
pub(super) fn create(file: &Path) -> Result<OperationOutcome, GatewayError> {
    let book = umya_spreadsheet::new_file();
    save(&book, file)?;
    Ok(OperationOutcome::Created(file.to_path_buf()))
}

/// Load an existing document, perform `op`, and save if it mutates
pub(super) fn apply(
    op: Operation,
    file: &Path,
    spec: &OperationSpec,
) -> Result<OperationOutcome, GatewayError> {
    let mut book = umya_spreadsheet::reader::xlsx::read(file)
        .map_err(|e| GatewayError::Internal(format!("Failed to open {:?}: {}", file, e)))?;

    let outcome = match op {
        Operation::ListSheets => OperationOutcome::Sheets(
            book.get_sheet_collection()
                .iter()
                .map(|ws| ws.get_name().to_string())
                .collect(),
        ),
        Operation::ReadCell => {
            let cell = required_cell(spec)?;
            let sheet = sheet_ref(&book, spec.sheet.as_deref())?;
            let value = sheet
                .get_cell(cell.as_str())
                .map(|c| c.get_value().to_string())
                .filter(|v| !v.is_empty());
            OperationOutcome::Value(value)
        }
        Operation::WriteCell => {
            let cell = required_cell(spec)?;
            let value = spec
                .value
                .as_ref()
                .ok_or(GatewayError::MissingField("value"))?;
            let sheet = sheet_mut(&mut book, spec.sheet.as_deref())?;
            let target = sheet.get_cell_mut(cell.as_str());
            match value {
                Value::Null => {
                    target.set_value("");
                }
                Value::Bool(b) => {
                    target.set_value_bool(*b);
                }
                Value::Number(n) => match n.as_f64() {
                    Some(f) => {
                        target.set_value_number(f);
                    }
                    None => {
                        target.set_value(n.to_string());
                    }
                },
                Value::String(s) => {
                    target.set_value(s.clone());
                }
                other => {
                    target.set_value(other.to_string());
                }
            }
            OperationOutcome::Written
        }
        Operation::AppendRow => {
            let values = spec.row.clone().unwrap_or_default();
            let sheet = sheet_mut(&mut book, spec.sheet.as_deref())?;
            let row = sheet.get_highest_row() + 1;
            for (i, value) in values.iter().enumerate() {
                let col = i as u32 + 1;
                let target = sheet.get_cell_mut((col, row));
                match value {
                    Value::Null => {}
                    Value::Bool(b) => {
                        target.set_value_bool(*b);
                    }
                    Value::Number(n) => {
                        if let Some(f) = n.as_f64() {
                            target.set_value_number(f);
                        }
                    }
                    Value::String(s) => {
                        target.set_value(s.clone());
                    }
                    other => {
                        target.set_value(other.to_string());
                    }
                }
            }
            OperationOutcome::Appended { row }
        }
        Operation::CreateDocument => return create(file),
    };

    if op.is_mutating() {
        save(&book, file)?;
    }
    Ok(outcome)
}

fn save(book: &Spreadsheet, file: &Path) -> Result<(), GatewayError> {
    if let Some(parent) = file.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| GatewayError::Io(e.to_string()))?;
        }
    }
    umya_spreadsheet::writer::xlsx::write(book, file)
        .map_err(|e| GatewayError::Io(format!("{:?}: {}", file, e)))
}

/// The cell reference, normalized to upper case and checked to be A1-style
fn required_cell(spec: &OperationSpec) -> Result<String, GatewayError> {
    let raw = spec
        .cell
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(GatewayError::MissingField("cell"))?;

    let letters = raw.chars().take_while(char::is_ascii_alphabetic).count();
    let digits = &raw[letters..];
    let valid = (1..=3).contains(&letters)
        && (1..=7).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0');

    if valid {
        Ok(raw.to_ascii_uppercase())
    } else {
        Err(GatewayError::InvalidCell(raw.to_string()))
    }
}

/// The named sheet, or the first sheet when no name is given
fn sheet_ref<'a>(book: &'a Spreadsheet, name: Option<&str>) -> Result<&'a Worksheet, GatewayError> {
    let sheets = book.get_sheet_collection();
    match name {
        Some(name) => sheets.iter().find(|ws| ws.get_name() == name),
        None => sheets.first(),
    }
    .ok_or_else(|| GatewayError::SheetNotFound(name.unwrap_or_default().to_string()))
}

fn sheet_mut<'a>(
    book: &'a mut Spreadsheet,
    name: Option<&str>,
) -> Result<&'a mut Worksheet, GatewayError> {
    let sheets = book.get_sheet_collection_mut();
    match name {
        Some(name) => sheets.iter_mut().find(|ws| ws.get_name() == name),
        None => sheets.first_mut(),
    }
    .ok_or_else(|| GatewayError::SheetNotFound(name.unwrap_or_default().to_string()))
}
