//! Integration tests for the operation gateway against real .xlsx files

use sdk::types::OperationSpec;
use serde_json::json;
use sophie_engine::gateway::{reply_json, GatewayError, OperationGateway, OperationOutcome};
use tempfile::TempDir;

fn workbook(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("d.xlsx");
    let created = OperationGateway::new().execute(&OperationSpec::new("create_workbook", &path));
    assert!(matches!(created, Ok(OperationOutcome::Created(_))));
    path
}

#[test]
fn test_create_then_list_sheets() {
    let dir = TempDir::new().unwrap();
    let path = workbook(&dir);
    assert!(path.exists());

    let sheets = OperationGateway::new()
        .execute(&OperationSpec::new("list_sheets", &path))
        .unwrap();
    assert_eq!(sheets, OperationOutcome::Sheets(vec!["Sheet1".to_string()]));
}

#[test]
fn test_write_then_read_cell() {
    let dir = TempDir::new().unwrap();
    let path = workbook(&dir);
    let gateway = OperationGateway::new();

    let written = gateway.execute(
        &OperationSpec::new("writeCell", &path)
            .with_cell("b2")
            .with_value(json!("hello")),
    );
    assert_eq!(written.unwrap(), OperationOutcome::Written);

    let read = gateway
        .execute(&OperationSpec::new("read_cell", &path).with_cell("B2"))
        .unwrap();
    assert_eq!(read, OperationOutcome::Value(Some("hello".to_string())));

    let empty = gateway
        .execute(&OperationSpec::new("read_cell", &path).with_cell("Z99"))
        .unwrap();
    assert_eq!(empty, OperationOutcome::Value(None));
    assert_eq!(reply_json(&Ok(empty)), json!({"ok": true, "value": null}));
}

#[test]
fn test_append_rows_go_below_existing_data() {
    let dir = TempDir::new().unwrap();
    let path = workbook(&dir);
    let gateway = OperationGateway::new();

    let first = gateway
        .execute(&OperationSpec::new("append_row", &path).with_row(vec![json!("a"), json!(1)]))
        .unwrap();
    let second = gateway
        .execute(&OperationSpec::new("append_row", &path).with_row(vec![json!("b"), json!(2)]))
        .unwrap();

    assert_eq!(first, OperationOutcome::Appended { row: 1 });
    assert_eq!(second, OperationOutcome::Appended { row: 2 });

    let read = gateway
        .execute(&OperationSpec::new("read_cell", &path).with_cell("A2"))
        .unwrap();
    assert_eq!(read, OperationOutcome::Value(Some("b".to_string())));
}

#[test]
fn test_create_overwrites_existing_document() {
    let dir = TempDir::new().unwrap();
    let path = workbook(&dir);
    let gateway = OperationGateway::new();

    gateway
        .execute(
            &OperationSpec::new("write_cell", &path)
                .with_cell("A1")
                .with_value(json!("old")),
        )
        .unwrap();
    gateway
        .execute(&OperationSpec::new("create_workbook", &path))
        .unwrap();

    let read = gateway
        .execute(&OperationSpec::new("read_cell", &path).with_cell("A1"))
        .unwrap();
    assert_eq!(read, OperationOutcome::Value(None));
}

#[test]
fn test_reads_do_not_modify_document() {
    let dir = TempDir::new().unwrap();
    let path = workbook(&dir);
    let before = std::fs::read(&path).unwrap();

    let gateway = OperationGateway::new();
    gateway
        .execute(&OperationSpec::new("list_sheets", &path))
        .unwrap();
    gateway
        .execute(&OperationSpec::new("read_cell", &path).with_cell("A1"))
        .unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn test_validation_errors() {
    let dir = TempDir::new().unwrap();
    let path = workbook(&dir);
    let gateway = OperationGateway::new();

    let missing_sheet = gateway.execute(
        &OperationSpec::new("read_cell", &path)
            .with_sheet("Budget")
            .with_cell("A1"),
    );
    assert!(matches!(missing_sheet, Err(GatewayError::SheetNotFound(ref s)) if s == "Budget"));

    let missing_cell = gateway.execute(&OperationSpec::new("write_cell", &path));
    assert!(matches!(missing_cell, Err(GatewayError::MissingField("cell"))));

    let before = std::fs::read(&path).unwrap();
    let missing_value = gateway.execute(&OperationSpec::new("write_cell", &path).with_cell("A1"));
    assert!(matches!(missing_value, Err(GatewayError::MissingField("value"))));
    assert_eq!(
        reply_json(&missing_value),
        json!({"error": "missing_field", "detail": "value"})
    );
    assert_eq!(std::fs::read(&path).unwrap(), before);

    let bad_cell = gateway.execute(
        &OperationSpec::new("write_cell", &path)
            .with_cell("A-1")
            .with_value(json!(1)),
    );
    assert!(matches!(bad_cell, Err(GatewayError::InvalidCell(_))));

    let missing_file =
        gateway.execute(&OperationSpec::new("list_sheets", dir.path().join("nope.xlsx")));
    assert!(matches!(missing_file, Err(GatewayError::FileNotFound(_))));
    assert_eq!(reply_json(&missing_file), json!({"error": "file_not_found"}));
}

#[test]
fn test_disallowed_operation_never_touches_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("never.xlsx");

    let result = OperationGateway::new().execute(&OperationSpec::new("delete_file", &path));
    assert!(matches!(result, Err(GatewayError::OperationNotAllowed(_))));
    assert!(!path.exists());
}
