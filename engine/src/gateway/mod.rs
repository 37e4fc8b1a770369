//! Operation Gateway
//!
//! The only place the assistant is allowed to change a user's documents.
//! Every request passes two gates before anything touches disk:
//!
//! 1. The operation must be on the allowlist
//! 2. A target document path must be present
//!
//! Each call performs exactly one read or one mutation. Mutations are saved
//! before `execute` returns; reads never save. Failures come back as
//! `GatewayError` values and are never fatal to the caller.

mod workbook;

use sdk::errors::EngineError;
use sdk::types::OperationSpec;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// The operations the gateway knows how to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateDocument,
    WriteCell,
    AppendRow,
    ReadCell,
    ListSheets,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::CreateDocument,
        Operation::WriteCell,
        Operation::AppendRow,
        Operation::ReadCell,
        Operation::ListSheets,
    ];

    /// Resolve a wire name; both snake_case and camelCase spellings are accepted
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "create_workbook" | "createDocument" => Some(Self::CreateDocument),
            "write_cell" | "writeCell" => Some(Self::WriteCell),
            "append_row" | "appendRow" => Some(Self::AppendRow),
            "read_cell" | "readCell" => Some(Self::ReadCell),
            "list_sheets" | "listSheets" => Some(Self::ListSheets),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CreateDocument => "create_workbook",
            Self::WriteCell => "write_cell",
            Self::AppendRow => "append_row",
            Self::ReadCell => "read_cell",
            Self::ListSheets => "list_sheets",
        }
    }

    /// Whether the operation saves the document
    pub fn is_mutating(self) -> bool {
        !matches!(self, Self::ReadCell | Self::ListSheets)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Operation not allowed: {0}")]
    OperationNotAllowed(String),

    #[error("A document path is required")]
    FileRequired,

    #[error("Document not found: {0:?}")]
    FileNotFound(PathBuf),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid cell reference: {0}")]
    InvalidCell(String),

    #[error("Failed to write document: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable machine-readable code used in replies
    pub fn code(&self) -> &'static str {
        match self {
            Self::OperationNotAllowed(_) => "operation_not_allowed",
            Self::FileRequired => "file_required",
            Self::FileNotFound(_) => "file_not_found",
            Self::SheetNotFound(_) => "sheet_not_found",
            Self::MissingField(_) => "missing_field",
            Self::InvalidCell(_) => "invalid_cell",
            Self::Io(_) => "io_failure",
            Self::Internal(_) => "internal",
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            Self::OperationNotAllowed(_) | Self::FileRequired | Self::FileNotFound(_) => None,
            Self::SheetNotFound(name) => Some(name.clone()),
            Self::MissingField(field) => Some(field.to_string()),
            Self::InvalidCell(cell) => Some(cell.clone()),
            Self::Io(msg) | Self::Internal(msg) => Some(msg.clone()),
        }
    }
}

impl From<GatewayError> for EngineError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::OperationNotAllowed(op) => EngineError::OperationNotAllowed(op),
            GatewayError::FileRequired => EngineError::FileRequired,
            GatewayError::FileNotFound(path) => EngineError::FileNotFound(path),
            GatewayError::Io(msg) => EngineError::Persistence(msg),
            GatewayError::Internal(msg) => EngineError::Internal(msg),
            other => EngineError::Validation(other.to_string()),
        }
    }
}

/// Successful result of one operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Created(PathBuf),
    Written,
    Appended { row: u32 },
    Value(Option<String>),
    Sheets(Vec<String>),
}

/// Render a gateway result as the JSON object shown to the user
///
/// Successes carry `"ok": true`; failures carry an `"error"` code.
pub fn reply_json(result: &Result<OperationOutcome, GatewayError>) -> Value {
    match result {
        Ok(OperationOutcome::Created(file)) => {
            json!({"ok": true, "message": format!("Created {}", file.display())})
        }
        Ok(OperationOutcome::Written) => json!({"ok": true}),
        Ok(OperationOutcome::Appended { row }) => json!({"ok": true, "row": row}),
        Ok(OperationOutcome::Value(value)) => json!({"ok": true, "value": value}),
        Ok(OperationOutcome::Sheets(sheets)) => json!({"ok": true, "sheets": sheets}),
        Err(err) => match err.detail() {
            Some(detail) => json!({"error": err.code(), "detail": detail}),
            None => json!({"error": err.code()}),
        },
    }
}

/// Allowlist-checked executor for spreadsheet operations
#[derive(Debug, Clone)]
pub struct OperationGateway {
    allowlist: HashSet<Operation>,
}

impl OperationGateway {
    /// Creates a gateway that allows all five document operations
    pub fn new() -> Self {
        Self {
            allowlist: Operation::ALL.into_iter().collect(),
        }
    }

    /// Creates a gateway with a narrower allowlist
    pub fn with_allowlist(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            allowlist: operations.into_iter().collect(),
        }
    }

    pub fn is_allowed(&self, op: Operation) -> bool {
        self.allowlist.contains(&op)
    }

    /// Run the allowlist and path gates without touching disk
    pub fn validate<'a>(
        &self,
        spec: &'a OperationSpec,
    ) -> Result<(Operation, &'a Path), GatewayError> {
        // Gate 1: operation must be allowlisted
        let op = Operation::from_name(&spec.op)
            .filter(|op| self.is_allowed(*op))
            .ok_or_else(|| GatewayError::OperationNotAllowed(spec.op.clone()))?;

        // Gate 2: a document path must be given
        let file = spec
            .file
            .as_deref()
            .filter(|f| !f.as_os_str().is_empty())
            .ok_or(GatewayError::FileRequired)?;

        Ok((op, file))
    }

    /// Execute one operation
    ///
    /// `create_workbook` overwrites an existing document. Every other
    /// operation requires the document to exist already.
    pub fn execute(&self, spec: &OperationSpec) -> Result<OperationOutcome, GatewayError> {
        let (op, file) = self.validate(spec)?;
        info!("Document operation {} on {:?}", op, file);

        let result = match op {
            Operation::CreateDocument => workbook::create(file),
            _ => {
                if !file.exists() {
                    return Err(GatewayError::FileNotFound(file.to_path_buf()));
                }
                workbook::apply(op, file, spec)
            }
        };

        if let Err(e) = &result {
            warn!("Document operation {} failed: {}", op, e);
        }
        result
    }
}

impl Default for OperationGateway {
    fn default() -> Self {
        Self::new()
    }
}
