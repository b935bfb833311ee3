//! JSON tree transform engine.
//!
//! Applies an ordered list of path-addressed edits to a `serde_json::Value`.
//! Paths may contain `*` (every child) and `**` (every descendant) wildcards;
//! each operation resolves its targets against the document as it stands
//! when the operation starts, gates them with optional conditions, checks
//! target-count constraints, and commits only if everything succeeded.

pub mod condition;
pub mod ops;
pub mod path;
pub mod resolve;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use condition::{deep_equal, Condition, ValueKind};
pub use ops::{OpKind, Operation, OperationSpec, TargetConstraints};
pub use path::{JsonPath, Segment};
pub use resolve::resolve;
pub use sitepipe_types::TransformError;

/// Keeps an explicit `null` as `Some(Value::Null)` instead of collapsing it
/// into "field absent".
pub(crate) fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Result of a single operation within a batch.
#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub index: usize,
    pub op: String,
    pub path: String,
    pub ok: bool,
    pub targets: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub cause: Option<TransformError>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformReport {
    pub operations: Vec<OperationReport>,
    pub applied: usize,
    pub failed: usize,
}

impl TransformReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn first_error(&self) -> Option<&OperationReport> {
        self.operations.iter().find(|r| !r.ok)
    }

    fn record(&mut self, report: OperationReport) {
        if report.ok {
            self.applied += 1;
        } else {
            self.failed += 1;
        }
        self.operations.push(report);
    }
}

fn describe_raw(raw: &Value) -> (String, String) {
    let field = |key: &str| {
        raw.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    (field("op"), field("path"))
}

/// Apply `operations` to `doc` in order.
///
/// In strict mode the first failing operation aborts the batch and its error
/// is returned; operations already applied stay applied. Otherwise every
/// failure is recorded in the report and processing continues.
pub fn apply_operations(
    doc: &mut Value,
    operations: &[Value],
    strict: bool,
) -> Result<TransformReport, TransformError> {
    let mut report = TransformReport::default();

    for (index, raw) in operations.iter().enumerate() {
        let (op_name, path) = describe_raw(raw);
        let result = Operation::from_value(raw).and_then(|op| op.apply(doc));

        match result {
            Ok(targets) => {
                tracing::debug!(index, op = %op_name, path = %path, targets, "Operation applied");
                report.record(OperationReport {
                    index,
                    op: op_name,
                    path,
                    ok: true,
                    targets,
                    error: None,
                    cause: None,
                });
            }
            Err(e) => {
                if strict {
                    tracing::debug!(index, op = %op_name, error = %e, "Operation failed, aborting");
                    return Err(e);
                }
                tracing::warn!(index, op = %op_name, path = %path, error = %e, "Operation failed");
                report.record(OperationReport {
                    index,
                    op: op_name,
                    path,
                    ok: false,
                    targets: 0,
                    error: Some(e.to_string()),
                    cause: Some(e),
                });
            }
        }
    }

    Ok(report)
}
