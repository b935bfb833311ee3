//! Per-target conditions (`when` / `fromWhen`) gating whether an operation
//! touches a resolved target.

use serde::Deserialize;
use serde_json::Value;
use sitepipe_types::TransformError;

use crate::path::JsonPath;
use crate::resolve::get;

/// Runtime kind of a JSON value, as named in `"type"` checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Null,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }
}

/// A set of checks against the value at a target. All present checks must
/// hold; an empty condition always holds.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Condition {
    /// Optional path relative to the target being tested.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub exists: Option<bool>,
    #[serde(default, rename = "type")]
    pub kind: Option<ValueKind>,
    #[serde(default, deserialize_with = "crate::present")]
    pub equals: Option<Value>,
    #[serde(default, deserialize_with = "crate::present")]
    pub not_equals: Option<Value>,
}

impl Condition {
    /// The relative path as a parsed [`JsonPath`]; the target itself when absent.
    pub fn relative_path(&self) -> Result<JsonPath, TransformError> {
        let relative = match &self.path {
            Some(raw) => JsonPath::parse(raw)?,
            None => JsonPath::root(),
        };
        if relative.has_wildcards() {
            return Err(TransformError::InvalidOperation(format!(
                "condition path '{relative}' must not contain wildcards"
            )));
        }
        Ok(relative)
    }

    /// Evaluate against the current document for one resolved target.
    pub fn evaluate(&self, root: &Value, target: &JsonPath) -> Result<bool, TransformError> {
        let at = target.join(&self.relative_path()?);
        Ok(self.matches(get(root, &at)))
    }

    /// Evaluate against a value that may be absent. Checks that need a value
    /// (`type`, `equals`, `notEquals`) are false when there is none.
    pub fn matches(&self, current: Option<&Value>) -> bool {
        if let Some(expected) = self.exists {
            if current.is_some() != expected {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            match current {
                Some(value) if ValueKind::of(value) == kind => {}
                _ => return false,
            }
        }
        if let Some(expected) = &self.equals {
            match current {
                Some(value) if deep_equal(value, expected) => {}
                _ => return false,
            }
        }
        if let Some(unexpected) = &self.not_equals {
            match current {
                Some(value) if !deep_equal(value, unexpected) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Structural equality that treats `1` and `1.0` as the same number.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x == y {
                return true;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(fx), Some(fy)) => (x.is_f64() || y.is_f64()) && fx == fy,
                _ => false,
            }
        }
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, xv)| ym.get(k).is_some_and(|yv| deep_equal(xv, yv)))
        }
        _ => a == b,
    }
}
