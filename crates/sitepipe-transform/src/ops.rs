//! Operation appliers: set, replace, remove, insert, append, merge, copy, move.

use serde::Deserialize;
use serde_json::Value;
use sitepipe_types::TransformError;

use crate::condition::Condition;
use crate::path::JsonPath;
use crate::resolve::{get, get_mut, kind_name, remove_value, removal_order, resolve, set_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Set,
    Replace,
    Remove,
    Insert,
    Append,
    Merge,
    Copy,
    Move,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Set => "set",
            OpKind::Replace => "replace",
            OpKind::Remove => "remove",
            OpKind::Insert => "insert",
            OpKind::Append => "append",
            OpKind::Merge => "merge",
            OpKind::Copy => "copy",
            OpKind::Move => "move",
        }
    }

    /// Whether the destination may be created when it does not exist yet.
    pub fn creates_targets(&self) -> bool {
        matches!(
            self,
            OpKind::Set | OpKind::Append | OpKind::Merge | OpKind::Copy | OpKind::Move
        )
    }

    fn needs_value(&self) -> bool {
        matches!(
            self,
            OpKind::Set | OpKind::Replace | OpKind::Insert | OpKind::Append | OpKind::Merge
        )
    }
}

/// Operation as written in a transform step's `operations` array.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSpec {
    pub op: OpKind,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default, deserialize_with = "crate::present")]
    pub value: Option<Value>,
    #[serde(default)]
    pub index: Option<i64>,
    #[serde(default)]
    pub when: Option<Condition>,
    #[serde(default)]
    pub from_when: Option<Condition>,
    #[serde(default)]
    pub min_targets: Option<usize>,
    #[serde(default)]
    pub max_targets: Option<usize>,
    #[serde(default)]
    pub exact_targets: Option<usize>,
}

/// Required count of targets an operation must touch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetConstraints {
    pub min: Option<usize>,
    pub max: Option<usize>,
    pub exact: Option<usize>,
}

impl TargetConstraints {
    pub fn new(
        min: Option<usize>,
        max: Option<usize>,
        exact: Option<usize>,
    ) -> Result<Self, TransformError> {
        if exact.is_some() && (min.is_some() || max.is_some()) {
            return Err(TransformError::InvalidOperation(
                "exactTargets cannot be combined with minTargets/maxTargets".into(),
            ));
        }
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(TransformError::InvalidOperation(format!(
                    "minTargets ({lo}) is greater than maxTargets ({hi})"
                )));
            }
        }
        Ok(Self { min, max, exact })
    }

    /// An operation may legitimately match nothing only when it says so.
    pub fn allows_zero(&self) -> bool {
        self.exact == Some(0) || self.min == Some(0)
    }

    pub fn check(&self, path: &str, actual: usize) -> Result<(), TransformError> {
        let violation = |message: String| TransformError::Constraint {
            path: path.to_string(),
            message,
            actual,
        };
        if let Some(exact) = self.exact {
            if actual != exact {
                return Err(violation(format!("expected exactly {exact} targets")));
            }
        }
        if let Some(min) = self.min {
            if actual < min {
                return Err(violation(format!("expected at least {min} targets")));
            }
        }
        if let Some(max) = self.max {
            if actual > max {
                return Err(violation(format!("expected at most {max} targets")));
            }
        }
        Ok(())
    }
}

/// A validated, ready-to-apply operation.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OpKind,
    pub path: JsonPath,
    pub from: Option<JsonPath>,
    pub value: Option<Value>,
    pub index: Option<i64>,
    pub when: Option<Condition>,
    pub from_when: Option<Condition>,
    pub constraints: TargetConstraints,
}

impl Operation {
    /// Parse and validate one entry of an `operations` array.
    pub fn from_value(raw: &Value) -> Result<Self, TransformError> {
        let spec: OperationSpec = serde_json::from_value(raw.clone())
            .map_err(|e| TransformError::InvalidOperation(e.to_string()))?;
        Self::from_spec(spec)
    }

    pub fn from_spec(spec: OperationSpec) -> Result<Self, TransformError> {
        let kind = spec.op;
        let invalid = |msg: &str| TransformError::InvalidOperation(format!("{}: {msg}", kind.as_str()));

        let raw_path = spec.path.ok_or_else(|| invalid("missing 'path'"))?;
        let path = JsonPath::parse(&raw_path)?;

        let from = match (kind, spec.from) {
            (OpKind::Copy | OpKind::Move, Some(raw)) => Some(JsonPath::parse(&raw)?),
            (OpKind::Copy | OpKind::Move, None) => return Err(invalid("missing 'from'")),
            (_, _) => None,
        };

        if kind.needs_value() && spec.value.is_none() {
            return Err(invalid("missing 'value'"));
        }
        if kind == OpKind::Merge && !matches!(spec.value, Some(Value::Object(_))) {
            return Err(invalid("'value' must be an object"));
        }
        if kind == OpKind::Insert && spec.index.is_none() {
            return Err(invalid("missing 'index'"));
        }
        if kind == OpKind::Remove && path.is_root() {
            return Err(invalid("cannot remove the document root"));
        }

        for condition in spec.when.iter().chain(spec.from_when.iter()) {
            condition.relative_path()?;
        }

        Ok(Self {
            kind,
            path,
            from,
            value: spec.value,
            index: spec.index,
            when: spec.when,
            from_when: spec.from_when,
            constraints: TargetConstraints::new(
                spec.min_targets,
                spec.max_targets,
                spec.exact_targets,
            )?,
        })
    }

    /// Apply to `doc` atomically and return the number of targets touched.
    ///
    /// The document is left unchanged when any part of the operation fails,
    /// including a violated target constraint.
    pub fn apply(&self, doc: &mut Value) -> Result<usize, TransformError> {
        let mut working = doc.clone();
        let touched = match self.kind {
            OpKind::Remove => self.apply_remove(&mut working)?,
            OpKind::Copy | OpKind::Move => self.apply_transfer(&mut working)?,
            _ => self.apply_each(&mut working)?,
        };
        self.constraints.check(&self.path.to_string(), touched)?;
        *doc = working;
        Ok(touched)
    }

    fn destinations(&self, doc: &Value) -> Result<Vec<JsonPath>, TransformError> {
        let targets = resolve(doc, &self.path, self.kind.creates_targets());
        if targets.is_empty() && !self.constraints.allows_zero() {
            return Err(TransformError::NoTargets {
                path: self.path.to_string(),
            });
        }
        Ok(targets)
    }

    fn passes(condition: Option<&Condition>, doc: &Value, target: &JsonPath) -> Result<bool, TransformError> {
        match condition {
            Some(c) => c.evaluate(doc, target),
            None => Ok(true),
        }
    }

    fn apply_each(&self, doc: &mut Value) -> Result<usize, TransformError> {
        let mut touched = 0;
        for target in self.destinations(doc)? {
            if !Self::passes(self.when.as_ref(), doc, &target)? {
                tracing::trace!(op = self.kind.as_str(), target = %target, "Condition not met");
                continue;
            }
            self.apply_one(doc, &target)?;
            touched += 1;
        }
        Ok(touched)
    }

    fn apply_one(&self, doc: &mut Value, target: &JsonPath) -> Result<(), TransformError> {
        let value = self.value.clone().unwrap_or(Value::Null);
        let type_mismatch = |expected: &str, found: &str| TransformError::TypeMismatch {
            path: target.to_string(),
            expected: expected.into(),
            found: found.into(),
        };

        match self.kind {
            OpKind::Set => set_value(doc, target, value),
            OpKind::Replace => {
                if get(doc, target).is_none() {
                    return Err(TransformError::NotFound {
                        path: target.to_string(),
                    });
                }
                set_value(doc, target, value)
            }
            OpKind::Insert => {
                let node = get_mut(doc, target).ok_or_else(|| TransformError::NotFound {
                    path: target.to_string(),
                })?;
                let found = kind_name(node);
                let items = node
                    .as_array_mut()
                    .ok_or_else(|| type_mismatch("array", found))?;
                let index = self.index.unwrap_or_default();
                if index < 0 || index as usize > items.len() {
                    return Err(TransformError::IndexOutOfBounds {
                        path: target.to_string(),
                        index,
                        len: items.len(),
                    });
                }
                items.insert(index as usize, value);
                Ok(())
            }
            OpKind::Append => match get_mut(doc, target) {
                None => set_value(doc, target, Value::Array(vec![value])),
                Some(Value::Array(items)) => {
                    items.push(value);
                    Ok(())
                }
                Some(other) => Err(type_mismatch("array", kind_name(other))),
            },
            OpKind::Merge => match get_mut(doc, target) {
                None => set_value(doc, target, value),
                Some(Value::Object(map)) => {
                    if let Value::Object(overlay) = value {
                        map.extend(overlay);
                    }
                    Ok(())
                }
                Some(other) => Err(type_mismatch("object", kind_name(other))),
            },
            OpKind::Remove | OpKind::Copy | OpKind::Move => Err(TransformError::InvalidOperation(
                format!("{} is not a single-target operation", self.kind.as_str()),
            )),
        }
    }

    fn apply_remove(&self, doc: &mut Value) -> Result<usize, TransformError> {
        let targets = resolve(doc, &self.path, false);
        if targets.is_empty() && !self.constraints.allows_zero() {
            return Err(TransformError::NoTargets {
                path: self.path.to_string(),
            });
        }

        // Conditions see the document as it was before any removal.
        let mut selected = Vec::with_capacity(targets.len());
        for target in targets {
            if Self::passes(self.when.as_ref(), doc, &target)? {
                selected.push(target);
            }
        }
        selected.sort_by(removal_order);
        for target in &selected {
            remove_value(doc, target)?;
        }
        Ok(selected.len())
    }

    fn apply_transfer(&self, doc: &mut Value) -> Result<usize, TransformError> {
        let Some(from) = &self.from else {
            return Err(TransformError::InvalidOperation(format!(
                "{}: missing 'from'",
                self.kind.as_str()
            )));
        };

        let resolved = resolve(doc, from, false);
        if resolved.is_empty() {
            if self.constraints.allows_zero() {
                return Ok(0);
            }
            return Err(TransformError::NoTargets {
                path: from.to_string(),
            });
        }

        let mut sources = Vec::new();
        for source in resolved {
            if get(doc, &source).is_none() {
                return Err(TransformError::NotFound {
                    path: source.to_string(),
                });
            }
            if Self::passes(self.from_when.as_ref(), doc, &source)? {
                sources.push(source);
            }
        }
        // Every source was excluded by `fromWhen`; constraints decide.
        if sources.is_empty() {
            return Ok(0);
        }

        let destinations = self.destinations(doc)?;
        let cardinality = |message: String| TransformError::Cardinality {
            from: from.to_string(),
            path: self.path.to_string(),
            message,
        };
        let pairs: Vec<(JsonPath, JsonPath)> =
            match (from.has_wildcards(), self.path.has_wildcards()) {
                (true, false) => {
                    if sources.len() != 1 {
                        return Err(cardinality(format!(
                            "wildcard source matched {} values but the destination is a single path",
                            sources.len()
                        )));
                    }
                    vec![(sources[0].clone(), self.path.clone())]
                }
                (true, true) => {
                    if sources.len() != destinations.len() {
                        return Err(cardinality(format!(
                            "{} sources cannot be paired with {} destinations",
                            sources.len(),
                            destinations.len()
                        )));
                    }
                    sources.into_iter().zip(destinations).collect()
                }
                (false, _) => destinations
                    .into_iter()
                    .map(|dest| (sources[0].clone(), dest))
                    .collect(),
            };

        if self.kind == OpKind::Move {
            if let Some((source, dest)) = pairs.iter().find(|(source, dest)| dest.starts_with(source)) {
                return Err(TransformError::InvalidOperation(format!(
                    "move destination '{dest}' lies inside its source '{source}'"
                )));
            }
        }

        // Read every source before writing anything.
        let mut planned = Vec::with_capacity(pairs.len());
        for (source, dest) in pairs {
            let value = get(doc, &source).cloned().ok_or_else(|| TransformError::NotFound {
                path: source.to_string(),
            })?;
            planned.push((source, dest, value));
        }

        let mut touched = 0;
        let mut moved: Vec<JsonPath> = Vec::new();
        for (source, dest, value) in planned {
            if !Self::passes(self.when.as_ref(), doc, &dest)? {
                continue;
            }
            set_value(doc, &dest, value)?;
            touched += 1;
            if !moved.contains(&source) {
                moved.push(source);
            }
        }

        if self.kind == OpKind::Move {
            moved.sort_by(removal_order);
            for source in &moved {
                remove_value(doc, source).map_err(|e| match e {
                    TransformError::NotFound { path } => TransformError::InvalidOperation(format!(
                        "move source '{path}' was overwritten by its destination"
                    )),
                    other => other,
                })?;
            }
        }
        Ok(touched)
    }
}
