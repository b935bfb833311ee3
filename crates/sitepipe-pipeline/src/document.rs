//! Pipeline document loading with `extends` inheritance.
//!
//! A document may name one or more base documents through `extends`. Bases
//! are loaded recursively, merged in listed order (first listed has the
//! lowest priority), and the document's own content is overlaid last. Step
//! lists concatenate instead of being replaced, so a base's steps always run
//! before the steps of documents extending it.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use sitepipe_types::{PipelineError, Result};

/// Reserved top-level key whose arrays concatenate on merge.
pub const STEPS_KEY: &str = "steps";
pub const EXTENDS_KEY: &str = "extends";

/// A fully merged pipeline document.
#[derive(Debug, Clone)]
pub struct PipelineDocument {
    /// Canonical path of the entry document.
    pub path: PathBuf,
    /// Directory step paths are resolved against.
    pub base_dir: PathBuf,
    /// Merged JSON with every `extends` key removed.
    pub root: Value,
}

impl PipelineDocument {
    /// Wrap an in-memory document. `extends` is not followed.
    pub fn from_value(path: impl Into<PathBuf>, root: Value) -> Result<Self> {
        let path = path.into();
        check_shape(&path, &root)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            path,
            base_dir,
            root,
        })
    }

    /// The merged step list, empty when the document declares none.
    pub fn steps(&self) -> &[Value] {
        self.root
            .get(STEPS_KEY)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Load `path`, following `extends` references.
pub fn load_document(path: impl AsRef<Path>) -> Result<PipelineDocument> {
    let path = canonical(path.as_ref())?;
    let mut in_progress = Vec::new();
    let root = load_merged(&path, &mut in_progress)?;
    check_shape(&path, &root)?;
    tracing::debug!(
        path = %path.display(),
        steps = root.get(STEPS_KEY).and_then(serde_json::Value::as_array).map_or(0, Vec::len),
        "Pipeline document loaded"
    );
    PipelineDocument::from_value(path, root)
}

fn canonical(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|_| PipelineError::DocumentNotFound {
        path: path.to_path_buf(),
    })
}

fn load_merged(path: &Path, in_progress: &mut Vec<PathBuf>) -> Result<Value> {
    if in_progress.iter().any(|p| p == path) {
        let chain = in_progress
            .iter()
            .chain(std::iter::once(&path.to_path_buf()))
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(PipelineError::InheritanceCycle { chain });
    }

    let mut own = read_json(path)?;
    let bases = take_extends(path, &mut own)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    in_progress.push(path.to_path_buf());
    let mut merged = Value::Object(Map::new());
    for base in bases {
        let base_path = canonical(&dir.join(&base))?;
        tracing::trace!(document = %path.display(), base = %base_path.display(), "Following extends");
        let base_doc = load_merged(&base_path, in_progress)?;
        merged = deep_merge(merged, base_doc);
    }
    in_progress.pop();

    Ok(deep_merge(merged, own))
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::DocumentNotFound {
            path: path.to_path_buf(),
        },
        _ => PipelineError::MalformedDocument {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
    })?;
    let value: Value =
        serde_json::from_str(&text).map_err(|e| PipelineError::MalformedDocument {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    if !value.is_object() {
        return Err(PipelineError::MalformedDocument {
            path: path.to_path_buf(),
            message: "top level must be a JSON object".into(),
        });
    }
    Ok(value)
}

/// Remove `extends` from `doc` and return its entries.
fn take_extends(path: &Path, doc: &mut Value) -> Result<Vec<String>> {
    let Some(raw) = doc.as_object_mut().and_then(|m| m.remove(EXTENDS_KEY)) else {
        return Ok(Vec::new());
    };
    let malformed = |message: &str| PipelineError::MalformedDocument {
        path: path.to_path_buf(),
        message: message.to_string(),
    };
    match raw {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                _ => Err(malformed("'extends' entries must be strings")),
            })
            .collect(),
        _ => Err(malformed("'extends' must be a string or a list of strings")),
    }
}

fn check_shape(path: &Path, root: &Value) -> Result<()> {
    let Some(map) = root.as_object() else {
        return Err(PipelineError::MalformedDocument {
            path: path.to_path_buf(),
            message: "top level must be a JSON object".into(),
        });
    };
    match map.get(STEPS_KEY) {
        None | Some(Value::Array(_)) => Ok(()),
        Some(_) => Err(PipelineError::MalformedDocument {
            path: path.to_path_buf(),
            message: "'steps' must be an array".into(),
        }),
    }
}

/// Overlay `overlay` onto `base`.
///
/// Objects merge key by key, recursively. Top-level `steps` arrays
/// concatenate (base first). Anything else is replaced by the overlay.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    merge_at(base, overlay, true)
}

fn merge_at(base: Value, overlay: Value, top_level: bool) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(Value::Array(mut existing)) if top_level && key == STEPS_KEY => {
                        match value {
                            Value::Array(more) => {
                                existing.extend(more);
                                Value::Array(existing)
                            }
                            other => other,
                        }
                    }
                    Some(existing) => merge_at(existing, value, false),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}
