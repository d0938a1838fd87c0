use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Opaque reference to a live control on a host page.
///
/// Handles are positions in the page's control arena, in document order.
/// They are never serialized toward the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlHandle(pub usize);

/// Structural rules declared on a control, captured verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        !self.required
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.min.is_none()
            && self.max.is_none()
            && self.pattern.is_none()
    }
}

/// Serializable description of one fillable control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Input type tag: `text`, `email`, `checkbox`, `textarea`, `select-one`, ...
    pub kind: String,
    /// Best-effort human-readable label. Empty when nothing could be found.
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
    /// Option labels for `<select>` controls.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FieldDescriptor {
    pub fn is_identified(&self) -> bool {
        !self.identity.trim().is_empty()
    }

    pub fn is_choice(&self) -> bool {
        matches!(self.kind.as_str(), "checkbox" | "radio")
    }
}

/// All fillable fields found in one page scan.
///
/// `fields` and `handles` are index-aligned: `handles[i]` is the live control
/// described by `fields[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormContext {
    pub url: Option<String>,
    pub fields: Vec<FieldDescriptor>,
    pub handles: Vec<ControlHandle>,
}

impl FormContext {
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            fields: Vec::new(),
            handles: Vec::new(),
        }
    }

    pub fn push(&mut self, field: FieldDescriptor, handle: ControlHandle) {
        self.fields.push(field);
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields that may be sent to the model, with their handles.
    pub fn identified(&self) -> impl Iterator<Item = (&FieldDescriptor, ControlHandle)> {
        self.fields
            .iter()
            .zip(self.handles.iter().copied())
            .filter(|(field, _)| field.is_identified())
    }

    /// Distinct identities of the identified fields, in scan order.
    pub fn identities(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (field, _) in self.identified() {
            if !out.contains(&field.identity) {
                out.push(field.identity.clone());
            }
        }
        out
    }

    /// Values currently present in identified fields, keyed by identity.
    /// Empty values are skipped.
    pub fn observed_values(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut observed = serde_json::Map::new();
        for (field, _) in self.identified() {
            let Some(value) = field.current_value.as_deref() else {
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }
            observed
                .entry(field.identity.clone())
                .or_insert_with(|| serde_json::Value::String(value.to_string()));
        }
        observed
    }

    /// Stable fingerprint of the form's shape (identities and kinds).
    pub fn signature(&self) -> String {
        let mut hasher = Sha1::new();
        for field in &self.fields {
            hasher.update(field.identity.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(field.kind.as_bytes());
            hasher.update(b"\x1e");
        }
        format!("{:x}", hasher.finalize())
    }
}
