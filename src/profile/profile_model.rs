use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::round::error::AutofillError;

/// Key under which the label → values profile shape keeps its entries.
pub const COMMON_FIELDS_KEY: &str = "commonFields";

/// Key every flat profile is expected to carry.
pub const FLAT_IDENTITY_KEY: &str = "fullName";

/// The two profile layouts seen in stored data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileShape {
    /// Personal fields at the top level: `{"fullName": ..., "emails": [...]}`.
    Flat,
    /// `{"commonFields": {"Email": ["..."], ...}}`.
    CommonFields,
}

impl ProfileShape {
    /// The top-level key a model answer must contain to be adopted.
    pub fn identity_key(self) -> &'static str {
        match self {
            ProfileShape::Flat => FLAT_IDENTITY_KEY,
            ProfileShape::CommonFields => COMMON_FIELDS_KEY,
        }
    }
}

/// The user's personal data: field identity → one or many known values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(pub Map<String, Value>);

impl Profile {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_value(value: Value) -> Result<Self, AutofillError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(AutofillError::ShapeInvalid(format!(
                "a profile must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn shape(&self) -> ProfileShape {
        match self.0.get(COMMON_FIELDS_KEY) {
            Some(Value::Object(_)) => ProfileShape::CommonFields,
            _ => ProfileShape::Flat,
        }
    }

    /// All known values for a top-level key, flattened to a list.
    pub fn values_of(&self, key: &str) -> Vec<Value> {
        match self.0.get(key) {
            None | Some(Value::Null) => vec![],
            Some(Value::Array(items)) => items.iter().filter(|v| !v.is_null()).cloned().collect(),
            Some(other) => vec![other.clone()],
        }
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Starter profile written by `profile init` when nothing is stored yet.
pub fn default_profile() -> Profile {
    let value = json!({
        "fullName": "Jane Doe",
        "preferredName": "Jane",
        "occupation": "Software Engineer",
        "phone": ["555-0100"],
        "emails": ["user@example.com"],
        "address": "100 Main Street",
        "city": "Springfield",
        "country": "United States",
        "zipcode": "90210",
        "dob": "1990-01-15"
    });
    match value {
        Value::Object(map) => Profile(map),
        _ => Profile::new(),
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
