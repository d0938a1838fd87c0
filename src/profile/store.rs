use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::profile::profile_model::Profile;
use crate::round::error::AutofillError;

pub const CREDENTIAL_KEY: &str = "openai_api_key";
pub const PROFILE_KEY: &str = "personalInfo";
pub const SAVED_FORMS_KEY: &str = "savedForms";

/// A timestamped snapshot of a form the user filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedForm {
    pub timestamp: DateTime<Utc>,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub data: Map<String, Value>,
}

/// Persistent key-value storage for the profile, credential and form log.
///
/// Implementations only provide `get`/`set`; the typed accessors are shared.
pub trait ProfileStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, AutofillError>;

    fn set(&self, key: &str, value: Value) -> Result<(), AutofillError>;

    fn credential(&self) -> Result<Option<String>, AutofillError> {
        Ok(self
            .get(CREDENTIAL_KEY)?
            .and_then(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty()))
    }

    fn set_credential(&self, key: &str) -> Result<(), AutofillError> {
        self.set(CREDENTIAL_KEY, Value::String(key.trim().to_string()))
    }

    /// The stored profile, or an empty one if none has been saved.
    fn profile(&self) -> Result<Profile, AutofillError> {
        match self.get(PROFILE_KEY)? {
            None | Some(Value::Null) => Ok(Profile::new()),
            Some(value) => Profile::from_value(value)
                .map_err(|e| AutofillError::Store(format!("stored profile is unreadable: {}", e))),
        }
    }

    fn has_profile(&self) -> Result<bool, AutofillError> {
        Ok(!self.profile()?.is_empty())
    }

    fn save_profile(&self, profile: &Profile) -> Result<(), AutofillError> {
        self.set(PROFILE_KEY, profile.clone().into_value())
    }

    fn saved_forms(&self) -> Result<Vec<SavedForm>, AutofillError> {
        match self.get(SAVED_FORMS_KEY)? {
            None | Some(Value::Null) => Ok(vec![]),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| AutofillError::Store(format!("saved forms log is unreadable: {}", e))),
        }
    }

    fn record_form(&self, form: SavedForm) -> Result<(), AutofillError> {
        let mut forms = self.saved_forms()?;
        forms.push(form);
        let value = serde_json::to_value(&forms)
            .map_err(|e| AutofillError::Store(format!("could not encode saved forms: {}", e)))?;
        self.set(SAVED_FORMS_KEY, value)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(profile: Profile) -> Self {
        let store = Self::new();
        if let Ok(mut entries) = store.entries.lock() {
            entries.insert(PROFILE_KEY.to_string(), profile.into_value());
        }
        store
    }

    pub fn with_credential(self, key: &str) -> Self {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(CREDENTIAL_KEY.to_string(), Value::String(key.to_string()));
        }
        self
    }
}

impl ProfileStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, AutofillError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| AutofillError::Store(format!("memory store lock poisoned: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), AutofillError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| AutofillError::Store(format!("memory store lock poisoned: {}", e)))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// All keys kept in one pretty-printed JSON object on disk.
///
/// The file is read on every access and rewritten on every `set`, so several
/// processes see each other's writes but may overwrite each other.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, AutofillError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(AutofillError::io(
                    format!("reading {}", self.path.display()),
                    e,
                ));
            }
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(AutofillError::Store(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(AutofillError::Store(format!(
                "{} is not valid JSON: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write_all(&self, entries: &Map<String, Value>) -> Result<(), AutofillError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| AutofillError::io(format!("creating {}", parent.display()), e))?;
        }

        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| AutofillError::Store(format!("could not encode store: {}", e)))?;

        // Written beside the target, then renamed over it.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| AutofillError::io(format!("writing {}", tmp.display()), e))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| AutofillError::io(format!("replacing {}", self.path.display()), e))?;
        Ok(())
    }
}

impl ProfileStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, AutofillError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| AutofillError::Store(format!("store lock poisoned: {}", e)))?;
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), AutofillError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| AutofillError::Store(format!("store lock poisoned: {}", e)))?;

        let mut entries = self.read_all()?;

        entries.insert(key.to_string(), value);
        self.write_all(&entries)?;
        debug!(key, path = %self.path.display(), "store updated");
        Ok(())
    }
}
