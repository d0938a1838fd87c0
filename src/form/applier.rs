use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::form::form_model::FormContext;
use crate::form::page::{ControlEvent, HostPage};
use crate::round::error::AutofillError;

/// Outcome of applying model values to a form.
///
/// Partial success is normal: unresolved fields are listed so the user can
/// complete them by hand and run a learn round afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompletionSummary {
    /// `(identity, value written)` in form order.
    pub resolved: Vec<(String, String)>,
    /// Identities the model returned null for, or omitted.
    pub unresolved: Vec<String>,
}

impl CompletionSummary {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn resolved_identities(&self) -> Vec<&str> {
        self.resolved.iter().map(|(id, _)| id.as_str()).collect()
    }
}

/// Write accepted values into the page's controls.
///
/// Every identified field whose identity maps to a non-null value is written
/// and then receives `input` and `change` notifications, in that order.
pub fn apply_fill(
    values: &Map<String, Value>,
    context: &FormContext,
    page: &mut dyn HostPage,
) -> Result<CompletionSummary, AutofillError> {
    let mut summary = CompletionSummary::default();

    for (field, handle) in context.identified() {
        let Some(text) = values.get(&field.identity).and_then(value_to_text) else {
            if !summary.unresolved.contains(&field.identity) {
                summary.unresolved.push(field.identity.clone());
            }
            continue;
        };

        debug!(identity = %field.identity, handle = handle.0, "writing value");
        page.set_value(handle, &text)?;
        page.dispatch(handle, ControlEvent::Input)?;
        page.dispatch(handle, ControlEvent::Change)?;

        summary.resolved.push((field.identity.clone(), text));
    }

    info!(
        resolved = summary.resolved.len(),
        unresolved = summary.unresolved.len(),
        "form fill applied"
    );
    Ok(summary)
}

/// Render a JSON value as control text. `null`, empty strings and empty
/// lists mean "no value".
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(value_to_text),
        Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_to_text_flattens_scalars() {
        assert_eq!(value_to_text(&json!("a")), Some("a".to_string()));
        assert_eq!(value_to_text(&json!(42)), Some("42".to_string()));
        assert_eq!(value_to_text(&json!(true)), Some("true".to_string()));
        assert_eq!(value_to_text(&json!(null)), None);
        assert_eq!(value_to_text(&json!("  ")), None);
    }

    #[test]
    fn value_to_text_takes_first_list_entry() {
        assert_eq!(
            value_to_text(&json!([null, "a@x.com", "b@x.com"])),
            Some("a@x.com".to_string())
        );
        assert_eq!(value_to_text(&json!([])), None);
    }
}
