use serde::Serialize;
use serde_json::{Map, Value};

use crate::form::form_model::{Constraints, FieldDescriptor, FormContext};
use crate::profile::profile_model::Profile;

/// Sentence every prompt carries; the response parser relies on it.
pub const JSON_ONLY_DEMAND: &str =
    "Return ONLY a JSON object, no additional text or explanation.";

/// What a round asks the model to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    Fill,
    Learn,
    Ingest,
}

impl PromptMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptMode::Fill => "fill",
            PromptMode::Learn => "learn",
            PromptMode::Ingest => "ingest",
        }
    }
}

/// System-role text for each mode.
pub fn system_message(mode: PromptMode) -> &'static str {
    match mode {
        PromptMode::Fill => {
            "You are a helpful assistant that fills forms accurately based on provided information. \
             You answer with a single JSON object and nothing else."
        }
        PromptMode::Learn | PromptMode::Ingest => {
            "You are a JSON-only response assistant. Return only valid JSON objects without any \
             explanation or additional text."
        }
    }
}

/// Ask for a flat object keyed by field identity, one value or null each.
pub fn build_fill_prompt(profile: &Profile, context: &FormContext) -> String {
    let fields = context
        .identified()
        .map(|(field, _)| describe_field(field))
        .collect::<Vec<_>>()
        .join("\n\n");

    let example_key = context
        .identities()
        .into_iter()
        .next()
        .unwrap_or_else(|| "field_label".to_string());

    format!(
        r#"You are a form-filling assistant. Use the following personal information to fill in the form.

Personal Information Available:
{profile}

Form Fields to Fill:
{fields}

Rules:
- Use the field labels above, exactly as written, as the keys of your answer.
- Use null for any field you cannot fill from the personal information.
- Respect each field's type and constraints.
- For fields with options, answer with one of the listed options.

{demand} Use this exact format:
{{
  "{example_key}": "value_or_null",
  ...
}}"#,
        profile = pretty(profile.as_map()),
        fields = if fields.is_empty() { "(none)".to_string() } else { fields },
        demand = JSON_ONLY_DEMAND,
        example_key = example_key.replace('"', "\\\""),
    )
}

/// Ask the model to fold values the user typed into the full profile.
pub fn build_learn_prompt(
    profile: &Profile,
    context: &FormContext,
    observed: &Map<String, Value>,
) -> String {
    #[derive(Serialize)]
    struct FieldSummary<'a> {
        label: &'a str,
        #[serde(rename = "type")]
        kind: &'a str,
        #[serde(skip_serializing_if = "no_constraints")]
        validation: &'a Constraints,
    }

    let summaries: Vec<FieldSummary<'_>> = context
        .identified()
        .map(|(field, _)| FieldSummary {
            label: &field.identity,
            kind: &field.kind,
            validation: &field.constraints,
        })
        .collect();

    format!(
        r#"You are a data extraction and merging assistant. Here is the order of what you will do:
1. Compare the current personal information with the newly filled form data.
2. Extract any new or updated information.
3. Merge the new information with the current personal information.
4. Return the entire personal information object in the exact same format as the Current Personal Information, including both existing and new data.
5. If a field has multiple values (like email or phone), make a list that keeps the existing values and adds new ones if they are different. Never drop a value that is already known.

IMPORTANT: {demand}

Current Personal Information:
{profile}

New Form Data:
{observed}

Form Fields Information:
{fields}"#,
        demand = JSON_ONLY_DEMAND,
        profile = pretty(profile.as_map()),
        observed = pretty(observed),
        fields = serde_json::to_string_pretty(&summaries).unwrap_or_else(|_| "[]".to_string()),
    )
}

/// Ask the model to pull personal details out of a document's text.
pub fn build_ingest_prompt(profile: &Profile, document_text: &str) -> String {
    format!(
        r#"You are a data extraction assistant. Here is the order of what you will do:
1. Analyze the provided document text.
2. Compare it with the current personal information.
3. Extract any new or updated personal information found in the document.
4. Merge the new information with the current personal information, keeping every value that is already known. Fields with several values become lists.
5. Return the entire personal information object in the exact same format as the Current Personal Information.

IMPORTANT: {demand}

Current Personal Information:
{profile}

Document Content:
{text}"#,
        demand = JSON_ONLY_DEMAND,
        profile = pretty(profile.as_map()),
        text = document_text.trim(),
    )
}

/// Re-ask with the previous prompt and the reason its answer was rejected.
pub fn amend_for_retry(previous_prompt: &str, failure: &str) -> String {
    format!(
        "{previous_prompt}\n\n\
         Your previous answer was rejected: {failure}\n\
         {JSON_ONLY_DEMAND} Do not wrap it in prose or code fences."
    )
}

fn describe_field(field: &FieldDescriptor) -> String {
    let c = &field.constraints;
    let mut desc = format!(
        "- Field \"{}\":\n  Type: {}\n  Required: {}",
        field.identity,
        field.kind,
        if c.required { "Yes" } else { "No" }
    );

    if let Some(v) = &c.min_length {
        desc.push_str(&format!("\n  Minimum Length: {}", v));
    }
    if let Some(v) = &c.max_length {
        desc.push_str(&format!("\n  Maximum Length: {}", v));
    }
    if let Some(v) = &c.pattern {
        desc.push_str(&format!("\n  Pattern Required: {}", v));
    }
    if let Some(v) = &c.min {
        desc.push_str(&format!("\n  Minimum Value: {}", v));
    }
    if let Some(v) = &c.max {
        desc.push_str(&format!("\n  Maximum Value: {}", v));
    }
    if !field.options.is_empty() {
        desc.push_str(&format!("\n  Options: {}", field.options.join(" | ")));
    }
    if let Some(v) = field.current_value.as_deref().filter(|v| !v.is_empty()) {
        desc.push_str(&format!("\n  Current Value: {}", v));
    }
    desc
}

fn no_constraints(constraints: &&Constraints) -> bool {
    constraints.is_empty()
}

fn pretty(map: &Map<String, Value>) -> String {
    serde_json::to_string_pretty(map).unwrap_or_else(|_| "{}".to_string())
}
