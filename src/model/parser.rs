use serde_json::{Map, Value};

use crate::profile::profile_model::{Profile, json_type_name};
use crate::round::error::AutofillError;

/// How much surrounding prose a model answer may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Locate the object inside arbitrary text. Best effort.
    #[default]
    Lenient,
    /// The whole answer must be a single JSON object (code fences allowed).
    Strict,
}

/// Extract the JSON object from a model answer.
///
/// Lenient mode first tries the span from the first `{` to the last `}`. If
/// that span does not parse (for example because the prose around the object
/// also contains braces) every balanced `{...}` span is tried in order.
pub fn extract_json_object(text: &str, mode: ParseMode) -> Result<Map<String, Value>, AutofillError> {
    let trimmed = strip_code_fence(text.trim());

    if trimmed.is_empty() {
        return Err(AutofillError::MalformedJson("the answer was empty".into()));
    }

    match mode {
        ParseMode::Strict => parse_object(trimmed),
        ParseMode::Lenient => {
            let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
                return Err(AutofillError::MalformedJson(format!(
                    "no JSON object found in: {}",
                    preview(trimmed)
                )));
            };

            if start < end {
                if let Ok(object) = parse_object(&trimmed[start..=end]) {
                    return Ok(object);
                }
            }

            balanced_spans(trimmed)
                .into_iter()
                .find_map(|span| parse_object(span).ok())
                .ok_or_else(|| {
                    AutofillError::MalformedJson(format!(
                        "no parseable JSON object in: {}",
                        preview(trimmed)
                    ))
                })
        }
    }
}

/// A fill answer must be an object keyed by at least one requested identity.
pub fn validate_fill_response(
    object: &Map<String, Value>,
    identities: &[String],
) -> Result<(), AutofillError> {
    if identities.is_empty() || identities.iter().any(|id| object.contains_key(id)) {
        return Ok(());
    }

    let returned: Vec<&str> = object.keys().map(|k| k.as_str()).take(5).collect();
    Err(AutofillError::ShapeInvalid(format!(
        "none of the requested fields were answered (expected keys like \"{}\", got [{}])",
        identities[0],
        returned.join(", ")
    )))
}

/// A learn/ingest answer must be an object that is recognizably the same
/// profile: it carries the identity key of the current profile's shape when
/// the profile has one, and otherwise shares at least one top-level key with
/// it. Any object is accepted while the profile is still empty.
pub fn validate_profile_response<'a>(
    current: &Profile,
    response: &'a Value,
) -> Result<&'a Map<String, Value>, AutofillError> {
    let Value::Object(object) = response else {
        return Err(AutofillError::ShapeInvalid(format!(
            "expected the full profile as a JSON object, got {}",
            json_type_name(response)
        )));
    };

    if current.is_empty() {
        return Ok(object);
    }

    let present = |key: &str| !matches!(object.get(key), None | Some(Value::Null));

    let required = current.shape().identity_key();
    if current.get(required).is_some_and(|v| !v.is_null()) {
        return if present(required) {
            Ok(object)
        } else {
            Err(AutofillError::ShapeInvalid(format!(
                "the returned profile is missing the \"{}\" field",
                required
            )))
        };
    }

    if current.as_map().keys().any(|key| present(key)) {
        return Ok(object);
    }

    let expected: Vec<&str> = current.as_map().keys().map(|k| k.as_str()).take(5).collect();
    Err(AutofillError::ShapeInvalid(format!(
        "the returned profile shares no fields with the current one (expected keys like [{}])",
        expected.join(", ")
    )))
}

fn parse_object(candidate: &str) -> Result<Map<String, Value>, AutofillError> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(AutofillError::MalformedJson(format!(
            "expected a JSON object, got {}",
            json_type_name(&other)
        ))),
        Err(e) => Err(AutofillError::MalformedJson(e.to_string())),
    }
}

/// Remove a surrounding ```json fence, if the whole answer is fenced.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Every top-level balanced `{...}` span, skipping braces inside strings.
fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if depth > 0 && in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    spans
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(80).collect();
    if text.chars().count() > 80 {
        out.push('…');
    }
    out
}
