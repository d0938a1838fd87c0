use crate::form::applier::CompletionSummary;
use crate::profile::store::SavedForm;
use crate::round::error::AutofillError;

// ============================================================================
// Console reporter: formatted terminal output
// ============================================================================

/// Format the outcome of a fill round for terminal output.
///
/// Produces output like:
/// ```text
/// === Form filled: 2 of 3 fields ===
///
/// ✓ Email        jane@example.com
/// ✓ Full Name    Jane Doe
/// ✗ Phone        (no value in profile)
/// ```
pub fn format_completion(summary: &CompletionSummary) -> String {
    let total = summary.resolved.len() + summary.unresolved.len();
    let mut out = format!(
        "=== Form filled: {} of {} fields ===\n\n",
        summary.resolved.len(),
        total
    );

    let width = summary
        .resolved
        .iter()
        .map(|(identity, _)| identity.chars().count())
        .chain(summary.unresolved.iter().map(|i| i.chars().count()))
        .max()
        .unwrap_or(0);

    for (identity, value) in &summary.resolved {
        out.push_str(&format!("\u{2713} {:<width$}  {}\n", identity, value, width = width));
    }
    for identity in &summary.unresolved {
        out.push_str(&format!(
            "\u{2717} {:<width$}  (no value in profile)\n",
            identity,
            width = width
        ));
    }

    if summary.is_complete() {
        out.push_str("\nForm filled successfully!\n");
    } else {
        out.push_str(&format!(
            "\nForm partially filled. Could not fill: {}\n",
            summary.unresolved.join(", ")
        ));
    }
    out
}

/// The user-visible notification for a failed round.
pub fn format_failure(error: &AutofillError) -> String {
    let mut out = format!("\u{2717} {}\n", error);
    if let Some(hint) = failure_hint(error) {
        out.push_str(&format!("    hint: {}\n", hint));
    }
    out
}

fn failure_hint(error: &AutofillError) -> Option<&'static str> {
    match error {
        AutofillError::UpstreamError { status: 401, .. } => {
            Some("the stored API key was refused; run `form-autofill key set <KEY> --validate`")
        }
        AutofillError::RetriesExhausted { .. } => {
            Some("the model kept answering with something other than JSON; try again or raise retry.max_retries")
        }
        AutofillError::NoObservedValues => Some("fill in the form by hand before learning from it"),
        AutofillError::NoExtractableText(_) => {
            Some("scanned PDFs have no text layer; export the document as text first")
        }
        _ => None,
    }
}

/// One line per saved form, oldest first.
pub fn format_saved_forms(forms: &[SavedForm]) -> String {
    if forms.is_empty() {
        return "No forms have been learned yet.\n".to_string();
    }

    let mut out = format!("=== Saved forms: {} ===\n\n", forms.len());
    for form in forms {
        out.push_str(&format!(
            "{}  {}  {} fields  {}\n",
            form.timestamp.format("%Y-%m-%d %H:%M:%S"),
            form.signature.chars().take(8).collect::<String>(),
            form.data.len(),
            form.url.as_deref().unwrap_or("-")
        ));
    }
    out
}
