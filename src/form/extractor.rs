use std::collections::HashMap;

use scraper::{ElementRef, Selector};
use tracing::debug;

use crate::form::form_model::{Constraints, ControlHandle, FieldDescriptor, FormContext};
use crate::form::page::{HtmlPage, control_selector};
use crate::round::error::AutofillError;

/// Elements whose text never labels a control.
const SKIPPED_TEXT_CONTAINERS: &[&str] = &[
    "script", "style", "head", "title", "noscript", "template", "select", "option", "textarea",
];

/// Scan a page for fillable controls.
///
/// Returns one descriptor per fillable control, in document order. Controls
/// whose label cannot be determined keep an empty identity and are left out
/// of anything sent to the model.
pub fn extract_form_context(page: &HtmlPage) -> Result<FormContext, AutofillError> {
    let document = page.document();
    let labels_by_for = explicit_labels(page);
    let mut context = FormContext::new(page.url().map(|u| u.to_string()));

    for (index, element) in document.select(&control_selector()).enumerate() {
        let handle = ControlHandle(index);
        let Some(state) = page.control(handle) else {
            continue;
        };
        if !is_fillable(&state.kind) {
            continue;
        }

        let el = element.value();
        let identity = resolve_identity(element, &labels_by_for);

        let options = state
            .options
            .iter()
            .map(|(_, label)| label.clone())
            .filter(|label| !label.is_empty())
            .collect();

        let field = FieldDescriptor {
            kind: state.kind.clone(),
            identity,
            name: non_empty_attr(element, "name"),
            id: non_empty_attr(element, "id"),
            constraints: Constraints {
                required: el.attr("required").is_some(),
                min_length: el.attr("minlength").map(|v| v.to_string()),
                max_length: el.attr("maxlength").map(|v| v.to_string()),
                min: el.attr("min").map(|v| v.to_string()),
                max: el.attr("max").map(|v| v.to_string()),
                pattern: el.attr("pattern").map(|v| v.to_string()),
            },
            current_value: state.current_value(),
            options,
        };

        context.push(field, handle);
    }

    if context.is_empty() {
        debug!("no fillable controls among {} native controls", page.control_count());
        return Err(AutofillError::NoFieldsFound);
    }

    debug!(
        fields = context.len(),
        identified = context.identified().count(),
        "form context extracted"
    );
    Ok(context)
}

/// Input types that carry user data.
pub fn is_fillable(kind: &str) -> bool {
    !matches!(
        kind,
        "hidden" | "submit" | "button" | "reset" | "image" | "file"
    )
}

/// Resolve a control's label: explicit label, aria-label, placeholder,
/// preceding text, then name or id.
pub fn resolve_identity(element: ElementRef<'_>, labels_by_for: &HashMap<String, String>) -> String {
    let el = element.value();

    let explicit = el
        .attr("id")
        .and_then(|id| labels_by_for.get(id).cloned())
        .filter(|label| !label.is_empty())
        .or_else(|| wrapping_label(element));

    explicit
        .or_else(|| non_empty_attr(element, "aria-label"))
        .or_else(|| non_empty_attr(element, "placeholder"))
        .or_else(|| preceding_text(element))
        .or_else(|| non_empty_attr(element, "name"))
        .or_else(|| non_empty_attr(element, "id"))
        .unwrap_or_default()
}

fn explicit_labels(page: &HtmlPage) -> HashMap<String, String> {
    let selector = Selector::parse("label[for]").expect("label selector");
    let mut labels = HashMap::new();

    for label in page.document().select(&selector) {
        let Some(target) = label.value().attr("for") else {
            continue;
        };
        let text = label_text(label);
        if !text.is_empty() {
            labels.entry(target.to_string()).or_insert(text);
        }
    }
    labels
}

fn wrapping_label(element: ElementRef<'_>) -> Option<String> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "label")
        .map(label_text)
        .filter(|text| !text.is_empty())
}

/// Visible text of a label, ignoring text that belongs to nested controls.
fn label_text(label: ElementRef<'_>) -> String {
    let label_node = *label;
    let pieces: Vec<&str> = label
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .ancestors()
                .take_while(|a| a.id() != label_node.id())
                .any(|a| {
                    a.value()
                        .as_element()
                        .is_some_and(|e| SKIPPED_TEXT_CONTAINERS.contains(&e.name()))
                });
            (!hidden).then_some(&**text)
        })
        .collect();

    collapse_whitespace(&pieces.join(" "))
}

/// Nearest non-empty text node before the control in document order.
fn preceding_text(element: ElementRef<'_>) -> Option<String> {
    let mut current = *element;

    loop {
        current = match current.prev_sibling() {
            Some(prev) => {
                let nodes: Vec<_> = prev.descendants().collect();
                for node in nodes.iter().rev() {
                    let Some(text) = node.value().as_text() else {
                        continue;
                    };
                    let hidden = node.ancestors().any(|a| {
                        a.value()
                            .as_element()
                            .is_some_and(|e| SKIPPED_TEXT_CONTAINERS.contains(&e.name()))
                    });
                    if hidden {
                        continue;
                    }
                    let collapsed = collapse_whitespace(text);
                    if !collapsed.is_empty() {
                        return Some(collapsed);
                    }
                }
                prev
            }
            None => current.parent()?,
        };
    }
}

fn non_empty_attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(collapse_whitespace)
        .filter(|v| !v.is_empty())
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
