use serde::Serialize;

use crate::form::applier::CompletionSummary;
use crate::form::form_model::FormContext;
use crate::form::page::{ControlEvent, HtmlPage};
use crate::round::error::AutofillError;

/// Machine-readable outcome of a fill round: the summary plus the state each
/// identified control was left in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillReport<'a> {
    pub summary: &'a CompletionSummary,
    pub controls: Vec<ControlReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlReport {
    pub identity: String,
    /// Position of the control among the page's `input, textarea, select`.
    pub control: usize,
    pub kind: String,
    pub value: Option<String>,
    pub events: Vec<ControlEvent>,
}

pub fn fill_report<'a>(
    summary: &'a CompletionSummary,
    context: &FormContext,
    page: &HtmlPage,
) -> FillReport<'a> {
    let controls = context
        .identified()
        .filter_map(|(field, handle)| {
            let state = page.control(handle)?;
            Some(ControlReport {
                identity: field.identity.clone(),
                control: handle.0,
                kind: state.kind.clone(),
                value: state.current_value(),
                events: page.events_for(handle),
            })
        })
        .collect();

    FillReport { summary, controls }
}

pub fn format_fill_json(report: &FillReport<'_>) -> Result<String, AutofillError> {
    serde_json::to_string_pretty(report)
        .map_err(|e| AutofillError::Store(format!("could not encode fill report: {}", e)))
}
