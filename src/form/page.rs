use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::form::form_model::ControlHandle;
use crate::round::error::AutofillError;

/// Synthetic notifications raised on a control after its value changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlEvent {
    Input,
    Change,
}

/// The host page's side of a fill: a document whose controls we write into
/// but do not own.
pub trait HostPage {
    fn set_value(&mut self, handle: ControlHandle, value: &str) -> Result<(), AutofillError>;

    fn dispatch(&mut self, handle: ControlHandle, event: ControlEvent) -> Result<(), AutofillError>;
}

/// CSS selector for every native form control, in document order.
pub fn control_selector() -> Selector {
    Selector::parse("input, textarea, select").expect("control selector")
}

/// Mutable state of one control on an `HtmlPage`.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlState {
    pub tag: String,
    pub kind: String,
    pub value: String,
    pub checked: bool,
    /// `(value, label)` pairs for `<select>` controls.
    pub options: Vec<(String, String)>,
}

impl ControlState {
    fn from_element(element: ElementRef<'_>) -> Self {
        let el = element.value();
        let tag = el.name().to_ascii_lowercase();

        match tag.as_str() {
            "textarea" => ControlState {
                kind: "textarea".to_string(),
                value: element.text().collect::<String>(),
                checked: false,
                options: vec![],
                tag: tag.clone(),
            },
            "select" => {
                let option_selector = Selector::parse("option").expect("option selector");
                let options: Vec<(String, String)> = element
                    .select(&option_selector)
                    .map(|opt| {
                        let label = opt.text().collect::<Vec<_>>().join(" ").trim().to_string();
                        let value = opt
                            .value()
                            .attr("value")
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| label.clone());
                        (value, label)
                    })
                    .collect();

                let selected = element
                    .select(&option_selector)
                    .find(|opt| opt.value().attr("selected").is_some())
                    .and_then(|opt| {
                        opt.value()
                            .attr("value")
                            .map(|v| v.to_string())
                            .or_else(|| Some(opt.text().collect::<String>().trim().to_string()))
                    })
                    .or_else(|| options.first().map(|(v, _)| v.clone()))
                    .unwrap_or_default();

                let kind = if el.attr("multiple").is_some() {
                    "select-multiple"
                } else {
                    "select-one"
                };

                ControlState {
                    kind: kind.to_string(),
                    value: selected,
                    checked: false,
                    options,
                    tag: tag.clone(),
                }
            }
            _ => {
                let kind = el
                    .attr("type")
                    .map(|t| t.trim().to_ascii_lowercase())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "text".to_string());
                let default_value = if matches!(kind.as_str(), "checkbox" | "radio") {
                    "on"
                } else {
                    ""
                };

                ControlState {
                    value: el.attr("value").unwrap_or(default_value).to_string(),
                    checked: el.attr("checked").is_some(),
                    options: vec![],
                    kind,
                    tag: tag.clone(),
                }
            }
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self.kind.as_str(), "checkbox" | "radio")
    }

    /// The value a form submission would carry for this control, if any.
    pub fn current_value(&self) -> Option<String> {
        if self.is_choice() {
            return self.checked.then(|| self.value.clone());
        }
        if self.value.is_empty() {
            None
        } else {
            Some(self.value.clone())
        }
    }
}

/// An event raised on a control, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchedEvent {
    pub handle: usize,
    pub event: ControlEvent,
    pub bubbles: bool,
}

/// A parsed HTML document with live, writable control state.
pub struct HtmlPage {
    url: Option<String>,
    document: Html,
    controls: Vec<ControlState>,
    events: Vec<DispatchedEvent>,
}

impl HtmlPage {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let selector = control_selector();
        let controls = document
            .select(&selector)
            .map(ControlState::from_element)
            .collect();

        HtmlPage {
            url: None,
            document,
            controls,
            events: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn document(&self) -> &Html {
        &self.document
    }

    pub fn control(&self, handle: ControlHandle) -> Option<&ControlState> {
        self.controls.get(handle.0)
    }

    pub fn control_count(&self) -> usize {
        self.controls.len()
    }

    pub fn events(&self) -> &[DispatchedEvent] {
        &self.events
    }

    pub fn events_for(&self, handle: ControlHandle) -> Vec<ControlEvent> {
        self.events
            .iter()
            .filter(|e| e.handle == handle.0)
            .map(|e| e.event)
            .collect()
    }

    fn control_mut(&mut self, handle: ControlHandle) -> Result<&mut ControlState, AutofillError> {
        let count = self.controls.len();
        self.controls
            .get_mut(handle.0)
            .ok_or_else(|| AutofillError::ControlNotFound {
                handle: handle.0,
                count,
            })
    }
}

impl HostPage for HtmlPage {
    fn set_value(&mut self, handle: ControlHandle, value: &str) -> Result<(), AutofillError> {
        let control = self.control_mut(handle)?;

        if control.is_choice() {
            control.checked = is_truthy(value) || value == control.value;
            return Ok(());
        }

        if !control.options.is_empty() {
            // Accept either the option value or its visible label.
            let wanted = value.trim();
            if let Some((option_value, _)) = control.options.iter().find(|(v, label)| {
                v == wanted || label.eq_ignore_ascii_case(wanted)
            }) {
                control.value = option_value.clone();
                return Ok(());
            }
        }

        control.value = value.to_string();
        Ok(())
    }

    fn dispatch(&mut self, handle: ControlHandle, event: ControlEvent) -> Result<(), AutofillError> {
        self.control_mut(handle)?;
        self.events.push(DispatchedEvent {
            handle: handle.0,
            event,
            bubbles: true,
        });
        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "1" | "checked"
    )
}
