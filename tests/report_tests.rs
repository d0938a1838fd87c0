use chrono::{TimeZone, Utc};
use serde_json::json;

use form_autofill::{
    form::{
        applier::{CompletionSummary, apply_fill},
        extractor::extract_form_context,
        page::{ControlEvent, HtmlPage},
    },
    profile::store::SavedForm,
    report::console::{format_completion, format_failure, format_saved_forms},
    report::json::{fill_report, format_fill_json},
    round::error::AutofillError,
};

#[test]
fn completion_lists_filled_and_unfilled_fields() {
    let summary = CompletionSummary {
        resolved: vec![("Email".into(), "a@x.com".into())],
        unresolved: vec!["Phone".into()],
    };
    let out = format_completion(&summary);

    assert!(out.starts_with("=== Form filled: 1 of 2 fields ==="));
    assert!(out.contains("\u{2713} Email  a@x.com"));
    assert!(out.contains("\u{2717} Phone  (no value in profile)"));
    assert!(out.contains("Could not fill: Phone"));
}

#[test]
fn complete_fill_says_so() {
    let summary = CompletionSummary {
        resolved: vec![("Full Name".into(), "Jane Doe".into())],
        unresolved: vec![],
    };
    assert!(format_completion(&summary).contains("Form filled successfully!"));
}

#[test]
fn failure_carries_message_and_hint() {
    let err = AutofillError::RetriesExhausted {
        attempts: 3,
        last: Box::new(AutofillError::MalformedJson("no JSON object found in: hi".into())),
    };
    let out = format_failure(&err);
    assert!(out.contains("Gave up after 3 attempts"));
    assert!(out.contains("no JSON object found"));
    assert!(out.contains("hint:"));

    let out = format_failure(&AutofillError::MissingCredential);
    assert!(out.contains("key set"));
    assert!(!out.contains("hint:"));
}

#[test]
fn saved_forms_listing() {
    assert_eq!(format_saved_forms(&[]), "No forms have been learned yet.\n");

    let form = SavedForm {
        timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
        signature: "0123456789abcdef".into(),
        url: Some("https://example.com/apply".into()),
        data: json!({"Email": "a@x.com", "Phone": "1"}).as_object().unwrap().clone(),
    };
    let out = format_saved_forms(&[form]);
    assert!(out.contains("2024-03-01 09:30:00  01234567  2 fields  https://example.com/apply"));
}

#[test]
fn fill_report_shows_written_values_and_events() {
    let html = r#"<form>
<label for="email">Email</label><input id="email" type="email">
<label for="phone">Phone</label><input id="phone" type="tel">
</form>"#;
    let mut page = HtmlPage::parse(html);
    let context = extract_form_context(&page).unwrap();
    let values = match json!({"Email": "a@x.com", "Phone": null}) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    };
    let summary = apply_fill(&values, &context, &mut page).unwrap();

    let report = fill_report(&summary, &context, &page);
    assert_eq!(report.controls.len(), 2);
    assert_eq!(report.controls[0].value.as_deref(), Some("a@x.com"));
    assert_eq!(report.controls[0].events, vec![ControlEvent::Input, ControlEvent::Change]);
    assert_eq!(report.controls[1].value, None);
    assert!(report.controls[1].events.is_empty());

    let out: serde_json::Value = serde_json::from_str(&format_fill_json(&report).unwrap()).unwrap();
    assert_eq!(out["summary"]["unresolved"], json!(["Phone"]));
    assert_eq!(out["controls"][0]["identity"], "Email");
    assert_eq!(out["controls"][0]["kind"], "email");
    assert_eq!(out["controls"][0]["events"], json!(["input", "change"]));
}
