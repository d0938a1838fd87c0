use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use form_autofill::{
    form::{extractor::extract_form_context, form_model::ControlHandle, page::HtmlPage},
    ingest::document::{DocumentSource, PlainTextSource},
    model::{gateway::ModelGateway, parser::ParseMode},
    profile::{
        profile_model::{Profile, default_profile},
        store::{MemoryStore, ProfileStore},
    },
    prompt::builder::JSON_ONLY_DEMAND,
    round::{
        error::AutofillError,
        round::RoundRunner,
        round_model::{RetryPolicy, RoundConfig, RoundState},
    },
    trace::logger::TraceLogger,
};

use crate::common::{FILLED_FORM, SIGNUP_FORM, ScriptedClient, SlowClient};

mod common;

// =========================================================================
// Helpers
// =========================================================================

fn store_with_key() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_profile(default_profile()).with_credential("sk-test"))
}

fn runner(client: Arc<ScriptedClient>, store: Arc<MemoryStore>) -> RoundRunner {
    RoundRunner::new(Arc::new(ModelGateway::new(client)), store)
}

fn config_with_retries(max_retries: u32) -> RoundConfig {
    RoundConfig {
        fill: RetryPolicy::new(max_retries),
        learn: RetryPolicy::new(max_retries),
        ingest: RetryPolicy::new(max_retries),
        ..RoundConfig::default()
    }
}

struct StaticText(&'static str);

#[async_trait]
impl DocumentSource for StaticText {
    async fn extract_text(&self, _path: &Path) -> Result<String, AutofillError> {
        Ok(self.0.to_string())
    }
}

struct StuckSource;

#[async_trait]
impl DocumentSource for StuckSource {
    async fn extract_text(&self, _path: &Path) -> Result<String, AutofillError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

// =========================================================================
// Fill rounds
// =========================================================================

#[tokio::test]
async fn fill_round_applies_values_and_ends_applied() {
    let client = Arc::new(ScriptedClient::new(vec![Ok(
        r#"Sure! {"Full Name": "Jane Doe", "Email": "a@x.com", "Phone": null}"#.to_string(),
    )]));
    let mut runner = runner(client.clone(), store_with_key());
    let mut page = HtmlPage::parse(SIGNUP_FORM);
    let context = extract_form_context(&page).unwrap();

    let summary = runner.fill(&context, &mut page).await.unwrap();

    assert_eq!(runner.state(), RoundState::Applied);
    assert_eq!(runner.attempts(), 1);
    assert_eq!(summary.resolved_identities(), vec!["Full Name", "Email"]);
    assert_eq!(summary.unresolved, vec!["Phone".to_string()]);
    assert_eq!(page.control(ControlHandle(1)).unwrap().value, "a@x.com");

    let prompt = &client.prompts()[0];
    assert!(prompt.contains("Full Name"));
    assert!(prompt.contains("Jane Doe"));
    assert!(prompt.contains(JSON_ONLY_DEMAND));
}

#[tokio::test]
async fn retry_ceiling_is_respected_exactly() {
    for max_retries in [0u32, 1, 2, 4] {
        let client = Arc::new(ScriptedClient::always("I'd rather chat about the weather."));
        let mut runner = runner(client.clone(), store_with_key())
            .with_config(config_with_retries(max_retries));
        let mut page = HtmlPage::parse(SIGNUP_FORM);
        let context = extract_form_context(&page).unwrap();

        let err = runner.fill(&context, &mut page).await.unwrap_err();

        assert_eq!(client.calls(), (max_retries + 1) as usize);
        assert_eq!(runner.state(), RoundState::Failed);
        match err {
            AutofillError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, max_retries + 1);
                assert!(matches!(*last, AutofillError::MalformedJson(_)));
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn retry_prompt_carries_the_rejection_reason() {
    let client = Arc::new(ScriptedClient::new(vec![
        Ok(r#"{"unrelated": 1}"#.to_string()),
        Ok(r#"{"Email": "a@x.com"}"#.to_string()),
    ]));
    let mut runner = runner(client.clone(), store_with_key());
    let mut page = HtmlPage::parse(SIGNUP_FORM);
    let context = extract_form_context(&page).unwrap();

    let summary = runner.fill(&context, &mut page).await.unwrap();

    assert_eq!(summary.resolved_identities(), vec!["Email"]);
    let prompts = client.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].starts_with(&prompts[0]));
    assert!(prompts[1].contains("previous answer was rejected"));
}

#[tokio::test]
async fn transport_errors_are_terminal_without_retry() {
    let client = Arc::new(ScriptedClient::new(vec![Err(AutofillError::UpstreamError {
        status: 500,
        message: "boom".into(),
    })]));
    let mut runner = runner(client.clone(), store_with_key());
    let mut page = HtmlPage::parse(SIGNUP_FORM);
    let context = extract_form_context(&page).unwrap();

    let err = runner.fill(&context, &mut page).await.unwrap_err();

    assert!(matches!(err, AutofillError::UpstreamError { status: 500, .. }));
    assert_eq!(client.calls(), 1);
    assert_eq!(runner.state(), RoundState::Failed);
    assert!(page.events().is_empty());
}

#[tokio::test]
async fn fill_without_key_never_calls_the_model() {
    let client = Arc::new(ScriptedClient::always("{}"));
    let store = Arc::new(MemoryStore::with_profile(default_profile()));
    let mut runner = runner(client.clone(), store);
    let mut page = HtmlPage::parse(SIGNUP_FORM);
    let context = extract_form_context(&page).unwrap();

    let err = runner.fill(&context, &mut page).await.unwrap_err();
    assert!(matches!(err, AutofillError::MissingCredential));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn strict_mode_retries_chatty_answers() {
    let client = Arc::new(ScriptedClient::new(vec![
        Ok(r#"Here: {"Email": "a@x.com"}"#.to_string()),
        Ok(r#"{"Email": "a@x.com"}"#.to_string()),
    ]));
    let config = RoundConfig {
        parse_mode: ParseMode::Strict,
        ..RoundConfig::default()
    };
    let mut runner = runner(client.clone(), store_with_key()).with_config(config);
    let mut page = HtmlPage::parse(SIGNUP_FORM);
    let context = extract_form_context(&page).unwrap();

    runner.fill(&context, &mut page).await.unwrap();
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn cancelled_round_fails_with_cancelled() {
    let client = Arc::new(ScriptedClient::always(r#"{"Email": "a@x.com"}"#));
    let mut runner = runner(client.clone(), store_with_key());
    runner.cancellation_token().cancel();
    let mut page = HtmlPage::parse(SIGNUP_FORM);
    let context = extract_form_context(&page).unwrap();

    let err = runner.fill(&context, &mut page).await.unwrap_err();
    assert!(matches!(err, AutofillError::Cancelled));
    assert_eq!(client.calls(), 0);
}

// =========================================================================
// Learn rounds
// =========================================================================

#[tokio::test]
async fn learn_round_merges_saves_and_records_the_form() {
    let answer = json!({
        "fullName": "Jane Doe",
        "emails": ["user@example.com", "b@x.com"]
    });
    let client = Arc::new(ScriptedClient::new(vec![Ok(answer.to_string())]));
    let store = store_with_key();
    let mut runner = runner(client.clone(), store.clone());
    let page = HtmlPage::parse(FILLED_FORM).with_url("https://example.com/apply");
    let context = extract_form_context(&page).unwrap();

    let merged = runner.learn(&context).await.unwrap();

    assert_eq!(runner.state(), RoundState::Merged);
    assert_eq!(merged.get("emails"), Some(&json!(["user@example.com", "b@x.com"])));
    assert_eq!(merged.get("fullName"), Some(&json!(["Jane Doe"])));
    // Keys the model left out are kept.
    assert_eq!(merged.get("city"), Some(&json!("Springfield")));
    assert_eq!(store.profile().unwrap(), merged);

    let forms = store.saved_forms().unwrap();
    assert_eq!(forms.len(), 1);
    assert_eq!(forms[0].signature, context.signature());
    assert_eq!(forms[0].url.as_deref(), Some("https://example.com/apply"));
    assert_eq!(forms[0].data["Email"], "b@x.com");

    assert!(client.prompts()[0].contains("b@x.com"));
}

#[tokio::test]
async fn learn_rejects_answers_missing_the_identity_key() {
    let client = Arc::new(ScriptedClient::always(r#"{"emails": ["b@x.com"]}"#));
    let store = store_with_key();
    let mut runner = runner(client.clone(), store.clone()).with_config(config_with_retries(1));
    let context = extract_form_context(&HtmlPage::parse(FILLED_FORM)).unwrap();

    let err = runner.learn(&context).await.unwrap_err();

    assert!(matches!(err, AutofillError::RetriesExhausted { attempts: 2, .. }));
    assert_eq!(store.profile().unwrap(), default_profile());
    assert!(store.saved_forms().unwrap().is_empty());
}

#[tokio::test]
async fn learn_into_a_profile_without_full_name() {
    let client = Arc::new(ScriptedClient::always(r#"{"email": ["a@x.com", "b@x.com"]}"#));
    let current = Profile::from_value(json!({"email": ["a@x.com"]})).unwrap();
    let store = Arc::new(MemoryStore::with_profile(current).with_credential("sk-test"));
    let mut runner = runner(client.clone(), store.clone());
    let page = HtmlPage::parse(r#"<form><label for="e">email</label><input id="e" value="b@x.com"></form>"#);
    let context = extract_form_context(&page).unwrap();

    let merged = runner.learn(&context).await.unwrap();

    assert_eq!(runner.state(), RoundState::Merged);
    assert_eq!(client.calls(), 1);
    assert_eq!(merged.clone().into_value(), json!({"email": ["a@x.com", "b@x.com"]}));
    assert_eq!(store.profile().unwrap(), merged);
}

#[tokio::test]
async fn learn_rejects_answers_unrelated_to_the_profile() {
    let client = Arc::new(ScriptedClient::always(r#"{"colour": "blue"}"#));
    let current = Profile::from_value(json!({"email": ["a@x.com"]})).unwrap();
    let store = Arc::new(MemoryStore::with_profile(current.clone()).with_credential("sk-test"));
    let mut runner = runner(client.clone(), store.clone()).with_config(config_with_retries(1));
    let page = HtmlPage::parse(r#"<form><label for="e">email</label><input id="e" value="b@x.com"></form>"#);
    let context = extract_form_context(&page).unwrap();

    let err = runner.learn(&context).await.unwrap_err();

    assert!(matches!(err, AutofillError::RetriesExhausted { attempts: 2, .. }));
    assert_eq!(store.profile().unwrap(), current);
}

#[tokio::test]
async fn learn_from_an_empty_form_is_refused() {
    let client = Arc::new(ScriptedClient::always("{}"));
    let mut runner = runner(client.clone(), store_with_key());
    let context = extract_form_context(&HtmlPage::parse(SIGNUP_FORM)).unwrap();

    let err = runner.learn(&context).await.unwrap_err();
    assert!(matches!(err, AutofillError::NoObservedValues));
    assert_eq!(client.calls(), 0);
}

// =========================================================================
// Ingest rounds
// =========================================================================

#[tokio::test]
async fn ingest_round_merges_document_details() {
    let client = Arc::new(ScriptedClient::always(
        r#"{"fullName": "Jane Doe", "phone": ["555-0100", "555-0142"], "employer": "Acme"}"#,
    ));
    let store = store_with_key();
    let mut runner = runner(client.clone(), store.clone());

    let source = StaticText("Jane Doe\nAcme Corp\nTel 555-0142");
    let merged = runner.ingest(&source, Path::new("cv.txt")).await.unwrap();

    assert_eq!(runner.state(), RoundState::Merged);
    assert_eq!(merged.get("phone"), Some(&json!(["555-0100", "555-0142"])));
    assert_eq!(store.profile().unwrap().get("employer"), Some(&json!(["Acme"])));
    assert!(client.prompts()[0].contains("Tel 555-0142"));
}

#[tokio::test(start_paused = true)]
async fn ingest_round_times_out() {
    let client = Arc::new(ScriptedClient::always("{}"));
    let mut runner = runner(client.clone(), store_with_key());

    let err = runner.ingest(&StuckSource, Path::new("big.pdf")).await.unwrap_err();

    match err {
        AutofillError::Timeout { after, .. } => assert_eq!(after, Duration::from_secs(30)),
        other => panic!("expected Timeout, got {:?}", other),
    }
    assert_eq!(runner.state(), RoundState::Failed);
    assert_eq!(client.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn ingest_timeout_covers_a_slow_model() {
    let gateway = ModelGateway::new(Arc::new(SlowClient::new(Duration::from_secs(120))));
    let config = RoundConfig {
        ingest_timeout: Duration::from_secs(5),
        ..RoundConfig::default()
    };
    let mut runner = RoundRunner::new(Arc::new(gateway), store_with_key()).with_config(config);

    let err = runner
        .ingest(&StaticText("Jane Doe"), Path::new("cv.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, AutofillError::Timeout { .. }));
}

#[tokio::test]
async fn empty_documents_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blank.txt");
    std::fs::write(&path, "  \n\t ").unwrap();

    let client = Arc::new(ScriptedClient::always("{}"));
    let mut runner = runner(client.clone(), store_with_key());

    let err = runner.ingest(&PlainTextSource, &path).await.unwrap_err();
    assert!(matches!(err, AutofillError::NoExtractableText(_)));
    assert_eq!(client.calls(), 0);
}

// =========================================================================
// Trace
// =========================================================================

#[tokio::test]
async fn every_transition_is_traced() {
    let dir = tempfile::tempdir().unwrap();
    let trace_path = dir.path().join("rounds.jsonl");
    let client = Arc::new(ScriptedClient::new(vec![
        Ok("no json here".to_string()),
        Ok(r#"{"Email": "a@x.com"}"#.to_string()),
    ]));
    let mut runner = runner(client, store_with_key()).with_tracer(Arc::new(TraceLogger::new(&trace_path)));
    let mut page = HtmlPage::parse(SIGNUP_FORM);
    let context = extract_form_context(&page).unwrap();

    runner.fill(&context, &mut page).await.unwrap();

    let lines: Vec<serde_json::Value> = std::fs::read_to_string(&trace_path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let states: Vec<&str> = lines.iter().map(|l| l["state"].as_str().unwrap()).collect();

    assert_eq!(
        states,
        vec![
            "Idle",
            "BuildingPrompt",
            "AwaitingModel",
            "Validating",
            "Retrying",
            "AwaitingModel",
            "Validating",
            "Applying",
            "Applied"
        ]
    );
    assert_eq!(lines[4]["error_kind"], "malformed_json");
    assert!(lines.iter().all(|l| l["mode"] == "fill"));
    assert_eq!(lines[0]["form_signature"], context.signature());
}
