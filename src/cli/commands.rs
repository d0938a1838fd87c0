use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::config::Settings;
use crate::form::extractor::extract_form_context;
use crate::form::page::HtmlPage;
use crate::ingest::document::{DocumentSource, PdfToTextSource, PlainTextSource};
use crate::model::client::OpenAiClient;
use crate::model::gateway::ModelGateway;
use crate::model::parser::ParseMode;
use crate::profile::profile_model::{Profile, default_profile};
use crate::profile::store::{JsonFileStore, ProfileStore};
use crate::report::console::{format_completion, format_saved_forms};
use crate::report::json::{fill_report, format_fill_json};
use crate::round::error::AutofillError;
use crate::round::round::RoundRunner;
use crate::trace::logger::TraceLogger;

// ============================================================================
// Wiring
// ============================================================================

pub fn open_store(settings: &Settings) -> Arc<dyn ProfileStore> {
    Arc::new(JsonFileStore::new(&settings.store_path))
}

pub fn build_client(settings: &Settings) -> OpenAiClient {
    OpenAiClient::new(&settings.endpoint, &settings.model)
        .with_temperature(settings.temperature)
        .with_json_mode(settings.round.parse_mode == ParseMode::Strict)
}

/// A runner over the HTTP client, cancelled on Ctrl-C.
pub fn build_runner(settings: &Settings, store: Arc<dyn ProfileStore>) -> RoundRunner {
    let gateway = ModelGateway::new(Arc::new(build_client(settings)))
        .with_acquire_timeout(settings.acquire_timeout);
    let tracer = match &settings.trace_path {
        Some(path) => TraceLogger::new(path),
        None => TraceLogger::disabled(),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    RoundRunner::new(Arc::new(gateway), store)
        .with_config(settings.round.clone())
        .with_tracer(Arc::new(tracer))
        .with_cancellation(cancel)
}

fn read_file(path: &str) -> Result<String, AutofillError> {
    std::fs::read_to_string(path).map_err(|e| AutofillError::io(format!("Could not read {}", path), e))
}

// ============================================================================
// fill subcommand
// ============================================================================

pub async fn cmd_fill(settings: &Settings, html_path: &str, output: &str) -> Result<(), AutofillError> {
    let html = read_file(html_path)?;
    let mut page = HtmlPage::parse(&html);
    let context = extract_form_context(&page)?;
    debug!(fields = context.len(), signature = %context.signature(), "form scanned");

    let store = open_store(settings);
    let mut runner = build_runner(settings, store);
    let summary = runner.fill(&context, &mut page).await?;

    match output {
        "json" => println!("{}", format_fill_json(&fill_report(&summary, &context, &page))?),
        _ => print!("{}", format_completion(&summary)),
    }
    Ok(())
}

// ============================================================================
// learn subcommand
// ============================================================================

pub async fn cmd_learn(settings: &Settings, html_path: &str, url: Option<&str>) -> Result<(), AutofillError> {
    let html = read_file(html_path)?;
    let mut page = HtmlPage::parse(&html);
    if let Some(url) = url {
        page = page.with_url(url);
    }
    let context = extract_form_context(&page)?;

    let store = open_store(settings);
    let mut runner = build_runner(settings, store);
    let profile = runner.learn(&context).await?;

    println!(
        "Learned from {} fields. Profile now has {} entries.",
        context.observed_values().len(),
        profile.as_map().len()
    );
    Ok(())
}

// ============================================================================
// ingest subcommand
// ============================================================================

pub async fn cmd_ingest(settings: &Settings, file: &str, pdf: bool) -> Result<(), AutofillError> {
    let source: Box<dyn DocumentSource> = if pdf || file.to_ascii_lowercase().ends_with(".pdf") {
        Box::new(PdfToTextSource::default())
    } else {
        Box::new(PlainTextSource)
    };

    let store = open_store(settings);
    let mut runner = build_runner(settings, store);
    let profile = runner.ingest(source.as_ref(), Path::new(file)).await?;

    println!(
        "Document processed. Profile now has {} entries.",
        profile.as_map().len()
    );
    Ok(())
}

// ============================================================================
// profile / key / forms subcommands
// ============================================================================

pub fn cmd_profile_show(store: &dyn ProfileStore) -> Result<(), AutofillError> {
    let profile = store.profile()?;
    if profile.is_empty() {
        println!("No profile stored yet. Run `form-autofill profile init` to start from a sample.");
    } else {
        println!("{}", profile.to_pretty_json());
    }
    Ok(())
}

/// Store the sample profile. Returns whether anything was written.
pub fn cmd_profile_init(store: &dyn ProfileStore, force: bool) -> Result<bool, AutofillError> {
    if store.has_profile()? && !force {
        println!("A profile already exists; use --force to replace it.");
        return Ok(false);
    }
    store.save_profile(&default_profile())?;
    info!("sample profile stored");
    println!("Sample profile stored.");
    Ok(true)
}

pub fn cmd_profile_set(store: &dyn ProfileStore, file: &str) -> Result<(), AutofillError> {
    let content = read_file(file)?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| AutofillError::MalformedJson(format!("{}: {}", file, e)))?;
    let profile = Profile::from_value(value)?;
    store.save_profile(&profile)?;
    println!("Profile replaced ({} entries).", profile.as_map().len());
    Ok(())
}

pub async fn cmd_key_set(
    settings: &Settings,
    store: &dyn ProfileStore,
    key: &str,
    validate: bool,
) -> Result<(), AutofillError> {
    if key.trim().is_empty() {
        return Err(AutofillError::MissingCredential);
    }
    if validate {
        build_client(settings).validate_credential(key).await?;
        println!("API key accepted by the service.");
    }
    store.set_credential(key)?;
    println!("API key saved.");
    Ok(())
}

pub fn cmd_forms_list(store: &dyn ProfileStore) -> Result<(), AutofillError> {
    print!("{}", format_saved_forms(&store.saved_forms()?));
    Ok(())
}
