use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::form::applier::{CompletionSummary, apply_fill};
use crate::form::form_model::FormContext;
use crate::form::page::HostPage;
use crate::ingest::document::DocumentSource;
use crate::model::client::ModelRequest;
use crate::model::gateway::ModelGateway;
use crate::model::parser::{extract_json_object, validate_fill_response};
use crate::profile::merger::merge_checked;
use crate::profile::profile_model::Profile;
use crate::profile::store::{ProfileStore, SavedForm};
use crate::prompt::builder::{
    PromptMode, amend_for_retry, build_fill_prompt, build_ingest_prompt, build_learn_prompt,
    system_message,
};
use crate::round::error::AutofillError;
use crate::round::round_model::{RetryDecision, RoundConfig, RoundState, check_retry};
use crate::trace::logger::TraceLogger;
use crate::trace::trace::TraceEvent;

/// Drives fill, learn and ingest rounds through the model gateway.
///
/// One runner handles one round at a time; each call starts from `Idle` and
/// ends in `Applied`, `Merged` or `Failed`. Every transition is logged and
/// written to the trace.
pub struct RoundRunner {
    gateway: Arc<ModelGateway>,
    store: Arc<dyn ProfileStore>,
    config: RoundConfig,
    tracer: Arc<TraceLogger>,
    cancel: CancellationToken,

    state: RoundState,
    mode: PromptMode,
    attempt: u32,
    signature: Option<String>,
}

impl RoundRunner {
    pub fn new(gateway: Arc<ModelGateway>, store: Arc<dyn ProfileStore>) -> Self {
        Self {
            gateway,
            store,
            config: RoundConfig::default(),
            tracer: Arc::new(TraceLogger::disabled()),
            cancel: CancellationToken::new(),
            state: RoundState::Idle,
            mode: PromptMode::Fill,
            attempt: 0,
            signature: None,
        }
    }

    pub fn with_config(mut self, config: RoundConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<TraceLogger>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    /// Model calls made by the most recent round.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ------------------------------------------------------------------------
    // Rounds
    // ------------------------------------------------------------------------

    /// Ask the model for values and write them into the page.
    pub async fn fill(
        &mut self,
        context: &FormContext,
        page: &mut dyn HostPage,
    ) -> Result<CompletionSummary, AutofillError> {
        self.begin(PromptMode::Fill, Some(context.signature()));

        let identities = context.identities();
        if identities.is_empty() {
            return Err(self.fail(AutofillError::NoFieldsFound));
        }
        let profile = self.guard(self.store.profile())?;

        self.enter(RoundState::BuildingPrompt);
        let prompt = build_fill_prompt(&profile, context);

        let values = self
            .exchange(prompt, |object| {
                validate_fill_response(&object, &identities)?;
                Ok(object)
            })
            .await?;

        self.enter(RoundState::Applying);
        let summary = self.guard(apply_fill(&values, context, page))?;

        self.enter(RoundState::Applied);
        info!(
            resolved = summary.resolved.len(),
            unresolved = summary.unresolved.len(),
            "fill round complete"
        );
        Ok(summary)
    }

    /// Fold the values the user typed into the stored profile.
    pub async fn learn(&mut self, context: &FormContext) -> Result<Profile, AutofillError> {
        self.begin(PromptMode::Learn, Some(context.signature()));

        let observed = context.observed_values();
        if observed.is_empty() {
            return Err(self.fail(AutofillError::NoObservedValues));
        }
        let current = self.guard(self.store.profile())?;

        self.enter(RoundState::BuildingPrompt);
        let prompt = build_learn_prompt(&current, context, &observed);

        let merged = self
            .exchange(prompt, |object| merge_checked(&current, &Value::Object(object)))
            .await?;

        self.enter(RoundState::Merging);
        self.guard(self.store.save_profile(&merged))?;
        let snapshot = SavedForm {
            timestamp: Utc::now(),
            signature: context.signature(),
            url: context.url.clone(),
            data: observed,
        };
        self.guard(self.store.record_form(snapshot))?;

        self.enter(RoundState::Merged);
        info!(keys = merged.as_map().len(), "learn round complete");
        Ok(merged)
    }

    /// Pull personal details from a document into the stored profile.
    ///
    /// The whole round, text extraction included, is bounded by the
    /// configured ingest timeout.
    pub async fn ingest(
        &mut self,
        source: &dyn DocumentSource,
        path: &Path,
    ) -> Result<Profile, AutofillError> {
        self.begin(PromptMode::Ingest, None);

        let limit = self.config.ingest_timeout;
        let outcome = tokio::time::timeout(limit, self.ingest_round(source, path)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => Err(self.fail(AutofillError::Timeout {
                operation: "Document ingestion".into(),
                after: limit,
            })),
        }
    }

    async fn ingest_round(
        &mut self,
        source: &dyn DocumentSource,
        path: &Path,
    ) -> Result<Profile, AutofillError> {
        let text = source.extract_text(path).await;
        let text = self.guard(text)?;
        let current = self.guard(self.store.profile())?;

        self.enter(RoundState::BuildingPrompt);
        let prompt = build_ingest_prompt(&current, &text);

        let merged = self
            .exchange(prompt, |object| merge_checked(&current, &Value::Object(object)))
            .await?;

        self.enter(RoundState::Merging);
        self.guard(self.store.save_profile(&merged))?;

        self.enter(RoundState::Merged);
        info!(keys = merged.as_map().len(), "ingest round complete");
        Ok(merged)
    }

    // ------------------------------------------------------------------------
    // Model exchange with bounded retries
    // ------------------------------------------------------------------------

    async fn exchange<T>(
        &mut self,
        prompt: String,
        accept: impl Fn(Map<String, Value>) -> Result<T, AutofillError>,
    ) -> Result<T, AutofillError> {
        let credential = self.guard(self.store.credential())?;
        let policy = self.config.policy(self.mode);
        let parse_mode = self.config.parse_mode;
        let system = system_message(self.mode);
        let mut request = ModelRequest::new(system, prompt.clone());

        loop {
            self.attempt += 1;
            self.enter(RoundState::AwaitingModel);
            debug!(attempt = self.attempt, prompt = %request.prompt, "sending prompt");

            let answer = self
                .gateway
                .call(&request, credential.as_deref(), &self.cancel)
                .await;
            let answer = self.guard(answer)?;
            debug!(attempt = self.attempt, answer = %answer, "model answered");

            self.enter(RoundState::Validating);
            let error = match extract_json_object(&answer, parse_mode).and_then(&accept) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            match check_retry(policy, self.attempt, &error) {
                RetryDecision::Retry => {
                    warn!(attempt = self.attempt, error = %error, "answer rejected, retrying");
                    self.trace(
                        TraceEvent::now(self.mode, self.attempt, &RoundState::Retrying)
                            .with_decision("retry")
                            .with_error(&error),
                    );
                    self.state = RoundState::Retrying;
                    request.prompt = amend_for_retry(&prompt, &error.to_string());
                }
                RetryDecision::GiveUp("retry_budget_exhausted") => {
                    return Err(self.fail(AutofillError::RetriesExhausted {
                        attempts: self.attempt,
                        last: Box::new(error),
                    }));
                }
                RetryDecision::GiveUp(_) => return Err(self.fail(error)),
            }
        }
    }

    // ------------------------------------------------------------------------
    // State bookkeeping
    // ------------------------------------------------------------------------

    fn begin(&mut self, mode: PromptMode, signature: Option<String>) {
        self.mode = mode;
        self.attempt = 0;
        self.signature = signature;
        self.enter(RoundState::Idle);
    }

    fn enter(&mut self, next: RoundState) {
        debug!(mode = self.mode.as_str(), attempt = self.attempt, state = ?next, "round transition");
        self.state = next;
        self.trace(TraceEvent::now(self.mode, self.attempt, &next));
    }

    /// Move to `Failed`, record why, and hand the error back.
    fn fail(&mut self, error: AutofillError) -> AutofillError {
        info!(mode = self.mode.as_str(), attempt = self.attempt, error = %error, "round failed");
        self.state = RoundState::Failed;
        self.trace(
            TraceEvent::now(self.mode, self.attempt, &RoundState::Failed)
                .with_decision("fail")
                .with_error(&error),
        );
        error
    }

    fn guard<T>(&mut self, result: Result<T, AutofillError>) -> Result<T, AutofillError> {
        result.map_err(|e| self.fail(e))
    }

    fn trace(&self, event: TraceEvent) {
        self.tracer
            .log(&event.with_signature(self.signature.as_deref()));
    }
}
