use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::model::client::{ModelClient, ModelRequest};
use crate::round::error::AutofillError;

/// Serializes all model traffic: at most one request is in flight at a time.
///
/// Waiters are admitted in arrival order. Waiting can be bounded, and both
/// the wait and the request itself can be abandoned through a cancellation
/// token. Share one gateway (behind an `Arc`) across every round in the
/// process.
pub struct ModelGateway {
    client: Arc<dyn ModelClient>,
    gate: Mutex<()>,
    acquire_timeout: Option<Duration>,
}

impl ModelGateway {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            gate: Mutex::new(()),
            acquire_timeout: None,
        }
    }

    /// Give up with `Timeout` if the gate is not free within `limit`.
    pub fn with_acquire_timeout(mut self, limit: Duration) -> Self {
        self.acquire_timeout = Some(limit);
        self
    }

    /// Send one request, waiting for any earlier request to settle first.
    pub async fn call(
        &self,
        request: &ModelRequest,
        credential: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, AutofillError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AutofillError::MissingCredential)?;

        let acquire = async {
            match self.acquire_timeout {
                Some(limit) => tokio::time::timeout(limit, self.gate.lock())
                    .await
                    .map_err(|_| AutofillError::Timeout {
                        operation: "Waiting for the model gateway".into(),
                        after: limit,
                    }),
                None => Ok(self.gate.lock().await),
            }
        };

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AutofillError::Cancelled),
            permit = acquire => permit?,
        };

        debug!(prompt_chars = request.prompt.len(), "model request started");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AutofillError::Cancelled),
            result = self.client.complete(request, credential) => result,
        };

        match &result {
            Ok(_) => debug!("model request settled"),
            Err(e) => info!(error = %e, "model request failed"),
        }
        result
    }
}
