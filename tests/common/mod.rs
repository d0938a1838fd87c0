#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use form_autofill::model::client::{ModelClient, ModelRequest};
use form_autofill::round::error::AutofillError;

/// Answers prompts from a script, then repeats `fallback` (or fails).
pub struct ScriptedClient {
    answers: Mutex<VecDeque<Result<String, AutofillError>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<ModelRequest>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(answers: Vec<Result<String, AutofillError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            fallback: None,
            prompts: Mutex::new(vec![]),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(answer: &str) -> Self {
        Self {
            fallback: Some(answer.to_string()),
            ..Self::new(vec![])
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }

    pub fn systems(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.system.clone())
            .collect()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn complete(&self, request: &ModelRequest, _credential: &str) -> Result<String, AutofillError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.clone());

        if let Some(next) = self.answers.lock().unwrap().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(answer) => Ok(answer.clone()),
            None => Err(AutofillError::TransportFailure("script exhausted".into())),
        }
    }
}

/// Sleeps on every call and records how many calls overlapped.
pub struct SlowClient {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    order: Mutex<Vec<String>>,
}

impl SlowClient {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            order: Mutex::new(vec![]),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn order(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for SlowClient {
    async fn complete(&self, request: &ModelRequest, _credential: &str) -> Result<String, AutofillError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.order.lock().unwrap().push(request.prompt.clone());

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(format!("{{\"echo\":\"{}\"}}", request.prompt))
    }
}

pub const SIGNUP_FORM: &str = r#"<html><body><form>
<label for="name">Full Name</label><input id="name" name="full_name" required minlength="2">
<label for="email">Email</label><input id="email" type="email" name="email">
<label for="phone">Phone</label><input id="phone" type="tel" name="phone">
<input type="hidden" name="csrf" value="t0k3n">
<button type="submit">Sign up</button>
</form></body></html>"#;

pub const FILLED_FORM: &str = r#"<html><body><form>
<label for="name">Full Name</label><input id="name" value="Jane Doe">
<label for="email">Email</label><input id="email" type="email" value="b@x.com">
<label for="phone">Phone</label><input id="phone" type="tel" value="">
</form></body></html>"#;
