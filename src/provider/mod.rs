//! Reasoning service abstraction
//!
//! The runner dispatches rendered prompts through a boxed Tower service so
//! the model behind it can be swapped without touching the loop: the real
//! OpenAI-backed reasoner in production, a scripted one in tests and
//! offline runs.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use serde_json::Value;
use tower::{util::BoxCloneService, BoxError, Service, ServiceExt};
use tracing::debug;

/// A fully rendered prompt for one reasoning step.
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub system: String,
    pub user: String,
}

/// Model reply for one step: structured output plus actual token cost.
#[derive(Debug, Clone)]
pub struct StepResponse {
    pub output: Value,
    pub tokens: u64,
}

/// Boxed reasoning service type.
pub type ReasoningSvc = BoxCloneService<StepRequest, StepResponse, BoxError>;

/// Dispatch a request through a cloned handle of the reasoning service.
pub async fn dispatch(mut svc: ReasoningSvc, req: StepRequest) -> Result<StepResponse, BoxError> {
    ServiceExt::ready(&mut svc).await?.call(req).await
}

/// Parse a model reply into a structured value. Replies are expected as
/// YAML (JSON is a YAML subset); anything unparseable is wrapped under
/// `raw_response`.
pub fn parse_reply(text: &str) -> Value {
    match serde_yaml::from_str::<serde_yaml::Value>(text) {
        Ok(yaml) => match serde_json::to_value(&yaml) {
            Ok(value) => value,
            Err(_) => serde_json::json!({ "raw_response": text }),
        },
        Err(_) => serde_json::json!({ "raw_response": text }),
    }
}

/// OpenAI-backed reasoning service.
#[derive(Clone)]
pub struct OpenAiReasoner {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiReasoner {
    pub fn new(
        client: Arc<Client<OpenAIConfig>>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
            max_tokens,
        }
    }

    pub fn into_svc(self) -> ReasoningSvc {
        BoxCloneService::new(self)
    }
}

impl Service<StepRequest> for OpenAiReasoner {
    type Response = StepResponse;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: StepRequest) -> Self::Future {
        let client = self.client.clone();
        let model = self.model.clone();
        let temperature = self.temperature;
        let max_tokens = self.max_tokens;

        Box::pin(async move {
            let system = ChatCompletionRequestSystemMessageArgs::default()
                .content(req.system)
                .build()
                .map_err(|e| format!("system msg build error: {e}"))?;
            let user = ChatCompletionRequestUserMessageArgs::default()
                .content(req.user)
                .build()
                .map_err(|e| format!("user msg build error: {e}"))?;
            let request = CreateChatCompletionRequestArgs::default()
                .model(&model)
                .temperature(temperature)
                .max_tokens(max_tokens)
                .messages(vec![system.into(), user.into()])
                .build()
                .map_err(|e| format!("request build error: {e}"))?;

            let response = client.chat().create(request).await.map_err(BoxError::from)?;

            let content = response
                .choices
                .first()
                .and_then(|c| c.message.content.clone())
                .unwrap_or_default();
            let tokens = response
                .usage
                .map(|u| u.total_tokens as u64)
                .unwrap_or(0);
            debug!(model = %model, tokens, "model call complete");

            Ok(StepResponse {
                output: parse_reply(&content),
                tokens,
            })
        })
    }
}

/// A reasoner that replays a fixed script of outcomes, in order. Used by
/// tests and by offline dry runs when no API key is configured.
#[derive(Clone, Default)]
pub struct ScriptedReasoner {
    script: Arc<Mutex<VecDeque<Result<StepResponse, String>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedReasoner {
    pub fn new(script: Vec<Result<StepResponse, String>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A script of `n` identical successful responses.
    pub fn repeating(output: Value, tokens: u64, n: usize) -> Self {
        Self::new(
            std::iter::repeat_with(|| {
                Ok(StepResponse {
                    output: output.clone(),
                    tokens,
                })
            })
            .take(n)
            .collect(),
        )
    }

    /// Number of calls dispatched so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn into_svc(self) -> ReasoningSvc {
        BoxCloneService::new(self)
    }
}

impl Service<StepRequest> for ScriptedReasoner {
    type Response = StepResponse;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: StepRequest) -> Self::Future {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .expect("script mutex")
            .pop_front();
        Box::pin(async move {
            match next {
                Some(Ok(resp)) => Ok(resp),
                Some(Err(msg)) => Err(msg.into()),
                None => Err("script exhausted".into()),
            }
        })
    }
}
