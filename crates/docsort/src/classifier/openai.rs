//! Classifier backed by an OpenAI-compatible `/chat/completions` endpoint.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tracing::{debug, info_span, warn};

use super::{prompt, truncate_input, Analysis, CategorySet, Classifier};
use crate::config::Config;
use crate::error::ClassificationError;
use crate::secrets::resolve_secret_optional;

const USER_AGENT: &str = concat!("docsort/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub model: String,
    pub temperature: f32,
    pub api_base: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub max_input_chars: usize,
    pub language: String,
}

impl ClassifierSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            api_base: config.llm.api_base.clone(),
            timeout: Duration::from_secs(config.llm.request_timeout_secs),
            max_retries: config.llm.max_retries,
            max_input_chars: config.llm.max_input_chars,
            language: config.language.clone(),
        }
    }
}

/// Sends one chat-completion request per document.
///
/// The client owns a current-thread runtime so the pipeline can stay synchronous.
pub struct OpenAiClassifier {
    http: Client,
    runtime: Runtime,
    settings: ClassifierSettings,
    api_key: Option<SecretString>,
    entity_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClassifier {
    /// Builds the classifier from the `llm` section, resolving the API key.
    ///
    /// `entity_keys` are the entity names the routing templates reference.
    pub fn from_config(
        config: &Config,
        entity_keys: Vec<String>,
    ) -> Result<Self, ClassificationError> {
        let api_key = resolve_secret_optional(
            config.llm.api_key.as_deref(),
            config.llm.api_key_file.as_deref(),
            config.llm.api_key_env.as_deref(),
        )?;
        if api_key.is_none() {
            warn!("No API key configured, sending unauthenticated requests");
        }
        Self::new(ClassifierSettings::from_config(config), api_key, entity_keys)
    }

    pub fn new(
        settings: ClassifierSettings,
        api_key: Option<SecretString>,
        entity_keys: Vec<String>,
    ) -> Result<Self, ClassificationError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ClassificationError::Runtime(format!("HTTP client: {}", e)))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ClassificationError::Runtime(format!("async runtime: {}", e)))?;

        Ok(Self {
            http,
            runtime,
            settings,
            api_key,
            entity_keys,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.api_base.trim_end_matches('/')
        )
    }

    fn request_body(&self, text: &str, categories: &CategorySet) -> Value {
        json!({
            "model": self.settings.model,
            "temperature": self.settings.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                {
                    "role": "system",
                    "content": prompt::system_prompt(categories, &self.entity_keys, &self.settings.language),
                },
                { "role": "user", "content": prompt::user_prompt(text) },
            ],
        })
    }

    async fn send_once(&self, body: &Value) -> Result<String, ClassificationError> {
        let mut request = self.http.post(self.endpoint()).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClassificationError::Timeout(self.settings.timeout)
            } else {
                ClassificationError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassificationError::HttpStatus {
                status: status.as_u16(),
                body: crate::sanitize::preview(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            ClassificationError::InvalidResponse(format!("unexpected response shape: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                ClassificationError::InvalidResponse("response contains no message".to_string())
            })
    }

    fn send_with_timeout(&self, body: &Value) -> Result<String, ClassificationError> {
        let timeout = self.settings.timeout;
        self.runtime.block_on(async {
            match tokio::time::timeout(timeout, self.send_once(body)).await {
                Ok(result) => result,
                Err(_) => Err(ClassificationError::Timeout(timeout)),
            }
        })
    }
}

impl Classifier for OpenAiClassifier {
    fn classify(
        &self,
        text: &str,
        categories: &CategorySet,
    ) -> Result<Analysis, ClassificationError> {
        if text.trim().is_empty() {
            return Err(ClassificationError::EmptyInput);
        }

        let input = truncate_input(text, self.settings.max_input_chars);
        let _span = info_span!(
            "llm_request",
            model = %self.settings.model,
            input_chars = input.chars().count(),
        )
        .entered();

        let body = self.request_body(input, categories);
        let mut attempt = 0;
        loop {
            match self.send_with_timeout(&body) {
                Ok(content) => {
                    debug!(
                        response = %crate::sanitize::preview(&content, 200),
                        "Model responded"
                    );
                    return prompt::parse_response(&content);
                }
                Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.settings.max_retries,
                        error = %e,
                        "Transient model error, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
