//! Client de conseil : texte narratif produit par un service de
//! complétion génératif.
//!
//! - `CompletionBackend` est la couture transport (Gemini en REST en
//!   production, stubs scriptés en test)
//! - `AdvisoryClient` porte la politique de retry et ne remonte jamais
//!   d'erreur : chaque appel aboutit à un texte affichable
//! - le client est construit une fois au démarrage et partagé via `Arc`

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AdvisoryConf;
use crate::models::AdvisoryResult;

/// Affiché quand le service nous limite encore après tous les retries.
pub const CAPACITY_FALLBACK: &str =
    "Neural uplink at capacity. Strategic analysis will resume once mesh bandwidth frees up.";

/// Affiché quand le service échoue pour toute autre raison.
pub const LINK_UNSTABLE_FALLBACK: &str =
    "Intelligence link interrupted. Local analysis suggests nominal mesh performance.";

const HEALTH_PROBE_PROMPT: &str = "Reply with the single word: online";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub thinking_budget: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Classe une réponse HTTP en échec dans la taxonomie d'erreurs.
    pub fn classify(status: u16, body: String) -> Self {
        if status == 429 || body.contains("RESOURCE_EXHAUSTED") {
            BackendError::RateLimited(body)
        } else {
            BackendError::Http { status, body }
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BackendError::RateLimited(_))
    }
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, BackendError>;
}

/// Backend REST `generateContent`.
pub struct GeminiBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiBackend {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(cfg: &AdvisoryConf) -> Result<Self, BackendError> {
        let api_key = std::env::var(&cfg.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            warn!(env = %cfg.api_key_env, "completion API key not set, advisory calls will fail");
        }
        Self::new(&cfg.base_url, api_key, Duration::from_secs(cfg.request_timeout_secs))
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

fn request_body(request: &CompletionRequest) -> serde_json::Value {
    let mut body = json!({
        "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
    });
    if let Some(instruction) = &request.system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }
    let mut generation = serde_json::Map::new();
    if let Some(t) = request.temperature {
        generation.insert("temperature".into(), json!(t));
    }
    if let Some(max) = request.max_output_tokens {
        generation.insert("maxOutputTokens".into(), json!(max));
    }
    if let Some(budget) = request.thinking_budget {
        generation.insert("thinkingConfig".into(), json!({ "thinkingBudget": budget }));
    }
    if !generation.is_empty() {
        body["generationConfig"] = serde_json::Value::Object(generation);
    }
    body
}

fn extract_text(response: GenerateResponse) -> Result<String, BackendError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(BackendError::Malformed("no candidate text".into()));
    }
    Ok(text)
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let resp = self
            .http
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::classify(status.as_u16(), body));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        extract_text(parsed)
    }
}

#[derive(Debug, Default)]
struct AdvisoryStats {
    attempts: AtomicU64,
    rate_limited: AtomicU64,
    failures: AtomicU64,
    fallbacks: AtomicU64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryStatsView {
    pub attempts: u64,
    pub rate_limited: u64,
    pub failures: u64,
    pub fallbacks: u64,
}

enum Failure {
    RateLimited,
    Other,
}

pub struct AdvisoryClient {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    thinking_budget: Option<u32>,
    max_attempts: u32,
    stats: AdvisoryStats,
}

/// Attente après l'essai raté d'index `attempt` (base 0) :
/// `2^attempt` secondes plus jusqu'à une seconde de jitter.
pub fn backoff_delay<R: Rng + ?Sized>(attempt: u32, rng: &mut R) -> Duration {
    let base = Duration::from_secs(1u64 << attempt.min(16));
    base + Duration::from_millis(rng.gen_range(0..1000))
}

impl AdvisoryClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            temperature: None,
            max_output_tokens: None,
            thinking_budget: None,
            max_attempts: 3,
            stats: AdvisoryStats::default(),
        }
    }

    pub fn from_config(cfg: &AdvisoryConf, backend: Arc<dyn CompletionBackend>) -> Self {
        let mut client = Self::new(backend, cfg.model.clone()).with_max_attempts(cfg.max_attempts);
        client.temperature = cfg.temperature;
        client.max_output_tokens = cfg.max_output_tokens;
        client.thinking_budget = cfg.thinking_budget;
        client
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn stats(&self) -> AdvisoryStatsView {
        AdvisoryStatsView {
            attempts: self.stats.attempts.load(Ordering::Relaxed),
            rate_limited: self.stats.rate_limited.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            fallbacks: self.stats.fallbacks.load(Ordering::Relaxed),
        }
    }

    fn request(&self, prompt: &str, model: Option<&str>, system_instruction: Option<&str>) -> CompletionRequest {
        CompletionRequest {
            model: model.unwrap_or(&self.model).to_string(),
            prompt: prompt.to_string(),
            system_instruction: system_instruction.map(str::to_string),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
            thinking_budget: self.thinking_budget,
        }
    }

    async fn run(&self, request: &CompletionRequest) -> Result<String, Failure> {
        let mut attempt: u32 = 0;
        loop {
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);
            let err = match self.backend.generate(request).await {
                Ok(text) if !text.trim().is_empty() => return Ok(text),
                Ok(_) => BackendError::Malformed("empty completion".into()),
                Err(e) => e,
            };

            if !err.is_rate_limited() {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "advisory request failed");
                return Err(Failure::Other);
            }

            self.stats.rate_limited.fetch_add(1, Ordering::Relaxed);
            if attempt + 1 >= self.max_attempts {
                warn!(attempts = attempt + 1, "advisory retries exhausted on rate limit");
                return Err(Failure::RateLimited);
            }
            let delay = {
                let mut rng = rand::thread_rng();
                backoff_delay(attempt, &mut rng)
            };
            debug!(attempt = attempt + 1, ?delay, "rate limited, backing off");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// `Some(text)` en cas de succès, `Some(CAPACITY_FALLBACK)` une fois les
    /// retries sur rate-limit épuisés, `None` pour tout autre échec. `model`
    /// remplace le modèle configuré pour cet appel seulement.
    pub async fn complete(
        &self,
        prompt: &str,
        model: Option<&str>,
        system_instruction: Option<&str>,
    ) -> Option<String> {
        let request = self.request(prompt, model, system_instruction);
        match self.run(&request).await {
            Ok(text) => Some(text),
            Err(Failure::RateLimited) => {
                self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                Some(CAPACITY_FALLBACK.to_string())
            }
            Err(Failure::Other) => None,
        }
    }

    /// Forme de `complete` côté panneau : toujours un texte affichable.
    pub async fn advise(&self, prompt: &str, system_instruction: Option<&str>) -> AdvisoryResult {
        let request = self.request(prompt, None, system_instruction);
        match self.run(&request).await {
            Ok(text) => AdvisoryResult { text, is_fallback: false },
            Err(failure) => {
                self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                let text = match failure {
                    Failure::RateLimited => CAPACITY_FALLBACK,
                    Failure::Other => LINK_UNSTABLE_FALLBACK,
                };
                AdvisoryResult { text: text.to_string(), is_fallback: true }
            }
        }
    }

    /// Sonde unique, sans retry.
    pub async fn check_health(&self) -> bool {
        let request = self.request(HEALTH_PROBE_PROMPT, None, None);
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);
        match self.backend.generate(&request).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "advisory health probe failed");
                false
            }
        }
    }
}
