/*!
Backend de complétion scripté

Remplace le service de complétion génératif pour tester panneaux et client
de conseil sans réseau. Les réponses sont consommées dans l'ordre des appels ;
une fois le script vide, la réponse de repli se répète indéfiniment.
*/

use async_trait::async_trait;
use parking_lot::Mutex;
use sovereign_kernel::advisory::{BackendError, CompletionBackend, CompletionRequest};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Répond après un délai sur l'horloge tokio.
    Delayed(String, Duration),
    RateLimited,
    Fail,
    Empty,
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Reply::Text(text.to_string())
    }

    pub fn delayed(text: &str, delay: Duration) -> Self {
        Reply::Delayed(text.to_string(), delay)
    }
}

pub struct ScriptedBackend {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn always(reply: Reply) -> Arc<Self> {
        Self::new(Vec::new(), reply)
    }

    pub fn push(&self, reply: Reply) {
        self.script.lock().push_back(reply);
    }

    /// Tous les appels reçus, sondes de santé comprises.
    pub fn attempts(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        self.prompts.lock().push(request.prompt.clone());
        let reply = self.script.lock().pop_front().unwrap_or_else(|| self.fallback.clone());
        log::debug!("scripted reply {:?} for model {}", reply, request.model);
        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Delayed(text, delay) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Reply::RateLimited => Err(BackendError::classify(
                429,
                r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#.to_string(),
            )),
            Reply::Fail => Err(BackendError::Http { status: 500, body: "internal".into() }),
            Reply::Empty => Ok(String::new()),
        }
    }
}
