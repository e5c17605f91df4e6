//! Configuration du kernel (`kernel.yaml`).
//!
//! Chemin lu dans `SOVEREIGN_KERNEL_CONFIG`. Un fichier absent ou invalide
//! n'arrête jamais le kernel : valeurs par défaut + warning dans les logs.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub advisory: AdvisoryConf,
    pub telemetry: TelemetryConf,
    pub panels: PanelTimings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryConf {
    pub base_url: String,
    pub model: String,
    /// Nom de la variable d'env contenant la clé API de complétion.
    pub api_key_env: String,
    pub max_attempts: u32,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub thinking_budget: Option<u32>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Simulated,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConf {
    pub source: SourceKind,
    /// Graine RNG fixe pour des simulations reproductibles ; aléatoire si absente.
    pub seed: Option<u64>,
    pub mqtt: MqttConf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub topic: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelTimings {
    pub metric_tick_ms: u64,
    pub progress_tick_ms: u64,
    pub beacon_tick_ms: u64,
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl Default for AdvisoryConf {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".into(),
            model: "gemini-3-flash-preview".into(),
            api_key_env: "API_KEY".into(),
            max_attempts: 3,
            temperature: Some(0.7),
            max_output_tokens: None,
            thinking_budget: None,
            request_timeout_secs: 30,
        }
    }
}

impl Default for TelemetryConf {
    fn default() -> Self {
        Self {
            source: SourceKind::Simulated,
            seed: None,
            mqtt: MqttConf::default(),
        }
    }
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            topic: "sovereign/mesh/heartbeat@v1".into(),
        }
    }
}

impl Default for PanelTimings {
    fn default() -> Self {
        Self {
            metric_tick_ms: 3000,
            progress_tick_ms: 100,
            beacon_tick_ms: 5000,
        }
    }
}

impl PanelTimings {
    pub fn metric_tick(&self) -> Duration {
        Duration::from_millis(self.metric_tick_ms)
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms)
    }

    pub fn beacon_tick(&self) -> Duration {
        Duration::from_millis(self.beacon_tick_ms)
    }
}

impl KernelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.advisory.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "advisory.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        let p = &self.panels;
        for (field, ms) in [
            ("panels.metric_tick_ms", p.metric_tick_ms),
            ("panels.progress_tick_ms", p.progress_tick_ms),
            ("panels.beacon_tick_ms", p.beacon_tick_ms),
        ] {
            // un interval tokio panique sur une période nulle
            if ms == 0 {
                return Err(ConfigError::Invalid { field, reason: "must be > 0".into() });
            }
        }
        Ok(())
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    let cfg: KernelConfig = serde_yaml::from_str(txt)?;
    cfg.validate()?;
    Ok(cfg)
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("SOVEREIGN_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    if !Path::new(&path).exists() {
        info!(%path, "no kernel config found, using defaults");
        return KernelConfig::default();
    }
    let txt = fs::read_to_string(&path).await.unwrap_or_default();
    parse_config(&txt).unwrap_or_else(|e| {
        warn!(%path, error = %e, "config rejected, using defaults");
        KernelConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let cfg = parse_config("   \n").unwrap();
        assert_eq!(cfg.advisory.max_attempts, 3);
        assert_eq!(cfg.telemetry.source, SourceKind::Simulated);
        assert_eq!(cfg.http.bind, "0.0.0.0:8080");
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let cfg = parse_config(
            "telemetry:\n  source: live\n  seed: 7\npanels:\n  metric_tick_ms: 2000\n",
        )
        .unwrap();
        assert_eq!(cfg.telemetry.source, SourceKind::Live);
        assert_eq!(cfg.telemetry.seed, Some(7));
        assert_eq!(cfg.telemetry.mqtt.port, 1883);
        assert_eq!(cfg.panels.metric_tick(), Duration::from_secs(2));
        assert_eq!(cfg.panels.progress_tick_ms, 100);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let err = parse_config("advisory:\n  max_attempts: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "advisory.max_attempts", .. }));
    }

    #[test]
    fn test_zero_tick_rejected() {
        assert!(parse_config("panels:\n  beacon_tick_ms: 0\n").is_err());
    }
}
