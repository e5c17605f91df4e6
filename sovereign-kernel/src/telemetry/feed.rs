//! Flux d'événements : événements réseau synthétiques, plus récent en tête, borné.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Builder;

use super::TelemetryError;
use crate::models::{display_time, LogEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedKind {
    pub kind: String,
    pub weight: f64,
}

impl WeightedKind {
    pub fn new(kind: &str, weight: f64) -> Self {
        Self { kind: kind.to_string(), weight }
    }
}

/// Champ `value` dérivé : `{prefix}-{n}` avec `n` tiré dans `[low, high]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRule {
    pub prefix: String,
    pub low: u32,
    pub high: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub vocabulary: Vec<WeightedKind>,
    /// Probabilité qu'un tick produise un événement.
    pub emit_probability: f64,
    pub capacity: usize,
    pub interval_ms: u64,
    pub subject: Option<SubjectRule>,
}

impl FeedSpec {
    /// Vocabulaire uniforme, un événement par tick.
    pub fn uniform(name: &str, kinds: &[&str], capacity: usize, interval_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            vocabulary: kinds.iter().map(|k| WeightedKind::new(k, 1.0)).collect(),
            emit_probability: 1.0,
            capacity,
            interval_ms,
            subject: None,
        }
    }

    pub fn weighted(name: &str, vocabulary: Vec<WeightedKind>, capacity: usize, interval_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            vocabulary,
            emit_probability: 1.0,
            capacity,
            interval_ms,
            subject: None,
        }
    }

    pub fn gated(mut self, probability: f64) -> Self {
        self.emit_probability = probability;
        self
    }

    pub fn with_subject(mut self, prefix: &str, low: u32, high: u32) -> Self {
        self.subject = Some(SubjectRule { prefix: prefix.to_string(), low, high });
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<(), TelemetryError> {
        let bad = |reason: &str| TelemetryError::InvalidFeed {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.vocabulary.is_empty() {
            return Err(bad("vocabulary is empty"));
        }
        if self.vocabulary.iter().any(|w| !w.weight.is_finite() || w.weight < 0.0) {
            return Err(bad("weights must be finite and non-negative"));
        }
        if self.vocabulary.iter().map(|w| w.weight).sum::<f64>() <= 0.0 {
            return Err(bad("weights sum to zero"));
        }
        if !(0.0..=1.0).contains(&self.emit_probability) {
            return Err(bad("emit probability outside [0,1]"));
        }
        if self.capacity == 0 {
            return Err(bad("capacity must be at least 1"));
        }
        if self.interval_ms == 0 {
            return Err(bad("interval must be > 0"));
        }
        if let Some(s) = &self.subject {
            if s.low > s.high {
                return Err(bad("subject range is empty"));
            }
        }
        Ok(())
    }
}

/// Sélection par poids cumulés pour un tirage dans `[0, 1)`.
pub fn select_kind(vocabulary: &[WeightedKind], draw: f64) -> Option<&str> {
    let total: f64 = vocabulary.iter().map(|w| w.weight).sum();
    if total <= 0.0 {
        return None;
    }
    let target = draw.clamp(0.0, 1.0) * total;
    let mut acc = 0.0;
    for w in vocabulary {
        acc += w.weight;
        if target < acc {
            return Some(&w.kind);
        }
    }
    // tirage == 1.0 ou résidu flottant : dernier type tirable
    vocabulary.iter().rev().find(|w| w.weight > 0.0).map(|w| w.kind.as_str())
}

/// Id opaque construit depuis le RNG de l'appelant.
pub fn event_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    Builder::from_random_bytes(rng.gen()).into_uuid().simple().to_string()
}

#[derive(Debug, Clone)]
pub struct EventGenerator {
    spec: FeedSpec,
}

impl EventGenerator {
    pub fn new(spec: FeedSpec) -> Result<Self, TelemetryError> {
        spec.validate()?;
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &FeedSpec {
        &self.spec
    }

    pub fn tick<R: Rng + ?Sized>(&self, rng: &mut R, now: OffsetDateTime) -> Option<LogEvent> {
        if !rng.gen_bool(self.spec.emit_probability) {
            return None;
        }
        let kind = select_kind(&self.spec.vocabulary, rng.gen::<f64>())?.to_string();
        let value = self
            .spec
            .subject
            .as_ref()
            .map(|s| format!("{}-{}", s.prefix, rng.gen_range(s.low..=s.high)));
        Some(LogEvent {
            id: event_id(rng),
            kind,
            timestamp: display_time(now),
            value,
        })
    }
}

/// Liste plus-récent-d'abord, tronquée par position après chaque insertion.
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    events: VecDeque<LogEvent>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, events: VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, event: LogEvent) {
        self.events.push_front(event);
        self.events.truncate(self.capacity);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn latest(&self) -> Option<&LogEvent> {
        self.events.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEvent> {
        self.events.iter()
    }

    pub fn to_vec(&self) -> Vec<LogEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
