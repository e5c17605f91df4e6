//! Générateur de métriques bruitées.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::TelemetryError;

/// Déclaration d'une grandeur numérique qui doit « sembler vivante ».
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    pub initial: f64,
    /// Variation maximale d'un tick.
    pub delta: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Décimales conservées après chaque tick.
    pub precision: Option<u32>,
}

impl MetricSpec {
    pub fn new(name: &str, initial: f64, delta: f64) -> Self {
        Self {
            name: name.to_string(),
            initial,
            delta,
            min: None,
            max: None,
            precision: None,
        }
    }

    pub fn bounded(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn precision(mut self, places: u32) -> Self {
        self.precision = Some(places);
        self
    }

    /// Raccourci pourcentage : bornes [0,100].
    pub fn percent(name: &str, initial: f64, delta: f64) -> Self {
        Self::new(name, initial, delta).bounded(0.0, 100.0)
    }

    pub fn validate(&self) -> Result<(), TelemetryError> {
        let bad = |reason: &str| TelemetryError::InvalidMetric {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if !self.initial.is_finite() {
            return Err(bad("initial value must be finite"));
        }
        if !self.delta.is_finite() || self.delta < 0.0 {
            return Err(bad("delta must be finite and non-negative"));
        }
        if self.min.is_some_and(|v| !v.is_finite()) || self.max.is_some_and(|v| !v.is_finite()) {
            return Err(bad("bounds must be finite"));
        }
        if let (Some(lo), Some(hi)) = (self.min, self.max) {
            if lo > hi {
                return Err(bad("min exceeds max"));
            }
        }
        Ok(())
    }

    fn clamp(&self, v: f64) -> f64 {
        let v = self.min.map_or(v, |lo| v.max(lo));
        self.max.map_or(v, |hi| v.min(hi))
    }
}

#[derive(Debug, Clone)]
pub struct JitteredMetric {
    spec: MetricSpec,
    value: f64,
}

impl JitteredMetric {
    pub fn new(spec: MetricSpec) -> Result<Self, TelemetryError> {
        spec.validate()?;
        let value = spec.clamp(spec.initial);
        Ok(Self { spec, value })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &MetricSpec {
        &self.spec
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Retour à la valeur initiale, comme au montage.
    pub fn reseed(&mut self) {
        self.value = self.spec.clamp(self.spec.initial);
    }

    /// `next = clamp(current + uniform(-delta, +delta), min, max)`, arrondi
    /// à la précision déclarée. L'arrondi n'élargit jamais le pas au-delà de
    /// `delta` : sinon la valeur est tronquée vers `current`.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        let delta = self.spec.delta;
        let step = if delta > 0.0 { rng.gen_range(-delta..=delta) } else { 0.0 };
        let current = self.value;
        let mut next = current + step;

        if let Some(places) = self.spec.precision {
            let scale = 10f64.powi(places as i32);
            let rounded = (next * scale).round() / scale;
            next = if (rounded - current).abs() <= delta {
                rounded
            } else if next > current {
                (next * scale).floor() / scale
            } else {
                (next * scale).ceil() / scale
            };
        }

        let next = self.spec.clamp(next);
        // cas limites arithmétiques (très grandes magnitudes)
        if next.is_finite() {
            self.value = next;
        }
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_bounded_jitter_over_many_ticks() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut m = JitteredMetric::new(MetricSpec::percent("load", 50.0, 5.0)).unwrap();
        let mut prev = m.value();
        for _ in 0..1000 {
            let v = m.tick(&mut rng);
            assert!((0.0..=100.0).contains(&v), "out of bounds: {v}");
            assert!((v - prev).abs() <= 5.0 + 1e-9);
            prev = v;
        }
    }

    #[test]
    fn test_precision_never_exceeds_delta() {
        let mut rng = StdRng::seed_from_u64(3);
        let spec = MetricSpec::percent("threat", 12.0, 0.25).precision(1);
        let mut m = JitteredMetric::new(spec).unwrap();
        let mut prev = m.value();
        for _ in 0..2000 {
            let v = m.tick(&mut rng);
            assert!((v - prev).abs() <= 0.25 + 1e-9, "step {prev} -> {v}");
            assert_eq!((v * 10.0).round(), v * 10.0);
            prev = v;
        }
    }

    #[test]
    fn test_integer_counts_stay_integral_and_non_negative() {
        let mut rng = StdRng::seed_from_u64(11);
        let spec = MetricSpec::new("peers", 2.0, 5.0).at_least(0.0).precision(0);
        let mut m = JitteredMetric::new(spec).unwrap();
        for _ in 0..500 {
            let v = m.tick(&mut rng);
            assert!(v >= 0.0);
            assert_eq!(v.fract(), 0.0);
        }
    }

    #[test]
    fn test_zero_delta_is_constant() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut m = JitteredMetric::new(MetricSpec::new("flat", 7.5, 0.0)).unwrap();
        assert_eq!(m.tick(&mut rng), 7.5);
    }

    #[test]
    fn test_reseed_restores_initial() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut m = JitteredMetric::new(MetricSpec::percent("health", 94.0, 2.0)).unwrap();
        for _ in 0..10 {
            m.tick(&mut rng);
        }
        m.reseed();
        assert_eq!(m.value(), 94.0);
    }

    #[test]
    fn test_initial_outside_bounds_is_clamped() {
        let m = JitteredMetric::new(MetricSpec::percent("battery", 140.0, 1.0)).unwrap();
        assert_eq!(m.value(), 100.0);
    }

    #[test]
    fn test_invalid_specs_rejected() {
        assert!(JitteredMetric::new(MetricSpec::new("a", f64::NAN, 1.0)).is_err());
        assert!(JitteredMetric::new(MetricSpec::new("b", 1.0, -1.0)).is_err());
        assert!(JitteredMetric::new(MetricSpec::new("c", 1.0, 1.0).bounded(5.0, 0.0)).is_err());
    }
}
