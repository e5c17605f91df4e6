//! Catalogue des écrans.
//!
//! Chaque écran est une `ScreenConfig` : métriques bruitées, flux actifs,
//! flotte d'entités affichée, prompt de conseil et fonctions annexes
//! (onboarding, uplink, balise, vérification). Un seul contrôleur
//! paramétré les sert tous.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::models::SimulatedEntity;
use crate::telemetry::entities::{kinetic_swarm, mesh_nodes};
use crate::telemetry::feed::{FeedSpec, WeightedKind};
use crate::telemetry::metric::MetricSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    Dashboard,
    Network,
    Identity,
    Uplink,
    Security,
    Verify,
    Governance,
    Atlas,
    Beacon,
    Command,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown screen: {0}")]
pub struct UnknownScreen(pub String);

impl Screen {
    pub const ALL: [Screen; 10] = [
        Screen::Dashboard,
        Screen::Network,
        Screen::Identity,
        Screen::Uplink,
        Screen::Security,
        Screen::Verify,
        Screen::Governance,
        Screen::Atlas,
        Screen::Beacon,
        Screen::Command,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Screen::Dashboard => "dashboard",
            Screen::Network => "network",
            Screen::Identity => "identity",
            Screen::Uplink => "uplink",
            Screen::Security => "security",
            Screen::Verify => "verify",
            Screen::Governance => "governance",
            Screen::Atlas => "atlas",
            Screen::Beacon => "beacon",
            Screen::Command => "command",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Screen::Dashboard => "Mesh Overview",
            Screen::Network => "Mesh Explorer",
            Screen::Identity => "Sovereign Identity",
            Screen::Uplink => "Network Uplink",
            Screen::Security => "Security Perimeter",
            Screen::Verify => "Verification Hub",
            Screen::Governance => "Governance Core",
            Screen::Atlas => "Neural Atlas",
            Screen::Beacon => "Active Beacon",
            Screen::Command => "Autonomous Command Hub",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Screen {
    type Err = UnknownScreen;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('/');
        // la route racine du shell mène au dashboard
        if wanted.is_empty() {
            return Ok(Screen::Dashboard);
        }
        Screen::ALL
            .into_iter()
            .find(|screen| screen.path().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownScreen(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Onboarding,
    Uplink,
    Beacon,
    Verification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorySpec {
    /// Les `{name}` sont résolus d'abord sur les paramètres du panneau, puis
    /// sur les valeurs courantes des métriques.
    pub prompt: String,
    pub system_instruction: Option<String>,
    pub loading_text: String,
}

impl AdvisorySpec {
    pub fn render(&self, params: &BTreeMap<String, String>, metrics: &BTreeMap<String, f64>) -> String {
        let mut out = self.prompt.clone();
        for (key, value) in params {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        for (key, value) in metrics {
            out = out.replace(&format!("{{{key}}}"), &value.to_string());
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenConfig {
    pub screen: Screen,
    pub metrics: Vec<MetricSpec>,
    pub feeds: Vec<FeedSpec>,
    pub entities: Option<Vec<SimulatedEntity>>,
    pub advisory: Option<AdvisorySpec>,
    pub parameters: BTreeMap<String, String>,
    /// Valeurs autorisées par paramètre ; les autres acceptent tout.
    pub choices: BTreeMap<String, Vec<String>>,
    pub features: Vec<Feature>,
}

const INTELLIGENCE_UNIT: &str = "You are the SovereignMap Intelligence Unit. Provide strategic, \
high-level analysis of spatial mesh performance and its digital sovereignty impact. \
Keep responses concise and technical.";

const ATLAS_SECTORS: [&str; 4] = ["Alpha-7", "Delta-4", "Sierra-9", "Zulu-2"];

impl ScreenConfig {
    fn empty(screen: Screen) -> Self {
        Self {
            screen,
            metrics: Vec::new(),
            feeds: Vec::new(),
            entities: None,
            advisory: None,
            parameters: BTreeMap::new(),
            choices: BTreeMap::new(),
            features: Vec::new(),
        }
    }

    fn param(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    fn advisory(mut self, prompt: &str, system: Option<&str>, loading: &str) -> Self {
        self.advisory = Some(AdvisorySpec {
            prompt: prompt.to_string(),
            system_instruction: system.map(str::to_string),
            loading_text: loading.to_string(),
        });
        self
    }

    pub fn has(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn for_screen(screen: Screen) -> Self {
        let base = Self::empty(screen);
        match screen {
            Screen::Dashboard => Self {
                metrics: vec![
                    MetricSpec::percent("mesh_load", 40.0, 5.0).precision(0),
                    MetricSpec::new("mesh_nodes", 42_891.0, 25.0).at_least(0.0).precision(0),
                    MetricSpec::new("throughput_pbs", 1.4, 0.05).at_least(0.0).precision(2),
                    MetricSpec::new("neural_tflops", 88.4, 0.5).at_least(0.0).precision(1),
                ],
                feeds: vec![FeedSpec::weighted(
                    "network",
                    vec![
                        WeightedKind::new("Handshake", 40.0),
                        WeightedKind::new("Block Confirmed", 30.0),
                        WeightedKind::new("Node Joined", 20.0),
                        WeightedKind::new("Intrusion Blocked", 10.0),
                    ],
                    15,
                    3000,
                )
                .with_subject("NODE", 0, 998)],
                ..base
            }
            .param("nodes", r#"[{"id":"node-x","status":"active"}]"#)
            .advisory(
                "Analyze this set of spatial network nodes for a digital sovereign mapping network. \
                 Identify potential clusters, network weaknesses, and give a strategic outlook on \
                 expansion. Current mesh load is {mesh_load}%. Nodes: {nodes}",
                Some(INTELLIGENCE_UNIT),
                "Initializing neural analysis...",
            ),

            Screen::Network => Self { entities: Some(mesh_nodes()), ..base },

            Screen::Identity => Self {
                metrics: vec![MetricSpec::percent("reputation", 98.2, 0.1).precision(1)],
                features: vec![Feature::Onboarding],
                ..base
            }
            .param("alias", "Alpha-Omega-42")
            .advisory(
                "Generate a short futuristic briefing for Node Operator {alias} about their current \
                 sector's status in the digital sovereignty mesh.",
                None,
                "Compiling operator briefing...",
            ),

            Screen::Uplink => Self {
                metrics: vec![MetricSpec::percent("signal_strength", 72.0, 3.0).precision(0)],
                features: vec![Feature::Uplink],
                ..base
            },

            Screen::Security => Self {
                metrics: vec![MetricSpec::percent("threat_level", 12.0, 3.0).precision(0)],
                feeds: vec![FeedSpec::weighted(
                    "tactical",
                    vec![
                        WeightedKind::new("encryption_rotation", 0.8),
                        WeightedKind::new("intrusion_blocked", 0.2),
                    ],
                    10,
                    4000,
                )
                .with_subject("NODE", 0, 998)],
                ..base
            },

            Screen::Verify => Self { features: vec![Feature::Verification], ..base },

            Screen::Governance => Self {
                metrics: vec![MetricSpec::percent("health", 94.0, 1.0).precision(0)],
                ..base
            }
            .advisory(
                "Autonomous mesh health is at {health}%. Propose three concise mesh optimization \
                 protocols for operators to vote on, each with a title, impact class \
                 (Critical, Optimization or Maintenance) and one-line rationale.",
                Some(INTELLIGENCE_UNIT),
                "Recalculating proposals...",
            ),

            Screen::Atlas => {
                let mut cfg = Self {
                    metrics: vec![MetricSpec::percent("poloc_confidence", 97.0, 0.5).precision(1)],
                    ..base
                }
                .param("sector", ATLAS_SECTORS[0])
                .advisory(
                    "Produce a semantic topological synthesis of mesh sector {sector}: terrain \
                     coverage, node density and notable anomalies, in under 120 words.",
                    Some(INTELLIGENCE_UNIT),
                    "Synthesizing sector atlas...",
                );
                cfg.choices.insert(
                    "sector".to_string(),
                    ATLAS_SECTORS.iter().map(|s| s.to_string()).collect(),
                );
                cfg
            }

            Screen::Beacon => Self { features: vec![Feature::Beacon], ..base },

            Screen::Command => Self {
                metrics: vec![MetricSpec::percent("airspace_integrity", 96.0, 1.0).precision(0)],
                feeds: vec![FeedSpec::weighted(
                    "swarm",
                    vec![
                        WeightedKind::new("Telemetry Sync", 60.0),
                        WeightedKind::new("Waypoint Reached", 20.0),
                        WeightedKind::new("Battery Swap", 10.0),
                        WeightedKind::new("Airspace Intrusion", 10.0),
                    ],
                    5,
                    5000,
                )
                .with_subject("DRN", 1, 12)],
                entities: Some(kinetic_swarm()),
                ..base
            }
            .param("origin", "Sector-7")
            .param("destination", "Nexus-Alpha")
            .param("clearance", "84")
            .advisory(
                "Plan an autonomous drone mission from {origin} to {destination}. Flight corridor \
                 clearance is {clearance}% and airspace integrity is {airspace_integrity}%. List \
                 waypoints, risks and a go/no-go call.",
                Some(INTELLIGENCE_UNIT),
                "Generating flight intel...",
            ),
        }
    }
}
