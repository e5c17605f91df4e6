//! Hub de vérification : tests d'audit séquentiels, diagnostics et rapport d'audit.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::models::display_time;

pub const PASS_PROBABILITY: f64 = 0.95;
pub const PASSED_RESULT: &str = "Integrity verified via PoL";
pub const FAILED_RESULT: &str = "Validation timeout";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Idle,
    Running,
    Passed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationTest {
    pub id: String,
    pub name: String,
    pub category: String,
    pub status: TestStatus,
    pub last_run: Option<String>,
    pub result: Option<String>,
}

fn test(id: &str, name: &str, category: &str) -> VerificationTest {
    VerificationTest {
        id: id.into(),
        name: name.into(),
        category: category.into(),
        status: TestStatus::Idle,
        last_run: None,
        result: None,
    }
}

pub fn default_tests() -> Vec<VerificationTest> {
    vec![
        test("t1", "Spatial Consistency Check", "Spatial"),
        test("t2", "Quantum Encryption Handshake", "Encryption"),
        test("t3", "P2P Mesh Latency Test", "Network"),
        test("t4", "DID Consensus Verification", "Identity"),
        test("t5", "Neural Strategy Link", "Network"),
    ]
}

/// Statuts de capacités, affichage seul. Le kernel est headless : tout sauf
/// l'uplink de complétion est rapporté `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub core_engine: String,
    pub api: String,
    pub permissions: String,
    pub geolocation: String,
}

impl Diagnostics {
    pub fn pending() -> Self {
        let checking = || "Checking...".to_string();
        Self { core_engine: checking(), api: checking(), permissions: checking(), geolocation: checking() }
    }

    pub fn headless(api_reachable: bool) -> Self {
        let unknown = || "Unknown".to_string();
        Self {
            core_engine: unknown(),
            api: if api_reachable { "Uplink Established" } else { "Link Failed" }.into(),
            permissions: unknown(),
            geolocation: unknown(),
        }
    }
}

/// Durée d'un test simulé : uniforme dans [1s, 2s).
pub fn test_duration<R: Rng + ?Sized>(rng: &mut R) -> Duration {
    Duration::from_millis(rng.gen_range(1000..2000))
}

pub fn draw_outcome<R: Rng + ?Sized>(rng: &mut R) -> bool {
    rng.gen_bool(PASS_PROBABILITY)
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationSuite {
    pub tests: Vec<VerificationTest>,
    pub diagnostics: Diagnostics,
    pub running: bool,
    pub report: Option<String>,
}

impl Default for VerificationSuite {
    fn default() -> Self {
        Self {
            tests: default_tests(),
            diagnostics: Diagnostics::pending(),
            running: false,
            report: None,
        }
    }
}

impl VerificationSuite {
    /// Ouvre un run complet. Retourne false si un run est déjà en cours.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        self.diagnostics = Diagnostics::pending();
        for t in self.tests.iter_mut() {
            t.status = TestStatus::Idle;
        }
        self.report = Some(
            "Initializing comprehensive network verification suite...\n\n\
             Running system-level diagnostics first..."
                .into(),
        );
        true
    }

    pub fn mark_running(&mut self, index: usize) {
        if let Some(t) = self.tests.get_mut(index) {
            t.status = TestStatus::Running;
        }
    }

    pub fn finish_test(&mut self, index: usize, passed: bool, now: OffsetDateTime) {
        if let Some(t) = self.tests.get_mut(index) {
            t.status = if passed { TestStatus::Passed } else { TestStatus::Failed };
            t.result = Some(if passed { PASSED_RESULT } else { FAILED_RESULT }.into());
            t.last_run = Some(display_time(now));
        }
    }

    pub fn finish(&mut self, now: OffsetDateTime) {
        self.report = Some(self.compose_report(now));
        self.running = false;
    }

    pub fn passed(&self) -> usize {
        self.tests.iter().filter(|t| t.status == TestStatus::Passed).count()
    }

    pub fn compose_report(&self, now: OffsetDateTime) -> String {
        let date = now
            .format(format_description!("[year]-[month]-[day]"))
            .unwrap_or_default();
        let total = self.tests.len();
        let passed = self.passed();
        let mesh = if passed == total { "ALL SYSTEMS NOMINAL" } else { "MINIMAL DRIFT DETECTED" };
        format!(
            "System Audit Complete [{date}]\n\
             ---------------------------------\n\
             CORE ENGINE: {}\n\
             API UPLINK: {}\n\
             PERMISSIONS: {}\n\
             GEOLOCATION: {}\n\n\
             MESH STATUS: {mesh}\n\n\
             RECAP: {passed} of {total} sovereign tests passed validation.",
            self.diagnostics.core_engine.to_uppercase(),
            self.diagnostics.api.to_uppercase(),
            self.diagnostics.permissions.to_uppercase(),
            self.diagnostics.geolocation.to_uppercase(),
        )
    }
}
