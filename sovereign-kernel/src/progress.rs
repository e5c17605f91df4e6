//! Compteurs de progression à cadence fixe : l'onboarding identité et le
//! transfert uplink. Les deux avancent de `PROGRESS_STEP` à chaque tick de
//! progression du panneau et ne peuvent pas échouer.

use serde::{Deserialize, Serialize};

pub const PROGRESS_STEP: u8 = 5;
const FULL: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStage {
    Welcome,
    Step1,
    Step2,
    Step3,
    Active,
}

impl OnboardingStage {
    fn next(self) -> Self {
        match self {
            OnboardingStage::Welcome => OnboardingStage::Step1,
            OnboardingStage::Step1 => OnboardingStage::Step2,
            OnboardingStage::Step2 => OnboardingStage::Step3,
            OnboardingStage::Step3 | OnboardingStage::Active => OnboardingStage::Active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingStepper {
    pub stage: OnboardingStage,
    /// Avancement de l'étape courante, 0..=100.
    pub progress: u8,
}

impl Default for OnboardingStepper {
    fn default() -> Self {
        Self { stage: OnboardingStage::Welcome, progress: 0 }
    }
}

impl OnboardingStepper {
    pub fn is_running(&self) -> bool {
        !matches!(self.stage, OnboardingStage::Welcome | OnboardingStage::Active)
    }

    /// Quitte l'accueil. Retourne false si l'onboarding a déjà commencé.
    pub fn begin(&mut self) -> bool {
        if self.stage != OnboardingStage::Welcome {
            return false;
        }
        self.stage = OnboardingStage::Step1;
        self.progress = 0;
        true
    }

    /// Un tick de progression. Retourne true si quelque chose a bougé.
    pub fn tick(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.progress = (self.progress + PROGRESS_STEP).min(FULL);
        if self.progress == FULL {
            self.stage = self.stage.next();
            self.progress = if self.stage == OnboardingStage::Active { FULL } else { 0 };
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UplinkStatus {
    Idle,
    Uploading,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UplinkTransfer {
    pub status: UplinkStatus,
    pub progress: u8,
}

impl Default for UplinkTransfer {
    fn default() -> Self {
        Self { status: UplinkStatus::Idle, progress: 0 }
    }
}

impl UplinkTransfer {
    /// Démarre un transfert à zéro. Un transfert en cours n'est pas touché.
    pub fn start(&mut self) -> bool {
        if self.status == UplinkStatus::Uploading {
            return false;
        }
        self.status = UplinkStatus::Uploading;
        self.progress = 0;
        true
    }

    pub fn tick(&mut self) -> bool {
        if self.status != UplinkStatus::Uploading {
            return false;
        }
        self.progress = (self.progress + PROGRESS_STEP).min(FULL);
        if self.progress == FULL {
            self.status = UplinkStatus::Complete;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stepper_walks_every_stage_linearly() {
        let mut s = OnboardingStepper::default();
        assert!(!s.tick());
        assert!(s.begin());
        assert!(!s.begin());

        let mut seen = vec![s.stage];
        let mut ticks = 0;
        while s.stage != OnboardingStage::Active {
            assert!(s.tick());
            ticks += 1;
            if seen.last() != Some(&s.stage) {
                seen.push(s.stage);
            }
        }
        assert_eq!(
            seen,
            vec![
                OnboardingStage::Step1,
                OnboardingStage::Step2,
                OnboardingStage::Step3,
                OnboardingStage::Active,
            ]
        );
        // 20 ticks par étape, trois étapes
        assert_eq!(ticks, 60);
        assert_eq!(s.progress, 100);
        assert!(!s.tick());
    }

    #[test]
    fn test_uplink_caps_at_100_and_completes() {
        let mut u = UplinkTransfer::default();
        assert!(!u.tick());
        assert!(u.start());
        assert!(!u.start());
        for _ in 0..19 {
            u.tick();
        }
        assert_eq!((u.status, u.progress), (UplinkStatus::Uploading, 95));
        u.tick();
        assert_eq!((u.status, u.progress), (UplinkStatus::Complete, 100));
        assert!(!u.tick());
        assert_eq!(u.progress, 100);

        // un transfert terminé peut être relancé
        assert!(u.start());
        assert_eq!(u.progress, 0);
    }
}
