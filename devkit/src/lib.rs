/*!
# Sovereign DevKit - outillage de test du kernel Sovereign Mesh

- Backend de complétion scripté (sans réseau, réponses déterministes)
- Builders de heartbeats pour la télémétrie live
- Harness de panneaux sur horloge en pause et assertions de quiescence
*/

pub mod backend_stub;
pub mod heartbeat;
pub mod test_utils;

pub use backend_stub::{Reply, ScriptedBackend};
pub use heartbeat::HeartbeatBuilder;
pub use test_utils::{assert_quiescent, PanelHarness};
