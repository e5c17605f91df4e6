//! Kernel Sovereign Mesh : panneaux de télémétrie simulée avec texte de
//! conseil génératif, servis par une petite API REST.

pub mod advisory;
pub mod beacon;
pub mod config;
pub mod health;
pub mod http;
pub mod models;
pub mod panel;
pub mod progress;
pub mod screens;
pub mod shell;
pub mod state;
pub mod telemetry;
pub mod verification;
