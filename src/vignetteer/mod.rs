// src/vignetteer/mod.rs

pub mod agent;
pub mod bus;
pub mod clients;
pub mod config;
pub mod generation;
pub mod orchestrator;
pub mod store;

// Explicitly export the main entry points so callers reach them as
// vignetteer::Orchestrator instead of vignetteer::orchestrator::Orchestrator.
pub use agent::Agent;
pub use orchestrator::Orchestrator;
