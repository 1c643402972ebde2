// src/lib.rs

// On déclare tous nos modules principaux pour les rendre publics et
// utilisables par le binaire (pump_monitor.rs) et les tests d'intégration.
pub mod config;
pub mod data_pipeline;
pub mod decoders;
pub mod error;
pub mod events;
pub mod filtering;
pub mod monitor;
pub mod monitoring;
pub mod rpc;
pub mod state;
