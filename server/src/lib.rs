//! kts server: account, page and album services over HTTP
//!
//! Every request runs as a [`kts_workflow`] engine:
//! - [`services`] hold the per-route workflows
//! - [`db`] persists documents in SQLite or memory
//! - [`web`] maps routes onto services and replies onto status codes

pub mod config;
pub mod db;
pub mod security;
pub mod services;
pub mod telemetry;
pub mod uploads;
pub mod web;

pub use config::KtsConfig;
pub use services::Services;
