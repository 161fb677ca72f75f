//! Deterministic decision-and-safety core for the health twin chat.
//!
//! Raw readings become classified [`signals`], questions become [`intent`]s,
//! and [`pipeline::ChatPipeline`] wraps exactly one generation call in consent,
//! safety and audit checks.

pub mod config;
pub mod consent;
pub mod error;
pub mod events;
pub mod health;
pub mod intent;
pub mod pipeline;
pub mod prompt;
pub mod safety;
pub mod signals;
pub mod summary;
pub mod trend;

/// Header carrying the authenticated caller's id between the gateway, the API and the CLI.
pub const USER_ID_HEADER: &str = "x-twin-user-id";
