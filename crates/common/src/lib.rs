//! # entangle-common — Shared Primitives
//!
//! Types shared across every crate in the workspace:
//!
//! * **[`EntangleConfig`]** — classifier sizes, penalty schedule and
//!   optimiser knobs (serialised as JSON).

pub mod config;

pub use config::EntangleConfig;
