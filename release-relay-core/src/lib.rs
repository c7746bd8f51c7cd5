#![doc = "release-relay-core: release reconciliation logic for release-relay."]

//! This crate holds the pipeline that decides whether a new build can be released and then
//! publishes it: version resolution, the documentation readiness gate, changelog composition and
//! the publication sequence. External systems are reached through the traits in [`contract`].
//!
//! # Usage
//! Construct a [`config::RelayConfig`], implement (or mock) the [`contract`] ports and call
//! [`release::reconcile`].

pub mod assets;
pub mod changelog;
pub mod config;
pub mod contract;
pub mod error;
pub mod publish;
pub mod readiness;
pub mod release;
pub mod upload;
pub mod version;

pub use error::{HostError, RelayError, Result};
