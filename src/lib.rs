//! walletbridge: a signing-session gateway.
//!
//! The gateway prepares unsigned on-chain transactions (contract
//! deployments and transfers), exposes them to a browser wallet through a
//! short-lived signing session, verifies the reported outcome against the
//! chain, and dispatches typed hooks once a deployment confirms. It never
//! holds a private key.
//!
//! Subsystems:
//! - [`session`]: the session data model, store backends, and the
//!   confirmation protocol;
//! - [`orchestrator`]: multi-step deployment plans whose later steps take
//!   earlier steps' addresses as constructor arguments;
//! - [`verifier`]: JSON-RPC receipt lookup and outcome classification;
//! - [`hooks`]: post-confirmation observers;
//! - [`chains`]: the chain registry;
//! - [`web`]: the axum API the signing page talks to.

pub mod chains;
pub mod config;
pub mod error;
pub mod hooks;
pub mod orchestrator;
pub mod session;
pub mod verifier;
pub mod web;

pub use error::{Error, Result};
