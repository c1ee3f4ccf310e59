//! HTTP boundary: the signing-page API and server plumbing.

pub mod server;
pub mod types;

pub use server::{AppState, build_router, spawn_expiry_sweeper, start_server};
