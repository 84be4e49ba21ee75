//! HTTP surface of regcache
//!
//! Serves package files from the local store and forwards misses to the
//! configured upstream registry.

pub mod forward;
pub mod handler;
pub mod server;

pub use forward::{ForwardError, ForwardRequest, Forwarder, HttpForwarder};
pub use handler::{Resolution, resolve};
pub use server::{AppState, router, serve};
