//! Integration test utilities for the gateway
//!
//! Runs the real gateway on ephemeral ports against an in-process backend and
//! drives it with WebSocket and HTTP clients.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
