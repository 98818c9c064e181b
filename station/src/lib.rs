//! Execution orchestrator for an infrastructure-as-code engine (`tofu`).
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (request validation, argument
//!   building, output classification, ids). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem checks, process execution,
//!   config, records). Isolated behind traits to enable scripted tests.
//!
//! [`orchestrator::Station`] composes both into the public operations.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod locks;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
