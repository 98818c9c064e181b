//! Side-effecting helpers: filesystem checks, process execution, config, records.

pub mod binary;
pub mod cancel;
pub mod config;
pub mod engine;
pub mod process;
pub mod records;
pub mod workdir;
