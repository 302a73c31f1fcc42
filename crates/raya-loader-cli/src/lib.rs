//! Raya unit loader CLI
//!
//! Command implementations behind the `raya-loader` binary.

pub mod commands;
pub mod output;
pub mod setup;
