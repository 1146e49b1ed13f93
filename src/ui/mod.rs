//! ui
//!
//! User interaction utilities.
//!
//! # Modules
//!
//! - [`prompts`] - Interactive password prompt
//! - [`output`] - Output formatting and display
//!
//! # Design
//!
//! All user-facing output and prompts go through this module. Structured
//! diagnostics go through `tracing` instead.

pub mod output;
pub mod prompts;
