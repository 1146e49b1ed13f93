//! core
//!
//! Configuration, storage layout, and project descriptor handling.
//!
//! # Modules
//!
//! - [`config`] - CLI configuration schema and loading
//! - [`paths`] - State and socket directory layout
//! - [`project`] - Project descriptor (`package.json`) model

pub mod config;
pub mod paths;
pub mod project;
