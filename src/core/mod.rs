//! Core domain models for the runner
//!
//! This module defines the fundamental data structures that represent
//! pipelines, steps, and their configuration.

pub mod config;
pub mod context;
pub mod pipeline;
pub mod state;
pub mod step;

pub use context::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
