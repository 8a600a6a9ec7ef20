//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the media sync core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the storage, metadata and
//! sync crates depend on. It establishes the logging conventions, the
//! configuration builder and the event broadcasting used to publish queue
//! state and collection refreshes to the host UI.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
