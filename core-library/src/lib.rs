//! # Local Library Module
//!
//! Owns the local tracking database and the domain models shared by the
//! sync core.
//!
//! ## Overview
//!
//! This module manages:
//! - Domain models for collections, inventory records, metadata and snapshots
//! - SQLite connection pooling and embedded migrations
//! - The [`LocalStore`](store::LocalStore) repository for settings, tracked
//!   media, snapshots and the cached mirror/simulated collections

pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use error::{LibraryError, Result};
pub use store::{LocalStore, SqliteLocalStore};
