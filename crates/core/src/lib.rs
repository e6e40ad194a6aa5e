//! Core types and utilities for the Nexus dashboard
//!
//! This crate provides shared types used across all components:
//! - Live price records and the live price table
//! - REST snapshot records (quotes, chart points, weather, news)
//! - Tracked assets and cities
//! - Configuration and error types

pub mod types;
pub mod assets;
pub mod config;
pub mod errors;

pub use types::*;
pub use assets::*;
pub use self::config::*;
pub use errors::*;
