//! Core types and trait definitions for the Warden authorization subsystem.
//!
//! This crate has no database dependencies. It defines the
//! relationship model, the builder functions that turn grants and revocations
//! into graph-engine updates, the RPC contract of the external graph engine,
//! and the [`AuthzStore`](store::AuthzStore) abstraction that storage backends
//! implement.

pub mod builder;
pub mod engine;
pub mod error;
pub mod memory;
pub mod model;
pub mod retry;
pub mod service;
pub mod store;

pub use error::{Error, Result};
