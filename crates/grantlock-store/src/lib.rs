//! # Grantlock Store
//!
//! Storage abstraction for grantlock. Provides a trait-based interface
//! for protocol persistence with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store module abstracts persistence behind the [`Store`] trait,
//! allowing the vault to be storage-agnostic. The primary implementation
//! is [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`ConsumeResult`] - Result of consuming a grant's jti
//!
//! ## Design Notes
//!
//! The one concurrency-critical operation is
//! [`Store::consume_grant`]: it is an atomic insert-if-absent keyed by
//! `jti`, so two concurrent requests carrying the same grant can never
//! both succeed. Everything else is ordinary row storage.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ConsumeResult, Store};
