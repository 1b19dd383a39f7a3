//! # Grantlock Testkit
//!
//! Testing utilities for grantlock.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a vault over a memory store with a registered device,
//!   plus client-side token minting and DEK wrapping
//! - **Generators**: proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! Quickly set up a full protocol scenario:
//!
//! ```rust,ignore
//! use grantlock_core::SCOPE_DECRYPT;
//! use grantlock_testkit::TestFixture;
//!
//! let fixture = TestFixture::new().await;
//! let token = fixture.minter.mint(&[SCOPE_DECRYPT], "jti-1");
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use grantlock_testkit::generators::GrantParams;
//!
//! proptest! {
//!     #[test]
//!     fn minted_grants_decode(params: GrantParams) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{sample_document, wrap_for_pem, GrantMinter, TestFixture, TEST_GRANT_LIFETIME};
pub use generators::GrantParams;
