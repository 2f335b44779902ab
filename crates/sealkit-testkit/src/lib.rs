//! # sealkit-testkit
//!
//! Testing utilities for the sealkit engine.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: an engine over an in-memory policy store with a manual
//!   clock and a scratch directory
//! - **Generators**: proptest strategies for ids, windows, and updates
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use sealkit_testkit::TestFixture;
//! use sealkit::core::{ChatId, Direction};
//!
//! # async fn example() {
//! let fx = TestFixture::new();
//! let path = fx.write_plaintext("photo.jpg", b"bytes");
//! fx.register_media(1, 1, &path, "photo.jpg").await;
//! let sealed = fx
//!     .engine
//!     .encrypt_file(ChatId(1), &path, "photo.jpg", Direction::Outgoing, true)
//!     .await
//!     .unwrap();
//! # let _ = sealed;
//! # }
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use sealkit_testkit::generators::access_window;
//!
//! proptest! {
//!     #[test]
//!     fn windows_contain_their_start(w in access_window()) {
//!         prop_assert!(w.contains(w.start_ms));
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::TestFixture;
