//! # UnitWork Testkit
//!
//! Test utilities for UnitWork.
//!
//! This crate provides:
//! - Fixture entities and seeded persistence units
//! - Property-based test generators using proptest
//! - A model harness that replays session operations against a reference
//!   model and checks storage afterwards
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use unitwork_testkit::prelude::*;
//!
//! with_seeded_unit(|test| {
//!     let mut session = test.unit.begin().unwrap();
//!     let alice = session.find::<Person>(ALICE).unwrap().unwrap();
//!     assert_eq!(alice.get().age, 30);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
