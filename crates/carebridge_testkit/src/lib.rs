//! # Carebridge Testkit
//!
//! Test utilities for Carebridge.
//!
//! This crate provides:
//! - A demo clinical schema (patients, encounters, survey responses)
//!   shared by integration tests across the workspace
//! - Fixture builders for stores and wire records
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use carebridge_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     let store = populated_store(3);
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
