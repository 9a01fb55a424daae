//! # ZDB Testkit
//!
//! Test utilities for ZDB.
//!
//! This crate provides:
//! - Fixtures that lay out segment files in temporary directories
//! - Property-based test generators using proptest
//! - Concurrent lookup and read stress tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use zdb_testkit::prelude::*;
//!
//! #[test]
//! fn reads_two_segments() {
//!     let mut fixture = JournalFixture::new();
//!     fixture.add_segment(10);
//!     fixture.add_segment(5);
//!
//!     let journal = fixture.open().unwrap();
//!     assert_eq!(journal.last_index(), 15);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
