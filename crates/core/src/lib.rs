//! Domain types shared by the storage and HTTP layers.
//!
//! Nothing in this crate performs I/O: it defines the entity envelope that
//! every synchronized table uses, the opaque identifiers and version tokens,
//! the delta-sync cursor, and the filter predicate language.

pub mod clock;
pub mod cursor;
pub mod entity;
pub mod error;
pub mod filter;
pub mod types;
