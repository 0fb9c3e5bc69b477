//! Tablesync API server library.
//!
//! Exposes the building blocks (config, state, error handling, table
//! controllers, routes) so integration tests and the binary entrypoint can
//! both access them.

pub mod conditional;
pub mod config;
pub mod error;
pub mod handlers;
pub mod response;
pub mod retry;
pub mod router;
pub mod routes;
pub mod state;
pub mod table;
