//! Payload types bound to table endpoints.

pub mod kitchen_sink;
