//! API exposure over transports
//!
//! Each exposure consumes a `ServerHost` and produces a Router for its
//! protocol.

pub mod rest;

pub use rest::RestExposure;
