//! Common types and utilities shared across the CXP stack.
//!
//! This crate provides:
//! - Text frame serialization and parsing ([`frame`])
//! - Protocol constants and wire tokens ([`types`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod frame;
pub mod types;

pub use frame::{Frame, RouteMessage};
pub use types::CampusName;
