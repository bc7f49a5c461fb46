//! Shared building blocks for the freezer crates
pub mod crypto;
pub mod http;
pub mod interrupt;
pub mod types;
