//! Access control for tool dispatch.

mod access;

pub use access::{AccessLevel, SecurityContext};
