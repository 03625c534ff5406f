//! Built-in WGSL sources.
//!
//! The fallback pair has the same interface as the forward pair, so it fits any pipeline
//! layout the forward renderer creates.

pub const FORWARD_VERTEX: &str = include_str!("forward_vertex.wgsl");
pub const FORWARD_FRAGMENT: &str = include_str!("forward_fragment.wgsl");
pub const FALLBACK_VERTEX: &str = include_str!("fallback_vertex.wgsl");
pub const FALLBACK_FRAGMENT: &str = include_str!("fallback_fragment.wgsl");
