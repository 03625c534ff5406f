//! Loadable content and its readiness.
//!
//! An [`Asset`] moves through `Unloaded -> Loading -> Ready | Failed` exactly once. The
//! [`AssetRegistry`] deduplicates assets by identity and drives them toward a terminal
//! state without ever blocking the frame loop.

mod asset;
mod error;
mod payload;
mod registry;
mod source;

pub use asset::*;
pub use error::*;
pub use payload::*;
pub use registry::*;
pub use source::*;
