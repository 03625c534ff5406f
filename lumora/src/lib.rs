#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
pub mod engine;
pub mod logging;
pub mod utils;

pub use engine::*;

pub use ::log;
pub use ::nalgebra;
pub use ::tokio;
pub use ::wgpu;
