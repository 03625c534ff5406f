pub mod assets;
pub mod config;
pub mod gpu;
pub mod rendering;
pub mod scene;
pub mod scheduler;

pub use self::config::EngineConfig;
pub use self::scheduler::{FrameScheduler, FrameStats};
