//! Log backend setup.
//!
//! The engine only talks to the `log` facade. Embedding applications may bring their own
//! logger; these helpers install `env_logger` for everyone else.

/// Installs `env_logger` with an `Info` default level. `RUST_LOG` overrides the filter.
///
/// Panics in debug builds if a logger was already installed.
#[cfg(feature = "env_logger")]
pub fn init() {
    if let Err(e) = try_init() {
        lumora_utils::debug_panic!("Logger was already installed: {e}");
    }
}

/// Like [`init`], but reports an already installed logger instead of complaining about it.
#[cfg(feature = "env_logger")]
pub fn try_init() -> Result<(), log::SetLoggerError> {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init()
}

#[cfg(not(feature = "env_logger"))]
pub fn init() {}

#[cfg(not(feature = "env_logger"))]
pub fn try_init() -> Result<(), log::SetLoggerError> {
    Ok(())
}
