//! Colorful-banner logging facade, now backed by `tracing` instead of raw
//! `println!`. Call sites keep using `info!`/`trace!`/etc. unchanged; the
//! macros just forward to `tracing`'s equivalents so output goes through
//! whatever subscriber `init` installed (level filtering via `RUST_LOG`,
//! structured fields, non-blocking writers, ...).

pub use tracing;

#[macro_export]
macro_rules! info { ($($arg:tt)*) => { $crate::tracing::info!($($arg)*); }; }
#[macro_export]
macro_rules! warn { ($($arg:tt)*) => { $crate::tracing::warn!($($arg)*); }; }
#[macro_export]
macro_rules! errors { ($($arg:tt)*) => { $crate::tracing::error!($($arg)*); }; }
#[macro_export]
macro_rules! debug { ($($arg:tt)*) => { $crate::tracing::debug!($($arg)*); }; }
#[macro_export]
macro_rules! trace { ($($arg:tt)*) => { $crate::tracing::trace!($($arg)*); }; }

/// Installs the process-wide subscriber. `level` is the config's `log_level`
/// directive; `RUST_LOG` overrides it when set, matching how the rest of the
/// ecosystem expects `tracing_subscriber::EnvFilter` to behave.
pub fn init(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
