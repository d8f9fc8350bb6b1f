pub mod display;
pub mod parser;
pub mod types;
pub mod validate;

pub use parser::{ConfigError, ConfigParser, FromYaml, ParseResult};
pub use types::{AppConfig, CacheZoneConfig, Config, ListenerOptions, ProxyPassConfig, RouteConfig, ServerConfig};
pub use display::display_config;
pub use validate::validate_configs;

use arc_swap::ArcSwap;
use std::sync::Arc;

/// Process-wide configuration snapshot with atomic reload (spec §9: "Global
/// `ngx_cycle` mutable singleton" -> "immutable configuration value refcounted
/// and swapped in under a brief lock"). Every request clones the `Arc` it
/// resolved at request-start and keeps that snapshot for its whole lifetime,
/// even across a concurrent `Shared::reload`.
pub struct Shared {
    current: ArcSwap<Config>,
}

impl Shared {
    pub fn new(config: Config) -> Self {
        Self { current: ArcSwap::from_pointee(config) }
    }

    pub fn load(&self) -> Arc<Config> {
        self.current.load_full()
    }

    pub fn reload(&self, config: Config) {
        self.current.store(Arc::new(config));
    }
}
