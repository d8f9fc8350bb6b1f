use derive_yaml::FromYaml;
use std::collections::HashMap;
use crate::config::parser::FromYaml; // Import trait

// --- Constants ---
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SERVER_NAME: &str = "_";
pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576; // 1MB
pub const DEFAULT_ROUTE_PATH: &str = "/";
pub const DEFAULT_ROOT: &str = "./www";
pub const DEFAULT_FILE: &str = "index.html";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Per-listener socket tuning, see spec §3/§6. `so_keepalive` is kept as the
/// raw directive string ("on" | "off" | "K:I:C") and decoded at bind time.
#[derive(Debug, Clone, FromYaml)]
pub struct ListenerOptions {
    pub reuseport: bool,
    pub backlog: usize,
    pub rcvbuf: usize,
    pub sndbuf: usize,
    pub fastopen: usize,
    pub deferred: bool,
    pub ipv6only: bool,
    pub so_keepalive: String,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            reuseport: false,
            backlog: 1024,
            rcvbuf: 0,
            sndbuf: 0,
            fastopen: 0,
            deferred: false,
            ipv6only: false,
            so_keepalive: "off".to_string(),
        }
    }
}

/// A named cache zone, one per `path ... keys_zone=NAME:SIZE` directive.
#[derive(Debug, Clone, FromYaml)]
pub struct CacheZoneConfig {
    pub name: String,
    pub path: String,
    pub levels: String,
    pub use_temp_path: bool,
    pub zone_size_mb: usize,
    pub inactive_secs: u64,
    pub max_size_bytes: u64,
    pub min_free_bytes: u64,
    pub loader_files: usize,
    pub loader_sleep_ms: u64,
    pub loader_threshold_ms: u64,
    pub manager_files: usize,
    pub manager_sleep_ms: u64,
    pub manager_threshold_ms: u64,
}

impl Default for CacheZoneConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            path: "./cache".to_string(),
            levels: "1:2".to_string(),
            use_temp_path: false,
            zone_size_mb: 10,
            inactive_secs: 600,
            max_size_bytes: 0, // 0 = unbounded
            min_free_bytes: 0,
            loader_files: 100,
            loader_sleep_ms: 50,
            loader_threshold_ms: 200,
            manager_files: 100,
            manager_sleep_ms: 50,
            manager_threshold_ms: 200,
        }
    }
}

/// Proxy/cache behavior for a single route. Empty `upstream` means the route
/// is served from disk by the static-file handler rather than proxied.
#[derive(Debug, Clone, FromYaml)]
pub struct ProxyPassConfig {
    pub upstream: String,
    pub cache_zone: String,
    pub cache_valid_codes: Vec<u16>,
    pub cache_valid_ttl_secs: u64,
    pub cache_lock: bool,
    pub cache_lock_timeout_ms: u64,
    pub use_stale_error: bool,
    pub use_stale_updating: bool,
}

impl Default for ProxyPassConfig {
    fn default() -> Self {
        Self {
            upstream: String::new(),
            cache_zone: String::new(),
            cache_valid_codes: vec![200],
            cache_valid_ttl_secs: 0,
            cache_lock: true,
            cache_lock_timeout_ms: 5000,
            use_stale_error: false,
            use_stale_updating: false,
        }
    }
}

impl ProxyPassConfig {
    pub fn is_proxied(&self) -> bool {
        !self.upstream.is_empty()
    }

    pub fn is_cacheable(&self) -> bool {
        !self.cache_zone.is_empty()
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct RouteConfig {
    pub path: String,
    pub methods: Vec<String>,
    pub redirection: Option<String>,
    pub redirect_code: Option<u16>,
    pub root: String,
    pub default_file: String,
    pub cgi_ext: Option<String>,
    pub cgi_path: Option<String>,
    pub autoindex: bool,
    pub upload_dir: String,
    pub proxy: ProxyPassConfig,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_ROUTE_PATH.to_string(),
            methods: vec!["GET".to_string(), "HEAD".to_string()],
            redirection: None,
            redirect_code: None,
            root: DEFAULT_ROOT.to_string(),
            default_file: DEFAULT_FILE.to_string(),
            cgi_ext: None,
            cgi_path: None,
            autoindex: false,
            upload_dir: DEFAULT_UPLOAD_DIR.to_string(),
            proxy: ProxyPassConfig::default(),
        }
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct ServerConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub server_name: String,
    pub default_server: bool,
    pub error_pages: HashMap<u16, String>,
    pub client_max_body_size: usize,
    pub routes: Vec<RouteConfig>,
    pub listener: ListenerOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ports: vec![DEFAULT_PORT],
            server_name: DEFAULT_SERVER_NAME.to_string(),
            default_server: false,
            error_pages: HashMap::new(),
            client_max_body_size: DEFAULT_MAX_BODY_SIZE,
            routes: Vec::new(),
            listener: ListenerOptions::default(),
        }
    }
}

impl ServerConfig {
    /// Resolves a request's (method, url) against this server's route table.
    /// Longest matching `path` prefix wins, mirroring how the handlers already
    /// assume `request.url.strip_prefix(&r_cfg.path)` behaves.
    pub fn find_route(&self, url: &str, method: &str) -> Result<std::sync::Arc<RouteConfig>, crate::router::RoutingError> {
        let mut best: Option<&RouteConfig> = None;
        for route in &self.routes {
            if url.starts_with(route.path.as_str()) {
                match best {
                    Some(cur) if cur.path.len() >= route.path.len() => {}
                    _ => best = Some(route),
                }
            }
        }
        match best {
            None => Err(crate::router::RoutingError::NotFound),
            Some(route) => {
                if route.methods.iter().any(|m| m.eq_ignore_ascii_case(method)) {
                    Ok(std::sync::Arc::new(route.clone()))
                } else {
                    Err(crate::router::RoutingError::MethodNotAllowed)
                }
            }
        }
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct Config {
    pub servers: Vec<ServerConfig>,
    pub cache_zones: Vec<CacheZoneConfig>,
    pub log_level: String,
    pub worker_connections: usize,
    pub keepalive_timeout_secs: u64,
    pub client_header_buffer_size: usize,
    pub large_client_header_buffers_num: usize,
    pub large_client_header_buffers_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            cache_zones: Vec::new(),
            log_level: "info".to_string(),
            worker_connections: 1024,
            keepalive_timeout_secs: 75,
            client_header_buffer_size: 1024,
            large_client_header_buffers_num: 4,
            large_client_header_buffers_size: 8192,
        }
    }
}

/// Alias kept for code that historically called it `AppConfig`.
pub type AppConfig = Config;
