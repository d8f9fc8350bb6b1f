use std::collections::HashSet;
use crate::config::types::ServerConfig;

/// Rejects configurations with ambiguous listener bindings or dangling error
/// page references. Returns the same list back (so callers can chain it
/// straight into `AppConfig`) after printing one `❌` diagnostic line per
/// problem found; an empty return means every server failed validation.
pub fn validate_configs(configs: Vec<ServerConfig>) -> Vec<ServerConfig> {
    let mut seen: HashSet<(String, u16, String)> = HashSet::new();
    let mut wildcard_ports: HashSet<u16> = HashSet::new();
    let mut specific_ports: HashSet<(String, u16)> = HashSet::new();
    let mut ok = Vec::new();

    for cfg in configs {
        let mut valid = true;

        for &port in &cfg.ports {
            let key = (cfg.host.clone(), port, cfg.server_name.clone());
            if !seen.insert(key) {
                eprintln!(
                    "❌ \x1b[1;31mconfig conflict\x1b[0m: duplicate host:port:server_name {}:{}:{}",
                    cfg.host, port, cfg.server_name
                );
                valid = false;
            }

            if cfg.host == "0.0.0.0" {
                if specific_ports.contains(&(cfg.host.clone(), port)) {
                    eprintln!(
                        "❌ wildcard bind 0.0.0.0:{} conflicts with a specific-address bind on the same port",
                        port
                    );
                    valid = false;
                }
                wildcard_ports.insert(port);
            } else if wildcard_ports.contains(&port) {
                eprintln!(
                    "❌ specific bind {}:{} conflicts with an existing wildcard 0.0.0.0:{} bind",
                    cfg.host, port, port
                );
                valid = false;
            } else {
                specific_ports.insert((cfg.host.clone(), port));
            }
        }

        for (&code, path) in &cfg.error_pages {
            if !(300..=599).contains(&code) {
                eprintln!("❌ invalid error_pages status code {}", code);
                valid = false;
            }
            if !std::path::Path::new(path).exists() {
                eprintln!(
                    "❌ error_pages[{}] points at missing file {:?}",
                    code, path
                );
                valid = false;
            }
        }

        for route in &cfg.routes {
            if route.proxy.is_proxied() && route.proxy.upstream.parse::<std::net::SocketAddr>().is_err() {
                eprintln!(
                    "❌ route {:?} proxy_pass target {:?} is not host:port",
                    route.path, route.proxy.upstream
                );
                valid = false;
            }
        }

        if valid {
            ok.push(cfg);
        }
    }

    ok
}
