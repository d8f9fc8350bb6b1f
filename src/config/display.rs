use crate::config::types::ServerConfig;

/// Prints a colorized human summary of the resolved server configuration,
/// the way the process announces itself on startup before entering the event
/// loop.
pub fn display_config(servers: &[ServerConfig]) {
    println!("\x1b[1;36m=== server_proxy configuration ===\x1b[0m");
    for (i, s) in servers.iter().enumerate() {
        println!(
            "\x1b[1mserver[{}]\x1b[0m {}:{:?} name={:?}{}",
            i,
            s.host,
            s.ports,
            s.server_name,
            if s.default_server { " \x1b[33m(default)\x1b[0m" } else { "" }
        );
        println!(
            "  client_max_body_size={}  keepalive listener={{reuseport={}, backlog={}}}",
            s.client_max_body_size, s.listener.reuseport, s.listener.backlog
        );
        if !s.error_pages.is_empty() {
            println!("  error_pages:");
            let mut codes: Vec<_> = s.error_pages.keys().collect();
            codes.sort();
            for code in codes {
                println!("    {} -> {}", code, s.error_pages[code]);
            }
        }
        println!("  routes:");
        for r in &s.routes {
            let kind = if r.proxy.is_proxied() {
                format!("proxy_pass {}", r.proxy.upstream)
            } else {
                format!("root {}", r.root)
            };
            println!(
                "    {} [{}] -> {}{}",
                r.path,
                r.methods.join(","),
                kind,
                if r.proxy.is_cacheable() {
                    format!(" (cache={})", r.proxy.cache_zone)
                } else {
                    String::new()
                }
            );
        }
    }
    println!("\x1b[1;36m==================================\x1b[0m");
}
