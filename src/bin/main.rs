use mio::Poll;
use server_proxy::config::{display_config, validate_configs, AppConfig, FromYaml};
use server_proxy::error::Result;
use server_proxy::server::Server;

fn config_path() -> String {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return path;
            }
        }
    }
    "config.yaml".to_string()
}

fn main() -> Result<()> {
    let path = config_path();
    let content = std::fs::read_to_string(&path)?;
    let mut config = AppConfig::from_str(&content)?;

    config.servers = validate_configs(config.servers);

    proxy_log::init(&config.log_level);
    display_config(&config.servers);

    let poll = Poll::new()?;
    let mut server = Server::new(config, &poll)?;
    server.run(poll)
}
