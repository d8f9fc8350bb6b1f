use server_proxy::config::{RouteConfig, ServerConfig};
use server_proxy::router::RoutingError;

fn server_with_routes(routes: Vec<RouteConfig>) -> ServerConfig {
    ServerConfig { routes, ..Default::default() }
}

fn route(path: &str, methods: &[&str]) -> RouteConfig {
    RouteConfig {
        path: path.to_string(),
        methods: methods.iter().map(|m| m.to_string()).collect(),
        ..Default::default()
    }
}

#[test]
fn simple_match() {
    let cfg = server_with_routes(vec![route("/", &["GET"])]);
    let result = cfg.find_route("/", "GET");
    assert!(result.is_ok());
    assert_eq!(result.unwrap().path, "/");
}

#[test]
fn unconfigured_subpath_falls_back_to_root() {
    let cfg = server_with_routes(vec![route("/", &["GET"])]);
    let result = cfg.find_route("/unconfigured", "GET");
    assert!(result.is_ok());
}

#[test]
fn longest_prefix_wins() {
    let cfg = server_with_routes(vec![route("/a", &["GET"]), route("/a/b", &["GET"])]);
    let result = cfg.find_route("/a/b/c", "GET");
    assert!(result.is_ok());
    assert_eq!(result.unwrap().path, "/a/b");
}

#[test]
fn method_not_allowed() {
    let cfg = server_with_routes(vec![route("/", &["GET"])]);
    let result = cfg.find_route("/", "POST");
    assert!(matches!(result.unwrap_err(), RoutingError::MethodNotAllowed));
}

#[test]
fn path_not_found() {
    let cfg = server_with_routes(vec![route("/a", &["GET"])]);
    let result = cfg.find_route("/b", "GET");
    assert!(matches!(result.unwrap_err(), RoutingError::NotFound));
}
