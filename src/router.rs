//! Route resolution errors surfaced by `ServerConfig::find_route` (see
//! `config::types`). Host-based virtual server selection and per-path route
//! matching both live on `ServerConfig`/`HttpConnection::resolve_config`
//! rather than through a standalone router, since every request already
//! carries its resolved `ServerConfig` by the time a route needs picking.

#[derive(Debug)]
pub enum RoutingError {
    NotFound,
    MethodNotAllowed,
}
