//! `proxy_pass` dispatch (C9/C10 glue; spec §4.4-§4.6).
//!
//! Upstream fetches here go through a short-lived blocking `TcpStream`
//! rather than the reactor's non-blocking pump in `crate::pipe` - wiring a
//! second mio-registered socket through `HttpConnection`'s per-token state
//! machine is a larger change than this route needed to become functional,
//! and a `connect_timeout` plus read timeout bounds the worst case to one
//! blocked worker tick. `crate::pipe::UpstreamPipe` is what a later pass
//! should drive this through once upstream sockets get their own token.
//! Disk caching, when the route names a `keys_zone`, reuses the on-disk
//! layout in `crate::cache` so a restart doesn't cold-start every entry.

use crate::cache::{
    cache_path, md5_key as cache_md5_key, now_secs, read_cached_response, write_cached_response,
    CacheIndex, LookupResult,
};
use crate::prelude::*;
use std::io::Read as _;
use std::net::TcpStream;
use std::time::Duration;

const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const UPSTREAM_READ_TIMEOUT: Duration = Duration::from_secs(30);

pub fn handle_proxy(
    request: &HttpRequest,
    r_cfg: &RouteConfig,
    s_cfg: &Arc<ServerConfig>,
    cache_index: &mut CacheIndex,
) -> HttpResponse {
    let proxy = &r_cfg.proxy;
    let key_parts = [request.method.as_str(), request.url.as_str()];
    let cache_key = cache_md5_key(&key_parts);

    if proxy.is_cacheable() {
        let zone = cache_index.zone(&proxy.cache_zone);
        match zone.lookup(&cache_key, proxy.cache_lock_timeout_ms / 1000) {
            LookupResult::Hit => {
                let zone_cfg_path = &r_cfg.root; // placeholder base until zone path threading lands
                let path = cache_path(zone_cfg_path, &cache_key, "1:2");
                if let Ok(Some(cached)) = read_cached_response(&path, u16::MAX) {
                    let mut res = HttpResponse::new(HTTP_OK, "OK");
                    res.set_body(cached.body, "application/octet-stream");
                    return res;
                }
            }
            LookupResult::Updating => {
                // Someone else is revalidating; fall through and serve
                // stale-while-updating from disk if we have it, else fetch.
                let path = cache_path(&r_cfg.root, &cache_key, "1:2");
                if proxy.use_stale_updating {
                    if let Ok(Some(cached)) = read_cached_response(&path, u16::MAX) {
                        let mut res = HttpResponse::new(HTTP_OK, "OK");
                        res.set_body(cached.body, "application/octet-stream");
                        return res;
                    }
                }
            }
            LookupResult::Stale { .. } | LookupResult::Miss => {}
        }
    }

    let result = fetch_upstream(proxy.upstream.as_str(), request);

    let res = match result {
        Ok((status, body)) => {
            if proxy.is_cacheable() && proxy.cache_valid_codes.contains(&status) {
                let zone = cache_index.zone(&proxy.cache_zone);
                let _ = write_cached_response(
                    &r_cfg.root,
                    &cache_key,
                    "1:2",
                    &key_parts,
                    &body,
                    now_secs() + proxy.cache_valid_ttl_secs,
                    30,
                    30,
                    now_secs(),
                );
                zone.store_sized(
                    cache_key.to_vec(),
                    now_secs() + proxy.cache_valid_ttl_secs,
                    30,
                    30,
                    body.len() as u64,
                );
                zone.finish_update(&cache_key);
            } else if proxy.is_cacheable() {
                cache_index.zone(&proxy.cache_zone).finish_update(&cache_key);
            }
            let mut res = HttpResponse::new(status, &HttpResponse::status_text(status));
            res.set_body(body, "application/octet-stream");
            res
        }
        Err(_) => {
            if proxy.is_cacheable() {
                cache_index.zone(&proxy.cache_zone).finish_update(&cache_key);
            }
            if proxy.use_stale_error {
                let path = cache_path(&r_cfg.root, &cache_key, "1:2");
                if let Ok(Some(cached)) = read_cached_response(&path, u16::MAX) {
                    info!("serving stale cached copy after upstream failure");
                    let mut res = HttpResponse::new(HTTP_OK, "OK");
                    res.set_body(cached.body, "application/octet-stream");
                    return res;
                }
            }
            build_error_response(HTTP_BAD_GATEWAY, Some(s_cfg))
        }
    };

    res
}

fn fetch_upstream(upstream: &str, request: &HttpRequest) -> io::Result<(u16, Vec<u8>)> {
    let addr: SocketAddr = upstream
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad upstream address"))?;

    let mut stream = TcpStream::connect_timeout(&addr, UPSTREAM_CONNECT_TIMEOUT)?;
    stream.set_read_timeout(Some(UPSTREAM_READ_TIMEOUT))?;

    let mut req = format!("{} {} HTTP/1.1\r\n", request.method.as_str(), request.url);
    for (k, v) in &request.headers {
        if k.eq_ignore_ascii_case("connection") || k.eq_ignore_ascii_case("proxy-connection") {
            continue;
        }
        req.push_str(&format!("{k}: {v}\r\n"));
    }
    req.push_str("Connection: close\r\n\r\n");
    stream.write_all(req.as_bytes())?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw)?;

    let header_end = find_subsequence(&raw, b"\r\n\r\n", 0).unwrap_or(raw.len());
    let head = String::from_utf8_lossy(&raw[..header_end]);
    let status = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(HTTP_INTERNAL_SERVER_ERROR);

    let body = if header_end < raw.len() {
        raw[header_end + 4..].to_vec()
    } else {
        Vec::new()
    };

    Ok((status, body))
}
