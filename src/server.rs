//! Owns the listener fleet and the reactor loop (C4, C5, C8 glue).
//!
//! Connections are still addressed by the monotonically increasing `mio`
//! token the teacher's code already hands out per accept (`next_token`),
//! rather than by `reactor::ConnKey` - tokens here are never reused across
//! connections, so the generational-index problem `ConnKey` solves doesn't
//! arise for client sockets. `reactor::ConnectionPool` is still put to work
//! as the capacity/backoff tracker the spec's C5 calls for: every accept
//! goes through `pool.acquire`, every close through `pool.release`, and
//! `AcceptMutex` gates how aggressively the loop drains the accept queue.

use crate::cache::CacheIndex;
use crate::cgi::{check_time_out_cgi, handle_cgi_event};
use crate::config::{AppConfig, ServerConfig, Shared};
use crate::http::{ActiveAction, HttpConnection};
use crate::prelude::*;
use crate::reactor::{AcceptMutex, ConnKey, ConnectionPool};
use crate::timer::TimerWheel;
use std::process::Child;

const LISTENER_TOKEN_BUDGET: usize = 1024;

pub struct Server {
    pub config: Shared,
    listeners: Vec<(TcpListener, Token, Vec<Arc<ServerConfig>>)>,
    pub connections: HashMap<Token, HttpConnection>,
    pub cgi_to_client: HashMap<Token, Token>,
    pub zombie_purgatory: Vec<Child>,
    pub session_store: SessionStore,
    pub cache_index: CacheIndex,
    next_token: usize,
    pool: ConnectionPool<()>,
    pool_keys: HashMap<Token, ConnKey>,
    accept_mutex: AcceptMutex,
    timers: TimerWheel,
    last_manager_run: Instant,
}

impl Server {
    pub fn new(config: AppConfig, poll: &Poll) -> Result<Self> {
        let mut listeners = Vec::new();
        let mut token_id = 0usize;

        // Group server blocks that share a host:port so every listener
        // carries its full virtual-host list for SNI-less Host: dispatch.
        let mut by_addr: HashMap<(String, u16), Vec<Arc<ServerConfig>>> = HashMap::new();
        for server_cfg in &config.servers {
            let cfg = Arc::new(server_cfg.clone());
            for &port in &server_cfg.ports {
                by_addr
                    .entry((server_cfg.host.clone(), port))
                    .or_default()
                    .push(Arc::clone(&cfg));
            }
        }

        for ((host, port), cfgs) in by_addr {
            let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
            let mut listener = TcpListener::bind(addr)?;
            let token = Token(token_id);
            token_id += 1;
            poll.registry()
                .register(&mut listener, token, Interest::READABLE)?;
            info!("listening on {}", addr);
            listeners.push((listener, token, cfgs));
        }

        let worker_connections = config.worker_connections;
        let keepalive = config.keepalive_timeout_secs;

        // Loader runs once per zone at worker start while it's cold (spec
        // §4.7), so a restart doesn't serve a cold cache from an empty
        // index while warm files still sit on disk.
        let mut cache_index = CacheIndex::new();
        for zone_cfg in &config.cache_zones {
            let zone = cache_index.zone(&zone_cfg.name);
            zone.configure(zone_cfg.inactive_secs);
            let stats = crate::cache::load_zone(
                &zone,
                &zone_cfg.path,
                zone_cfg.loader_files,
                Duration::from_millis(zone_cfg.loader_sleep_ms),
                zone_cfg.loader_threshold_ms,
            );
            info!(
                "cache zone {} loaded {} entries ({} skipped)",
                zone_cfg.name, stats.loaded, stats.skipped
            );
        }

        Ok(Self {
            config: Shared::new(config),
            listeners,
            connections: HashMap::new(),
            cgi_to_client: HashMap::new(),
            zombie_purgatory: Vec::new(),
            session_store: SessionStore::new(keepalive),
            cache_index,
            next_token: LISTENER_TOKEN_BUDGET.max(token_id),
            pool: ConnectionPool::new(worker_connections),
            pool_keys: HashMap::new(),
            accept_mutex: AcceptMutex::new(),
            timers: TimerWheel::new(),
            last_manager_run: Instant::now(),
        })
    }

    fn listener_token(&self, token: Token) -> Option<usize> {
        self.listeners
            .iter()
            .position(|(_, t, _)| *t == token)
    }

    fn accept_on(&mut self, idx: usize, poll: &Poll) -> Result<()> {
        self.accept_mutex
            .recompute_backoff(self.pool.capacity(), self.pool.capacity() - self.pool.len());

        loop {
            if !self.accept_mutex.try_lock() {
                break;
            }

            let (listener, _token, cfgs) = &mut self.listeners[idx];
            match listener.accept() {
                Ok((mut stream, _peer)) => {
                    let key = match self.pool.acquire(|| ()) {
                        Ok(key) => key,
                        Err(_) => {
                            drop(stream);
                            self.accept_mutex.fail_to_lock();
                            break;
                        }
                    };

                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) = poll.registry().register(&mut stream, token, Interest::READABLE) {
                        errors!("failed to register accepted connection: {}", e);
                        self.pool.release(key);
                        continue;
                    }

                    let conn = HttpConnection::new(stream, cfgs.clone());
                    self.connections.insert(token, conn);
                    self.pool_keys.insert(token, key);
                    self.accept_mutex.on_accept();
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    self.accept_mutex.fail_to_lock();
                    break;
                }
                Err(e) => {
                    errors!("accept failed: {}", e);
                    self.accept_mutex.fail_to_lock();
                    break;
                }
            }
        }

        Ok(())
    }

    fn remove_connection(&mut self, token: Token, poll: &Poll) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = poll.registry().deregister(&mut conn.stream);
            if let ActiveAction::Cgi { mut child, .. } =
                std::mem::replace(&mut conn.action, ActiveAction::None)
            {
                let _ = child.kill();
                match child.try_wait() {
                    Ok(None) => self.zombie_purgatory.push(child),
                    _ => {}
                }
                crate::cgi::cleanup_cgi(&mut self.cgi_to_client, &mut conn);
            }
        }
        if let Some(key) = self.pool_keys.remove(&token) {
            self.pool.release(key);
        }
    }

    fn reap_zombies(&mut self) {
        self.zombie_purgatory.retain_mut(|child| match child.try_wait() {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(_) => false,
        });
    }

    pub fn run(&mut self, poll: Poll) -> Result<()> {
        let mut poll = poll;
        let mut events = Events::with_capacity(1024);

        loop {
            let wake = self.timers.next_expiry().map(|_| Duration::from_millis(250));
            poll.poll(&mut events, wake.or(Some(Duration::from_millis(500))))?;

            for event in events.iter() {
                let token = event.token();

                if let Some(idx) = self.listener_token(token) {
                    self.accept_on(idx, &poll)?;
                    continue;
                }

                if let Some(&client_token) = self.cgi_to_client.get(&token) {
                    if let Some(mut conn) = self.connections.remove(&client_token) {
                        let result = handle_cgi_event(
                            &poll,
                            event,
                            token,
                            client_token,
                            &mut conn,
                            &mut self.cgi_to_client,
                        );
                        self.connections.insert(client_token, conn);
                        if let Err(e) = result {
                            errors!("cgi event handling failed: {}", e);
                        }
                    }
                    continue;
                }

                if self.connections.contains_key(&token) {
                    let mut conn = self.connections.remove(&token).unwrap();
                    conn.touch();

                    let result = if event.is_readable() {
                        HttpConnection::handle_read_phase(
                            &mut conn,
                            &poll,
                            token,
                            &mut self.next_token,
                            &mut self.cgi_to_client,
                            &mut self.session_store,
                            &mut self.cache_index,
                        )
                    } else {
                        Ok(())
                    };

                    if result.is_ok() && event.is_writable() {
                        let _ = HttpConnection::handle_write_phase(
                            &mut conn,
                            &poll,
                            token,
                            &mut self.next_token,
                            &mut self.cgi_to_client,
                            &mut self.session_store,
                            &mut self.cache_index,
                        );
                    }

                    let should_close = result.is_err() || conn.should_close();
                    self.connections.insert(token, conn);

                    if let Err(e) = result {
                        errors!("connection {:?} error: {}", token, e);
                    }

                    if should_close {
                        self.remove_connection(token, &poll);
                    }
                }
            }

            check_time_out_cgi(&mut self.connections, &poll, &mut self.cgi_to_client);
            crate::timeouts::process(self, &poll);
            self.reap_zombies();
            self.run_cache_managers();
        }
    }

    /// Drives one manager pass per configured cache zone, throttled to the
    /// slowest `manager_sleep_ms` among them (spec §4.7).
    fn run_cache_managers(&mut self) {
        let zones = self.config.load().cache_zones.clone();
        if zones.is_empty() {
            return;
        }
        let min_sleep = zones.iter().map(|z| z.manager_sleep_ms).min().unwrap_or(1000);
        if self.last_manager_run.elapsed() < Duration::from_millis(min_sleep) {
            return;
        }
        self.last_manager_run = Instant::now();

        for zone_cfg in &zones {
            let zone = self.cache_index.zone(&zone_cfg.name);
            zone.configure(zone_cfg.inactive_secs);
            let watermark = if zone_cfg.zone_size_mb == 0 { usize::MAX } else { zone_cfg.zone_size_mb * 64 };
            let stats = crate::cache::run_manager_cycle(&zone, zone_cfg, watermark);
            if stats.evicted > 0 {
                trace!("cache zone {} manager evicted {} entries", zone_cfg.name, stats.evicted);
            }
        }
    }
}
