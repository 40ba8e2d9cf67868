//! MJPEG server listener
//!
//! Owns the listening socket and the accept loop. Admitted peers get their
//! own streaming task; the loop keeps a handle per task so it can tell them
//! to stop when the server is paused.
//!
//! Accepts are bounded by the accept timeout, so the loop regularly gets a
//! chance to notice a pause request or a port change. The controller also
//! pokes the loop through a `Notify` to make those changes take effect early.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::frames::FrameSource;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::stats::ServerMetrics;

/// Observable state of the listening socket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenerHealth {
    /// Address currently accepting connections, if any
    pub bound_addr: Option<SocketAddr>,
    /// Consecutive failed rebind attempts
    pub rebind_failures: u32,
    /// Most recent rebind error
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct LoopControl {
    /// Cleared to ask the loop to drain and exit
    running: bool,
    /// Set while an accept loop task owns the shared state
    active: bool,
}

/// State shared between the controller and the accept loop
#[derive(Debug)]
pub(crate) struct ListenerShared {
    control: Mutex<LoopControl>,
    port: AtomicU16,
    wake: Notify,
    health: Mutex<ListenerHealth>,
    next_session_id: AtomicU64,
    pub(crate) metrics: Arc<ServerMetrics>,
}

impl ListenerShared {
    pub(crate) fn new(port: u16) -> Self {
        Self {
            control: Mutex::new(LoopControl::default()),
            port: AtomicU16::new(port),
            wake: Notify::new(),
            health: Mutex::new(ListenerHealth::default()),
            next_session_id: AtomicU64::new(1),
            metrics: Arc::new(ServerMetrics::new()),
        }
    }

    fn control(&self) -> MutexGuard<'_, LoopControl> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn health_mut(&self) -> MutexGuard<'_, ListenerHealth> {
        self.health.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.control().running
    }

    /// Ask a live loop to keep going
    ///
    /// Returns false when no loop is active, in which case the caller has to
    /// start one.
    pub(crate) fn request_run(&self) -> bool {
        let mut control = self.control();
        if control.active {
            control.running = true;
        }
        control.active
    }

    /// Mark a freshly spawned loop as the owner of the shared state
    pub(crate) fn activate(&self) {
        let mut control = self.control();
        control.running = true;
        control.active = true;
    }

    /// Ask the loop to drain and exit
    pub(crate) fn request_stop(&self) {
        self.control().running = false;
        self.wake.notify_one();
    }

    /// Give up ownership if a stop was requested
    ///
    /// Returns false while the server should keep running, including when a
    /// resume landed after the stop request.
    fn try_deactivate(&self) -> bool {
        let mut control = self.control();
        if control.running {
            return false;
        }
        control.active = false;
        true
    }

    pub(crate) fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    pub(crate) fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::Release);
        self.wake.notify_one();
    }

    pub(crate) fn health(&self) -> ListenerHealth {
        self.health_mut().clone()
    }

    fn set_bound(&self, addr: Option<SocketAddr>) {
        self.health_mut().bound_addr = addr;
    }

    fn record_rebind_success(&self, addr: Option<SocketAddr>) {
        let mut health = self.health_mut();
        health.bound_addr = addr;
        health.rebind_failures = 0;
        health.last_error = None;
    }

    fn record_rebind_failure(&self, error: &Error) {
        let mut health = self.health_mut();
        health.rebind_failures += 1;
        health.last_error = Some(error.to_string());
    }

    fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Bind a listening socket on the configured interface
pub(crate) async fn bind(config: &ServerConfig, port: u16) -> Result<TcpListener> {
    let addr = config.bind_addr(port);
    TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })
}

/// Exponential backoff between failed rebind attempts
#[derive(Debug)]
struct RebindRetry {
    base: Duration,
    max: Duration,
    /// Port the failures were counted for
    port: Option<u16>,
    failures: u32,
    next_attempt: Option<Instant>,
}

impl RebindRetry {
    fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            port: None,
            failures: 0,
            next_attempt: None,
        }
    }

    /// Aim at `port`; a different target starts over without backoff
    fn target(&mut self, port: u16) {
        if self.port != Some(port) {
            self.port = Some(port);
            self.reset();
        }
    }

    fn ready(&self) -> bool {
        self.next_attempt.map_or(true, |at| Instant::now() >= at)
    }

    /// Record a failure and return the delay before the next attempt
    fn failed(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let exponent = (self.failures - 1).min(16);
        let delay = self.base.saturating_mul(1 << exponent).min(self.max);
        self.next_attempt = Some(Instant::now() + delay);
        delay
    }

    fn reset(&mut self) {
        self.failures = 0;
        self.next_attempt = None;
    }
}

struct ConnectionHandle {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

enum AcceptEvent {
    Accepted(TcpStream, SocketAddr),
    Failed(std::io::Error),
    Idle,
}

/// Accept loop state, owned by the loop task
pub(crate) struct Listener {
    config: Arc<ServerConfig>,
    source: Arc<dyn FrameSource>,
    shared: Arc<ListenerShared>,
    socket: Option<TcpListener>,
    connections: HashMap<u64, ConnectionHandle>,
    retry: RebindRetry,
}

impl Listener {
    pub(crate) fn new(
        config: Arc<ServerConfig>,
        source: Arc<dyn FrameSource>,
        shared: Arc<ListenerShared>,
        socket: TcpListener,
    ) -> Self {
        let retry = RebindRetry::new(config.accept_timeout, config.max_rebind_backoff);
        let listener = Self {
            config,
            source,
            shared,
            socket: Some(socket),
            connections: HashMap::new(),
            retry,
        };
        listener.shared.set_bound(listener.local_addr());
        listener
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Run until the server is paused or stopped
    pub(crate) async fn run(mut self) {
        if let Some(addr) = self.local_addr() {
            tracing::info!(addr = %addr, "MJPEG server listening");
        }

        loop {
            match self.next_event().await {
                AcceptEvent::Accepted(socket, peer_addr) => self.admit(socket, peer_addr),
                AcceptEvent::Failed(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
                AcceptEvent::Idle => {}
            }

            // Deciding to exit and giving up the socket must not be split by a
            // resume: once deactivated, a resume waits for this task to finish.
            if self.shared.try_deactivate() {
                self.close();
                break;
            }

            self.check_port().await;
        }

        tracing::info!("MJPEG server stopped accepting");
    }

    async fn next_event(&self) -> AcceptEvent {
        let timeout = self.config.accept_timeout;

        match &self.socket {
            Some(socket) => tokio::select! {
                result = tokio::time::timeout(timeout, socket.accept()) => match result {
                    Ok(Ok((stream, peer_addr))) => AcceptEvent::Accepted(stream, peer_addr),
                    Ok(Err(e)) => AcceptEvent::Failed(e),
                    Err(_) => AcceptEvent::Idle,
                },
                _ = self.shared.wake.notified() => AcceptEvent::Idle,
            },
            None => {
                // Unbound after a failed rebind; wait for the next retry window
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {}
                    _ = self.shared.wake.notified() => {}
                }
                AcceptEvent::Idle
            }
        }
    }

    fn admit(&mut self, socket: TcpStream, peer_addr: SocketAddr) {
        if !self.config.origin_policy.allows(peer_addr.ip()) {
            tracing::debug!(peer = %peer_addr, "Connection rejected: origin not allowed");
            self.shared.metrics.connection_rejected();
            return;
        }

        self.reap();
        if self.config.max_connections > 0 && self.connections.len() >= self.config.max_connections
        {
            tracing::warn!(
                peer = %peer_addr,
                limit = self.config.max_connections,
                "Connection rejected: limit reached"
            );
            self.shared.metrics.connection_rejected();
            return;
        }

        let session_id = self.shared.next_session_id();

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let running = Arc::new(AtomicBool::new(true));
        let connection = Connection::new(
            session_id,
            socket,
            peer_addr,
            &self.config,
            Arc::clone(&self.source),
            Arc::clone(&running),
            Arc::clone(&self.shared.metrics),
        );

        let task = tokio::spawn(async move {
            if let Err(e) = connection.run().await {
                tracing::warn!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });

        self.connections
            .insert(session_id, ConnectionHandle { running, task });
    }

    /// Forget connections whose task already finished
    fn reap(&mut self) {
        self.connections.retain(|_, handle| !handle.task.is_finished());
    }

    /// Stop every connection and release the listening socket
    fn close(&mut self) {
        for (_, handle) in self.connections.drain() {
            handle.running.store(false, Ordering::Release);
        }

        if let Some(socket) = self.socket.take() {
            let addr = socket.local_addr().ok();
            drop(socket);
            tracing::info!(addr = ?addr, "Listening socket closed");
        }
        self.shared.set_bound(None);
    }

    /// Rebind when the configured port no longer matches the bound one
    async fn check_port(&mut self) {
        let wanted = self.shared.port();
        let current = self.local_addr();

        let stale = match current {
            // Port 0 accepts whatever the OS assigned
            Some(addr) => wanted != 0 && addr.port() != wanted,
            None => true,
        };
        if !stale {
            // Back on the bound port: earlier failures no longer apply
            if self.retry.port.take().is_some() {
                self.retry.reset();
                self.shared.record_rebind_success(current);
            }
            return;
        }

        self.retry.target(wanted);
        if !self.retry.ready() {
            return;
        }

        // New socket first, so a failed rebind leaves the old one serving
        match bind(&self.config, wanted).await {
            Ok(socket) => {
                self.socket = Some(socket);
                self.retry.reset();
                let addr = self.local_addr();
                self.shared.record_rebind_success(addr);

                tracing::info!(
                    from = ?current,
                    addr = ?addr,
                    "Listening socket rebound"
                );
            }
            Err(e) => {
                let delay = self.retry.failed();
                self.shared.record_rebind_failure(&e);

                tracing::warn!(
                    port = wanted,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Rebind failed"
                );
            }
        }
    }
}
