//! Server lifecycle
//!
//! ```text
//!            start()               pause()
//!   Stopped ─────────► Running ◄──────────► Paused
//!      ▲               resume()     resume()   │
//!      │                  │                    │
//!      └──── stop() ──────┴────── stop() ──────┘
//! ```
//!
//! Pausing only asks the accept loop to drain: it notices on its next wakeup,
//! tells every connection to stop, closes the listening socket and exits.
//! Resuming before that happened simply lets the loop carry on.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::error::Result;
use crate::frames::{FrameSource, FrameStore};
use crate::server::config::ServerConfig;
use crate::server::listener::{self, Listener, ListenerHealth, ListenerShared};
use crate::stats::ServerStats;

/// Externally visible server state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No accept loop, no listening socket
    Stopped,
    /// Accepting and streaming
    Running,
    /// Asked to stop accepting; the loop may still be draining
    Paused,
}

/// MJPEG streaming server
///
/// Owns the frame store the producer publishes into and the accept loop that
/// serves it. Must be started from within a Tokio runtime.
pub struct MjpegServer {
    config: Arc<ServerConfig>,
    store: Arc<FrameStore>,
    shared: Arc<ListenerShared>,
    state: Mutex<ServerState>,
    /// Serializes lifecycle transitions and owns the accept loop task
    lifecycle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl MjpegServer {
    /// Create a server with its own, initially empty, frame store
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(FrameStore::new()))
    }

    /// Create a server serving an existing frame store
    pub fn with_store(config: ServerConfig, store: Arc<FrameStore>) -> Self {
        let shared = Arc::new(ListenerShared::new(config.port));

        Self {
            config: Arc::new(config),
            store,
            shared,
            state: Mutex::new(ServerState::Stopped),
            lifecycle: tokio::sync::Mutex::new(None),
        }
    }

    /// The store the frame producer publishes into
    pub fn frame_store(&self) -> &Arc<FrameStore> {
        &self.store
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the server is in the `Running` state
    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Start accepting connections
    ///
    /// Fails only if the listening socket cannot be bound, in which case the
    /// server stays where it was. Starting a running server does nothing;
    /// starting a paused one resumes it.
    pub async fn start(&self) -> Result<()> {
        let mut task = self.lifecycle.lock().await;

        match self.state() {
            ServerState::Running => {
                tracing::debug!("Start ignored: already running");
                Ok(())
            }
            ServerState::Paused => self.resume_locked(&mut task).await,
            ServerState::Stopped => self.launch(&mut task).await,
        }
    }

    /// Stop accepting and stop every active connection
    ///
    /// Returns immediately; the accept loop winds down on its own.
    pub async fn pause(&self) {
        let _task = self.lifecycle.lock().await;

        if self.state() != ServerState::Running {
            return;
        }

        self.shared.request_stop();
        self.set_state(ServerState::Paused);
        tracing::info!("MJPEG server paused");
    }

    /// Resume after `pause` (or start after `stop`)
    pub async fn resume(&self) -> Result<()> {
        let mut task = self.lifecycle.lock().await;

        if self.state() == ServerState::Running {
            return Ok(());
        }
        self.resume_locked(&mut task).await
    }

    /// Shut down and wait for the listening socket to be released
    pub async fn stop(&self) {
        let mut task = self.lifecycle.lock().await;

        self.shared.request_stop();
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Accept loop task failed");
            }
        }

        if self.state() != ServerState::Stopped {
            self.set_state(ServerState::Stopped);
            tracing::info!("MJPEG server stopped");
        }
    }

    async fn resume_locked(&self, task: &mut Option<JoinHandle<()>>) -> Result<()> {
        if self.shared.request_run() {
            self.set_state(ServerState::Running);
            tracing::info!("MJPEG server resumed");
            return Ok(());
        }

        self.launch(task).await
    }

    async fn launch(&self, task: &mut Option<JoinHandle<()>>) -> Result<()> {
        // A previous loop has deactivated; wait until it has released its socket
        if let Some(previous) = task.take() {
            if let Err(e) = previous.await {
                tracing::warn!(error = %e, "Accept loop task failed");
            }
        }

        let port = self.shared.port();
        let socket = match listener::bind(&self.config, port).await {
            Ok(socket) => socket,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start MJPEG server");
                return Err(e);
            }
        };

        self.shared.activate();
        let source: Arc<dyn FrameSource> = self.store.clone();
        let listener = Listener::new(
            Arc::clone(&self.config),
            source,
            Arc::clone(&self.shared),
            socket,
        );
        *task = Some(tokio::spawn(listener.run()));

        self.set_state(ServerState::Running);
        Ok(())
    }

    /// Port the server listens on, or will listen on once running
    pub fn port(&self) -> u16 {
        self.shared.port()
    }

    /// Change the listening port
    ///
    /// A running server rebinds within one accept timeout; otherwise the new
    /// port is used by the next start or resume.
    pub fn set_port(&self, port: u16) {
        let previous = self.shared.port();
        if previous == port {
            return;
        }

        self.shared.set_port(port);
        tracing::info!(from = previous, to = port, "Listening port changed");
    }

    /// Address currently accepting connections
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.health().bound_addr
    }

    /// Listening socket health, including rebind failures
    pub fn health(&self) -> ListenerHealth {
        self.shared.health()
    }

    /// Server-wide statistics
    pub fn stats(&self) -> ServerStats {
        self.shared.metrics.snapshot()
    }
}

impl Drop for MjpegServer {
    fn drop(&mut self) {
        // Let a detached accept loop release its socket
        self.shared.request_stop();
    }
}
