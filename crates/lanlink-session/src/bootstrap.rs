//! Session Bootstrap
//!
//! Starts the engine, then programs routing. If routing fails the engine is
//! stopped before the error is returned, so no interface is left forwarding
//! without routes and no route points at a dead interface.
//!
//! # Usage
//!
//! ```rust,ignore
//! let bootstrapper = SessionBootstrapper::new(
//!     Arc::new(ProcessEngine::new(EngineConfig::default())),
//!     route::for_current_os(Arc::new(SystemRunner)),
//! );
//!
//! let session = bootstrapper.start(config)?;
//! // ... wait for SIGINT/SIGTERM ...
//! session.stop();
//! ```

use crate::config::{ConfigError, SessionConfig};
use crate::engine::{EngineError, EngineHandle, SessionEngine};
use crate::route::{RouteConfigurator, RouteError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Bootstrap errors
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Invalid session configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to start engine: {0}")]
    Engine(#[from] EngineError),

    #[error("Add route failed: {0}")]
    Route(#[from] RouteError),
}

/// Brings a session up in the right order
pub struct SessionBootstrapper {
    /// Forwarding engine
    engine: Arc<dyn SessionEngine>,
    /// Platform routing
    routes: Box<dyn RouteConfigurator>,
}

impl SessionBootstrapper {
    /// Create a new bootstrapper
    pub fn new(engine: Arc<dyn SessionEngine>, routes: Box<dyn RouteConfigurator>) -> Self {
        Self { engine, routes }
    }

    /// Start the engine and configure routing
    pub fn start(&self, config: SessionConfig) -> Result<Session, BootstrapError> {
        config.validate()?;

        info!("SOCKS port: {}", config.socks_port);
        info!("DNS port: {}", config.dns_port);
        info!("Enable log: {}", config.debug);
        if config.mtu != crate::config::DEFAULT_MTU {
            info!("MTU: {}", config.mtu);
        }

        // Nothing is provisioned yet, so an engine failure needs no cleanup
        let mut handle = self.engine.start(&config)?;

        if let Err(e) = self.routes.configure(&config.tun_name, config.bypass_lan) {
            error!("Add route failed, stopping engine: {}", e);
            handle.stop();
            return Err(BootstrapError::Route(e));
        }

        info!("{} started", config.tun_name);

        Ok(Session {
            config,
            handle,
            started_at: Instant::now(),
            stopped: false,
        })
    }
}

/// A running session; owns the engine until stopped or dropped
pub struct Session {
    config: SessionConfig,
    handle: Box<dyn EngineHandle>,
    started_at: Instant,
    stopped: bool,
}

impl Session {
    /// Get session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Time since the session came up
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Fails once the engine has gone away without being stopped
    pub fn check(&mut self) -> Result<(), EngineError> {
        if self.stopped {
            return Ok(());
        }
        match self.handle.poll_exit() {
            Some(status) => {
                error!("{} engine exited: {}", self.config.tun_name, status);
                Err(EngineError::Died(status))
            }
            None => Ok(()),
        }
    }

    /// Stop the engine.
    ///
    /// Routes bound to the virtual interface disappear with it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.handle.stop();
        info!("{} closed after {:?}", self.config.tun_name, self.uptime());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
