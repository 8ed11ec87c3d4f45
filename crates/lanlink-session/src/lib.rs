//! LanLink Session - Tunnel Bootstrap
//!
//! Turns a selected device into a running tunnel session.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌────────────────┐   ┌──────────────┐
//! │   Selected   │──▶│ SessionConfig│──▶│ SessionEngine  │──▶│    Route     │
//! │    device    │   │   (merge)    │   │ (tun ⇄ SOCKS)  │   │ Configurator │
//! └──────────────┘   └──────────────┘   └────────────────┘   └──────────────┘
//!                          ▲                                        │ failure
//!                  operator overrides                     engine.stop() ◀┘
//! ```
//!
//! # Guarantees
//!
//! - The engine is started before any route is installed
//! - A routing failure stops the engine exactly once before reporting
//! - Dropping a [`Session`] stops its engine

mod bootstrap;
mod command;
mod config;
mod engine;
pub mod route;

pub use bootstrap::{BootstrapError, Session, SessionBootstrapper};
pub use command::{format_command, CommandError, CommandRunner, SystemRunner};
pub use config::{
    default_tun_name, tun_name_for, ConfigError, Overrides, SessionConfig, DEFAULT_DNS_PORT,
    DEFAULT_MTU, DEFAULT_SOCKS_PORT,
};
pub use engine::{EngineConfig, EngineError, EngineHandle, ProcessEngine, ProcessHandle, SessionEngine};
pub use route::{RouteConfigurator, RouteError};
