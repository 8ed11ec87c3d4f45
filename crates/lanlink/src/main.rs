//! LanLink: tunnel through a companion device on the LAN
//!
//! Main entry point. Sets up logging, discovers (or takes) a device, picks
//! one, and runs a tunnel session until SIGINT/SIGTERM.

mod cli;
mod settings;
mod system;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::Args;
use lanlink_discovery::{list_bindings, CandidateDevice, JsonCodec, Query, Scanner, Selector};
use lanlink_session::{
    route, ProcessEngine, Session, SessionBootstrapper, SessionConfig, SystemRunner,
};
use settings::Settings;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// How often the engine is checked while waiting for a signal
const ENGINE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

// Use mimalloc as the global allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(if args.verbose { Level::DEBUG } else { Level::INFO });

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();
}

async fn run(args: Args) -> Result<()> {
    let settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("load settings from {}", path.display()))?,
        None => Settings::default(),
    };

    system::ensure_privileged()?;

    let candidates = match args.address {
        Some(addr) => vec![CandidateDevice::manual(addr, args.socks, args.dns)],
        None => discover(&settings).await?,
    };

    let selector = match args.max_prompts {
        Some(max) => Selector::with_max_attempts(max as usize),
        None => Selector::new(),
    };
    let index = args.device;
    let selected = tokio::task::spawn_blocking(move || {
        selector.select(candidates, index, std::io::stdin().lock(), std::io::stdout())
    })
    .await
    .context("selection task")??;

    if selected.is_discovered() {
        info!("Selected {}", selected);
    }

    let config = SessionConfig::merge(&selected, &args.overrides());

    let bootstrapper = SessionBootstrapper::new(
        Arc::new(ProcessEngine::new(settings.engine.clone())),
        route::for_current_os(Arc::new(SystemRunner)),
    );
    let mut session = tokio::task::spawn_blocking(move || bootstrapper.start(config))
        .await
        .context("bootstrap task")??;

    wait_for_shutdown(&mut session).await?;

    session.stop();
    info!("Closed");
    Ok(())
}

/// Broadcast a query on every usable interface
async fn discover(settings: &Settings) -> Result<Vec<CandidateDevice>> {
    let device_name = system::local_hostname().context("get hostname")?;

    let scanner = Scanner::new(
        Arc::new(JsonCodec),
        &Query::new(device_name),
        settings.discovery.options(),
    )
    .context("make scan query")?;

    let bindings = list_bindings()?;
    if bindings.is_empty() {
        bail!("no available network interface");
    }

    Ok(scanner.discover(bindings).await)
}

/// Wait for SIGINT/SIGTERM; fails early if the engine dies meanwhile
#[cfg(unix)]
async fn wait_for_shutdown(session: &mut Session) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut engine_check = tokio::time::interval(ENGINE_CHECK_INTERVAL);

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
                return Ok(());
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
                return Ok(());
            }
            _ = engine_check.tick() => session.check()?,
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(session: &mut Session) -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut engine_check = tokio::time::interval(ENGINE_CHECK_INTERVAL);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res?;
                info!("Received Ctrl+C, shutting down");
                return Ok(());
            }
            _ = engine_check.tick() => session.check()?,
        }
    }
}
