use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pingwatch::{probe, scheduler, server, Monitor, Settings, StateFile};

#[derive(Parser, Debug)]
#[command(name = "pingwatch")]
#[command(about = "Continuous ICMP reachability monitor with a live event stream")]
struct Args {
    /// Path to a TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listening port (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Directory of static assets
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// State file location
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Host to probe; repeat for several (replaces the configured list)
    #[arg(short, long = "target")]
    targets: Vec<String>,
}

impl Args {
    fn apply(self, settings: &mut Settings) {
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(bind) = self.bind {
            settings.bind = bind;
        }
        if let Some(dir) = self.static_dir {
            settings.static_dir = dir;
        }
        if let Some(path) = self.state_file {
            settings.state_file = path;
        }
        if !self.targets.is_empty() {
            settings.targets = self.targets;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref()).context("loading settings")?;
    args.apply(&mut settings);
    settings.validate().context("validating settings")?;

    let monitor = Arc::new(
        Monitor::new(settings.targets.iter().cloned(), settings.ledger_config()?)
            .with_subscriber_buffer(settings.subscriber_buffer),
    );
    let store = StateFile::new(&settings.state_file);
    monitor.hydrate(store.load());

    let addr = settings.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    let background = scheduler::start(monitor.clone(), store.clone(), settings.schedule()?);
    let command = settings.probe_command();
    let probes: Vec<_> = settings
        .targets
        .iter()
        .map(|target| probe::spawn_probe(monitor.clone(), command.clone(), target.clone()))
        .collect();
    let http = server::start_server(listener, monitor.clone(), settings.static_dir.clone());

    info!(%addr, targets = ?settings.targets, "pingwatch running");
    shutdown_signal().await;
    info!("shutting down");

    http.abort();
    for probe in &probes {
        probe.abort();
    }
    background.stop().await;
    if scheduler::persist(&monitor, &store).await {
        info!(path = %store.path().display(), "final state saved");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
