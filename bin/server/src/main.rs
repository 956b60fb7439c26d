use shellflow_engine::WorkspaceRegistry;
use shellflow_engine::bus::{EventLog, default_state_dir};
use shellflow_graph::FileStorage;
use shellflow_server::config::ServerConfig;
use shellflow_server::{AppState, routes};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    // Open the shared event log
    let event_log = if config.event_log.enabled {
        let dir = config
            .event_log
            .dir
            .clone()
            .map_or_else(default_state_dir, PathBuf::from);
        match EventLog::open(&dir) {
            Ok(log) => {
                tracing::info!(dir = %dir.display(), "Event log open");
                Some(Arc::new(Mutex::new(log)))
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to open event log; continuing without");
                None
            }
        }
    } else {
        None
    };

    let registry = Arc::new(WorkspaceRegistry::new(
        Arc::new(FileStorage::new()),
        event_log,
        Duration::from_millis(config.engine.grace_period_ms),
    ));

    // Optional self-termination once nothing has been connected for a while
    if config.idle_exit.enabled {
        let registry = registry.clone();
        let quiet = Duration::from_secs(config.idle_exit.after_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                if registry.workspace_count() == 0 && registry.last_activity().elapsed() > quiet {
                    tracing::info!("No workspaces and no recent activity; exiting");
                    std::process::exit(0);
                }
            }
        });
    }

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        registry,
        config: Arc::new(config),
    };
    let app = routes::router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            tracing::error!(%bind_addr, "Address already in use; is another instance running?");
            std::process::exit(2);
        }
        Err(err) => {
            tracing::error!(%bind_addr, error = %err, "Failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!("listening on http://{bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
    }
}
