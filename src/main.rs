use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use wallet_recharge::api::{self, AppState};
use wallet_recharge::config::AppConfig;
use wallet_recharge::database::recharge_repository::PgRechargeRepository;
use wallet_recharge::database::user_repository::PgUserRepository;
use wallet_recharge::database::{init_pool_from_config, run_migrations};
use wallet_recharge::health::HealthChecker;
use wallet_recharge::logging::init_tracing;
use wallet_recharge::middleware::auth::JwtVerifier;
use wallet_recharge::payments::providers::PhonePeGateway;
use wallet_recharge::services::RechargeService;
use wallet_recharge::workers::RechargeMonitorWorker;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        gateway_environment = ?config.gateway.environment,
        verification_mode = ?config.recharge.verification_mode,
        "Starting wallet recharge service"
    );

    let pool = init_pool_from_config(&config.database)
        .await
        .context("database connection failed")?;
    run_migrations(&pool).await.context("database migration failed")?;

    let recharges = Arc::new(PgRechargeRepository::new(pool.clone()));
    let users = Arc::new(PgUserRepository::new(pool));

    let gateway = PhonePeGateway::new(config.gateway.clone())
        .context("failed to build PhonePe client")?;

    let recharge_service = Arc::new(RechargeService::new(
        recharges.clone(),
        users,
        Arc::new(gateway),
        config.recharge.clone(),
    ));

    let state = AppState {
        recharge_service: recharge_service.clone(),
        jwt: JwtVerifier::new(&config.auth),
        health_checker: HealthChecker::new(recharges),
    };

    let app = api::router(state).layer(api::cors_layer(&config.server.cors_allowed_origins));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor_handle = if config.monitor.enabled {
        let worker = RechargeMonitorWorker::new(recharge_service, config.monitor.clone());
        Some(tokio::spawn(worker.run(shutdown_rx)))
    } else {
        info!("Recharge monitor disabled");
        None
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(%addr, error = %e, "Failed to bind");
        e
    })?;

    info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(shutdown_tx))
        .await?;

    if let Some(handle) = monitor_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .is_err()
        {
            warn!("Recharge monitor did not stop within 5s");
        }
    }

    info!("Server shut down");
    Ok(())
}
