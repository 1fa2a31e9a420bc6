use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::Db;
use crate::gateway::{self, GatewayState};
use crate::grpc;
use crate::health::{HealthChecker, Monitored};
use crate::notifier::pubsub::PubSub;
use crate::notifier::{LoggerNotifier, Notifier};
use crate::outbox::processor::OutboxProcessor;
use crate::outbox::repo::PgOutboxStore;
use crate::users::commands::{UserCommandService, UserCommands};
use crate::users::queries::{UserQueries, UserQueryService};
use crate::users::repo::PgUserStore;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Starts every component in dependency order, waits for a shutdown signal
/// or a fatal server error, then winds everything down in reverse.
pub async fn run(cfg: Config) -> anyhow::Result<()> {
    // Infra
    let db = Db::connect(&cfg.postgres).await?;
    let pubsub = Arc::new(PubSub::connect(&cfg.pubsub).await?);

    let notifier: Arc<dyn Notifier> = if cfg.pubsub.enabled {
        Arc::new(pubsub.notifier()?)
    } else {
        Arc::new(LoggerNotifier)
    };

    // Outbox drain
    let processor = OutboxProcessor::new(
        db.tx_manager(),
        Arc::new(PgOutboxStore),
        notifier,
        cfg.notifications.max_concurrency,
    );
    let drain = {
        let processor = processor.clone();
        let interval = Duration::from_secs(cfg.notifications.interval_seconds);
        let limit = cfg.notifications.batch_size_max;
        tokio::spawn(async move { processor.run(interval, limit).await })
    };

    // Service layer
    let commands: Arc<dyn UserCommands> = Arc::new(UserCommandService::new(
        db.tx_manager(),
        Arc::new(PgUserStore),
        Arc::new(PgOutboxStore),
    ));
    let queries: Arc<dyn UserQueries> = Arc::new(UserQueryService::new(
        db.pool().clone(),
        Arc::new(PgUserStore),
    ));
    let health = HealthChecker::new(
        Arc::new(db.clone()) as Arc<dyn Monitored>,
        Arc::clone(&pubsub) as Arc<dyn Monitored>,
    );

    // API servers
    let grpc_addr = SocketAddr::from(([0, 0, 0, 0], cfg.grpc.port));
    let (grpc_stop, grpc_stopped) = oneshot::channel::<()>();
    let mut grpc_task = tokio::spawn(grpc::serve(grpc_addr, commands, queries, async {
        let _ = grpc_stopped.await;
    }));

    let http_addr = SocketAddr::from(([0, 0, 0, 0], cfg.http.port));
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .context("bind http listener")?;
    info!(addr = %http_addr, "http server listening");
    let router = gateway::router(GatewayState {
        client: gateway::connect_lazy(cfg.grpc.port)?,
        health,
    });
    let (http_stop, http_stopped) = oneshot::channel::<()>();
    let mut http_task = tokio::spawn(
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = http_stopped.await;
            })
            .into_future(),
    );

    // Wait for a reason to stop
    tokio::select! {
        _ = shutdown_signal() => info!("shutdown signal received"),
        res = &mut grpc_task => match res {
            Ok(Err(err)) => error!(error = %err, "grpc server failed"),
            Err(err) => error!(error = %err, "grpc server panicked"),
            Ok(Ok(())) => warn!("grpc server stopped unexpectedly"),
        },
        res = &mut http_task => match res {
            Ok(Err(err)) => error!(error = %err, "http server failed"),
            Err(err) => error!(error = %err, "http server panicked"),
            Ok(Ok(())) => warn!("http server stopped unexpectedly"),
        },
    }

    // Reverse-order shutdown
    let _ = http_stop.send(());
    if !http_task.is_finished()
        && tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut http_task)
            .await
            .is_err()
    {
        warn!("http server did not shut down in time");
        http_task.abort();
    }

    let _ = grpc_stop.send(());
    if !grpc_task.is_finished() {
        let _ = (&mut grpc_task).await;
    }
    info!("grpc server stopped");

    processor.stop().await;
    let _ = drain.await;

    db.close().await;
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
