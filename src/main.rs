// src/main.rs
// Entry point for the ml-service control loop

use anyhow::{Context, Result};
use dotenv::dotenv;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;

use mlfleet_lib::activity::ActivityLog;
use mlfleet_lib::api::{AppState, create_api_routes};
use mlfleet_lib::cluster::{CommandWorkerPool, HelmDeployment, KubectlClient};
use mlfleet_lib::config::ControlConfig;
use mlfleet_lib::control::{
    DispatchCoordinator, RegistryPoller, ReplicaController, WorkerRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    info!("Starting ml-service control loop...");

    let config = ControlConfig::from_env().context("Failed to load configuration")?;
    info!(
        "Watching pods matching {} every {}s",
        config.worker_name_pattern,
        config.poll_interval.as_secs()
    );

    let activity = Arc::new(ActivityLog::new());

    let orchestrator = Arc::new(KubectlClient::new(
        config.kubectl_bin.clone(),
        config.namespace.clone(),
        config.tool_timeout,
    ));
    let deployment = Arc::new(HelmDeployment::new(
        config.helm_bin.clone(),
        config.helm_release.clone(),
        config.helm_chart.clone(),
        config.helm_scaled_object,
        config.tool_timeout,
    ));
    let pool = Arc::new(
        CommandWorkerPool::new(
            config.worker_pool_command.clone(),
            config.worker_pool_dir.clone(),
            config.result_idle_timeout,
        )
        .context("Failed to configure worker pool")?,
    );

    let registry = Arc::new(WorkerRegistry::new(
        orchestrator,
        config.name_regex()?,
        activity.clone(),
    ));
    let replicas = Arc::new(ReplicaController::new(
        deployment,
        activity.clone(),
        config.initial_bounds()?,
    ));
    let dispatcher = Arc::new(DispatchCoordinator::new(
        pool,
        replicas.clone(),
        activity.clone(),
    ));

    info!("Starting worker poller");
    let poller = Arc::new(RegistryPoller::spawn(registry.clone(), config.poll_interval));

    let app_state = Arc::new(AppState {
        registry,
        poller: poller.clone(),
        replicas,
        dispatcher,
        activity,
    });
    let app = create_api_routes(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Control API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("Control API server failed")?;

    poller.shutdown().await;
    info!("Control loop shut down");

    Ok(())
}
