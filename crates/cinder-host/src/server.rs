//! Thin serving edge: a router over the deployment table and the
//! listener loop. Everything interesting happens in the dispatcher.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::Request;
use axum::routing::any;
use axum::Router;

use cinder_runtime::{RuntimeOptions, WasmHost};

use crate::config::HostConfig;
use crate::deployment::Deployment;
use crate::dispatch::dispatch;

/// Build the router: each deployment's route pattern maps every method
/// onto the dispatcher.
pub fn build_router(host: Arc<WasmHost>, deployments: &[Deployment]) -> Router {
    let mut router = Router::new();
    for deployment in deployments {
        let host = Arc::clone(&host);
        let deployment = Arc::new(deployment.clone());
        tracing::info!(
            route = %deployment.route,
            deployment = %deployment.id,
            engine = ?deployment.engine,
            "registering route"
        );
        let route = deployment.route.clone();
        router = router.route(
            &route,
            any(move |req: Request| dispatch(Arc::clone(&host), Arc::clone(&deployment), req)),
        );
    }
    router
}

/// Build the wasm host from configuration.
///
/// # Errors
///
/// Returns an error if the scripted-runtime module cannot be read or the
/// engine cannot be constructed.
pub fn build_host(config: &HostConfig) -> Result<WasmHost> {
    let script_runtime = match &config.script_runtime {
        Some(path) => Some(std::fs::read(path).with_context(|| {
            format!("failed to read script runtime module {}", path.display())
        })?),
        None => None,
    };
    WasmHost::new(RuntimeOptions {
        script_runtime,
        caps: config.capabilities.clone(),
    })
}

/// Run the host until the process is stopped.
///
/// # Errors
///
/// Returns an error if startup fails; per-request failures are handled
/// inside the dispatcher and never reach here.
pub async fn serve(config: HostConfig) -> Result<()> {
    let host = Arc::new(build_host(&config)?);
    let router = build_router(host, &config.deployments);

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    tracing::info!(
        addr = %config.listen,
        deployments = config.deployments.len(),
        "cinder host listening"
    );

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")
}
