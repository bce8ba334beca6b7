//! Gatekeeper HTTP service entry point.
//!
//! # Purpose
//! Wires configuration, observability and the identity store, seeds the
//! predefined roles, then serves the API and the metrics listener.
//!
//! # Notes
//! The `build_state` helper keeps wiring testable and minimizes main setup logic.
use anyhow::Context;
use gatekeeper::app::{AppState, build_router};
use gatekeeper::config::{GatewayConfig, StorageBackend};
use gatekeeper::observability::{self, MetricsObserver, Observer};
use gatekeeper::store::memory::InMemoryStore;
use gatekeeper::store::redis::RedisStore;
use gatekeeper::store::{IdentityStore, StoreConfig};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env_or_yaml().context("gatekeeper config")?;
    run_with_shutdown(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}

async fn run_with_shutdown<F>(config: GatewayConfig, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics_handle = observability::init_observability("gatekeeper")?;
    let state = build_state(config.clone(), Arc::new(MetricsObserver)).await?;
    let metrics_task = tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(state.clone());
    let addr = config.bind_addr;
    tracing::info!(
        %addr,
        backend = state.store.backend_name(),
        require_mtls = config.auth.require_mtls,
        "gatekeeper listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::pin!(shutdown);
    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            result?;
        }
        _ = &mut shutdown => {}
    }

    metrics_task.abort();
    let _ = metrics_task.await;
    Ok(())
}

async fn build_state(config: GatewayConfig, observer: Arc<dyn Observer>) -> anyhow::Result<AppState> {
    let store_config = StoreConfig {
        audit_retention: config.audit_retention,
    };
    let store: Arc<dyn IdentityStore> = match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("using the in-memory identity store; state is lost on restart");
            Arc::new(InMemoryStore::with_observer(store_config, observer.clone()))
        }
        StorageBackend::Redis => {
            let redis = config
                .redis
                .as_ref()
                .context("redis configuration missing")?;
            Arc::new(
                RedisStore::connect(redis, store_config, observer.clone())
                    .await
                    .context("connect to redis")?,
            )
        }
    };
    store
        .initialize_default_roles()
        .await
        .context("seed predefined roles")?;

    AppState::new(store, config.auth, observer).context("auth pipeline")
}
