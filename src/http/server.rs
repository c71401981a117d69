//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router and its middleware stack
//! - Apply the admission layer in front of the upstream forwarder
//! - Serve plain TCP or TLS with graceful shutdown
//! - Swap in reloaded configuration without dropping connections

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware,
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admission::{admission_middleware, panic_response, AdmissionState, PolicyError};
use crate::config::GateConfig;
use crate::http::upstream::{failure_response, Upstream, UpstreamError};
use crate::net::tls::load_tls_config;
use crate::security::MemoryStore;

/// Grace period for in-flight requests after shutdown is signalled.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// The server could not be built.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Admission gateway in front of the upstream application.
pub struct GateServer {
    router: Router,
    state: AdmissionState,
    config: GateConfig,
}

impl GateServer {
    pub fn new(config: GateConfig) -> Result<Self, ServerError> {
        let store = MemoryStore::new(Duration::from_secs(config.rate_limit.sweep_interval_secs));
        let state = AdmissionState::new(&config, std::sync::Arc::new(store))?;
        let upstream = Upstream::from_config(&config.upstream)?;

        let forwarder = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(upstream);

        let router = gate_router(forwarder, state.clone(), &config);
        Ok(Self {
            router,
            state,
            config,
        })
    }

    /// The full middleware stack, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AdmissionState {
        &self.state
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GateConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, upstream = %self.config.upstream.url, "Gateway listening");

        spawn_reloader(self.state.clone(), config_updates);

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }

    /// Serve TLS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        config_updates: mpsc::UnboundedReceiver<GateConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let Some(tls) = self.config.listener.tls.clone() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "listener.tls is not configured",
            ));
        };
        let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
        tracing::info!(address = %addr, upstream = %self.config.upstream.url, "Gateway listening (TLS)");

        spawn_reloader(self.state.clone(), config_updates);

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received, draining connections");
            drain.graceful_shutdown(Some(DRAIN_TIMEOUT));
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Wrap `inner` with the admission layer and the ambient middleware stack.
#[allow(deprecated)]
pub fn gate_router(inner: Router, state: AdmissionState, config: &GateConfig) -> Router {
    // Panics are caught inside the admission layer so they are logged with
    // the request context.
    inner
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(state, admission_middleware))
        .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn spawn_reloader(state: AdmissionState, mut updates: mpsc::UnboundedReceiver<GateConfig>) {
    tokio::spawn(async move {
        while let Some(config) = updates.recv().await {
            match state.reload(&config) {
                Ok(()) => tracing::info!("Admission policy reloaded"),
                Err(e) => tracing::error!(error = %e, "Rejected reloaded configuration, keeping current policy"),
            }
        }
    });
}

/// Forward an admitted request upstream.
async fn proxy_handler(State(upstream): State<Upstream>, request: Request<Body>) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    tracing::debug!(method = %method, path = %path, "Forwarding request");

    match upstream.forward(request, peer).await {
        Ok(response) => response,
        Err(err) => failure_response(err, &method, &path),
    }
}
