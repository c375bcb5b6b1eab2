use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    middleware,
    routing::get,
};
use pds_adaptor_auth::ApiKeyAuthState;
use tower_http::trace::TraceLayer;

use crate::{
    config::{AppConfig, AuthSettings},
    handlers,
    middleware::{self as app_middleware, TraceId},
    service::PdsService,
};

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PdsService>,
    pub api_keys: ApiKeyAuthState,
}

impl FromRef<AppState> for ApiKeyAuthState {
    fn from_ref(state: &AppState) -> Self {
        state.api_keys.clone()
    }
}

impl AppState {
    pub fn new(service: PdsService, auth: &AuthSettings) -> Self {
        let api_keys = if auth.enabled {
            ApiKeyAuthState::new(auth.api_keys.iter().map(|(name, key)| (name.clone(), key)))
        } else {
            tracing::warn!("Inbound authentication is disabled");
            ApiKeyAuthState::disabled()
        };
        Self {
            service: Arc::new(service),
            api_keys,
        }
    }
}

pub struct PdsAdaptorServer {
    addr: SocketAddr,
    app: Router,
}

pub fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let service = PdsService::from_config(&cfg.pds)?;
    let state = AppState::new(service, &cfg.auth);
    Ok(build_router(state, cfg.server.body_limit_bytes))
}

pub fn build_router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route(
            "/suspended-patient-status/{nhs_number}",
            get(handlers::get_patient_gp_status).put(handlers::update_patient_managing_organisation),
        )
        .route(
            "/patient-trace-information/{nhs_number}",
            get(handlers::get_patient_trace_information),
        )
        .with_state(state)
        // Middleware stack (outermost last: trace id -> trace span -> body limit)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let trace_id = req
                        .extensions()
                        .get::<TraceId>()
                        .map(|t| t.as_str().to_string())
                        .unwrap_or_default();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        trace_id = %trace_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: std::time::Duration, span: &tracing::Span| {
                        span.record("http.status_code", tracing::field::display(res.status().as_u16()));
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::trace_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> anyhow::Result<PdsAdaptorServer> {
        let app = build_app(&self.config)?;
        Ok(PdsAdaptorServer {
            addr: self.addr,
            app,
        })
    }
}

impl PdsAdaptorServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
