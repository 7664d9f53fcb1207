use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{config::AppConfig, handlers, state::AppState};

pub struct OmopFhirServer {
    addr: SocketAddr,
    app: Router,
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    Router::new()
        .route("/healthz", get(handlers::healthz))
        // Local mapping stores
        .route(
            "/admin/vocabulary-map",
            get(handlers::list_vocabulary_map).post(handlers::create_vocabulary_map),
        )
        .route(
            "/admin/vocabulary-map/{id}",
            put(handlers::update_vocabulary_map).delete(handlers::delete_vocabulary_map),
        )
        .route(
            "/admin/code-map",
            get(handlers::list_code_map).post(handlers::create_code_map),
        )
        .route(
            "/admin/code-map/{concept_id}",
            put(handlers::update_code_map).delete(handlers::delete_code_map),
        )
        .route(
            "/admin/state-map",
            get(handlers::list_state_map).post(handlers::create_state_map),
        )
        .route(
            "/admin/state-map/{state_name}",
            put(handlers::update_state_map).delete(handlers::delete_state_map),
        )
        .route("/admin/ingestion/run", post(handlers::run_ingestion))
        // Translation lookups
        .route("/mapping/concept", get(handlers::lookup_concept))
        .route("/mapping/coding/{concept_id}", get(handlers::lookup_coding))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    state: Option<AppState>,
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
            state: None,
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

    /// Uses already connected stores instead of the configured backends.
    pub fn with_state(mut self, state: AppState) -> Self {
        self.state = Some(state);
        self
    }

    pub async fn build(self) -> anyhow::Result<OmopFhirServer> {
        let state = match self.state {
            Some(state) => state,
            None => AppState::from_config(&self.config).await?,
        };
        let app = build_app(state, &self.config);
        Ok(OmopFhirServer {
            addr: self.addr,
            app,
        })
    }
}

impl OmopFhirServer {
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
