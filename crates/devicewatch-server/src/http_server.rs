//! Prometheus scrape endpoint.

use crate::metrics::MetricsRegistry;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// Metrics endpoint with its listener already bound.
///
/// Binding happens at startup so a taken port fails the server instead of a
/// background task.
pub struct MetricsServer {
    registry: Arc<MetricsRegistry>,
    listener: TcpListener,
}

impl MetricsServer {
    pub async fn bind(registry: Arc<MetricsRegistry>, listen_addr: &str) -> common::Result<Self> {
        let listener = TcpListener::bind(listen_addr).await.map_err(|e| {
            common::Error::config(format!("cannot bind metrics listener {listen_addr}: {e}"))
        })?;
        Ok(Self { registry, listener })
    }

    pub fn local_addr(&self) -> common::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve scrapes until `shutdown` fires, letting in-flight requests finish
    pub async fn serve(self, shutdown: CancellationToken) -> common::Result<()> {
        info!(addr = %self.local_addr()?, "Metrics endpoint listening");

        let app = Router::new()
            .route("/metrics", get(scrape))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(self.registry);

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Metrics endpoint stopped");
        Ok(())
    }
}

async fn scrape(State(registry): State<Arc<MetricsRegistry>>) -> Response {
    match registry.render() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            warn!(error = %e, "Metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
