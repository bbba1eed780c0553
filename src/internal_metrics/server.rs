//! # Metrics Server
//!
//! The `axum` server that exposes the exporter's state to a Prometheus
//! scraper. Every request renders a fresh snapshot: the internal counters
//! from the `PrometheusHandle`, followed by each stale-aware gauge family.
//!
//! The server stops accepting connections once the shutdown signal fires
//! and finishes any in-flight scrape before returning.

use crate::registry::{exposition, MetricFamily};
use axum::{http::header, response::IntoResponse, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, trace};

/// Renders everything the pull endpoint exposes.
#[derive(Clone)]
pub struct Exposition {
    prom_handle: PrometheusHandle,
    families: Arc<Vec<Arc<dyn MetricFamily>>>,
}

impl Exposition {
    pub fn new(prom_handle: PrometheusHandle, families: Vec<Arc<dyn MetricFamily>>) -> Self {
        Self {
            prom_handle,
            families: Arc::new(families),
        }
    }

    pub fn render(&self) -> String {
        let mut out = self.prom_handle.render();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        for family in self.families.iter() {
            family.encode(&mut out);
        }
        out
    }
}

/// A server that exposes metrics to a Prometheus scraper.
pub struct MetricsServer {
    listener: TcpListener,
    exposition: Exposition,
    shutdown_rx: watch::Receiver<bool>,
}

impl MetricsServer {
    /// Creates a new `MetricsServer` but does not spawn it.
    ///
    /// # Arguments
    ///
    /// * `listener` - A `TcpListener` that has already been bound to an address.
    /// * `exposition` - Renders the response body.
    /// * `shutdown_rx` - A watch channel receiver for graceful shutdown.
    pub fn new(
        listener: TcpListener,
        exposition: Exposition,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            listener,
            exposition,
            shutdown_rx,
        }
    }

    /// Returns a future that runs the server until a shutdown signal is received.
    pub fn run(self) -> impl Future<Output = ()> {
        let view = self.exposition;
        let handler = move || {
            let view = view.clone();
            async move {
                (
                    [(header::CONTENT_TYPE, exposition::CONTENT_TYPE)],
                    view.render(),
                )
                    .into_response()
            }
        };
        // Scrapers pointed at the bare address get the same body.
        let app = Router::new()
            .route("/metrics", get(handler.clone()))
            .route("/", get(handler));

        let mut shutdown_rx = self.shutdown_rx;
        let listener = self.listener;
        async move {
            let shutdown = async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
                trace!("Metrics server received shutdown signal.");
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Metrics server error: {}", e);
            }
            trace!("Metrics server task finished.");
        }
    }
}
