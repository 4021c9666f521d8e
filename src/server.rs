//! HTTP endpoint exposing the gauges to Prometheus.
use std::net::SocketAddr;

use axum::{
	extract::State,
	http::{header, StatusCode},
	response::{Html, IntoResponse, Response},
	routing::get,
	Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{error::Error, VERSION};

/// State shared by the handlers
#[derive(Clone, Debug)]
struct AppState {
	/// Registry rendered on the metrics path
	registry: Registry,
	/// Where the metrics live, for the landing page
	metrics_path: String,
}

/// Render every metric in `registry` in the Prometheus text format.
pub fn render(registry: &Registry) -> Result<String, Error> {
	let mut buffer = Vec::new();
	TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
	String::from_utf8(buffer).map_err(|err| Error::Invalid(format!("metrics are not UTF-8: {err}")))
}

/// Build the router serving `registry` on `metrics_path`.
pub fn router(registry: Registry, metrics_path: &str) -> Router {
	let state = AppState { registry, metrics_path: metrics_path.to_owned() };
	Router::new()
		.route(metrics_path, get(metrics_handler))
		.route("/version", get(version_handler))
		.route("/", get(index_handler))
		.with_state(state)
}

/// Renders the registry
async fn metrics_handler(State(state): State<AppState>) -> Response {
	match render(&state.registry) {
		Ok(body) => {
			([(header::CONTENT_TYPE, TextEncoder::new().format_type().to_owned())], body).into_response()
		}
		Err(err) => {
			error!(error = %err, "rendering metrics failed");
			(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
		}
	}
}

/// Reports the exporter version
async fn version_handler() -> String {
	format!("{VERSION}\n")
}

/// Landing page pointing at the metrics
async fn index_handler(State(state): State<AppState>) -> Html<String> {
	Html(format!(
		"<html>\n<head><title>OpenDJ Exporter</title></head>\n<body>\n<h1>OpenDJ Exporter</h1>\n\
		 <p><a href=\"{path}\">Metrics</a></p>\n</body>\n</html>\n",
		path = state.metrics_path
	))
}

/// Serves the metrics endpoint until cancelled.
#[derive(Debug)]
pub struct MetricsServer {
	/// Registry to serve
	registry: Registry,
	/// Address to listen on
	listen: SocketAddr,
	/// Path of the metrics endpoint
	metrics_path: String,
}

impl MetricsServer {
	/// Create a server for `registry`.
	#[must_use]
	pub fn new(registry: Registry, listen: SocketAddr, metrics_path: String) -> Self {
		Self { registry, listen, metrics_path }
	}

	/// Listen and serve until `token` is cancelled.
	pub async fn run(self, token: CancellationToken) -> Result<(), Error> {
		let listener = tokio::net::TcpListener::bind(self.listen).await?;
		info!(addr = %self.listen, path = %self.metrics_path, "starting http listener");
		axum::serve(listener, router(self.registry, &self.metrics_path))
			.with_graceful_shutdown(token.cancelled_owned())
			.await?;
		info!("http listener stopped");
		Ok(())
	}
}
