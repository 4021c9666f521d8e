//! Export OpenDJ metrics to Prometheus.
use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::Context;
use clap::{builder::BoolishValueParser, Parser};
use opendj_exporter::{
	config::{parse_duration, parse_server_url},
	Config, LdapConnector, MetricRegistry, MetricsServer, Scraper,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Export OpenDJ metrics to Prometheus.
///
/// Every option can also come from the environment or from a YAML
/// configuration file. Options given here win over the environment, which
/// wins over the file.
#[derive(Parser, Debug, Default)]
#[command(name = "opendj_exporter", version)]
struct Args {
	/// Optional configuration from a YAML file
	#[arg(short, long, value_name = "YAML_FILE")]
	config_file: Option<PathBuf>,

	/// Bind address for Prometheus HTTP metrics server
	#[arg(short = 'a', long, env = "PROM_ADDR")]
	prom_addr: Option<SocketAddr>,

	/// Path on which to expose Prometheus metrics
	#[arg(short, long, env = "METRICS_PATH")]
	metrics_path: Option<String>,

	/// Scrape interval, such as 30s or 1m
	#[arg(short, long, env = "INTERVAL", value_parser = parse_interval)]
	interval: Option<Duration>,

	/// Address and port, or URL, of the OpenDJ server
	#[arg(short, long, env = "LDAP_ADDR", value_parser = parse_server_url)]
	ldap_addr: Option<Url>,

	/// OpenDJ LDAP port
	#[arg(long, env = "LDAP_PORT")]
	ldap_port: Option<u16>,

	/// The address that LDAP connection handler is listening on
	#[arg(long, env = "LDAP_LSTN")]
	ldap_listen_addr: Option<String>,

	/// OpenDJ LDAPS port
	#[arg(long, env = "LDAPS_PORT")]
	ldaps_port: Option<u16>,

	/// The address that LDAPS connection handler is listening on
	#[arg(long, env = "LDAPS_LSTN")]
	ldaps_listen_addr: Option<String>,

	/// OpenDJ administration port
	#[arg(long, env = "ADMN_PORT")]
	admin_port: Option<u16>,

	/// The address that administration connector is listening on
	#[arg(long, env = "ADMN_LSTN")]
	admin_listen_addr: Option<String>,

	/// OpenDJ bind username (optional)
	#[arg(short = 'u', long, env = "LDAP_USER")]
	ldap_user: Option<String>,

	/// OpenDJ bind password (optional)
	#[arg(long, env = "LDAP_PASS", hide_env_values = true)]
	ldap_pass: Option<String>,

	/// Output logs in JSON format
	#[arg(long, env = "JSON_LOG", value_parser = BoolishValueParser::new())]
	json_log: bool,
}

/// clap value parser for the interval
fn parse_interval(input: &str) -> Result<Duration, String> {
	parse_duration(input).map_err(|err| err.to_string())
}

impl Args {
	/// Load the configuration file, if any, and apply the options on top.
	fn into_config(self) -> anyhow::Result<Config> {
		let mut config = match &self.config_file {
			Some(path) => Config::load_from_file(path)
				.with_context(|| format!("can't load config file {}", path.display()))?,
			None => Config::default(),
		};

		if let Some(listen) = self.prom_addr {
			config.server.listen = listen;
		}
		if let Some(path) = self.metrics_path {
			config.server.metrics_path = path;
		}
		if let Some(interval) = self.interval {
			config.interval = interval;
		}
		if let Some(url) = self.ldap_addr {
			config.url = url;
		}
		let listeners = &mut config.listeners;
		if let Some(port) = self.ldap_port {
			listeners.ldap_port = port;
		}
		if let Some(addr) = self.ldap_listen_addr {
			listeners.ldap_listen_addr = addr;
		}
		if let Some(port) = self.ldaps_port {
			listeners.ldaps_port = port;
		}
		if let Some(addr) = self.ldaps_listen_addr {
			listeners.ldaps_listen_addr = addr;
		}
		if let Some(port) = self.admin_port {
			listeners.admin_port = port;
		}
		if let Some(addr) = self.admin_listen_addr {
			listeners.admin_listen_addr = addr;
		}
		if let Some(user) = self.ldap_user {
			config.bind_user = user;
		}
		if let Some(pass) = self.ldap_pass {
			config.bind_password = pass;
		}
		if self.json_log {
			config.logging.json = true;
		}

		config.validate()?;
		Ok(config)
	}
}

/// Install the global tracing subscriber.
fn init_logging(config: &Config) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
	if config.logging.json {
		tracing_subscriber::fmt().with_env_filter(filter).json().init();
	} else {
		tracing_subscriber::fmt().with_env_filter(filter).init();
	}
}

/// Resolves once SIGINT or SIGTERM arrives.
async fn shutdown_signal() -> std::io::Result<()> {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};

		let mut terminate = signal(SignalKind::terminate())?;
		tokio::select! {
			res = tokio::signal::ctrl_c() => res,
			_ = terminate.recv() => Ok(()),
		}
	}
	#[cfg(not(unix))]
	{
		tokio::signal::ctrl_c().await
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let config = Args::parse().into_config()?;
	init_logging(&config);

	let registry = MetricRegistry::new(&config.listeners)?;
	let server = MetricsServer::new(
		registry.prometheus().clone(),
		config.server.listen,
		config.server.metrics_path.clone(),
	);
	let connector = LdapConnector::new(config.url.clone(), config.connection.clone());
	let mut scraper = Scraper::new(connector, config.credentials(), config.interval);

	// Whichever task ends first, for any reason, stops the other two.
	let token = CancellationToken::new();
	let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

	let guard = token.clone().drop_guard();
	let server_token = token.clone();
	tasks.spawn(
		async move {
			let _guard = guard;
			server.run(server_token).await?;
			Ok(())
		}
		.instrument(info_span!("server")),
	);

	let guard = token.clone().drop_guard();
	let scraper_token = token.clone();
	tasks.spawn(
		async move {
			let _guard = guard;
			scraper.run(&registry, scraper_token).await?;
			Ok(())
		}
		.instrument(info_span!("scraper")),
	);

	let guard = token.clone().drop_guard();
	let signal_token = token.clone();
	tasks.spawn(async move {
		let _guard = guard;
		tokio::select! {
			res = shutdown_signal() => {
				res?;
				info!("shutdown received");
			}
			() = signal_token.cancelled() => {}
		}
		Ok(())
	});

	let mut failed = false;
	while let Some(joined) = tasks.join_next().await {
		match joined {
			Ok(Ok(())) => {}
			Ok(Err(err)) => {
				error!(error = %err, "service failed");
				failed = true;
			}
			Err(err) => {
				error!(error = %err, "task panicked");
				failed = true;
			}
		}
	}
	anyhow::ensure!(!failed, "service failed");
	Ok(())
}
