//! Export the monitoring counters of an OpenDJ directory server to Prometheus.
//!
//! OpenDJ publishes live operational counters as ordinary attributes of the
//! entries below `cn=monitor`. This library repeatedly searches a fixed set of
//! those entries over LDAP and writes every numeric attribute into a gauge
//! vector labelled with the attribute name, where a Prometheus server can pull
//! them from.
//!
//! For a general primer on LDAP, the [introduction] in the `ldap3` crate which
//! is used here for interfacing with LDAP is an excellent resource.
//!
//! [introduction]: https://github.com/inejge/ldap3/blob/master/LDAP-primer.md
//!
//! # Getting started
//! A minimal example of running the scraper might look like so:
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use opendj_exporter::{Config, LdapConnector, MetricRegistry, Scraper};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = Config::default();
//! let registry = MetricRegistry::new(&config.listeners)?;
//! let connector = LdapConnector::new(config.url.clone(), config.connection.clone());
//! let mut scraper = Scraper::new(connector, config.credentials(), config.interval);
//!
//! let token = CancellationToken::new();
//! scraper.run(&registry, token).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//! * Only the last value of every attribute is kept. Attributes that
//!   disappear from the server keep reporting their last value.
//! * The connection is established once. If it breaks, every query fails
//!   until the process is restarted.
//! * Entries are queried one at a time, in a fixed order.

pub mod config;
pub mod directory;
pub mod entry;
pub mod error;
pub mod query;
pub mod registry;
pub mod scraper;
pub mod server;

pub use ldap3::{self, SearchEntry};

pub use crate::{
	config::{Config, ConnectionConfig, Credentials, ListenerConfig},
	directory::{Connector, Directory, LdapConnector, LdapDirectory},
	entry::SearchEntryExt,
	error::Error,
	registry::{Category, GaugeSeries, MetricRegistry, MonitoredQuery},
	scraper::{CycleReport, ScrapeState, Scraper},
	server::MetricsServer,
};

/// Version of the exporter
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
