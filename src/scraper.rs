//! The polling loop driving the scrape.
//!
//! The loop dials the server once, then runs a scrape cycle every interval
//! until it is cancelled. A cycle binds (if credentials are configured) and
//! runs every monitored query in registry order, one after the other. A failed
//! query is logged and skipped; a failed bind abandons the cycle. Nothing is
//! reconnected: if dialing fails the loop ends, and if the connection drops
//! later every query fails until the process is restarted.

use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
	config::{Credentials, MAX_INTERVAL},
	directory::{Connector, Directory},
	error::Error,
	query::{execute, extract},
	registry::MetricRegistry,
};

/// Where a [`Scraper`] is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
	/// Constructed, not started yet
	Idle,
	/// Dialing the server
	Connecting,
	/// Connected, scraping every interval
	Running,
	/// Finished, either cancelled or unable to connect
	Stopped,
}

/// Outcome of a single scrape cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
	/// Queries that succeeded
	pub succeeded: usize,
	/// Queries that failed
	pub failed: usize,
	/// Gauge values written
	pub values: usize,
}

/// Periodically scrapes the monitor subtree into a [`MetricRegistry`].
#[derive(Debug)]
pub struct Scraper<C> {
	/// Opens the session
	connector: C,
	/// Bind credentials, `None` for anonymous access
	credentials: Option<Credentials>,
	/// Time between cycles
	interval: Duration,
	/// Current state
	state: ScrapeState,
}

impl<C: Connector> Scraper<C> {
	/// Create an idle scraper.
	#[must_use]
	pub fn new(connector: C, credentials: Option<Credentials>, interval: Duration) -> Self {
		Self { connector, credentials, interval, state: ScrapeState::Idle }
	}

	/// The current state
	#[must_use]
	pub fn state(&self) -> ScrapeState {
		self.state
	}

	/// Connect and scrape every interval until `token` is cancelled.
	///
	/// The first cycle runs one interval after connecting. Cancellation is
	/// only looked at between cycles, so a cycle in progress always finishes.
	/// Returns [`Error::Dial`] without scraping anything if the connection
	/// cannot be established, and [`Error::Invalid`] without dialing if the
	/// interval is zero or longer than [`MAX_INTERVAL`].
	pub async fn run(&mut self, registry: &MetricRegistry, token: CancellationToken) -> Result<(), Error> {
		if self.interval.is_zero() || self.interval > MAX_INTERVAL {
			self.state = ScrapeState::Stopped;
			return Err(Error::Invalid(format!("unusable scrape interval {:?}", self.interval)));
		}
		self.state = ScrapeState::Connecting;
		let mut directory = match self.connector.connect().await {
			Ok(directory) => directory,
			Err(err) => {
				error!(error = %err, "dial failed");
				self.state = ScrapeState::Stopped;
				return Err(err);
			}
		};
		self.state = ScrapeState::Running;
		info!(interval = ?self.interval, queries = registry.queries().len(), "starting monitor loop");

		let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
		loop {
			tokio::select! {
				biased;
				() = token.cancelled() => break,
				_ = ticker.tick() => {}
			}
			match scrape_cycle(&mut directory, self.credentials.as_ref(), registry).await {
				Ok(report) => debug!(
					succeeded = report.succeeded,
					failed = report.failed,
					values = report.values,
					"scrape cycle finished"
				),
				Err(err) => error!(error = %err, "bind failed"),
			}
		}

		info!("stopping monitor loop");
		self.state = ScrapeState::Stopped;
		if let Err(err) = directory.close().await {
			warn!(error = %err, "closing the connection failed");
		}
		Ok(())
	}
}

/// Run one scrape cycle over an open session: bind if there are credentials,
/// then execute every query in order and write the results into its series.
///
/// A failing query is logged and counted but does not stop the cycle. A
/// failing bind aborts the cycle before any query with [`Error::Bind`].
pub async fn scrape_cycle<D: Directory>(
	directory: &mut D,
	credentials: Option<&Credentials>,
	registry: &MetricRegistry,
) -> Result<CycleReport, Error> {
	if let Some(credentials) = credentials {
		directory.bind(&credentials.user, &credentials.password).await?;
	}

	let mut report = CycleReport::default();
	for query in registry.queries() {
		match execute(directory, query).await {
			Ok(entries) => {
				report.values += extract(&entries, query.series());
				report.succeeded += 1;
			}
			Err(err) => {
				warn!(base = query.base(), error = %err, "query failed");
				report.failed += 1;
			}
		}
	}
	Ok(report)
}
