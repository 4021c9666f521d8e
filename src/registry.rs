//! The fixed set of monitor entries that get scraped, and the gauges their
//! attributes are published in.
//!
//! Every monitor entry belongs to a [`Category`], which decides both the DN
//! that is searched and the gauge vector the numeric attributes land in. The
//! gauge vectors carry a single `attr` label holding the attribute name.
use prometheus::{core::Collector, GaugeVec, Opts, Registry};
use tracing::debug;

use crate::{config::ListenerConfig, error::Error};

/// Prefix of every exported metric
pub const NAMESPACE: &str = "opendj";
/// The root of the monitor subtree
pub const MONITOR_BASE: &str = "cn=monitor";
/// Name of the label holding the attribute name
pub const ATTR_LABEL: &str = "attr";

/// Kinds of monitor entries that are scraped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
	/// `userRoot JE Database`
	Database,
	/// `JVM Memory Usage`
	JvmMemory,
	/// `userRoot backend`
	Backend,
	/// The administration connector
	AdminConnector,
	/// The plain LDAP connection handler
	LdapHandler,
	/// The LDAPS connection handler
	LdapsHandler,
	/// Statistics of the administration connector
	AdminConnectorStatistics,
	/// Statistics of the plain LDAP connection handler
	LdapHandlerStatistics,
	/// Statistics of the LDAPS connection handler
	LdapsHandlerStatistics,
}

impl Category {
	/// All categories, in the order they are queried.
	pub const ALL: [Category; 9] = [
		Category::Database,
		Category::JvmMemory,
		Category::Backend,
		Category::AdminConnector,
		Category::LdapHandler,
		Category::LdapsHandler,
		Category::AdminConnectorStatistics,
		Category::LdapHandlerStatistics,
		Category::LdapsHandlerStatistics,
	];

	/// Metric name, without the namespace.
	#[must_use]
	pub const fn metric_name(self) -> &'static str {
		match self {
			Category::Database => "userRoot_je_database",
			Category::JvmMemory => "jvm_memory_usage",
			Category::Backend => "userRoot_backend",
			Category::AdminConnector => "administration_connector",
			Category::LdapHandler => "ldap_connection_handler",
			Category::LdapsHandler => "ldaps_connection_handler",
			Category::AdminConnectorStatistics => "administration_connector_statistics",
			Category::LdapHandlerStatistics => "ldap_connection_handler_statistics",
			Category::LdapsHandlerStatistics => "ldaps_connection_handler_statistics",
		}
	}

	/// Help text of the metric.
	#[must_use]
	pub const fn help(self) -> &'static str {
		match self {
			Category::Database => "userRoot JE database",
			Category::JvmMemory => "JVM memory usage",
			Category::Backend => "userRoot backend",
			Category::AdminConnector => "Administration connector",
			Category::LdapHandler => "LDAP connection handler metrics",
			Category::LdapsHandler => "LDAPS connection handler metrics",
			Category::AdminConnectorStatistics => "Administration connector statistics",
			Category::LdapHandlerStatistics => "LDAP connection handler statistics",
			Category::LdapsHandlerStatistics => "LDAPS connection handler statistics",
		}
	}

	/// The `cn` of the monitor entry. Handler entries are named after the
	/// address and port the handler listens on.
	#[must_use]
	pub fn common_name(self, listeners: &ListenerConfig) -> String {
		let ldap = || format!("LDAP Connection Handler {} port {}", listeners.ldap_listen_addr, listeners.ldap_port);
		let ldaps = || {
			format!("LDAPS Connection Handler {} port {}", listeners.ldaps_listen_addr, listeners.ldaps_port)
		};
		let admin = || {
			format!("Administration Connector {} port {}", listeners.admin_listen_addr, listeners.admin_port)
		};
		match self {
			Category::Database => "userRoot JE Database".to_owned(),
			Category::JvmMemory => "JVM Memory Usage".to_owned(),
			Category::Backend => "userRoot backend".to_owned(),
			Category::AdminConnector => admin(),
			Category::LdapHandler => ldap(),
			Category::LdapsHandler => ldaps(),
			Category::AdminConnectorStatistics => format!("{} Statistics", admin()),
			Category::LdapHandlerStatistics => format!("{} Statistics", ldap()),
			Category::LdapsHandlerStatistics => format!("{} Statistics", ldaps()),
		}
	}
}

/// The DN of the monitor entry with the given `cn`.
#[must_use]
pub fn monitor_dn(common_name: &str) -> String {
	format!("cn={common_name},{MONITOR_BASE}")
}

/// A gauge vector keyed by attribute name, holding the last value seen for
/// every attribute.
///
/// Labels appear the first time an attribute is seen and are never removed.
/// An attribute that stops showing up keeps reporting its last value.
#[derive(Debug, Clone)]
pub struct GaugeSeries {
	/// The underlying gauge vector
	gauge: GaugeVec,
}

impl GaugeSeries {
	/// Create the gauge vector for a category. It is not registered anywhere.
	fn new(category: Category) -> Result<Self, prometheus::Error> {
		let opts = Opts::new(category.metric_name(), category.help()).namespace(NAMESPACE);
		Ok(Self { gauge: GaugeVec::new(opts, &[ATTR_LABEL])? })
	}

	/// Overwrite the value of an attribute, creating its label if needed.
	pub fn set(&self, attr: &str, value: f64) {
		self.gauge.with_label_values(&[attr]).set(value);
	}

	/// The last value observed for an attribute, or `None` if the attribute
	/// was never observed.
	#[must_use]
	pub fn value(&self, attr: &str) -> Option<f64> {
		self.gauge.collect().iter().flat_map(|family| family.get_metric()).find_map(|metric| {
			metric
				.get_label()
				.iter()
				.any(|label| label.get_name() == ATTR_LABEL && label.get_value() == attr)
				.then(|| metric.get_gauge().get_value())
		})
	}

	/// Names of all attributes observed so far, sorted.
	#[must_use]
	pub fn attrs(&self) -> Vec<String> {
		let mut attrs: Vec<String> = self
			.gauge
			.collect()
			.iter()
			.flat_map(|family| family.get_metric())
			.flat_map(|metric| metric.get_label())
			.filter(|label| label.get_name() == ATTR_LABEL)
			.map(|label| label.get_value().to_owned())
			.collect();
		attrs.sort();
		attrs
	}
}

/// One monitor entry to search, and where its values go.
#[derive(Debug, Clone)]
pub struct MonitoredQuery {
	/// What kind of entry this is
	category: Category,
	/// The search base
	base: String,
	/// The target of the entry's numeric attributes
	series: GaugeSeries,
}

impl MonitoredQuery {
	/// What kind of entry this is
	#[must_use]
	pub fn category(&self) -> Category {
		self.category
	}

	/// The DN searched for this entry
	#[must_use]
	pub fn base(&self) -> &str {
		&self.base
	}

	/// The gauges this entry's attributes are written to
	#[must_use]
	pub fn series(&self) -> &GaugeSeries {
		&self.series
	}
}

/// The fixed list of monitored entries, in query order, together with the
/// Prometheus registry their gauges are registered in.
///
/// Build this once per process. The set of queries never changes afterwards;
/// only gauge values do.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
	/// Registry all gauges are registered in
	registry: Registry,
	/// Queries in execution order
	queries: Vec<MonitoredQuery>,
}

impl MetricRegistry {
	/// Build the queries for the given listeners and register their gauges in
	/// a new, private [`Registry`].
	pub fn new(listeners: &ListenerConfig) -> Result<Self, Error> {
		Self::with_registry(listeners, Registry::new())
	}

	/// Build the queries for the given listeners and register their gauges in
	/// `registry`.
	///
	/// Fails with [`Error::Metrics`] if `registry` already holds these gauges,
	/// for example because it was passed here before.
	pub fn with_registry(listeners: &ListenerConfig, registry: Registry) -> Result<Self, Error> {
		let mut queries = Vec::with_capacity(Category::ALL.len());
		for category in Category::ALL {
			let series = GaugeSeries::new(category)?;
			registry.register(Box::new(series.gauge.clone()))?;
			let base = monitor_dn(&category.common_name(listeners));
			debug!(%base, metric = category.metric_name(), "registered monitor entry");
			queries.push(MonitoredQuery { category, base, series });
		}
		Ok(Self { registry, queries })
	}

	/// All queries, in the order they are executed.
	#[must_use]
	pub fn queries(&self) -> &[MonitoredQuery] {
		&self.queries
	}

	/// The series of a category.
	#[must_use]
	pub fn series(&self, category: Category) -> Option<&GaugeSeries> {
		self.queries.iter().find(|query| query.category == category).map(MonitoredQuery::series)
	}

	/// The Prometheus registry the gauges live in, for rendering.
	#[must_use]
	pub fn prometheus(&self) -> &Registry {
		&self.registry
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used, clippy::float_cmp)]

	use prometheus::Registry;

	use super::{monitor_dn, Category, MetricRegistry};
	use crate::{config::ListenerConfig, error::Error};

	/// Listeners as set up by the test container
	fn listeners() -> ListenerConfig {
		ListenerConfig {
			ldap_listen_addr: "0.0.0.0".to_owned(),
			ldap_port: 1389,
			ldaps_listen_addr: "0.0.0.0".to_owned(),
			ldaps_port: 1636,
			admin_listen_addr: "0.0.0.0".to_owned(),
			admin_port: 4444,
		}
	}

	#[test]
	fn one_query_per_category() {
		let registry = MetricRegistry::new(&listeners()).unwrap();
		let categories: Vec<_> = registry.queries().iter().map(|query| query.category()).collect();
		assert_eq!(categories, Category::ALL);
	}

	#[test]
	fn base_dns() {
		let registry = MetricRegistry::new(&listeners()).unwrap();
		let bases: Vec<_> = registry.queries().iter().map(|query| query.base()).collect();
		assert_eq!(
			bases,
			[
				"cn=userRoot JE Database,cn=monitor",
				"cn=JVM Memory Usage,cn=monitor",
				"cn=userRoot backend,cn=monitor",
				"cn=Administration Connector 0.0.0.0 port 4444,cn=monitor",
				"cn=LDAP Connection Handler 0.0.0.0 port 1389,cn=monitor",
				"cn=LDAPS Connection Handler 0.0.0.0 port 1636,cn=monitor",
				"cn=Administration Connector 0.0.0.0 port 4444 Statistics,cn=monitor",
				"cn=LDAP Connection Handler 0.0.0.0 port 1389 Statistics,cn=monitor",
				"cn=LDAPS Connection Handler 0.0.0.0 port 1636 Statistics,cn=monitor",
			]
		);
	}

	#[test]
	fn deterministic() {
		let first = MetricRegistry::new(&listeners()).unwrap();
		let second = MetricRegistry::new(&listeners()).unwrap();
		let bases = |registry: &MetricRegistry| {
			registry.queries().iter().map(|query| query.base().to_owned()).collect::<Vec<_>>()
		};
		assert_eq!(bases(&first), bases(&second));
	}

	#[test]
	fn malformed_address_is_not_validated() {
		let listeners = ListenerConfig { ldap_listen_addr: "not an address".to_owned(), ..listeners() };
		let registry = MetricRegistry::new(&listeners).unwrap();
		assert_eq!(
			registry.queries()[4].base(),
			monitor_dn("LDAP Connection Handler not an address port 1389")
		);
	}

	#[test]
	fn double_registration_fails() {
		let shared = Registry::new();
		MetricRegistry::with_registry(&listeners(), shared.clone()).unwrap();
		assert!(matches!(
			MetricRegistry::with_registry(&listeners(), shared),
			Err(Error::Metrics(prometheus::Error::AlreadyReg))
		));
	}

	#[test]
	fn series_values() {
		let registry = MetricRegistry::new(&listeners()).unwrap();
		let series = registry.series(Category::JvmMemory).unwrap();
		assert_eq!(series.value("max-memory"), None, "Never observed");

		series.set("max-memory", 512.0);
		series.set("max-memory", 1024.0);
		series.set("used-memory", 10.0);
		assert_eq!(series.value("max-memory"), Some(1024.0), "Last value wins");
		assert_eq!(series.attrs(), ["max-memory", "used-memory"]);

		assert_eq!(registry.series(Category::Backend).unwrap().value("max-memory"), None);
	}

	#[test]
	fn gauges_are_gathered() {
		let registry = MetricRegistry::new(&listeners()).unwrap();
		registry.series(Category::Database).unwrap().set("EntryCount", 100.0);
		let families = registry.prometheus().gather();
		let family = families
			.iter()
			.find(|family| family.get_name() == "opendj_userRoot_je_database")
			.unwrap();
		assert_eq!(family.get_metric()[0].get_gauge().get_value(), 100.0);
	}
}
