//! Running a monitored query and turning its result into gauge values.
use ldap3::SearchEntry;

use crate::{
	directory::Directory,
	entry::SearchEntryExt,
	error::Error,
	registry::{GaugeSeries, MonitoredQuery},
};

/// Search the subtree below the query's base DN.
pub async fn execute<D: Directory>(
	directory: &mut D,
	query: &MonitoredQuery,
) -> Result<Vec<SearchEntry>, Error> {
	directory.search(query.base()).await
}

/// Write the first value of every numeric attribute of `entries` into
/// `series`, labelled with the attribute name. Text attributes are skipped.
/// Returns how many values were written.
pub fn extract(entries: &[SearchEntry], series: &GaugeSeries) -> usize {
	let mut written = 0;
	for entry in entries {
		for (attr, value) in entry.numeric_attrs() {
			series.set(attr, value);
			written += 1;
		}
	}
	written
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used, clippy::float_cmp)]

	use std::collections::HashMap;

	use ldap3::SearchEntry;

	use super::extract;
	use crate::{
		config::ListenerConfig,
		registry::{Category, MetricRegistry},
	};

	/// An entry with single valued attributes
	fn entry(dn: &str, attrs: &[(&str, &str)]) -> SearchEntry {
		SearchEntry {
			dn: dn.to_owned(),
			attrs: attrs
				.iter()
				.map(|(name, value)| ((*name).to_owned(), vec![(*value).to_owned()]))
				.collect(),
			bin_attrs: HashMap::new(),
		}
	}

	#[test]
	fn numeric_values_are_set() {
		let registry = MetricRegistry::new(&ListenerConfig::default()).unwrap();
		let series = registry.series(Category::Database).unwrap();
		let entries = [entry(
			"cn=userRoot JE Database,cn=monitor",
			&[("EntryCount", "100"), ("cn", "userRoot JE Database")],
		)];

		assert_eq!(extract(&entries, series), 1);
		assert_eq!(series.value("EntryCount"), Some(100.0));
		assert_eq!(series.value("cn"), None);
	}

	#[test]
	fn text_does_not_touch_previous_value() {
		let registry = MetricRegistry::new(&ListenerConfig::default()).unwrap();
		let series = registry.series(Category::Backend).unwrap();
		extract(&[entry("cn=userRoot backend,cn=monitor", &[("ds-backend-entry-count", "42.0")])], series);
		extract(
			&[entry("cn=userRoot backend,cn=monitor", &[("ds-backend-entry-count", "available")])],
			series,
		);
		assert_eq!(series.value("ds-backend-entry-count"), Some(42.0), "Not reset to zero or erased");

		extract(&[entry("cn=userRoot backend,cn=monitor", &[("status", "available")])], series);
		assert_eq!(series.value("status"), None, "Never set");
	}

	#[test]
	fn missing_attribute_keeps_last_value() {
		let registry = MetricRegistry::new(&ListenerConfig::default()).unwrap();
		let series = registry.series(Category::JvmMemory).unwrap();
		extract(&[entry("cn=JVM Memory Usage,cn=monitor", &[("used-memory", "12")])], series);
		extract(&[entry("cn=JVM Memory Usage,cn=monitor", &[("max-memory", "64")])], series);
		assert_eq!(series.value("used-memory"), Some(12.0));
		assert_eq!(series.value("max-memory"), Some(64.0));
	}

	#[test]
	fn idempotent() {
		let registry = MetricRegistry::new(&ListenerConfig::default()).unwrap();
		let series = registry.series(Category::LdapHandlerStatistics).unwrap();
		let entries = [
			entry("cn=LDAP Connection Handler 0.0.0.0 port 389 Statistics,cn=monitor", &[
				("searchRequests", "7"),
				("bindRequests", "3"),
			]),
			entry("cn=child,cn=LDAP Connection Handler 0.0.0.0 port 389 Statistics,cn=monitor", &[
				("connectionsClosed", "1"),
			]),
		];

		extract(&entries, series);
		let first: Vec<_> = series.attrs().into_iter().map(|a| (series.value(&a), a)).collect();
		extract(&entries, series);
		let second: Vec<_> = series.attrs().into_iter().map(|a| (series.value(&a), a)).collect();
		assert_eq!(first, second);
		assert_eq!(first.len(), 3, "Attributes of subtree entries are included");
	}

	#[test]
	fn later_entries_overwrite_earlier_ones() {
		let registry = MetricRegistry::new(&ListenerConfig::default()).unwrap();
		let series = registry.series(Category::AdminConnector).unwrap();
		extract(&[entry("cn=a,cn=monitor", &[("count", "1")]), entry("cn=b,cn=monitor", &[("count", "2")])], series);
		assert_eq!(series.value("count"), Some(2.0));
	}
}
