//! Config for the exporter.
use std::{net::SocketAddr, path::Path, time::Duration};

use ldap3::LdapConnSettings;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Exporter configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
	/// The URL of the monitored directory server. Supports ldap, ldaps, and
	/// ldapi schemes
	pub url: Url,
	/// Connection settings.
	pub connection: ConnectionConfig,
	/// The DN to bind as before every scrape cycle. Binding only happens if
	/// both this and the password are non-empty
	pub bind_user: String,
	/// The password for the bind user
	pub bind_password: String,
	/// Time between two scrape cycles
	#[serde(with = "duration")]
	pub interval: Duration,
	/// Where the monitored server's listeners are bound, used to name the
	/// per-handler monitor entries
	pub listeners: ListenerConfig,
	/// The HTTP endpoint metrics are served on
	pub server: ServerConfig,
	/// Log output settings
	pub logging: LoggingConfig,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			url: default_url(),
			connection: ConnectionConfig::default(),
			bind_user: String::new(),
			bind_password: String::new(),
			interval: Duration::from_secs(30),
			listeners: ListenerConfig::default(),
			server: ServerConfig::default(),
			logging: LoggingConfig::default(),
		}
	}
}

/// Returns `ldap://localhost:389`
#[allow(clippy::expect_used)]
fn default_url() -> Url {
	Url::parse("ldap://localhost:389").expect("static URL is valid")
}

/// Longest accepted scrape interval
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Credentials for a simple bind
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
	/// The bind DN
	pub user: String,
	/// The bind password
	pub password: String,
}

impl Config {
	/// Load a configuration from a YAML file. The result is not validated, so
	/// that overrides can still be applied on top of it before calling
	/// [`Config::validate`].
	pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
		let content = std::fs::read_to_string(path)?;
		Ok(serde_yaml::from_str(&content)?)
	}

	/// Parse and validate a configuration from a YAML string.
	pub fn parse(content: &str) -> Result<Self, Error> {
		let config: Config = serde_yaml::from_str(content)?;
		config.validate()?;
		Ok(config)
	}

	/// Check the values that would make the exporter misbehave. Listener
	/// addresses are deliberately left alone, a wrong one only results in a
	/// monitor entry that never matches.
	pub fn validate(&self) -> Result<(), Error> {
		if self.interval.is_zero() || self.interval > MAX_INTERVAL {
			return Err(Error::Invalid(format!(
				"scrape interval must be greater than zero and at most {}, got {}",
				format_duration(MAX_INTERVAL),
				format_duration(self.interval)
			)));
		}
		let path = &self.server.metrics_path;
		if !path.starts_with('/') || path == "/" || path == "/version" {
			return Err(Error::Invalid(format!(
				"metrics path must start with '/' and not clash with '/' or '/version', got {path:?}"
			)));
		}
		if path.contains(['*', ':', '{', '}']) {
			return Err(Error::Invalid(format!(
				"metrics path must be a plain path without '*', ':', '{{' or '}}', got {path:?}"
			)));
		}
		Ok(())
	}

	/// The credentials to bind with, or `None` for anonymous access.
	#[must_use]
	pub fn credentials(&self) -> Option<Credentials> {
		if self.bind_user.is_empty() || self.bind_password.is_empty() {
			return None;
		}
		Some(Credentials { user: self.bind_user.clone(), password: self.bind_password.clone() })
	}
}

/// Parse a server address given either as a URL or as a bare `host:port`,
/// which is taken to mean plain LDAP.
pub fn parse_server_url(address: &str) -> Result<Url, url::ParseError> {
	if address.contains("://") {
		Url::parse(address)
	} else {
		Url::parse(&format!("ldap://{address}"))
	}
}

/// Configuration for how to connect to the LDAP server
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
	/// Timeout to establish a connection in seconds.
	pub timeout: u64,

	/// LDAP operation timeout. Applies to each bind and search; unset means
	/// an operation only fails when the connection does.
	#[serde(with = "duration::option")]
	pub operation_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		Self { timeout: 5, operation_timeout: None }
	}
}

impl ConnectionConfig {
	/// Create a [`LdapConnSettings`] based on this [`ConnectionConfig`]
	pub(crate) fn to_settings(&self) -> LdapConnSettings {
		LdapConnSettings::new().set_conn_timeout(Duration::from_secs(self.timeout))
	}
}

/// Addresses and ports the monitored server's listeners are bound to. The
/// server names its per-listener monitor entries after these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
	/// Address of the LDAP connection handler
	pub ldap_listen_addr: String,
	/// Port of the LDAP connection handler
	pub ldap_port: u16,
	/// Address of the LDAPS connection handler
	pub ldaps_listen_addr: String,
	/// Port of the LDAPS connection handler
	pub ldaps_port: u16,
	/// Address of the administration connector
	pub admin_listen_addr: String,
	/// Port of the administration connector
	pub admin_port: u16,
}

impl Default for ListenerConfig {
	fn default() -> Self {
		Self {
			ldap_listen_addr: "0.0.0.0".to_owned(),
			ldap_port: 389,
			ldaps_listen_addr: "0.0.0.0".to_owned(),
			ldaps_port: 636,
			admin_listen_addr: "0.0.0.0".to_owned(),
			admin_port: 4444,
		}
	}
}

/// HTTP endpoint configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
	/// Address to listen on
	pub listen: SocketAddr,
	/// Path metrics are exposed on
	pub metrics_path: String,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			listen: SocketAddr::from(([0, 0, 0, 0], 9330)),
			metrics_path: "/metrics".to_owned(),
		}
	}
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
	/// Default filter directive, overridden by `RUST_LOG`
	pub level: String,
	/// Emit JSON lines instead of human readable text
	pub json: bool,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self { level: "info".to_owned(), json: false }
	}
}

/// Nanoseconds per second
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Parse a duration such as `30s`, `500ms`, `1h`, or a sequence like `1m30s`.
/// Every number may carry a fraction (`1.5s`). A bare number is a number of
/// seconds.
pub fn parse_duration(input: &str) -> Result<Duration, Error> {
	let input = input.trim();
	let invalid = || Error::Invalid(format!("invalid duration {input:?}"));
	if let Ok(secs) = input.parse::<u64>() {
		return Ok(Duration::from_secs(secs));
	}
	if input.is_empty() {
		return Err(invalid());
	}

	let mut nanos: u128 = 0;
	let mut rest = input;
	while !rest.is_empty() {
		let number_end = rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).ok_or_else(|| {
			Error::Invalid(format!("missing unit in duration {input:?}"))
		})?;
		let (number, tail) = rest.split_at(number_end);
		let unit_end = tail.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(tail.len());
		let (unit, tail) = tail.split_at(unit_end);
		let scale = unit_nanos(unit).ok_or_else(|| {
			Error::Invalid(format!("unknown duration unit {unit:?} in {input:?}"))
		})?;
		let value = scaled(number, scale).ok_or_else(invalid)?;
		nanos = nanos.checked_add(value).ok_or_else(invalid)?;
		rest = tail;
	}

	let secs = u64::try_from(nanos / NANOS_PER_SEC).map_err(|_| invalid())?;
	let subsec = u32::try_from(nanos % NANOS_PER_SEC).map_err(|_| invalid())?;
	Ok(Duration::new(secs, subsec))
}

/// Length of a duration unit in nanoseconds
fn unit_nanos(unit: &str) -> Option<u128> {
	let nanos = match unit {
		"ns" => 1,
		"us" | "\u{b5}s" | "\u{3bc}s" => 1_000,
		"ms" => 1_000_000,
		"s" => NANOS_PER_SEC,
		"m" => 60 * NANOS_PER_SEC,
		"h" => 60 * 60 * NANOS_PER_SEC,
		_ => return None,
	};
	Some(nanos)
}

/// `number` times `scale`, where `number` is a decimal with an optional
/// fraction. Fraction digits beyond nanosecond precision are dropped.
fn scaled(number: &str, scale: u128) -> Option<u128> {
	let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
	if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
		return None;
	}
	let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
	let mut total = whole.checked_mul(scale)?;

	let fraction = &fraction[..fraction.len().min(18)];
	if !fraction.is_empty() {
		let digits: u128 = fraction.parse().ok()?;
		let exponent = u32::try_from(fraction.len()).ok()?;
		total = total.checked_add(digits.checked_mul(scale)? / 10_u128.pow(exponent))?;
	}
	Some(total)
}

/// Formats a duration the way [`parse_duration`] reads it.
fn format_duration(duration: Duration) -> String {
	if duration.subsec_nanos() == 0 {
		format!("{}s", duration.as_secs())
	} else {
		format!("{}ms", duration.as_millis())
	}
}

/// Serde support for human readable durations.
mod duration {
	use std::time::Duration;

	use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

	/// Serialize as a string like `30s`
	pub(super) fn serialize<S: Serializer>(
		value: &Duration,
		serializer: S,
	) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&super::format_duration(*value))
	}

	/// Deserialize from a string like `30s`, or a plain number of seconds
	pub(super) fn deserialize<'de, D: Deserializer<'de>>(
		deserializer: D,
	) -> Result<Duration, D::Error> {
		#[derive(Deserialize)]
		#[serde(untagged)]
		/// Accepted representations
		enum Raw {
			/// Seconds
			Secs(u64),
			/// Duration string
			Text(String),
		}
		match Raw::deserialize(deserializer)? {
			Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
			Raw::Text(text) => super::parse_duration(&text).map_err(D::Error::custom),
		}
	}

	/// The same for optional durations.
	pub(super) mod option {
		use std::time::Duration;

		use serde::{Deserialize, Deserializer, Serializer};

		/// Serialize as a string, or nothing
		pub(crate) fn serialize<S: Serializer>(
			value: &Option<Duration>,
			serializer: S,
		) -> Result<S::Ok, S::Error> {
			match value {
				Some(duration) => super::serialize(duration, serializer),
				None => serializer.serialize_none(),
			}
		}

		/// Deserialize a duration that may be null
		pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
			deserializer: D,
		) -> Result<Option<Duration>, D::Error> {
			/// Routes the inner value through the plain duration parser
			#[derive(Deserialize)]
			struct Wrapper(#[serde(deserialize_with = "super::deserialize")] Duration);

			Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(duration)| duration))
		}
	}
}
