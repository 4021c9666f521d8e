//! Error codes

/// Errors that can occur while scraping the monitor subtree or serving
/// metrics
#[derive(thiserror::Error, Debug)]
pub enum Error {
	/// The connection to the directory server could not be established.
	#[error("Dial failed: {0}")]
	Dial(#[source] ldap3::LdapError),
	/// Authenticating with the configured bind user failed.
	#[error("Bind failed: {0}")]
	Bind(#[source] ldap3::LdapError),
	/// A search below a monitored entry failed.
	#[error("Search under {base} failed: {source}")]
	Query {
		/// The base DN of the failed search
		base: String,
		/// The underlying protocol error
		#[source]
		source: ldap3::LdapError,
	},
	/// An underlying protocol error or similar occurred outside of a specific
	/// operation.
	#[error(transparent)]
	Ldap(#[from] ldap3::LdapError),
	/// A metric could not be created, registered or encoded.
	#[error(transparent)]
	Metrics(#[from] prometheus::Error),
	/// Reading a file or binding a socket failed.
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// The configuration file is not valid YAML for [`crate::Config`].
	#[error(transparent)]
	Yaml(#[from] serde_yaml::Error),
	/// The configuration did not pass validation.
	#[error("Invalid configuration: {0}")]
	Invalid(String),
}
