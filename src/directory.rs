//! Connection to the monitored directory server.
//!
//! The scrape loop talks to the server through the [`Connector`] and
//! [`Directory`] traits. [`LdapConnector`] implements them on top of `ldap3`;
//! tests substitute an in-memory directory.

use std::{fmt, future::Future, time::Duration};

use ldap3::{
	DerefAliases, LdapConnAsync, LdapError, LdapResult, Scope, SearchEntry, SearchOptions,
	SearchResult,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

use crate::{config::ConnectionConfig, error::Error};

/// Filter matching every entry
pub const MATCH_ALL: &str = "(objectClass=*)";
/// Result code the server answers with when the search base does not exist
const NO_SUCH_OBJECT: u32 = 32;

/// Something that can open a session to the directory server.
pub trait Connector {
	/// The session type
	type Directory: Directory + Send;

	/// Open a session. Fails with [`Error::Dial`].
	fn connect(&self) -> impl Future<Output = Result<Self::Directory, Error>> + Send;
}

/// An open session to the directory server.
pub trait Directory {
	/// Authenticate with a simple bind. Fails with [`Error::Bind`].
	fn bind(
		&mut self,
		user: &str,
		password: &str,
	) -> impl Future<Output = Result<(), Error>> + Send;

	/// Search the whole subtree below `base` for any entry, returning all of
	/// their attributes. A missing base is an empty result. Fails with
	/// [`Error::Query`].
	fn search(&mut self, base: &str) -> impl Future<Output = Result<Vec<SearchEntry>, Error>> + Send;

	/// Close the session.
	fn close(self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Opens sessions to an LDAP server with `ldap3`.
#[derive(Debug, Clone)]
pub struct LdapConnector {
	/// The server URL
	url: Url,
	/// Connection settings
	connection: ConnectionConfig,
}

impl LdapConnector {
	/// Create a connector for the server at `url`.
	#[must_use]
	pub fn new(url: Url, connection: ConnectionConfig) -> Self {
		Self { url, connection }
	}
}

impl Connector for LdapConnector {
	type Directory = LdapDirectory;

	async fn connect(&self) -> Result<LdapDirectory, Error> {
		info!(addr = %self.url, "connecting to directory server");
		let settings = self.connection.to_settings();
		let (conn, ldap) =
			LdapConnAsync::from_url_with_settings(settings, &self.url).await.map_err(Error::Dial)?;
		let driver = tokio::spawn(async move {
			if let Err(err) = conn.drive().await {
				warn!("Ldap connection error {err}");
			}
		});
		Ok(LdapDirectory { ldap, driver, operation_timeout: self.connection.operation_timeout })
	}
}

/// Interpret the final result of a search: `Ok(false)` if the base does not
/// exist, `Ok(true)` on success, the result as an error otherwise.
fn base_exists(result: LdapResult) -> Result<bool, LdapError> {
	if result.rc == NO_SUCH_OBJECT {
		return Ok(false);
	}
	result.success()?;
	Ok(true)
}

/// A session opened by [`LdapConnector`].
pub struct LdapDirectory {
	/// Handle for issuing operations
	ldap: ldap3::Ldap,
	/// The task driving the connection
	driver: JoinHandle<()>,
	/// Timeout applied to every operation
	operation_timeout: Option<Duration>,
}

impl fmt::Debug for LdapDirectory {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LdapDirectory")
			.field("operation_timeout", &self.operation_timeout)
			.finish_non_exhaustive()
	}
}

impl LdapDirectory {
	/// The operation handle, with the configured timeout armed for the next
	/// operation.
	fn ldap(&mut self) -> &mut ldap3::Ldap {
		if let Some(timeout) = self.operation_timeout {
			self.ldap.with_timeout(timeout);
		}
		&mut self.ldap
	}
}

impl Directory for LdapDirectory {
	async fn bind(&mut self, user: &str, password: &str) -> Result<(), Error> {
		self.ldap()
			.simple_bind(user, password)
			.await
			.and_then(ldap3::LdapResult::success)
			.map_err(Error::Bind)?;
		Ok(())
	}

	async fn search(&mut self, base: &str) -> Result<Vec<SearchEntry>, Error> {
		let query_error = |source: LdapError| Error::Query { base: base.to_owned(), source };
		let options = SearchOptions::new().deref(DerefAliases::Never).sizelimit(0).timelimit(0);
		let SearchResult(entries, result) = self
			.ldap()
			.with_search_options(options)
			.search(base, Scope::Subtree, MATCH_ALL, vec!["*"])
			.await
			.map_err(query_error)?;
		if !base_exists(result).map_err(query_error)? {
			return Ok(Vec::new());
		}
		Ok(entries.into_iter().map(SearchEntry::construct).collect())
	}

	async fn close(mut self) -> Result<(), Error> {
		let unbind = self.ldap.unbind().await;
		if let Err(err) = self.driver.await {
			warn!("Failed to join background task: {err}");
		}
		unbind?;
		Ok(())
	}
}
