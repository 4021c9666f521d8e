use std::{
	collections::HashMap,
	error::Error as StdError,
	io,
	sync::{Arc, Mutex},
};

use ldap3::{LdapConnAsync, LdapError, SearchEntry};
use opendj_exporter::{Connector, Directory, Error};
use tokio_util::sync::CancellationToken;

/// What the in-memory directory answers for a base DN
#[derive(Debug, Clone)]
pub enum Response {
	Entries(Vec<SearchEntry>),
	Fail,
}

/// Operations the in-memory directory has seen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
	Connect,
	Bind(String),
	Search(String),
	Close,
}

#[derive(Debug, Default)]
pub struct MockState {
	responses: Mutex<HashMap<String, Response>>,
	calls: Mutex<Vec<Call>>,
	cancel_on: Mutex<Option<(String, CancellationToken)>>,
}

impl MockState {
	pub fn respond(&self, base: &str, response: Response) {
		self.responses.lock().unwrap().insert(base.to_owned(), response);
	}

	/// Cancel `token` while the search below `base` is running
	pub fn cancel_during(&self, base: &str, token: CancellationToken) {
		*self.cancel_on.lock().unwrap() = Some((base.to_owned(), token));
	}

	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().unwrap().clone()
	}

	pub fn searches(&self) -> Vec<String> {
		self.calls()
			.into_iter()
			.filter_map(|call| match call {
				Call::Search(base) => Some(base),
				_ => None,
			})
			.collect()
	}

	fn record(&self, call: Call) {
		self.calls.lock().unwrap().push(call);
	}
}

/// A connector handing out sessions to an in-memory directory
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
	pub state: Arc<MockState>,
	pub fail_dial: bool,
	pub fail_bind: bool,
}

#[derive(Debug)]
pub struct MockDirectory {
	state: Arc<MockState>,
	fail_bind: bool,
}

pub fn io_error(kind: io::ErrorKind) -> LdapError {
	LdapError::from(io::Error::new(kind, "mock failure"))
}

impl Connector for MockConnector {
	type Directory = MockDirectory;

	async fn connect(&self) -> Result<MockDirectory, Error> {
		self.state.record(Call::Connect);
		if self.fail_dial {
			return Err(Error::Dial(io_error(io::ErrorKind::ConnectionRefused)));
		}
		Ok(MockDirectory { state: self.state.clone(), fail_bind: self.fail_bind })
	}
}

impl Directory for MockDirectory {
	async fn bind(&mut self, user: &str, _password: &str) -> Result<(), Error> {
		self.state.record(Call::Bind(user.to_owned()));
		if self.fail_bind {
			return Err(Error::Bind(io_error(io::ErrorKind::PermissionDenied)));
		}
		Ok(())
	}

	async fn search(&mut self, base: &str) -> Result<Vec<SearchEntry>, Error> {
		self.state.record(Call::Search(base.to_owned()));
		if let Some((cancel_base, token)) = &*self.state.cancel_on.lock().unwrap() {
			if cancel_base == base {
				token.cancel();
			}
		}
		match self.state.responses.lock().unwrap().get(base) {
			Some(Response::Entries(entries)) => Ok(entries.clone()),
			Some(Response::Fail) => Err(Error::Query {
				base: base.to_owned(),
				source: io_error(io::ErrorKind::ConnectionReset),
			}),
			None => Ok(Vec::new()),
		}
	}

	async fn close(self) -> Result<(), Error> {
		self.state.record(Call::Close);
		Ok(())
	}
}

/// A search entry with single valued attributes
pub fn entry(dn: &str, attrs: &[(&str, &str)]) -> SearchEntry {
	SearchEntry {
		dn: dn.to_owned(),
		attrs: attrs
			.iter()
			.map(|(name, value)| ((*name).to_owned(), vec![(*value).to_owned()]))
			.collect(),
		bin_attrs: HashMap::new(),
	}
}

pub const OPENDJ_URL: &str = "ldap://localhost:1389";
pub const OPENDJ_ADMIN: &str = "cn=Directory Manager";
pub const OPENDJ_PASSWORD: &str = "password";

/// Connect to the OpenDJ test container as the directory manager
pub async fn ldap_connect() -> Result<ldap3::Ldap, Box<dyn StdError>> {
	let (conn, mut ldap) = LdapConnAsync::new(OPENDJ_URL).await?;
	let _handle = tokio::spawn(async move {
		if let Err(err) = conn.drive().await {
			panic!("Ldap connection error {err}");
		}
	});
	ldap.simple_bind(OPENDJ_ADMIN, OPENDJ_PASSWORD).await?.success()?;
	Ok(ldap)
}
