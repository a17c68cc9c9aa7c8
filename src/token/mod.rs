pub mod fernet;

use chrono::{NaiveDateTime, Utc};

pub use fernet::Fernet;

const DATE_FORMAT: &str = "%Y-%m-%d %H-%M-%S";
const SEPARATOR: char = '|';

/// How long a sealed token stays valid.
pub const EXPIRATION_DAYS: i64 = 3;

/// Why a token was rejected. Clients only ever see "Invalid token.".
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
	#[error("token could not be decrypted")]
	Undecryptable,
	#[error("token payload is malformed")]
	Malformed,
	#[error("token expired")]
	Expired,
}

/// Seals a short text value (an email address) together with its issue
/// time, producing an opaque token that can later be opened and checked
/// for age without any server-side state.
#[derive(Debug, Clone)]
pub struct ExpiringTokenGenerator {
	fernet: Fernet,
}

impl ExpiringTokenGenerator {
	pub fn new(fernet: Fernet) -> Self {
		Self { fernet }
	}

	pub fn generate(&self, text: &str) -> String {
		self.generate_at(text, Utc::now().naive_utc())
	}

	pub fn generate_at(&self, text: &str, now: NaiveDateTime) -> String {
		let payload = format!("{text}{SEPARATOR}{}", now.format(DATE_FORMAT));

		self.fernet.encrypt(payload.as_bytes())
	}

	/// Opens a token and returns the text it was generated for.
	pub fn value(&self, token: &str) -> Result<String, Error> {
		self.value_at(token, Utc::now().naive_utc())
	}

	pub fn value_at(&self, token: &str, now: NaiveDateTime) -> Result<String, Error> {
		let payload = self
			.fernet
			.decrypt(token)
			.map_err(|_| Error::Undecryptable)?;
		let payload = String::from_utf8(payload).map_err(|_| Error::Malformed)?;

		// the text itself may contain the separator, the timestamp never does
		let (text, issued) = payload.rsplit_once(SEPARATOR).ok_or(Error::Malformed)?;
		let issued =
			NaiveDateTime::parse_from_str(issued, DATE_FORMAT).map_err(|_| Error::Malformed)?;

		if issued + chrono::Duration::days(EXPIRATION_DAYS) < now {
			return Err(Error::Expired);
		}

		Ok(text.to_string())
	}
}
