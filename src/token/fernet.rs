//! Fernet authenticated encryption.
//!
//! Tokens are interoperable with other Fernet implementations: a token is
//! the url-safe base64 encoding of
//!
//! ```text
//! version (0x80) | timestamp (u64 BE) | iv (16) | ciphertext | hmac-sha256 (32)
//! ```
//!
//! where the ciphertext is AES-128-CBC with PKCS7 padding and the HMAC
//! covers every byte before it.

use aes::Aes128;
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const VERSION: u8 = 0x80;
const KEY_LENGTH: usize = 32;
const IV_LENGTH: usize = 16;
const HMAC_LENGTH: usize = 32;
/// version + timestamp + iv
const HEADER_LENGTH: usize = 1 + 8 + IV_LENGTH;
const BLOCK_LENGTH: usize = 16;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
	#[error("fernet key must be 32 url-safe base64-encoded bytes")]
	InvalidKey,
	#[error("invalid token")]
	InvalidToken,
}

/// A Fernet key pair, split into its signing and encryption halves.
#[derive(Clone)]
pub struct Fernet {
	signing_key: [u8; 16],
	encryption_key: [u8; 16],
}

impl std::fmt::Debug for Fernet {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Fernet").finish_non_exhaustive()
	}
}

impl Fernet {
	/// Creates a codec from a url-safe base64 encoded 32 byte key.
	pub fn new(key: &str) -> Result<Self, Error> {
		let bytes = URL_SAFE
			.decode(key.trim())
			.map_err(|_| Error::InvalidKey)?;

		if bytes.len() != KEY_LENGTH {
			return Err(Error::InvalidKey);
		}

		let mut signing_key = [0; 16];
		let mut encryption_key = [0; 16];

		signing_key.copy_from_slice(&bytes[..16]);
		encryption_key.copy_from_slice(&bytes[16..]);

		Ok(Self {
			signing_key,
			encryption_key,
		})
	}

	/// Generates a fresh random key, encoded the way [`Fernet::new`] expects.
	pub fn generate_key() -> String {
		let mut key = [0; KEY_LENGTH];

		OsRng.fill_bytes(&mut key);
		URL_SAFE.encode(key)
	}

	pub fn encrypt(&self, data: &[u8]) -> String {
		let now = chrono::Utc::now().timestamp();

		self.encrypt_at(data, u64::try_from(now).unwrap_or_default())
	}

	/// Encrypts `data`, stamping the token with `timestamp` (seconds since epoch).
	pub fn encrypt_at(&self, data: &[u8], timestamp: u64) -> String {
		let mut iv = [0; IV_LENGTH];
		OsRng.fill_bytes(&mut iv);

		self.encrypt_with_iv(data, timestamp, iv)
	}

	fn encrypt_with_iv(&self, data: &[u8], timestamp: u64, iv: [u8; IV_LENGTH]) -> String {
		let ciphertext = cbc::Encryptor::<Aes128>::new(&self.encryption_key.into(), &iv.into())
			.encrypt_padded_vec_mut::<Pkcs7>(data);

		let mut token = Vec::with_capacity(HEADER_LENGTH + ciphertext.len() + HMAC_LENGTH);
		token.push(VERSION);
		token.extend_from_slice(&timestamp.to_be_bytes());
		token.extend_from_slice(&iv);
		token.extend_from_slice(&ciphertext);

		let tag = self.mac(&token).finalize().into_bytes();
		token.extend_from_slice(&tag);

		URL_SAFE.encode(token)
	}

	/// Verifies and decrypts a token, returning the plaintext.
	///
	/// The embedded timestamp is not checked, callers that need an
	/// expiry carry their own.
	pub fn decrypt(&self, token: &str) -> Result<Vec<u8>, Error> {
		let bytes = URL_SAFE
			.decode(token.trim())
			.map_err(|_| Error::InvalidToken)?;

		if bytes.len() < HEADER_LENGTH + BLOCK_LENGTH + HMAC_LENGTH || bytes[0] != VERSION {
			return Err(Error::InvalidToken);
		}

		let (signed, tag) = bytes.split_at(bytes.len() - HMAC_LENGTH);

		self.mac(signed)
			.verify_slice(tag)
			.map_err(|_| Error::InvalidToken)?;

		let iv = &signed[9..HEADER_LENGTH];
		let ciphertext = &signed[HEADER_LENGTH..];

		if ciphertext.len() % BLOCK_LENGTH != 0 {
			return Err(Error::InvalidToken);
		}

		cbc::Decryptor::<Aes128>::new_from_slices(&self.encryption_key, iv)
			.map_err(|_| Error::InvalidToken)?
			.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
			.map_err(|_| Error::InvalidToken)
	}

	fn mac(&self, data: &[u8]) -> HmacSha256 {
		let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.signing_key)
			.expect("HMAC accepts keys of any length");

		mac.update(data);
		mac
	}
}
