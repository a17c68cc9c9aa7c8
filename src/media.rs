use std::{
	future::Future,
	path::{Component, Path, PathBuf},
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const PROFILE_PHOTO_DIRECTORY: &str = "profile_photos";

const DATA_SEPARATOR: &str = ";base64,";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PhotoError {
	#[error("profile photo must be a base64 data url")]
	NotDataUrl,
	#[error("profile photo is not valid base64")]
	InvalidBase64,
	#[error("profile photo has no file extension")]
	MissingExtension,
}

/// A decoded upload, ready to be written under the media root.
#[derive(Debug, PartialEq, Eq)]
pub struct Upload {
	/// Path relative to the media root.
	pub path: String,
	pub bytes: Vec<u8>,
}

/// Decodes a `data:<mime>;base64,<data>` string into a profile photo for
/// the given user. The file is named after the user and the upload time.
pub fn profile_photo(data: &str, user_id: Uuid, now: DateTime<Utc>) -> Result<Upload, PhotoError> {
	let (mime, encoded) = data.split_once(DATA_SEPARATOR).ok_or(PhotoError::NotDataUrl)?;

	let extension = mime
		.rsplit('/')
		.next()
		.map(str::trim)
		.filter(|ext| !ext.is_empty() && !ext.contains(':'))
		.ok_or(PhotoError::MissingExtension)?;

	let bytes = STANDARD
		.decode(encoded.trim())
		.map_err(|_| PhotoError::InvalidBase64)?;

	let name = valid_filename(&format!(
		"{user_id}_{}.{extension}",
		now.format("%Y_%m_%d_%H_%M_%S_%6f")
	));

	Ok(Upload {
		path: format!("{PROFILE_PHOTO_DIRECTORY}/{name}"),
		bytes,
	})
}

/// Strips a name down to characters that are safe in a file name:
/// whitespace becomes `_`, anything but alphanumerics, `-`, `_` and `.`
/// is dropped.
pub fn valid_filename(name: &str) -> String {
	name.trim()
		.chars()
		.filter_map(|c| match c {
			c if c.is_whitespace() => Some('_'),
			c if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') => Some(c),
			_ => None,
		})
		.collect()
}

/// Stores files under the media root, overwriting existing files with the
/// same name.
#[derive(Debug, Clone)]
pub struct FileManager {
	root: PathBuf,
}

impl FileManager {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Resolves a stored relative path, refusing anything that would
	/// escape the media root.
	fn resolve(&self, path: &str) -> std::io::Result<PathBuf> {
		let relative = Path::new(path);

		if relative
			.components()
			.any(|component| !matches!(component, Component::Normal(..)))
		{
			return Err(std::io::Error::new(
				std::io::ErrorKind::InvalidInput,
				format!("media path {path:?} is not relative"),
			));
		}

		Ok(self.root.join(relative))
	}

	pub async fn save(&self, upload: &Upload) -> std::io::Result<()> {
		let path = self.resolve(&upload.path)?;

		if let Some(parent) = path.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}

		tokio::fs::write(&path, &upload.bytes).await?;
		tracing::debug!(path = %path.display(), "saved media file");

		Ok(())
	}

	/// Saves `upload` and then awaits `record`, which stores a reference to
	/// the file. The file is removed again when `record` fails so that no
	/// unreferenced media is left behind.
	pub async fn save_with<T, E, F>(&self, upload: Option<&Upload>, record: F) -> Result<T, E>
	where
		F: Future<Output = Result<T, E>>,
		E: From<std::io::Error>,
	{
		if let Some(upload) = upload {
			self.save(upload).await?;
		}

		let result = record.await;

		if let (Err(..), Some(upload)) = (&result, upload) {
			if let Err(error) = self.delete(&upload.path).await {
				tracing::warn!(%error, path = %upload.path, "failed to remove orphaned media file");
			}
		}

		result
	}

	/// Deletes a stored file. A file that is already gone is not an error.
	pub async fn delete(&self, path: &str) -> std::io::Result<()> {
		match tokio::fs::remove_file(self.resolve(path)?).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e),
		}
	}
}

/// Builds the public url of a stored media file.
pub fn url(site_domain: &str, media_url: &str, path: &str) -> String {
	format!("{site_domain}{media_url}{path}")
}
