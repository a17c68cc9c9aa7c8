use std::{env, net::IpAddr, str::FromStr};

use tracing::level_filters::LevelFilter;

/// An error raised while reading the configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("{0} must be set")]
	Missing(&'static str),
	#[error("{name} is invalid: {reason}")]
	Invalid { name: &'static str, reason: String },
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
	pub database_url: String,
	/// Url-safe base64 key used to seal verification and password reset tokens.
	pub fernet_key: String,
	pub host: IpAddr,
	pub port: u16,
	/// Base url of the frontend, used when building links sent by email.
	pub frontend_url: String,
	/// Public origin of this service, prefixed to media urls.
	pub site_domain: String,
	pub media_root: String,
	pub media_url: String,
	/// Lifetime of a bearer login token.
	pub token_lifetime: chrono::Duration,
	pub email_from: String,
	pub log_level: LevelFilter,
	pub otlp_endpoint: Option<String>,
	pub rate_limit_per_second: u64,
	pub rate_limit_burst: u32,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
	env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn or_default(name: &'static str, default: &str) -> String {
	env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
	T: FromStr,
	T::Err: std::fmt::Display,
{
	match env::var(name) {
		Ok(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
			name,
			reason: e.to_string(),
		}),
		Err(_) => Ok(default),
	}
}

impl Config {
	pub fn from_env() -> Result<Self, ConfigError> {
		let token_seconds = parsed::<i64>("USER_AUTH_TOKEN_EXPIRATION_SECONDS", 86_400)?;

		if token_seconds <= 0 {
			return Err(ConfigError::Invalid {
				name: "USER_AUTH_TOKEN_EXPIRATION_SECONDS",
				reason: "must be positive".into(),
			});
		}

		Ok(Self {
			database_url: required("DATABASE_URL")?,
			fernet_key: required("FERNET_KEY")?,
			host: parsed("HOST", IpAddr::from([127, 0, 0, 1]))?,
			port: parsed("PORT", 3000)?,
			frontend_url: or_default("FRONTEND_URL", "http://localhost:3000")
				.trim_end_matches('/')
				.to_string(),
			site_domain: or_default("SITE_DOMAIN", "http://localhost:3000")
				.trim_end_matches('/')
				.to_string(),
			media_root: or_default("MEDIA_ROOT", "media"),
			media_url: normalize_media_url(&or_default("MEDIA_URL", "/media/")),
			token_lifetime: chrono::Duration::seconds(token_seconds),
			email_from: or_default("EMAIL_HOST_USER", "noreply@localhost"),
			log_level: parsed("LOG_LEVEL", LevelFilter::INFO)?,
			otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
			rate_limit_per_second: parsed("RATE_LIMIT_PER_SECOND", 10)?,
			rate_limit_burst: parsed("RATE_LIMIT_BURST", 50)?,
		})
	}
}

/// Media urls always start and end with a slash, so a stored relative
/// path can be appended directly.
fn normalize_media_url(url: &str) -> String {
	let trimmed = url.trim_matches('/');

	if trimmed.is_empty() {
		"/".into()
	} else {
		format!("/{trimmed}/")
	}
}
