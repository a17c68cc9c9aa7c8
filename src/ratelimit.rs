use std::{sync::Arc, time::Duration};

use axum::{
	body::Body,
	response::{IntoResponse, Response},
};
use governor::{
	clock::QuantaInstant,
	middleware::{RateLimitingMiddleware, StateInformationMiddleware},
};
use tower_governor::{
	governor::{GovernorConfig, GovernorConfigBuilder},
	key_extractor::{KeyExtractor, SmartIpKeyExtractor},
	GovernorError,
};

use crate::{config::Config, error::AppError};

pub type Limits = Arc<GovernorConfig<SmartIpKeyExtractor, StateInformationMiddleware>>;

/// The limiters of the api, keyed by the client address (honouring
/// `X-Forwarded-For` when behind a proxy).
#[derive(Clone)]
pub struct RateLimits {
	/// Applies to every route.
	pub default: Limits,
	/// Applies on top of the default to routes that check credentials or send mail.
	pub secure: Limits,
}

impl RateLimits {
	/// Builds the limiters, or `None` when the configured quota disables them.
	pub fn from_config(config: &Config) -> Option<Self> {
		Some(Self {
			default: default(config)?,
			secure: secure()?,
		})
	}
}

fn default(config: &Config) -> Option<Limits> {
	GovernorConfigBuilder::default()
		.per_second(config.rate_limit_per_second)
		.burst_size(config.rate_limit_burst)
		.key_extractor(SmartIpKeyExtractor)
		.use_headers()
		.error_handler(error_handler)
		.finish()
		.map(Arc::new)
}

fn secure() -> Option<Limits> {
	GovernorConfigBuilder::default()
		.per_second(1)
		.key_extractor(SmartIpKeyExtractor)
		.use_headers()
		.error_handler(error_handler)
		.finish()
		.map(Arc::new)
}

fn error_handler(error: GovernorError) -> Response<Body> {
	AppError::from(error).into_response()
}

pub fn cleanup_old_limits<T, M>(configs: &[&Arc<GovernorConfig<T, M>>])
where
	T: KeyExtractor,
	<T as KeyExtractor>::Key: Send + Sync + 'static,
	M: RateLimitingMiddleware<QuantaInstant> + Send + Sync + 'static,
{
	let limiters = configs
		.iter()
		.map(|config| config.limiter().clone())
		.collect::<Vec<_>>();
	let interval = Duration::from_secs(60);

	std::thread::spawn(move || loop {
		std::thread::sleep(interval);

		for limiter in &limiters {
			tracing::debug!("rate limiting storage size: {}", limiter.len());

			limiter.retain_recent();
		}
	});
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_limits_from_config() {
		let mut config = crate::test::config("media");

		assert!(RateLimits::from_config(&config).is_some());

		config.rate_limit_per_second = 0;
		assert!(RateLimits::from_config(&config).is_none());

		config.rate_limit_per_second = 10;
		config.rate_limit_burst = 0;
		assert!(RateLimits::from_config(&config).is_none());
	}
}
