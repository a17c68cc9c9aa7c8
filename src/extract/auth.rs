use std::{
	convert::Infallible,
	net::{IpAddr, SocketAddr},
	sync::Arc,
};

use aide::OperationInput;
use axum::{
	extract::{ConnectInfo, FromRef, FromRequestParts},
	http::{header, request, StatusCode},
};

use crate::{
	config::Config,
	cookie,
	error::{self, AppError, ErrorShape},
	openapi::{SECURITY_SCHEME_BEARER, SECURITY_SCHEME_COOKIE},
	permission,
	route::user::model::{AuthToken, User, UserIp},
	Database,
};

pub const AUTHORIZATION_PREFIX: &str = "Bearer ";

/// An error that can occur while authenticating a request.
///
/// Note that the messages are presented to the client, so they should not contain
/// sensitive information.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Authentication credentials were not provided.")]
	NotProvided,
	#[error("Invalid token.")]
	InvalidToken,
	#[error("User inactive or deleted.")]
	Inactive,
	#[error("Token expired.")]
	Expired,
}

impl ErrorShape for Error {
	fn status(&self) -> StatusCode {
		StatusCode::UNAUTHORIZED
	}
}

impl From<Error> for error::RouteError<Error> {
	fn from(error: Error) -> Self {
		Self::Route(error)
	}
}

pub type RouteError = error::RouteError<Error>;

/// Where the token of an authenticated request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
	Header,
	Cookie,
}

/// Extracts the login token and related user from the request.
///
/// The token is read from an `Authorization: Bearer <token>` header, or
/// from the token cookie when there is no such header. Expired tokens
/// are deleted as they are seen.
///
/// ```rust
/// async fn route(auth: Auth) {
///   println!("{:?}", auth.user);
/// }
/// ```
#[derive(Debug)]
pub struct Auth {
	pub token: AuthToken,
	pub source: CredentialSource,
	pub user: User,
}

fn credentials(parts: &request::Parts) -> Result<(String, CredentialSource), Error> {
	if let Some(value) = parts.headers.get(header::AUTHORIZATION) {
		let value = value.to_str().map_err(|_| Error::InvalidToken)?;
		let key = value
			.strip_prefix(AUTHORIZATION_PREFIX)
			.map(str::trim)
			.filter(|key| !key.is_empty())
			.ok_or(Error::InvalidToken)?;

		return Ok((key.to_string(), CredentialSource::Header));
	}

	parts
		.headers
		.get_all(header::COOKIE)
		.into_iter()
		.filter_map(|value| value.to_str().ok())
		.flat_map(::cookie::Cookie::split_parse)
		.filter_map(Result::ok)
		.find(|pair| pair.name() == cookie::COOKIE_NAME && !pair.value().is_empty())
		.map(|pair| (pair.value().to_string(), CredentialSource::Cookie))
		.ok_or(Error::NotProvided)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Auth
where
	Database: FromRef<S>,
	Arc<Config>: FromRef<S>,
	S: Sync + Send,
{
	type Rejection = RouteError;

	async fn from_request_parts(
		parts: &mut request::Parts,
		state: &S,
	) -> Result<Self, Self::Rejection> {
		let (key, source) = credentials(parts)?;

		let database = Database::from_ref(state);
		let config = Arc::<Config>::from_ref(state);

		let token = sqlx::query_as::<_, AuthToken>("SELECT * FROM auth_token WHERE key = $1")
			.bind(&key)
			.fetch_optional(&database)
			.await?
			.ok_or(Error::InvalidToken)?;

		let user = User::by_id(&database, token.user_id)
			.await?
			.ok_or(Error::InvalidToken)?;

		if !user.is_active || user.is_deleted {
			return Err(Error::Inactive.into());
		}

		if token.is_expired(config.token_lifetime, chrono::Utc::now()) {
			sqlx::query("DELETE FROM auth_token WHERE key = $1")
				.bind(&token.key)
				.execute(&database)
				.await?;

			return Err(Error::Expired.into());
		}

		if let Some(ip) = client_ip(parts) {
			UserIp::record(&database, user.id, ip).await?;
		}

		Ok(Self {
			token,
			source,
			user,
		})
	}
}

impl OperationInput for Auth {
	/// Operation input for the auth extractor.
	///
	/// This adds a bearer token or cookie requirement to the `OpenAPI` operation.
	fn operation_input(_ctx: &mut aide::gen::GenContext, operation: &mut aide::openapi::Operation) {
		operation.security.extend([
			[(SECURITY_SCHEME_BEARER.to_string(), Vec::new())]
				.into_iter()
				.collect(),
			[(SECURITY_SCHEME_COOKIE.to_string(), Vec::new())]
				.into_iter()
				.collect(),
		]);
	}
}

/// An authenticated user with the `ADMIN` user type.
#[derive(Debug)]
pub struct Admin(pub Auth);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Admin
where
	Database: FromRef<S>,
	Arc<Config>: FromRef<S>,
	S: Sync + Send,
{
	type Rejection = RouteError;

	async fn from_request_parts(
		parts: &mut request::Parts,
		state: &S,
	) -> Result<Self, Self::Rejection> {
		let auth = Auth::from_request_parts(parts, state).await?;

		if !permission::is_admin(&auth.user) {
			return Err(AppError::Forbidden.into());
		}

		Ok(Self(auth))
	}
}

impl OperationInput for Admin {
	fn operation_input(ctx: &mut aide::gen::GenContext, operation: &mut aide::openapi::Operation) {
		Auth::operation_input(ctx, operation);
	}
}

/// The address of the client, taken from the first `X-Forwarded-For` hop
/// when present and from the connection otherwise.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

fn client_ip(parts: &request::Parts) -> Option<IpAddr> {
	parts
		.headers
		.get("x-forwarded-for")
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.split(',').next())
		.and_then(|ip| ip.trim().parse().ok())
		.or_else(|| {
			parts
				.extensions
				.get::<ConnectInfo<SocketAddr>>()
				.map(|ConnectInfo(addr)| addr.ip())
		})
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
	S: Sync + Send,
{
	type Rejection = Infallible;

	async fn from_request_parts(
		parts: &mut request::Parts,
		_state: &S,
	) -> Result<Self, Self::Rejection> {
		Ok(Self(client_ip(parts)))
	}
}

impl OperationInput for ClientIp {}
