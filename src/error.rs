use std::borrow::Cow;

use aide::OperationOutput;
use axum::{
	body::Body,
	extract::rejection::{JsonRejection, PathRejection, QueryRejection},
	http::{Response, StatusCode},
	response::IntoResponse,
};
use tower_governor::GovernorError;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::{
	envelope::{self, Envelope},
	mail,
};

pub const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";

/// Describes how an error is presented to the client.
///
/// Messages end up in the response body, so they must not contain
/// sensitive information.
pub trait ErrorShape: std::error::Error {
	fn status(&self) -> StatusCode;

	fn message(&self) -> Cow<'static, str> {
		self.to_string().into()
	}
}

/// Errors shared by every route.
///
/// The Display trait is not sent to the client for server errors, so it
/// can show sensitive information.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
	#[error("validation error: {0}")]
	Validation(#[from] ValidationErrors),
	#[error("json error: {0}")]
	Json(#[from] JsonRejection),
	#[error("query error: {0}")]
	Query(#[from] QueryRejection),
	#[error("path error: {0}")]
	Path(#[from] PathRejection),
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),
	#[error("password hashing error: {0}")]
	Hash(#[from] argon2::Error),
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	#[error("mail error: {0}")]
	Mail(#[from] mail::Error),
	#[error("rate limited")]
	RateLimit(GovernorError),
	#[error("not found")]
	NotFound,
	#[error("permission denied")]
	Forbidden,
}

impl From<GovernorError> for AppError {
	fn from(error: GovernorError) -> Self {
		Self::RateLimit(error)
	}
}

impl AppError {
	fn status(&self) -> StatusCode {
		match self {
			Self::Validation(..) => StatusCode::BAD_REQUEST,
			Self::Json(rejection) => rejection.status(),
			Self::Query(rejection) => rejection.status(),
			Self::Path(rejection) => rejection.status(),
			Self::NotFound => StatusCode::NOT_FOUND,
			Self::Forbidden => StatusCode::FORBIDDEN,
			Self::RateLimit(GovernorError::TooManyRequests { .. }) => StatusCode::TOO_MANY_REQUESTS,
			Self::RateLimit(GovernorError::Other { code, .. }) => *code,
			Self::RateLimit(GovernorError::UnableToExtractKey)
			| Self::Database(..)
			| Self::Hash(..)
			| Self::Io(..)
			| Self::Mail(..) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn message(&self) -> Cow<'static, str> {
		match self {
			Self::Validation(errors) => validation_message(errors).into(),
			Self::Json(rejection) => rejection.body_text().into(),
			Self::Query(rejection) => rejection.body_text().into(),
			Self::Path(rejection) => rejection.body_text().into(),
			Self::NotFound => envelope::NOT_FOUND.into(),
			Self::Forbidden => PERMISSION_DENIED.into(),
			Self::RateLimit(GovernorError::TooManyRequests { .. }) => "Request was throttled.".into(),
			_ => envelope::INTERNAL_SERVER_ERROR.into(),
		}
	}
}

impl IntoResponse for AppError {
	fn into_response(self) -> Response<Body> {
		let status = self.status();

		if status.is_server_error() {
			tracing::error!(error = %self, "request failed");
		}

		Envelope::error(status, self.message()).into_response()
	}
}

/// The error returned by route handlers: either one of the route's own
/// errors, or a shared [`AppError`].
#[derive(Debug)]
pub enum RouteError<E> {
	Route(E),
	App(AppError),
}

impl<E> IntoResponse for RouteError<E>
where
	E: ErrorShape,
{
	fn into_response(self) -> Response<Body> {
		match self {
			Self::Route(error) => {
				let status = error.status();

				if status.is_server_error() {
					tracing::error!(%error, "request failed");
				}

				Envelope::error(status, error.message()).into_response()
			}
			Self::App(error) => error.into_response(),
		}
	}
}

/// Error responses are documented once, as the default response.
impl<E> OperationOutput for RouteError<E> {
	type Inner = ();
}

impl<E> From<AppError> for RouteError<E> {
	fn from(error: AppError) -> Self {
		Self::App(error)
	}
}

macro_rules! impl_from_app_error {
	($($ty:ty),* $(,)?) => {
		$(
			impl<E> From<$ty> for RouteError<E> {
				fn from(error: $ty) -> Self {
					Self::App(error.into())
				}
			}
		)*
	};
}

impl_from_app_error!(
	ValidationErrors,
	sqlx::Error,
	argon2::Error,
	std::io::Error,
	mail::Error,
);

/// Flattens validation errors into a single line, `field: message` pairs
/// sorted by field name. Errors of nested (flattened) inputs are inlined
/// and struct-level errors are printed without a field name.
pub fn validation_message(errors: &ValidationErrors) -> String {
	let mut parts = Vec::new();
	collect_messages(errors, &mut parts);

	parts.join(" ")
}

fn collect_messages(errors: &ValidationErrors, parts: &mut Vec<String>) {
	let mut fields = errors.errors().iter().collect::<Vec<_>>();
	fields.sort_by(|a, b| a.0.cmp(b.0));

	for (field, kind) in fields {
		match kind {
			ValidationErrorsKind::Field(errors) => {
				let messages = errors
					.iter()
					.map(|error| {
						error
							.message
							.as_ref()
							.map_or_else(|| error.code.to_string(), ToString::to_string)
					})
					.collect::<Vec<_>>()
					.join(" ");

				if *field == "__all__" {
					parts.push(messages);
				} else {
					parts.push(format!("{field}: {messages}"));
				}
			}
			ValidationErrorsKind::Struct(errors) => collect_messages(errors, parts),
			ValidationErrorsKind::List(items) => {
				for errors in items.values() {
					collect_messages(errors, parts);
				}
			}
		}
	}
}
