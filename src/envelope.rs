use std::{any::Any, borrow::Cow};

use aide::{
	gen::GenContext,
	openapi::{Operation, Response as ApiResponse},
	OperationOutput,
};
use axum::{
	body::Body,
	http::{Response, StatusCode},
	response::IntoResponse,
};
use schemars::JsonSchema;
use serde::Serialize;

pub const SUCCESS: &str = "success";
pub const NOT_FOUND: &str = "Not found!";
pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error!";

/// The uniform wrapper around every response body.
///
/// `status_code` mirrors the HTTP status of the response, so clients that
/// only look at the body still see it.
#[derive(Debug, Serialize, JsonSchema)]
pub struct Envelope<T> {
	pub status_code: u16,
	pub message: Cow<'static, str>,
	pub result: T,
}

/// An empty object, for responses that carry no data.
#[derive(Debug, Default, Serialize, JsonSchema)]
pub struct Empty {}

impl<T> Envelope<T> {
	pub fn new(status: StatusCode, message: impl Into<Cow<'static, str>>, result: T) -> Self {
		Self {
			status_code: status.as_u16(),
			message: message.into(),
			result,
		}
	}

	pub fn success(result: T) -> Self {
		Self::new(StatusCode::OK, SUCCESS, result)
	}

	pub fn created(result: T) -> Self {
		Self::new(StatusCode::CREATED, SUCCESS, result)
	}

	pub fn status(&self) -> StatusCode {
		StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK)
	}
}

impl Envelope<()> {
	/// An error envelope, its `result` is always `null`.
	pub fn error(status: StatusCode, message: impl Into<Cow<'static, str>>) -> Self {
		Self::new(status, message, ())
	}
}

impl<T> IntoResponse for Envelope<T>
where
	T: Serialize,
{
	fn into_response(self) -> Response<Body> {
		(self.status(), axum::Json(self)).into_response()
	}
}

impl<T> OperationOutput for Envelope<T>
where
	T: Serialize + JsonSchema,
{
	type Inner = Self;

	fn operation_response(ctx: &mut GenContext, operation: &mut Operation) -> Option<ApiResponse> {
		axum::Json::<Self>::operation_response(ctx, operation)
	}

	fn inferred_responses(
		ctx: &mut GenContext,
		operation: &mut Operation,
	) -> Vec<(Option<u16>, ApiResponse)> {
		axum::Json::<Self>::inferred_responses(ctx, operation)
	}
}

/// Fallback for routes that do not exist.
pub async fn not_found() -> Envelope<()> {
	Envelope::error(StatusCode::NOT_FOUND, NOT_FOUND)
}

/// Renders a panic inside a handler as the 500 envelope.
#[allow(clippy::needless_pass_by_value)]
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
	let detail = panic
		.downcast_ref::<String>()
		.map(String::as_str)
		.or_else(|| panic.downcast_ref::<&str>().copied())
		.unwrap_or("unknown panic");

	tracing::error!(detail, "handler panicked");

	Envelope::error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR).into_response()
}

#[cfg(test)]
mod test {
	use axum::http::StatusCode;
	use serde_json::json;

	use super::*;

	#[test]
	fn test_success_shape() {
		let envelope = Envelope::success(json!({ "id": 1 }));

		assert_eq!(
			serde_json::to_value(&envelope).unwrap(),
			json!({ "status_code": 200, "message": "success", "result": { "id": 1 } })
		);
	}

	#[test]
	fn test_error_result_is_null() {
		let envelope = Envelope::error(StatusCode::NOT_FOUND, NOT_FOUND);

		assert_eq!(
			serde_json::to_value(&envelope).unwrap(),
			json!({ "status_code": 404, "message": "Not found!", "result": null })
		);
	}

	#[test]
	fn test_empty_is_object() {
		let envelope = Envelope::created(Empty {});

		assert_eq!(envelope.status(), StatusCode::CREATED);
		assert_eq!(serde_json::to_value(&envelope).unwrap()["result"], json!({}));
	}

	#[test]
	fn test_panic_response_status() {
		let response = panic_response(Box::new("boom"));

		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
	}
}
