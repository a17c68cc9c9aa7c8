use aide::{
	openapi::{ApiKeyLocation, SecurityScheme, Tag},
	transform::TransformOpenApi,
};
use axum::http::StatusCode;

use crate::{
	cookie,
	envelope::{self, Envelope},
};

pub const SECURITY_SCHEME_BEARER: &str = "Bearer";
pub const SECURITY_SCHEME_COOKIE: &str = "Cookie";

pub mod tag {
	pub const USER: &str = "User";
}

pub fn docs(api: TransformOpenApi) -> TransformOpenApi {
	api.title("Accounts API")
		.summary("User accounts: registration, login, verification and password resets")
		.description(include_str!("../README.md"))
		.tag(Tag {
			name: tag::USER.into(),
			description: Some("User accounts and profiles".into()),
			..Default::default()
		})
		.security_scheme(
			SECURITY_SCHEME_BEARER,
			SecurityScheme::Http {
				scheme: "bearer".into(),
				bearer_format: None,
				description: Some("A login token, sent as `Authorization: Bearer <token>`".into()),
				extensions: Default::default(),
			},
		)
		.security_scheme(
			SECURITY_SCHEME_COOKIE,
			SecurityScheme::ApiKey {
				location: ApiKeyLocation::Cookie,
				name: cookie::COOKIE_NAME.into(),
				description: Some("The login token cookie set when logging in".into()),
				extensions: Default::default(),
			},
		)
		.default_response_with::<Envelope<()>, _>(|res| {
			res.example(Envelope::error(
				StatusCode::NOT_FOUND,
				envelope::NOT_FOUND,
			))
		})
}
