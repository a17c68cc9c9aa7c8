use aide::axum::{
	routing::{delete_with, get_with, patch_with, post_with, put_with},
	ApiRouter,
};
use axum::http::StatusCode;
use tower_governor::GovernorLayer;
use uuid::Uuid;

use crate::{envelope, error, media::PhotoError, ratelimit::Limits, AppState};

pub mod account;
pub mod model;
pub mod password;
pub mod route;

/// An error that can occur while managing accounts.
///
/// Note that the messages are presented to the client, so they should not contain
/// sensitive information.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid credentials")]
	InvalidCredentials,
	#[error("Incorrect authentication credentials.")]
	IncorrectCredentials,
	#[error("User with this mail already exists.")]
	EmailTaken,
	#[error("username: A user with that username already exists.")]
	UsernameTaken,
	#[error("Invalid token.")]
	InvalidToken,
	#[error("User does not exist")]
	UserDoesNotExist,
	#[error("Password reset mail is already sent.")]
	ResetAlreadySent,
	#[error("Incorrect password!")]
	IncorrectPassword,
	#[error("profile_photo: {0}")]
	Photo(#[from] PhotoError),
	#[error("{}", envelope::NOT_FOUND)]
	UnknownUser(Uuid),
	#[error("{}", envelope::NOT_FOUND)]
	UnknownIp(Uuid),
}

pub type RouteError = error::RouteError<Error>;

impl From<Error> for RouteError {
	fn from(error: Error) -> Self {
		Self::Route(error)
	}
}

/// The account routes. Routes that check credentials or send mail are
/// additionally limited by `secure` when it is given.
pub fn routes(secure: Option<Limits>) -> ApiRouter<AppState> {
	use account::*;
	use route::*;

	let credentials = ApiRouter::new()
		.api_route("/signup", post_with(signup, signup_docs))
		.api_route("/login", post_with(login, login_docs))
		.api_route(
			"/send-password-reset-email",
			post_with(send_password_reset_email, send_password_reset_email_docs),
		)
		.api_route("/password-reset", post_with(password_reset, password_reset_docs));

	let credentials = match secure {
		Some(config) => credentials.layer(GovernorLayer { config }),
		None => credentials,
	};

	ApiRouter::new()
		.merge(credentials)
		.api_route("/", get_with(list_users, list_users_docs))
		.api_route("/logout", post_with(logout, logout_docs))
		.api_route("/activate/:token", get_with(verify_email, verify_email_docs))
		.api_route(
			"/me",
			get_with(get_me, get_me_docs)
				.patch_with(update_me, update_me_docs)
				.delete_with(delete_me, delete_me_docs),
		)
		.api_route("/me/settings", patch_with(update_settings, update_settings_docs))
		.api_route(
			"/me/photo",
			put_with(put_photo, put_photo_docs).delete_with(delete_photo, delete_photo_docs),
		)
		.api_route("/ips/:id", delete_with(delete_user_ip, delete_user_ip_docs))
		.api_route("/:id", get_with(get_user, get_user_docs))
		.api_route("/:id/ips", get_with(list_user_ips, list_user_ips_docs))
}

impl error::ErrorShape for Error {
	fn status(&self) -> StatusCode {
		match self {
			Self::IncorrectCredentials | Self::IncorrectPassword => StatusCode::UNAUTHORIZED,
			Self::UnknownUser(..) | Self::UnknownIp(..) => StatusCode::NOT_FOUND,
			Self::InvalidCredentials
			| Self::EmailTaken
			| Self::UsernameTaken
			| Self::InvalidToken
			| Self::UserDoesNotExist
			| Self::ResetAlreadySent
			| Self::Photo(..) => StatusCode::BAD_REQUEST,
		}
	}
}

#[cfg(test)]
mod test {
	use axum::http::{header, HeaderName, HeaderValue};

	use crate::test::*;

	const PHOTO: &str = "data:image/png;base64,aGVsbG8=";

	fn bearer(token: &str) -> (HeaderName, HeaderValue) {
		(
			header::AUTHORIZATION,
			HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
		)
	}

	/// Signs up a user and returns the `result` of the response.
	async fn signup(app: &TestApp, email: &str, username: &str) -> serde_json::Value {
		let response = app
			.post("/user/signup")
			.json(&json!({
				"email": email,
				"username": username,
				"password": "hunter2hunter",
				"full_name": "John Smith",
			}))
			.await;

		assert_eq!(response.status_code(), 201);

		response.json::<serde_json::Value>()["result"].clone()
	}

	fn token_of(user: &serde_json::Value) -> String {
		user["token"].as_str().unwrap().to_string()
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_signup_flow(pool: Database) {
		let app = app(pool);

		let user = signup(&app, "john@smith.com", "john").await;

		assert_eq!(user["username"], "john");
		assert_eq!(user["full_name"], "John Smith");
		assert_eq!(user["user_type"], "NORMAL");
		assert_eq!(user["profile_photo"], serde_json::Value::Null);
		assert_eq!(token_of(&user).len(), 40);
		assert!(user.get("password").is_none());

		let mail = app.mailer.last_to("john@smith.com").unwrap();
		assert_eq!(mail.subject, "Welcome, please verify your email address");

		let response = app
			.post("/user/signup")
			.json(&json!({
				"email": "john@smith.com",
				"username": "other",
				"password": "hunter2hunter",
			}))
			.await;

		assert_eq!(response.status_code(), 400);
		assert_eq!(
			response.json::<serde_json::Value>()["message"],
			"User with this mail already exists."
		);

		let response = app
			.post("/user/signup")
			.json(&json!({
				"email": "jane@smith.com",
				"username": "john",
				"password": "hunter2hunter",
			}))
			.await;

		assert_eq!(response.status_code(), 400);
		assert_eq!(
			response.json::<serde_json::Value>()["message"],
			"username: A user with that username already exists."
		);
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_signup_requires_fields(pool: Database) {
		let app = app(pool);

		let response = app
			.post("/user/signup")
			.json(&json!({ "email": "john@smith.com" }))
			.await;

		assert_eq!(response.status_code(), 400);

		let body = response.json::<serde_json::Value>();

		assert_eq!(body["status_code"], 400);
		assert_eq!(body["result"], serde_json::Value::Null);
		assert_eq!(
			body["message"],
			"password: This field is required. username: This field is required."
		);
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_login_flow(pool: Database) {
		let app = app(pool);

		signup(&app, "john@smith.com", "john").await;

		let response = app
			.post("/user/login")
			.json(&json!({ "email": "nobody@smith.com", "password": "hunter2hunter" }))
			.await;

		assert_eq!(response.status_code(), 400);
		assert_eq!(response.json::<serde_json::Value>()["message"], "Invalid credentials");

		let response = app
			.post("/user/login")
			.json(&json!({ "email": "john@smith.com", "password": "wrong" }))
			.await;

		assert_eq!(response.status_code(), 401);
		assert_eq!(
			response.json::<serde_json::Value>()["message"],
			"Incorrect authentication credentials."
		);

		let response = app
			.post("/user/login")
			.add_header(
				HeaderName::from_static("x-forwarded-for"),
				HeaderValue::from_static("203.0.113.7"),
			)
			.json(&json!({ "email": "john@smith.com", "password": "hunter2hunter" }))
			.await;

		assert_eq!(response.status_code(), 200);
		assert!(response
			.header("set-cookie")
			.to_str()
			.unwrap()
			.contains("token="));

		let body = response.json::<serde_json::Value>();

		assert_eq!(body["message"], "Login successful.");
		assert_eq!(body["result"]["is_active"], true);
		assert!(body["result"]["last_login"].is_string());

		let token = token_of(&body["result"]);
		let (name, value) = bearer(&token);
		let response = app.get("/user/me").add_header(name, value).await;

		assert_eq!(response.status_code(), 200);
		assert_eq!(response.json::<serde_json::Value>()["result"]["email"], "john@smith.com");

		let response = app
			.get("/user/me")
			.add_header(
				header::COOKIE,
				HeaderValue::from_str(&format!("token={token}")).unwrap(),
			)
			.await;

		assert_eq!(response.status_code(), 200);
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_logout(pool: Database) {
		let app = app(pool);

		let token = token_of(&signup(&app, "john@smith.com", "john").await);

		let response = app.post("/user/logout").await;
		assert_eq!(response.status_code(), 401);
		assert_eq!(
			response.json::<serde_json::Value>()["message"],
			"Authentication credentials were not provided."
		);

		let (name, value) = bearer(&token);
		let response = app.post("/user/logout").add_header(name, value).await;

		assert_eq!(response.status_code(), 200);
		assert_eq!(response.json::<serde_json::Value>()["result"], json!({}));

		let (name, value) = bearer(&token);
		let response = app.get("/user/me").add_header(name, value).await;

		assert_eq!(response.status_code(), 401);
		assert_eq!(response.json::<serde_json::Value>()["message"], "Invalid token.");
	}

	async fn backdate_tokens(pool: &Database, email: &str) {
		sqlx::query(
			r#"
				UPDATE auth_token SET created_at = now() - interval '2 days'
				WHERE user_id = (SELECT id FROM "user" WHERE email = $1)
			"#,
		)
		.bind(email)
		.execute(pool)
		.await
		.unwrap();
	}

	async fn token_count(pool: &Database) -> i64 {
		sqlx::query_scalar("SELECT count(*) FROM auth_token")
			.fetch_one(pool)
			.await
			.unwrap()
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_expired_token(pool: Database) {
		let app = app(pool.clone());

		let first = token_of(&signup(&app, "john@smith.com", "john").await);
		backdate_tokens(&pool, "john@smith.com").await;

		let response = app
			.post("/user/login")
			.json(&json!({ "email": "john@smith.com", "password": "hunter2hunter" }))
			.await;
		assert_eq!(response.status_code(), 200);

		let second = token_of(&response.json::<serde_json::Value>()["result"]);
		assert_ne!(first, second);
		assert_eq!(token_count(&pool).await, 1);

		let (name, value) = bearer(&first);
		let response = app.get("/user/me").add_header(name, value).await;
		assert_eq!(response.status_code(), 401);
		assert_eq!(response.json::<serde_json::Value>()["message"], "Invalid token.");

		backdate_tokens(&pool, "john@smith.com").await;

		let (name, value) = bearer(&second);
		let response = app.get("/user/me").add_header(name, value).await;
		assert_eq!(response.status_code(), 401);
		assert_eq!(response.json::<serde_json::Value>()["message"], "Token expired.");
		assert_eq!(token_count(&pool).await, 0);
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_inactive_user_is_rejected(pool: Database) {
		let app = app(pool.clone());

		let token = token_of(&signup(&app, "john@smith.com", "john").await);

		sqlx::query(r#"UPDATE "user" SET is_active = FALSE WHERE email = 'john@smith.com'"#)
			.execute(&pool)
			.await
			.unwrap();

		let (name, value) = bearer(&token);
		let response = app.get("/user/me").add_header(name, value).await;
		assert_eq!(response.status_code(), 401);
		assert_eq!(
			response.json::<serde_json::Value>()["message"],
			"User inactive or deleted."
		);
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_verify_email(pool: Database) {
		let app = app(pool);

		signup(&app, "john@smith.com", "john").await;

		let mail = app.mailer.last_to("john@smith.com").unwrap();
		let token = crate::mail::token_from_body(&mail.body).unwrap();

		let response = app.get("/user/activate/not-a-token").await;
		assert_eq!(response.status_code(), 400);
		assert_eq!(response.json::<serde_json::Value>()["message"], "Invalid token.");

		let response = app.get(&format!("/user/activate/{token}")).await;
		assert_eq!(response.status_code(), 200);

		let body = response.json::<serde_json::Value>();
		assert_eq!(body["message"], "Email verified successfully.");
		assert_eq!(body["result"]["is_verified"], true);

		let ghost = app.state.tokens.generate("ghost@smith.com");
		let response = app.get(&format!("/user/activate/{ghost}")).await;
		assert_eq!(response.status_code(), 400);
		assert_eq!(response.json::<serde_json::Value>()["message"], "User does not exist");
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_password_reset_flow(pool: Database) {
		let app = app(pool);

		signup(&app, "john@smith.com", "john").await;

		let response = app
			.post("/user/send-password-reset-email")
			.json(&json!({ "email": "nobody@smith.com" }))
			.await;
		assert_eq!(response.status_code(), 400);
		assert_eq!(response.json::<serde_json::Value>()["message"], "User does not exist");

		let response = app
			.post("/user/send-password-reset-email")
			.json(&json!({ "email": "john@smith.com" }))
			.await;
		assert_eq!(response.status_code(), 200);

		let response = app
			.post("/user/send-password-reset-email")
			.json(&json!({ "email": "john@smith.com" }))
			.await;
		assert_eq!(response.status_code(), 400);
		assert_eq!(
			response.json::<serde_json::Value>()["message"],
			"Password reset mail is already sent."
		);

		let mail = app.mailer.last_to("john@smith.com").unwrap();
		assert_eq!(mail.subject, "Password Reset");
		let token = crate::mail::token_from_body(&mail.body).unwrap();

		// a valid token that was never mailed out
		let response = app
			.post("/user/password-reset")
			.json(&json!({
				"password": "correcthorse",
				"token": app.state.tokens.generate("john@smith.com"),
			}))
			.await;
		assert_eq!(response.status_code(), 400);
		assert_eq!(response.json::<serde_json::Value>()["message"], "Invalid token.");

		let response = app
			.post("/user/password-reset")
			.json(&json!({ "password": "correcthorse", "token": token }))
			.await;
		assert_eq!(response.status_code(), 200);

		// the token can only be used once
		let response = app
			.post("/user/password-reset")
			.json(&json!({ "password": "correcthorse", "token": token }))
			.await;
		assert_eq!(response.status_code(), 400);

		let response = app
			.post("/user/login")
			.json(&json!({ "email": "john@smith.com", "password": "correcthorse" }))
			.await;
		assert_eq!(response.status_code(), 200);
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_password_reset_refuses_deleted_user(pool: Database) {
		let app = app(pool.clone());

		signup(&app, "john@smith.com", "john").await;

		let response = app
			.post("/user/send-password-reset-email")
			.json(&json!({ "email": "john@smith.com" }))
			.await;
		assert_eq!(response.status_code(), 200);

		let mail = app.mailer.last_to("john@smith.com").unwrap();
		let token = crate::mail::token_from_body(&mail.body).unwrap();

		sqlx::query(r#"UPDATE "user" SET is_deleted = TRUE WHERE email = 'john@smith.com'"#)
			.execute(&pool)
			.await
			.unwrap();

		let response = app
			.post("/user/password-reset")
			.json(&json!({ "password": "correcthorse", "token": token }))
			.await;
		assert_eq!(response.status_code(), 400);
		assert_eq!(response.json::<serde_json::Value>()["message"], "Invalid token.");
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_user_permissions(pool: Database) {
		let app = app(pool.clone());

		let john = signup(&app, "john@smith.com", "john").await;
		let jane = signup(&app, "jane@smith.com", "jane").await;
		let john_id = john["id"].as_str().unwrap();
		let jane_id = jane["id"].as_str().unwrap();

		let (name, value) = bearer(&token_of(&john));
		let response = app.get(&format!("/user/{john_id}")).add_header(name, value).await;
		assert_eq!(response.status_code(), 200);
		assert_eq!(
			response.json::<serde_json::Value>()["result"],
			json!({ "id": john_id, "email": "john@smith.com" })
		);

		let (name, value) = bearer(&token_of(&john));
		let response = app.get(&format!("/user/{jane_id}")).add_header(name, value).await;
		assert_eq!(response.status_code(), 403);

		let (name, value) = bearer(&token_of(&john));
		let response = app.get("/user").add_header(name, value).await;
		assert_eq!(response.status_code(), 403);

		sqlx::query(r#"UPDATE "user" SET user_type = 'ADMIN' WHERE email = 'jane@smith.com'"#)
			.execute(&pool)
			.await
			.unwrap();

		let (name, value) = bearer(&token_of(&jane));
		let response = app.get(&format!("/user/{john_id}")).add_header(name, value).await;
		assert_eq!(response.status_code(), 200);

		let (name, value) = bearer(&token_of(&jane));
		let response = app
			.get("/user")
			.add_query_param("limit", 1)
			.add_header(name, value)
			.await;
		assert_eq!(response.status_code(), 200);

		let page = response.json::<serde_json::Value>()["result"].clone();
		assert_eq!(page["count"], 2);
		assert_eq!(page["results"].as_array().unwrap().len(), 1);
		assert_eq!(page["next_offset"], "1");
		assert_eq!(page["previous"], serde_json::Value::Null);

		let (name, value) = bearer(&token_of(&jane));
		let response = app
			.get(&format!("/user/{}", uuid::Uuid::new_v4()))
			.add_header(name, value)
			.await;
		assert_eq!(response.status_code(), 404);
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_user_ips(pool: Database) {
		let app = app(pool);

		let john = signup(&app, "john@smith.com", "john").await;
		let jane = signup(&app, "jane@smith.com", "jane").await;
		let john_id = john["id"].as_str().unwrap();

		for _ in 0..2 {
			let (name, value) = bearer(&token_of(&john));
			app.get("/user/me")
				.add_header(name, value)
				.add_header(
					HeaderName::from_static("x-forwarded-for"),
					HeaderValue::from_static("198.51.100.4"),
				)
				.await;
		}

		let (name, value) = bearer(&token_of(&john));
		let response = app
			.get(&format!("/user/{john_id}/ips"))
			.add_header(name, value)
			.await;
		assert_eq!(response.status_code(), 200);

		let page = response.json::<serde_json::Value>()["result"].clone();
		assert_eq!(page["count"], 1);
		assert_eq!(page["results"][0]["ip_address"], "198.51.100.4");

		let ip_id = page["results"][0]["id"].as_str().unwrap().to_string();

		let (name, value) = bearer(&token_of(&jane));
		let response = app
			.get(&format!("/user/{john_id}/ips"))
			.add_header(name, value)
			.await;
		assert_eq!(response.status_code(), 403);

		let (name, value) = bearer(&token_of(&jane));
		let response = app
			.delete(&format!("/user/ips/{ip_id}"))
			.add_header(name, value)
			.await;
		assert_eq!(response.status_code(), 403);

		let (name, value) = bearer(&token_of(&john));
		let response = app
			.delete(&format!("/user/ips/{ip_id}"))
			.add_header(name, value)
			.await;
		assert_eq!(response.status_code(), 204);

		let (name, value) = bearer(&token_of(&john));
		let response = app
			.delete(&format!("/user/ips/{ip_id}"))
			.add_header(name, value)
			.await;
		assert_eq!(response.status_code(), 404);
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_update_profile(pool: Database) {
		let app = app(pool);

		let token = token_of(&signup(&app, "john@smith.com", "john").await);

		let (name, value) = bearer(&token);
		let response = app
			.patch("/user/me")
			.add_header(name, value)
			.json(&json!({ "city": "Springfield" }))
			.await;

		assert_eq!(response.status_code(), 200);

		let result = response.json::<serde_json::Value>()["result"].clone();
		assert_eq!(result["city"], "Springfield");
		assert_eq!(result["full_name"], "John Smith");

		let (name, value) = bearer(&token);
		let response = app
			.patch("/user/me")
			.add_header(name, value)
			.json(&json!({ "zip_code": "1234567890123456" }))
			.await;

		assert_eq!(response.status_code(), 400);
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_settings(pool: Database) {
		let app = app(pool);

		let token = token_of(&signup(&app, "john@smith.com", "john").await);

		let (name, value) = bearer(&token);
		let response = app
			.patch("/user/me/settings")
			.add_header(name, value)
			.json(&json!({ "old_password": "hunter2hunter" }))
			.await;
		assert_eq!(response.status_code(), 400);
		assert_eq!(
			response.json::<serde_json::Value>()["message"],
			"you need to provide new password!"
		);

		let (name, value) = bearer(&token);
		let response = app
			.patch("/user/me/settings")
			.add_header(name, value)
			.json(&json!({ "old_password": "wrong", "new_password": "correcthorse" }))
			.await;
		assert_eq!(response.status_code(), 401);
		assert_eq!(response.json::<serde_json::Value>()["message"], "Incorrect password!");

		let (name, value) = bearer(&token);
		let response = app
			.patch("/user/me/settings")
			.add_header(name, value)
			.json(&json!({ "old_password": "hunter2hunter", "new_password": "correcthorse" }))
			.await;
		assert_eq!(response.status_code(), 200);

		let (name, value) = bearer(&token);
		let response = app
			.patch("/user/me/settings")
			.add_header(name, value)
			.json(&json!({
				"account_delete_password": "correcthorse",
				"reason_to_delete": "moving on",
			}))
			.await;
		assert_eq!(response.status_code(), 200);
		assert_eq!(response.json::<serde_json::Value>()["result"]["is_deleted"], true);

		let (name, value) = bearer(&token);
		let response = app.get("/user/me").add_header(name, value).await;
		assert_eq!(response.status_code(), 401);

		let response = app
			.post("/user/login")
			.json(&json!({ "email": "john@smith.com", "password": "correcthorse" }))
			.await;
		assert_eq!(response.status_code(), 400);
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_profile_photo(pool: Database) {
		let app = app(pool);

		let token = token_of(&signup(&app, "john@smith.com", "john").await);

		let (name, value) = bearer(&token);
		let response = app
			.put("/user/me/photo")
			.add_header(name, value)
			.json(&json!({ "profile_photo": "not a data url" }))
			.await;
		assert_eq!(response.status_code(), 400);

		let (name, value) = bearer(&token);
		let response = app
			.put("/user/me/photo")
			.add_header(name, value)
			.json(&json!({ "profile_photo": PHOTO }))
			.await;
		assert_eq!(response.status_code(), 200);

		let url = response.json::<serde_json::Value>()["result"]["profile_photo"]
			.as_str()
			.unwrap()
			.to_string();
		assert!(url.starts_with("http://testserver/media/profile_photos/"));
		assert!(url.ends_with(".png"));

		let relative = url.trim_start_matches("http://testserver/media/");
		let stored = app.media_root().join(relative);
		assert_eq!(std::fs::read(&stored).unwrap(), b"hello");

		let (name, value) = bearer(&token);
		let response = app.delete("/user/me/photo").add_header(name, value).await;
		assert_eq!(response.status_code(), 204);
		assert!(!stored.exists());

		let (name, value) = bearer(&token);
		let response = app.get("/user/me").add_header(name, value).await;
		assert_eq!(
			response.json::<serde_json::Value>()["result"]["profile_photo"],
			serde_json::Value::Null
		);
	}

	#[sqlx::test]
	#[ignore = "requires a running Postgres instance (DATABASE_URL)"]
	async fn test_delete_me(pool: Database) {
		let app = app(pool);

		let token = token_of(&signup(&app, "john@smith.com", "john").await);

		let (name, value) = bearer(&token);
		let response = app.delete("/user/me").add_header(name, value).await;
		assert_eq!(response.status_code(), 204);

		let response = app
			.post("/user/login")
			.json(&json!({ "email": "john@smith.com", "password": "hunter2hunter" }))
			.await;
		assert_eq!(response.status_code(), 400);
	}
}
