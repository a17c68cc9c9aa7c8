use aide::axum::IntoApiResponse;
use axum::{
	extract::State,
	http::{header, StatusCode},
};
use chrono::Utc;
use macros::route;
use uuid::Uuid;

use crate::{
	cookie,
	envelope::{Empty, Envelope},
	error::AppError,
	extract::{Auth, ClientIp, Json, Path},
	media,
	openapi::tag,
	AppState,
};

use super::{
	model,
	password::{hash_password, verify_password},
	Error, RouteError,
};

/// Maps unique constraint violations on the user table to their client errors.
fn map_user_conflict(error: sqlx::Error) -> RouteError {
	match error {
		sqlx::Error::Database(ref d) => match d.constraint() {
			Some("user_email_key") => Error::EmailTaken.into(),
			Some("user_username_key") => Error::UsernameTaken.into(),
			_ => RouteError::from(error),
		},
		error => RouteError::from(error),
	}
}

/// The name used to greet a user in mails.
fn display_name(user: &model::User) -> &str {
	if user.profile.full_name.is_empty() {
		&user.username
	} else {
		&user.profile.full_name
	}
}

/// Sign up
/// Creates a new account and sends a mail to verify its email address.
/// The response contains the token to authenticate with.
#[route(tag = tag::USER, response(status = 201, description = "Signed up successfully.", shape = "Envelope<model::SignUpResult>"))]
pub async fn signup(
	State(state): State<AppState>,
	Json(input): Json<model::SignUpInput>,
) -> Result<Envelope<model::SignUpResult>, RouteError> {
	let email = input.email.unwrap_or_default();
	let username = input.username.unwrap_or_default();
	let password = input.password.unwrap_or_default();
	let profile = input.profile;

	let user_id = Uuid::new_v4();
	let hashed = hash_password(&state.hasher, &password, &user_id)?;

	let photo = input
		.profile_photo
		.as_deref()
		.map(|data| media::profile_photo(data, user_id, Utc::now()))
		.transpose()
		.map_err(Error::from)?;

	let mut tx = state.database.begin().await?;

	if model::User::by_email(&mut *tx, &email).await?.is_some() {
		return Err(Error::EmailTaken.into());
	}

	let user = sqlx::query_as::<_, model::User>(
		r#"
			INSERT INTO "user" (
				id, email, username, password, profile_photo,
				full_name, street, state, city, zip_code, contact_no
			)
			VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
			RETURNING *
		"#,
	)
	.bind(user_id)
	.bind(&email)
	.bind(&username)
	.bind(&hashed[..])
	.bind(photo.as_ref().map(|upload| upload.path.as_str()))
	.bind(&profile.full_name)
	.bind(&profile.street)
	.bind(&profile.state)
	.bind(&profile.city)
	.bind(&profile.zip_code)
	.bind(&profile.contact_no)
	.fetch_one(&mut *tx)
	.await
	.map_err(map_user_conflict)?;

	let token = model::AuthToken::get_or_create(&mut tx, user.id, state.config.token_lifetime).await?;

	// the photo is written first and removed again if the commit fails
	state
		.media
		.save_with(photo.as_ref(), async move {
			tx.commit().await.map_err(AppError::from)
		})
		.await?;

	let mail = state.templates.verification(
		&user.email,
		display_name(&user),
		&state.tokens.generate(&user.email),
	);

	if let Err(error) = state.mailer.send(mail).await {
		tracing::warn!(%error, user = %user.id, "failed to send verification mail");
	}

	tracing::info!(user = %user.id, "signed up");

	let photo_url = state.photo_url(&user);

	Ok(Envelope::created(model::SignUpResult::new(
		user, token.key, photo_url,
	)))
}

/// Log in
/// Logs in to an account with its email and password, returning the account
/// with a token and setting the token cookie.
#[route(tag = tag::USER, response(status = 200, description = "Logged in successfully.", shape = "Envelope<model::Account>"))]
pub async fn login(
	State(state): State<AppState>,
	ClientIp(ip): ClientIp,
	Json(input): Json<model::LoginInput>,
) -> Result<impl IntoApiResponse, RouteError> {
	let (email, password) = input.into_parts();

	let user = model::User::by_email(&state.database, &email)
		.await?
		.filter(|user| !user.is_deleted)
		.ok_or(Error::InvalidCredentials)?;

	if !verify_password(&state.hasher, &password, &user.id, &user.password)? {
		return Err(Error::IncorrectCredentials.into());
	}

	let mut tx = state.database.begin().await?;

	let user = sqlx::query_as::<_, model::User>(
		r#"
			UPDATE "user"
			SET is_active = TRUE, last_login = now(), updated_at = now()
			WHERE id = $1
			RETURNING *
		"#,
	)
	.bind(user.id)
	.fetch_one(&mut *tx)
	.await?;

	let token = model::AuthToken::get_or_create(&mut tx, user.id, state.config.token_lifetime).await?;

	if let Some(ip) = ip {
		model::UserIp::record(&mut *tx, user.id, ip).await?;
	}

	tx.commit().await?;

	let cookie = cookie::create_cookie(&token.key, state.config.token_lifetime);
	let photo_url = state.photo_url(&user);

	Ok((
		[(header::SET_COOKIE, cookie.to_string())],
		Envelope::new(
			StatusCode::OK,
			"Login successful.",
			model::Account::new(user, Some(token.key), photo_url),
		),
	))
}

/// Log out
/// Invalidates the token used to authenticate and clears the token cookie.
#[route(tag = tag::USER, response(status = 200, description = "Logged out successfully.", shape = "Envelope<Empty>"))]
pub async fn logout(
	State(state): State<AppState>,
	auth: Auth,
) -> Result<impl IntoApiResponse, RouteError> {
	sqlx::query("DELETE FROM auth_token WHERE key = $1")
		.bind(&auth.token.key)
		.execute(&state.database)
		.await?;

	tracing::info!(user = %auth.user.id, source = ?auth.source, "logged out");

	Ok((
		[(header::SET_COOKIE, cookie::clear_cookie().to_string())],
		Envelope::success(Empty::default()),
	))
}

/// Verify email
/// Marks the account the verification token was issued for as verified and active.
#[route(tag = tag::USER, response(status = 200, description = "Email verified.", shape = "Envelope<model::Account>"))]
pub async fn verify_email(
	State(state): State<AppState>,
	Path(input): Path<model::TokenInput>,
) -> Result<Envelope<model::Account>, RouteError> {
	let email = state
		.tokens
		.value(&input.token)
		.map_err(|_| Error::InvalidToken)?;

	let mut tx = state.database.begin().await?;

	let user = sqlx::query_as::<_, model::User>(
		r#"
			UPDATE "user"
			SET is_active = TRUE, is_verified = TRUE, updated_at = now()
			WHERE email = $1
			RETURNING *
		"#,
	)
	.bind(&email)
	.fetch_optional(&mut *tx)
	.await?
	.ok_or(Error::UserDoesNotExist)?;

	let token = model::AuthToken::get_or_create(&mut tx, user.id, state.config.token_lifetime).await?;

	tx.commit().await?;

	let photo_url = state.photo_url(&user);

	Ok(Envelope::new(
		StatusCode::OK,
		"Email verified successfully.",
		model::Account::new(user, Some(token.key), photo_url),
	))
}

/// Request password reset
/// Mails a password reset link to the account with the given email.
/// Only one reset can be pending per account until its token expires.
#[route(tag = tag::USER, response(status = 200, description = "Password reset mail sent.", shape = "Envelope<Empty>"))]
pub async fn send_password_reset_email(
	State(state): State<AppState>,
	Json(input): Json<model::PasswordResetEmailInput>,
) -> Result<Envelope<Empty>, RouteError> {
	let email = input.email.unwrap_or_default();

	let user = model::User::by_email(&state.database, &email)
		.await?
		.filter(|user| !user.is_deleted)
		.ok_or(Error::UserDoesNotExist)?;

	let mut tx = state.database.begin().await?;

	let pending = sqlx::query_as::<_, model::PasswordResetWhitelist>(
		"SELECT * FROM password_reset_whitelist WHERE email = $1 FOR UPDATE",
	)
	.bind(&user.email)
	.fetch_optional(&mut *tx)
	.await?;

	if let Some(pending) = pending {
		if state.tokens.value(&pending.token).is_ok() {
			return Err(Error::ResetAlreadySent.into());
		}

		sqlx::query("DELETE FROM password_reset_whitelist WHERE id = $1")
			.bind(pending.id)
			.execute(&mut *tx)
			.await?;
	}

	let token = state.tokens.generate(&user.email);

	sqlx::query("INSERT INTO password_reset_whitelist (email, token) VALUES ($1, $2)")
		.bind(&user.email)
		.bind(&token)
		.execute(&mut *tx)
		.await
		.map_err(|error| match error {
			sqlx::Error::Database(ref d) if d.is_unique_violation() => Error::ResetAlreadySent.into(),
			error => RouteError::from(error),
		})?;

	state
		.mailer
		.send(state.templates.password_reset(&user.email, display_name(&user), &token))
		.await?;

	tx.commit().await?;

	tracing::info!(user = %user.id, "password reset mail sent");

	Ok(Envelope::success(Empty::default()))
}

/// Reset password
/// Sets a new password using the token from a password reset mail. The token
/// can only be used once, and every login token of the account is revoked.
#[route(tag = tag::USER, response(status = 200, description = "Password changed.", shape = "Envelope<Empty>"))]
pub async fn password_reset(
	State(state): State<AppState>,
	Json(input): Json<model::PasswordResetInput>,
) -> Result<Envelope<Empty>, RouteError> {
	let (password, token) = input.into_parts();

	let mut tx = state.database.begin().await?;

	let whitelisted = sqlx::query_as::<_, model::PasswordResetWhitelist>(
		"DELETE FROM password_reset_whitelist WHERE token = $1 RETURNING *",
	)
	.bind(&token)
	.fetch_optional(&mut *tx)
	.await?
	.ok_or(Error::InvalidToken)?;

	let email = state
		.tokens
		.value(&token)
		.map_err(|_| Error::InvalidToken)?;

	if email != whitelisted.email {
		return Err(Error::InvalidToken.into());
	}

	let user = model::User::by_email(&mut *tx, &email)
		.await?
		.filter(|user| !user.is_deleted)
		.ok_or(Error::InvalidToken)?;

	let hashed = hash_password(&state.hasher, &password, &user.id)?;

	sqlx::query(r#"UPDATE "user" SET password = $1, updated_at = now() WHERE id = $2"#)
		.bind(&hashed[..])
		.bind(user.id)
		.execute(&mut *tx)
		.await?;

	sqlx::query("DELETE FROM auth_token WHERE user_id = $1")
		.bind(user.id)
		.execute(&mut *tx)
		.await?;

	tx.commit().await?;

	tracing::info!(user = %user.id, "password reset");

	Ok(Envelope::success(Empty::default()))
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn test_display_name_falls_back_to_username() {
		let mut user = crate::test::user(model::UserType::Normal);

		assert_eq!(display_name(&user), "john");

		user.profile.full_name = "John Smith".into();
		assert_eq!(display_name(&user), "John Smith");
	}
}
