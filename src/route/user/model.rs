pub use crate::route::model::{IdInput, LimitOffset, Page};

use chrono::{DateTime, Utc};
use macros::model;
use rand::{rngs::OsRng, RngCore};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Letters, digits and `@.+-_`, like most account systems allow.
fn validate_username(username: &str) -> Result<(), ValidationError> {
	if username
		.chars()
		.any(|c| !(c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_')))
	{
		return Err(ValidationError::new("username").with_message(
			"Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters."
				.into(),
		));
	}

	Ok(())
}

#[derive(Debug, thiserror::Error)]
#[error("unknown user type {0:?}")]
pub struct UnknownUserType(String);

/// The role of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserType {
	Admin,
	#[default]
	Normal,
}

impl UserType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Admin => "ADMIN",
			Self::Normal => "NORMAL",
		}
	}
}

impl TryFrom<String> for UserType {
	type Error = UnknownUserType;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		match value.as_str() {
			"ADMIN" => Ok(Self::Admin),
			"NORMAL" => Ok(Self::Normal),
			_ => Err(UnknownUserType(value)),
		}
	}
}

/// The editable profile details of a user.
#[model]
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, Validate, sqlx::FromRow)]
pub struct Profile {
	/// The user's full name.
	#[validate(length(max = 180))]
	#[serde(default)]
	pub full_name: String,
	#[validate(length(max = 100))]
	#[serde(default)]
	pub street: String,
	#[validate(length(max = 50))]
	#[serde(default)]
	pub state: String,
	#[validate(length(max = 50))]
	#[serde(default)]
	pub city: String,
	#[validate(length(max = 15))]
	#[serde(default)]
	pub zip_code: String,
	/// A phone number.
	#[validate(length(max = 20))]
	#[serde(default)]
	pub contact_no: String,
}

/// A single user, as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
	pub id: Uuid,
	pub username: String,
	/// The email address, used for logging in, verification and password resets.
	pub email: String,
	/// Argon2 hash salted with `id`.
	pub password: Vec<u8>,
	#[sqlx(try_from = "String")]
	pub user_type: UserType,
	pub is_verified: bool,
	pub is_active: bool,
	pub is_staff: bool,
	pub is_superuser: bool,
	#[sqlx(flatten)]
	pub profile: Profile,
	/// Path of the profile photo, relative to the media root.
	pub profile_photo: Option<String>,
	pub deletion_reason: Option<String>,
	pub last_login: Option<DateTime<Utc>>,
	pub date_joined: DateTime<Utc>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub is_deleted: bool,
	pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
	pub async fn by_id<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
		sqlx::query_as::<_, Self>(r#"SELECT * FROM "user" WHERE id = $1"#)
			.bind(id)
			.fetch_optional(executor)
			.await
	}

	pub async fn by_email<'e>(
		executor: impl PgExecutor<'e>,
		email: &str,
	) -> Result<Option<Self>, sqlx::Error> {
		sqlx::query_as::<_, Self>(r#"SELECT * FROM "user" WHERE email = $1"#)
			.bind(email)
			.fetch_optional(executor)
			.await
	}
}

/// A bearer token used to authenticate requests, one per user.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthToken {
	pub key: String,
	pub user_id: Uuid,
	pub created_at: DateTime<Utc>,
}

impl AuthToken {
	/// Generates a new 40 character hex key.
	pub fn generate_key() -> String {
		let mut bytes = [0u8; 20];
		OsRng.fill_bytes(&mut bytes);

		bytes.iter().map(|byte| format!("{byte:02x}")).collect()
	}

	/// Time left before the token expires. Negative once it has expired.
	pub fn expires_in(&self, lifetime: chrono::Duration, now: DateTime<Utc>) -> chrono::Duration {
		lifetime - (now - self.created_at)
	}

	pub fn is_expired(&self, lifetime: chrono::Duration, now: DateTime<Utc>) -> bool {
		self.expires_in(lifetime, now) < chrono::Duration::zero()
	}

	/// Returns the user's token, creating one if there is none and
	/// replacing it if it has expired.
	pub async fn get_or_create(
		conn: &mut PgConnection,
		user_id: Uuid,
		lifetime: chrono::Duration,
	) -> Result<Self, sqlx::Error> {
		let existing = sqlx::query_as::<_, Self>("SELECT * FROM auth_token WHERE user_id = $1")
			.bind(user_id)
			.fetch_optional(&mut *conn)
			.await?;

		match existing {
			Some(token) if !token.is_expired(lifetime, Utc::now()) => return Ok(token),
			Some(token) => {
				sqlx::query("DELETE FROM auth_token WHERE key = $1")
					.bind(&token.key)
					.execute(&mut *conn)
					.await?;
			}
			None => {}
		}

		let created = sqlx::query_as::<_, Self>(
			r#"
				INSERT INTO auth_token (key, user_id) VALUES ($1, $2)
				ON CONFLICT (user_id) DO NOTHING
				RETURNING *
			"#,
		)
		.bind(Self::generate_key())
		.bind(user_id)
		.fetch_optional(&mut *conn)
		.await?;

		match created {
			Some(token) => Ok(token),
			// another request created one first
			None => {
				sqlx::query_as::<_, Self>("SELECT * FROM auth_token WHERE user_id = $1")
					.bind(user_id)
					.fetch_one(&mut *conn)
					.await
			}
		}
	}
}

/// An address a user has made authenticated requests from.
#[derive(Debug, Serialize, JsonSchema, sqlx::FromRow)]
pub struct UserIp {
	pub id: Uuid,
	#[serde(skip)]
	pub user_id: Uuid,
	pub ip_address: String,
	/// When the address was first seen.
	pub created_at: DateTime<Utc>,
}

impl UserIp {
	/// Records that `user_id` was seen at `ip`. Already known addresses are left untouched.
	pub async fn record<'e>(
		executor: impl PgExecutor<'e>,
		user_id: Uuid,
		ip: std::net::IpAddr,
	) -> Result<(), sqlx::Error> {
		sqlx::query(
			r#"
				INSERT INTO user_ip (user_id, ip_address) VALUES ($1, $2)
				ON CONFLICT (user_id, ip_address) DO NOTHING
			"#,
		)
		.bind(user_id)
		.bind(ip.to_string())
		.execute(executor)
		.await?;

		Ok(())
	}
}

/// A password reset that has been mailed out and not used yet.
#[derive(Debug, sqlx::FromRow)]
pub struct PasswordResetWhitelist {
	pub id: Uuid,
	pub email: String,
	pub token: String,
}

/// The public part of a user.
#[derive(Debug, Serialize, JsonSchema, sqlx::FromRow)]
pub struct UserSummary {
	pub id: Uuid,
	pub email: String,
}

/// Everything a user may see about their own account.
#[derive(Debug, Serialize, JsonSchema)]
pub struct Account {
	pub id: Uuid,
	pub username: String,
	pub email: String,
	pub user_type: UserType,
	#[serde(flatten)]
	pub profile: Profile,
	pub is_verified: bool,
	pub is_active: bool,
	pub is_staff: bool,
	pub is_superuser: bool,
	pub last_login: Option<DateTime<Utc>>,
	pub date_joined: DateTime<Utc>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub is_deleted: bool,
	pub deleted_at: Option<DateTime<Utc>>,
	/// The bearer token to authenticate with.
	pub token: Option<String>,
	/// Public url of the profile photo.
	pub profile_photo: Option<String>,
}

impl Account {
	pub fn new(user: User, token: Option<String>, profile_photo: Option<String>) -> Self {
		Self {
			id: user.id,
			username: user.username,
			email: user.email,
			user_type: user.user_type,
			profile: user.profile,
			is_verified: user.is_verified,
			is_active: user.is_active,
			is_staff: user.is_staff,
			is_superuser: user.is_superuser,
			last_login: user.last_login,
			date_joined: user.date_joined,
			created_at: user.created_at,
			updated_at: user.updated_at,
			is_deleted: user.is_deleted,
			deleted_at: user.deleted_at,
			token,
			profile_photo,
		}
	}
}

/// The account as returned right after signing up.
#[derive(Debug, Serialize, JsonSchema)]
pub struct SignUpResult {
	pub id: Uuid,
	pub username: String,
	pub email: String,
	pub user_type: UserType,
	#[serde(flatten)]
	pub profile: Profile,
	pub token: String,
	pub profile_photo: Option<String>,
}

impl SignUpResult {
	pub fn new(user: User, token: String, profile_photo: Option<String>) -> Self {
		Self {
			id: user.id,
			username: user.username,
			email: user.email,
			user_type: user.user_type,
			profile: user.profile,
			token,
			profile_photo,
		}
	}
}

#[derive(Deserialize, Validate, JsonSchema)]
pub struct SignUpInput {
	#[validate(
		required(message = "This field is required."),
		email(message = "Enter a valid email address.")
	)]
	pub email: Option<String>,
	/// The username that is displayed to the public.
	#[validate(
		required(message = "This field is required."),
		length(min = 1, max = 150),
		custom(function = "validate_username")
	)]
	pub username: Option<String>,
	#[validate(
		required(message = "This field is required."),
		length(min = 1, max = 128)
	)]
	pub password: Option<String>,
	/// A `data:<mime>;base64,<data>` encoded image.
	pub profile_photo: Option<String>,
	#[serde(flatten)]
	#[validate(nested)]
	pub profile: CreateProfile,
}

#[derive(Deserialize, Validate, JsonSchema)]
pub struct LoginInput {
	#[validate(required(message = "This field is required."))]
	pub email: Option<String>,
	#[validate(required(message = "This field is required."))]
	pub password: Option<String>,
}

impl LoginInput {
	/// Splits a validated input into email and password.
	pub fn into_parts(self) -> (String, String) {
		(
			self.email.unwrap_or_default(),
			self.password.unwrap_or_default(),
		)
	}
}

#[derive(Deserialize, Validate, JsonSchema)]
pub struct PasswordResetEmailInput {
	#[validate(
		required(message = "This field is required."),
		email(message = "Enter a valid email address.")
	)]
	pub email: Option<String>,
}

#[derive(Deserialize, Validate, JsonSchema)]
pub struct PasswordResetInput {
	/// The new password.
	#[validate(
		required(message = "This field is required."),
		length(min = 1, max = 128)
	)]
	pub password: Option<String>,
	/// The token from the password reset mail.
	#[validate(required(message = "This field is required."))]
	pub token: Option<String>,
}

impl PasswordResetInput {
	pub fn into_parts(self) -> (String, String) {
		(
			self.password.unwrap_or_default(),
			self.token.unwrap_or_default(),
		)
	}
}

fn validate_settings(settings: &SettingsInput) -> Result<(), ValidationError> {
	let message = match (
		&settings.old_password,
		&settings.new_password,
		&settings.account_delete_password,
		&settings.reason_to_delete,
	) {
		(Some(_), None, ..) => "you need to provide new password!",
		(None, Some(_), ..) => "you need to provide old password!",
		(.., Some(_), None) => "you need to provide the reason of account deletion!",
		_ => return Ok(()),
	};

	Err(ValidationError::new("settings").with_message(message.into()))
}

/// Account settings. Passwords are only changed when both the old and the
/// new password are given; the account is only deleted when its password
/// and a reason are given.
#[derive(Deserialize, Validate, JsonSchema)]
#[validate(schema(function = "validate_settings"))]
pub struct SettingsInput {
	pub old_password: Option<String>,
	#[validate(length(min = 1, max = 128))]
	pub new_password: Option<String>,
	pub account_delete_password: Option<String>,
	#[validate(length(max = 500))]
	pub reason_to_delete: Option<String>,
}

#[derive(Deserialize, Validate, JsonSchema)]
pub struct PhotoInput {
	/// A `data:<mime>;base64,<data>` encoded image.
	#[validate(required(message = "This field is required."))]
	pub profile_photo: Option<String>,
}

#[derive(Deserialize, Validate, JsonSchema)]
pub struct TokenInput {
	pub token: String,
}

#[derive(Serialize, JsonSchema)]
pub struct PhotoResult {
	pub profile_photo: Option<String>,
}
