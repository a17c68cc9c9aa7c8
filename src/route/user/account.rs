use aide::axum::IntoApiResponse;
use axum::{
	extract::State,
	http::{header, StatusCode},
	response::IntoResponse,
};
use chrono::Utc;
use macros::route;

use crate::{
	cookie,
	envelope::Envelope,
	error::AppError,
	extract::{Admin, Auth, Json, Path, Query},
	media,
	openapi::tag,
	permission::check_object_permission,
	AppState, Database,
};

use super::{
	model,
	password::{hash_password, verify_password},
	Error, RouteError,
};

/// Get own account
/// Returns the authenticated account, including its token.
#[route(tag = tag::USER)]
pub async fn get_me(State(state): State<AppState>, auth: Auth) -> Envelope<model::Account> {
	let photo_url = state.photo_url(&auth.user);

	Envelope::success(model::Account::new(
		auth.user,
		Some(auth.token.key),
		photo_url,
	))
}

/// Update own profile
/// Updates the given profile fields of the authenticated account, leaving the others untouched.
#[route(tag = tag::USER)]
pub async fn update_me(
	State(state): State<AppState>,
	auth: Auth,
	Json(input): Json<model::UpdateProfile>,
) -> Result<Envelope<model::Account>, RouteError> {
	let user = sqlx::query_as::<_, model::User>(
		r#"
			UPDATE "user"
			SET
				full_name = COALESCE($1, full_name),
				street = COALESCE($2, street),
				state = COALESCE($3, state),
				city = COALESCE($4, city),
				zip_code = COALESCE($5, zip_code),
				contact_no = COALESCE($6, contact_no),
				updated_at = now()
			WHERE id = $7
			RETURNING *
		"#,
	)
	.bind(input.full_name)
	.bind(input.street)
	.bind(input.state)
	.bind(input.city)
	.bind(input.zip_code)
	.bind(input.contact_no)
	.bind(auth.user.id)
	.fetch_one(&state.database)
	.await?;

	let photo_url = state.photo_url(&user);

	Ok(Envelope::success(model::Account::new(
		user,
		Some(auth.token.key),
		photo_url,
	)))
}

/// Delete own account
/// Deletes the authenticated account, its profile photo and related content. This action is irreversible.
#[route(tag = tag::USER, response(status = 204, description = "Account deleted."))]
pub async fn delete_me(
	State(state): State<AppState>,
	auth: Auth,
) -> Result<impl IntoApiResponse, RouteError> {
	if let Some(path) = &auth.user.profile_photo {
		state.media.delete(path).await?;
	}

	sqlx::query(r#"DELETE FROM "user" WHERE id = $1"#)
		.bind(auth.user.id)
		.execute(&state.database)
		.await?;

	tracing::info!(user = %auth.user.id, "account deleted");

	Ok((
		[(header::SET_COOKIE, cookie::clear_cookie().to_string())],
		StatusCode::NO_CONTENT,
	))
}

/// Update account settings
/// Changes the password when both the old and the new password are given, and
/// deactivates the account when its password and a reason for leaving are given.
#[route(tag = tag::USER, response(status = 200, description = "Settings updated.", shape = "Envelope<model::Account>"))]
pub async fn update_settings(
	State(state): State<AppState>,
	auth: Auth,
	Json(input): Json<model::SettingsInput>,
) -> Result<impl IntoApiResponse, RouteError> {
	let user = auth.user;
	let mut tx = state.database.begin().await?;

	if let (Some(old), Some(new)) = (&input.old_password, &input.new_password) {
		if !verify_password(&state.hasher, old, &user.id, &user.password)? {
			return Err(Error::IncorrectPassword.into());
		}

		let hashed = hash_password(&state.hasher, new, &user.id)?;

		sqlx::query(r#"UPDATE "user" SET password = $1, updated_at = now() WHERE id = $2"#)
			.bind(&hashed[..])
			.bind(user.id)
			.execute(&mut *tx)
			.await?;
	}

	let deleted = match (&input.account_delete_password, &input.reason_to_delete) {
		(Some(password), Some(reason)) => {
			if !verify_password(&state.hasher, password, &user.id, &user.password)? {
				return Err(Error::IncorrectPassword.into());
			}

			sqlx::query(
				r#"
					UPDATE "user"
					SET
						is_deleted = TRUE,
						deleted_at = now(),
						is_active = FALSE,
						deletion_reason = $1,
						updated_at = now()
					WHERE id = $2
				"#,
			)
			.bind(reason)
			.bind(user.id)
			.execute(&mut *tx)
			.await?;

			sqlx::query("DELETE FROM auth_token WHERE user_id = $1")
				.bind(user.id)
				.execute(&mut *tx)
				.await?;

			tracing::info!(user = %user.id, "account deactivated");

			true
		}
		_ => false,
	};

	let user = model::User::by_id(&mut *tx, user.id)
		.await?
		.ok_or(Error::UnknownUser(user.id))?;

	tx.commit().await?;

	let photo_url = state.photo_url(&user);
	let token = (!deleted).then_some(auth.token.key);
	let envelope = Envelope::success(model::Account::new(user, token, photo_url));

	if deleted {
		return Ok((
			[(header::SET_COOKIE, cookie::clear_cookie().to_string())],
			envelope,
		)
			.into_response());
	}

	Ok(envelope.into_response())
}

/// Replace profile photo
/// Stores a new profile photo for the authenticated account, replacing the previous one.
#[route(tag = tag::USER, response(status = 200, description = "Profile photo replaced.", shape = "Envelope<model::PhotoResult>"))]
pub async fn put_photo(
	State(state): State<AppState>,
	auth: Auth,
	Json(input): Json<model::PhotoInput>,
) -> Result<Envelope<model::PhotoResult>, RouteError> {
	let data = input.profile_photo.unwrap_or_default();
	let upload = media::profile_photo(&data, auth.user.id, Utc::now()).map_err(Error::from)?;

	let user = state
		.media
		.save_with(Some(&upload), async {
			sqlx::query_as::<_, model::User>(
				r#"UPDATE "user" SET profile_photo = $1, updated_at = now() WHERE id = $2 RETURNING *"#,
			)
			.bind(&upload.path)
			.bind(auth.user.id)
			.fetch_one(&state.database)
			.await
			.map_err(AppError::from)
		})
		.await?;

	if let Some(previous) = auth.user.profile_photo.filter(|path| *path != upload.path) {
		state.media.delete(&previous).await?;
	}

	Ok(Envelope::success(model::PhotoResult {
		profile_photo: state.photo_url(&user),
	}))
}

/// Remove profile photo
/// Deletes the profile photo of the authenticated account, if it has one.
#[route(tag = tag::USER, response(status = 204, description = "Profile photo removed."))]
pub async fn delete_photo(
	State(state): State<AppState>,
	auth: Auth,
) -> Result<impl IntoApiResponse, RouteError> {
	if let Some(path) = &auth.user.profile_photo {
		state.media.delete(path).await?;

		sqlx::query(r#"UPDATE "user" SET profile_photo = NULL, updated_at = now() WHERE id = $1"#)
			.bind(auth.user.id)
			.execute(&state.database)
			.await?;
	}

	Ok(StatusCode::NO_CONTENT.into_response())
}

/// List users
/// Returns a paginated list of all users, newest first. Only available to admins.
#[route(tag = tag::USER)]
pub async fn list_users(
	State(state): State<AppState>,
	Admin(_): Admin,
	Query(paginate): Query<model::LimitOffset>,
) -> Result<Envelope<model::Page<model::UserSummary>>, RouteError> {
	let count = sqlx::query_scalar::<_, i64>(r#"SELECT count(*) FROM "user""#)
		.fetch_one(&state.database)
		.await?;

	let users = sqlx::query_as::<_, model::UserSummary>(
		r#"
			SELECT id, email FROM "user"
			ORDER BY date_joined DESC, id
			LIMIT $1 OFFSET $2
		"#,
	)
	.bind(paginate.limit())
	.bind(paginate.offset())
	.fetch_all(&state.database)
	.await?;

	let path = format!("{}/user", state.config.site_domain);

	Ok(Envelope::success(paginate.page(&path, count, users)))
}

/// Get user
/// Returns the id and email of a user. Users may only look up themselves, admins anyone.
#[route(tag = tag::USER)]
pub async fn get_user(
	State(database): State<Database>,
	auth: Auth,
	Path(model::IdInput { id }): Path<model::IdInput>,
) -> Result<Envelope<model::UserSummary>, RouteError> {
	let user = model::User::by_id(&database, id)
		.await?
		.ok_or(Error::UnknownUser(id))?;

	check_object_permission(&auth.user, &user)?;

	Ok(Envelope::success(model::UserSummary {
		id: user.id,
		email: user.email,
	}))
}

/// List user addresses
/// Returns a paginated list of the addresses a user has authenticated from,
/// most recent first. Users may only list their own, admins anyone's.
#[route(tag = tag::USER)]
pub async fn list_user_ips(
	State(state): State<AppState>,
	auth: Auth,
	Path(model::IdInput { id }): Path<model::IdInput>,
	Query(paginate): Query<model::LimitOffset>,
) -> Result<Envelope<model::Page<model::UserIp>>, RouteError> {
	let user = model::User::by_id(&state.database, id)
		.await?
		.ok_or(Error::UnknownUser(id))?;

	check_object_permission(&auth.user, &user)?;

	let count = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM user_ip WHERE user_id = $1")
		.bind(user.id)
		.fetch_one(&state.database)
		.await?;

	let ips = sqlx::query_as::<_, model::UserIp>(
		r#"
			SELECT * FROM user_ip
			WHERE user_id = $1
			ORDER BY created_at DESC, id
			LIMIT $2 OFFSET $3
		"#,
	)
	.bind(user.id)
	.bind(paginate.limit())
	.bind(paginate.offset())
	.fetch_all(&state.database)
	.await?;

	let path = format!("{}/user/{id}/ips", state.config.site_domain);

	Ok(Envelope::success(paginate.page(&path, count, ips)))
}

/// Forget user address
/// Deletes a recorded address. Users may only delete their own, admins anyone's.
#[route(tag = tag::USER, response(status = 204, description = "Address deleted."))]
pub async fn delete_user_ip(
	State(database): State<Database>,
	auth: Auth,
	Path(model::IdInput { id }): Path<model::IdInput>,
) -> Result<impl IntoApiResponse, RouteError> {
	let ip = sqlx::query_as::<_, model::UserIp>("SELECT * FROM user_ip WHERE id = $1")
		.bind(id)
		.fetch_optional(&database)
		.await?
		.ok_or(Error::UnknownIp(id))?;

	check_object_permission(&auth.user, &ip)?;

	sqlx::query("DELETE FROM user_ip WHERE id = $1")
		.bind(ip.id)
		.execute(&database)
		.await?;

	Ok(StatusCode::NO_CONTENT.into_response())
}
